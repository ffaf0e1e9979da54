//! Drives the AGMARKNET "Commodity wise, Market wise daily report" form.
//!
//! Sequence: open page → dismiss dialog → commodity → state → date → Go
//! → (market dropdown now populated) → market → Go → results grid.
//! Each step waits for the control it needs, and for the page to reload
//! after a postback, instead of sleeping.

use crate::config::{AppConfig, BrowserConfig, PortalConfig};
use crate::error::{ScrapeError, ScrapeResult};
use crate::models::MarketList;
use async_trait::async_trait;
use chrono::{NaiveDate, TimeDelta};
use std::future::Future;
use std::time::{Duration, Instant};
use thirtyfour::components::SelectElement;
use thirtyfour::prelude::*;
use tracing::{debug, info};

use super::browser::BrowserSession;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// `dd-Mon-YYYY`, `offset_days` before `today`.
pub fn form_date(today: NaiveDate, offset_days: i64) -> String {
    (today - TimeDelta::days(offset_days)).format("%d-%b-%Y").to_string()
}

/// Market names from the dropdown labels: blanks ignored, the leading
/// "-- Select --" placeholder dropped.
pub fn market_names(labels: Vec<String>) -> MarketList {
    labels
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .skip(1)
        .collect()
}

/// True once `market` is among the real (non-placeholder) dropdown labels.
pub fn offers_market(labels: Vec<String>, market: &str) -> bool {
    market_names(labels).iter().any(|m| m == market.trim())
}

// ── Form seam ─────────────────────────────────────────────────────────────────

/// The form steps a scrape is built from. Each call leaves the page settled
/// for the next one.
#[async_trait]
pub trait PortalForm: Send + Sync {
    /// Load a clean copy of the form.
    async fn open(&self) -> ScrapeResult<()>;

    /// Commodity, state and date, then the first Go.
    async fn fill_filters(&self, state: &str, commodity: &str, date: &str) -> ScrapeResult<()>;

    /// Markets offered after the first Go. Empty if the dropdown never fills.
    async fn market_options(&self) -> MarketList;

    async fn select_market_and_submit(&self, market: &str) -> ScrapeResult<()>;

    /// Wait for the results grid and hand back the page markup.
    async fn results_page(&self) -> ScrapeResult<String>;

    /// End the session behind the form.
    async fn close(self);

    /// Filters + first Go + market dropdown read.
    async fn discover_markets(
        &self,
        state: &str,
        commodity: &str,
        date: &str,
    ) -> ScrapeResult<MarketList> {
        self.fill_filters(state, commodity, date).await?;
        let markets = self.market_options().await;
        info!(
            "{} markets for {} in {}",
            markets.len(),
            commodity,
            state
        );
        Ok(markets)
    }
}

/// Opens a fresh form per scrape.
#[async_trait]
pub trait FormLauncher: Send + Sync {
    type Form: PortalForm;

    async fn launch(&self) -> ScrapeResult<Self::Form>;
}

/// Chrome over WebDriver.
pub struct ChromeLauncher {
    browser: BrowserConfig,
    portal: PortalConfig,
}

impl ChromeLauncher {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            browser: config.browser.clone(),
            portal: config.portal.clone(),
        }
    }
}

#[async_trait]
impl FormLauncher for ChromeLauncher {
    type Form = FormDriver;

    async fn launch(&self) -> ScrapeResult<FormDriver> {
        let session = BrowserSession::start(&self.browser).await?;
        Ok(FormDriver {
            session,
            portal: self.portal.clone(),
        })
    }
}

// ── WebDriver form ────────────────────────────────────────────────────────────

pub struct FormDriver {
    session: BrowserSession,
    portal: PortalConfig,
}

impl FormDriver {
    fn driver(&self) -> &WebDriver {
        self.session.driver()
    }

    async fn dismiss_popup(&self) {
        let popup = self
            .driver()
            .query(By::ClassName(self.portal.popup_class.as_str()))
            .wait(self.portal.popup_wait(), POLL_INTERVAL)
            .first()
            .await;

        let Ok(popup) = popup else {
            debug!("No popup found");
            return;
        };

        let closed = match popup
            .find(By::ClassName(self.portal.popup_close_class.as_str()))
            .await
        {
            Ok(button) => button.click().await,
            Err(e) => Err(e),
        };
        match closed {
            Ok(()) => info!("Popup closed"),
            Err(e) => debug!("Popup present but not closable: {}", e),
        }
    }

    /// Wait until the control is present and enabled.
    async fn ready(&self, id: &str) -> ScrapeResult<WebElement> {
        self.driver()
            .query(By::Id(id))
            .and_enabled()
            .wait(self.portal.step_wait(), POLL_INTERVAL)
            .first()
            .await
            .map_err(ScrapeError::element(id))
    }

    /// Wait for a postback to replace `before`. Selects that don't post back
    /// leave it attached; that is not an error.
    async fn settle(&self, before: WebElement, what: &str) {
        match before
            .wait_until()
            .wait(self.portal.postback_wait(), POLL_INTERVAL)
            .stale()
            .await
        {
            Ok(()) => debug!("Page reloaded after {}", what),
            Err(_) => debug!("No postback after {}", what),
        }
    }

    /// Select `label` and wait out any postback it triggers.
    async fn select_label(&self, id: &str, label: &str, what: &str) -> ScrapeResult<()> {
        debug!("Selecting {} '{}'", what, label);
        let element = self.ready(id).await?;
        let select = SelectElement::new(&element)
            .await
            .map_err(ScrapeError::element(id))?;
        select
            .select_by_visible_text(label)
            .await
            .map_err(|e| ScrapeError::navigation(format!("selecting {what} '{label}'"), e))?;
        self.settle(element, what).await;
        Ok(())
    }

    async fn set_date(&self, date: &str) -> ScrapeResult<()> {
        debug!("Setting date {}", date);
        let input = self.ready(&self.portal.date_input).await?;
        input
            .clear()
            .await
            .map_err(|e| ScrapeError::navigation("clearing the date field", e))?;
        input
            .send_keys(date)
            .await
            .map_err(|e| ScrapeError::navigation("typing the date", e))
    }

    /// Click Go. The first Go must reload the page before anything else is
    /// read from it.
    async fn submit(&self, step: &str, expect_reload: bool) -> ScrapeResult<()> {
        debug!("Clicking Go ({})", step);
        let go = self.ready(&self.portal.go_button).await?;
        go.click()
            .await
            .map_err(|e| ScrapeError::navigation(format!("submitting {step}"), e))?;

        if expect_reload {
            go.wait_until()
                .wait(self.portal.step_wait(), POLL_INTERVAL)
                .stale()
                .await
                .map_err(|e| ScrapeError::navigation(format!("reloading after {step}"), e))?;
        }
        Ok(())
    }

    async fn option_labels(&self) -> ScrapeResult<Vec<String>> {
        let id = &self.portal.market_select;
        let element = self
            .driver()
            .find(By::Id(id.as_str()))
            .await
            .map_err(ScrapeError::element(id.as_str()))?;
        let select = SelectElement::new(&element)
            .await
            .map_err(ScrapeError::element(id.as_str()))?;
        let options = select
            .options()
            .await
            .map_err(|e| ScrapeError::navigation("reading market options", e))?;

        let mut labels = Vec::with_capacity(options.len());
        for option in options {
            let text = option
                .text()
                .await
                .map_err(|e| ScrapeError::navigation("reading market options", e))?;
            labels.push(text);
        }
        Ok(labels)
    }

    /// Poll the market dropdown until `market` is offered.
    async fn await_market(&self, market: &str) -> ScrapeResult<()> {
        let offered = wait_until(self.portal.step_wait(), move || async move {
            match self.option_labels().await {
                Ok(labels) => offers_market(labels, market).then_some(()),
                Err(e) => {
                    debug!("Market dropdown not ready: {}", e);
                    None
                }
            }
        })
        .await;

        offered.ok_or_else(|| {
            ScrapeError::navigation(
                format!("waiting for market '{market}'"),
                format!("not offered within {}s", self.portal.step_wait_secs),
            )
        })
    }
}

#[async_trait]
impl PortalForm for FormDriver {
    async fn open(&self) -> ScrapeResult<()> {
        debug!("Loading {}", self.portal.base_url);
        self.driver()
            .goto(self.portal.base_url.as_str())
            .await
            .map_err(|e| ScrapeError::navigation("loading the search page", e))?;
        self.dismiss_popup().await;
        Ok(())
    }

    async fn fill_filters(&self, state: &str, commodity: &str, date: &str) -> ScrapeResult<()> {
        self.select_label(&self.portal.commodity_select, commodity, "commodity")
            .await?;
        self.select_label(&self.portal.state_select, state, "state")
            .await?;
        self.set_date(date).await?;
        self.submit("filters", true).await
    }

    async fn market_options(&self) -> MarketList {
        let found = wait_until(self.portal.step_wait(), move || async move {
            match self.option_labels().await {
                Ok(labels) => {
                    let markets = market_names(labels);
                    (!markets.is_empty()).then_some(markets)
                }
                Err(e) => {
                    debug!("Market dropdown not ready: {}", e);
                    None
                }
            }
        })
        .await;

        found.unwrap_or_default()
    }

    async fn select_market_and_submit(&self, market: &str) -> ScrapeResult<()> {
        self.await_market(market).await?;
        self.select_label(&self.portal.market_select, market, "market")
            .await?;
        self.submit("market", false).await
    }

    async fn results_page(&self) -> ScrapeResult<String> {
        debug!("Waiting for data table...");
        self.driver()
            .query(By::Id(self.portal.results_table.as_str()))
            .wait(self.portal.table_wait(), POLL_INTERVAL)
            .first()
            .await
            .map_err(|e| {
                ScrapeError::navigation(
                    format!(
                        "waiting {}s for results table '{}'",
                        self.portal.table_wait_secs, self.portal.results_table
                    ),
                    e,
                )
            })?;

        self.driver()
            .source()
            .await
            .map_err(|e| ScrapeError::navigation("reading page source", e))
    }

    async fn close(self) {
        self.session.close().await;
    }
}

/// Poll `probe` until it yields a value or `timeout` passes.
async fn wait_until<T, F, Fut>(timeout: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = probe().await {
            return Some(value);
        }
        if Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
