pub mod browser;
pub mod cleaner;
pub mod form;
pub mod parsers;

#[cfg(test)]
pub mod stub;

use crate::config::AppConfig;
use crate::error::{ScrapeError, ScrapeResult};
use crate::models::{MarketList, PriceRecord, ScrapeContext, ScrapeRequest};
use crate::utils::Timer;
use async_trait::async_trait;
use chrono::{Local, Utc};
use tracing::{error, info, warn};

use self::form::{ChromeLauncher, FormLauncher, PortalForm, form_date};
use self::parsers::parse_price_table;

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable data source abstraction.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Full scrape. Any failed form step aborts the whole call.
    async fn fetch_prices(&self, request: &ScrapeRequest) -> ScrapeResult<Vec<PriceRecord>>;

    /// Markets for a (state, commodity) pair. Empty on any failure.
    async fn fetch_markets(&self, state: &str, commodity: &str) -> MarketList;
}

// ── AGMARKNET scraper ─────────────────────────────────────────────────────────

pub struct AgmarknetScraper<L = ChromeLauncher> {
    config: AppConfig,
    launcher: L,
}

impl AgmarknetScraper {
    pub fn new(config: AppConfig) -> Self {
        let launcher = ChromeLauncher::new(&config);
        Self::with_launcher(config, launcher)
    }
}

impl<L: FormLauncher> AgmarknetScraper<L> {
    pub fn with_launcher(config: AppConfig, launcher: L) -> Self {
        Self { config, launcher }
    }

    fn target_date(&self) -> String {
        form_date(Local::now().date_naive(), self.config.portal.date_offset_days)
    }

    async fn scrape_in_session(
        &self,
        form: &L::Form,
        request: &ScrapeRequest,
        date: &str,
    ) -> ScrapeResult<Vec<PriceRecord>> {
        form.open().await?;

        let market = match &request.market {
            Some(market) => market.clone(),
            None => {
                let markets = form
                    .discover_markets(&request.state, &request.commodity, date)
                    .await
                    .unwrap_or_else(|e| {
                        warn!("Error getting markets: {}", e);
                        MarketList::new()
                    });
                let first = markets.into_iter().next().ok_or_else(|| {
                    ScrapeError::NoMarketsAvailable {
                        state: request.state.clone(),
                        commodity: request.commodity.clone(),
                    }
                })?;
                info!("Using market: {}", first);

                // Discovery leaves the form mid-postback; start over
                form.open().await?;
                first
            }
        };

        form.fill_filters(&request.state, &request.commodity, date)
            .await?;
        form.select_market_and_submit(&market).await?;
        let html = form.results_page().await?;

        let ctx = ScrapeContext {
            state: request.state.clone(),
            commodity: request.commodity.clone(),
            market,
            date: date.to_string(),
        };
        parse_price_table(&html, &ctx, self.config.scraper.columns, Utc::now().naive_utc())
    }
}

#[async_trait]
impl<L: FormLauncher> MarketDataSource for AgmarknetScraper<L> {
    async fn fetch_prices(&self, request: &ScrapeRequest) -> ScrapeResult<Vec<PriceRecord>> {
        info!(
            "Starting scrape for State: {}, Commodity: {}, Market: {:?}",
            request.state, request.commodity, request.market
        );
        let _t = Timer::start(format!("scrape {} / {}", request.state, request.commodity));

        let date = self.target_date();
        let form = self.launcher.launch().await?;
        let result = self.scrape_in_session(&form, request, &date).await;
        form.close().await;

        match &result {
            Ok(records) => info!("Successfully scraped {} records", records.len()),
            Err(e) => error!("Scraping failed: {}", e),
        }
        result
    }

    async fn fetch_markets(&self, state: &str, commodity: &str) -> MarketList {
        let date = self.target_date();
        let form = match self.launcher.launch().await {
            Ok(form) => form,
            Err(e) => {
                error!("Error getting markets: {}", e);
                return MarketList::new();
            }
        };

        let markets = match form.open().await {
            Ok(()) => form.discover_markets(state, commodity, &date).await,
            Err(e) => Err(e),
        };
        form.close().await;

        markets.unwrap_or_else(|e| {
            error!("Error getting markets: {}", e);
            MarketList::new()
        })
    }
}
