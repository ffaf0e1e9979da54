//! In-process sources for tests: no browser, canned pages and records.

use super::MarketDataSource;
use super::form::{FormLauncher, PortalForm};
use crate::error::{ScrapeError, ScrapeResult};
use crate::models::{MarketList, PRICE_UNIT, PriceRecord, ScrapeRequest};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::{Arc, Mutex};

/// "Kerala" always times out waiting for the results table, "Nowhere" has
/// no markets; everything else yields one record per scrape.
#[derive(Default)]
pub struct StubSource {
    calls: Mutex<Vec<ScrapeRequest>>,
}

impl StubSource {
    pub fn calls(&self) -> Vec<ScrapeRequest> {
        self.calls.lock().unwrap().clone()
    }

    fn markets(state: &str) -> MarketList {
        match state {
            "Nowhere" => vec![],
            _ => vec!["Pune".to_string(), "Pune(Pimpri)".to_string()],
        }
    }
}

pub fn record(state: &str, commodity: &str, market: &str) -> PriceRecord {
    PriceRecord {
        serial: "1".into(),
        state: state.into(),
        district: "Pune".into(),
        market: market.into(),
        commodity: commodity.into(),
        variety: "Other".into(),
        grade: "FAQ".into(),
        min_price: "2400.0".into(),
        max_price: "2900.0".into(),
        modal_price: "2650.0".into(),
        date: "12 Oct 2026".into(),
        scraped_at: NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap(),
        unit: PRICE_UNIT.into(),
    }
}

#[async_trait]
impl MarketDataSource for StubSource {
    async fn fetch_prices(&self, request: &ScrapeRequest) -> ScrapeResult<Vec<PriceRecord>> {
        self.calls.lock().unwrap().push(request.clone());

        if request.state == "Kerala" {
            return Err(ScrapeError::navigation(
                "waiting 15s for results table 'cphBody_GridPriceData'",
                "timed out",
            ));
        }

        let market = match &request.market {
            Some(m) => m.clone(),
            None => Self::markets(&request.state)
                .into_iter()
                .next()
                .ok_or_else(|| ScrapeError::NoMarketsAvailable {
                    state: request.state.clone(),
                    commodity: request.commodity.clone(),
                })?,
        };

        Ok(vec![record(&request.state, &request.commodity, &market)])
    }

    async fn fetch_markets(&self, state: &str, _commodity: &str) -> MarketList {
        Self::markets(state)
    }
}

// ── Scripted form ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Launch,
    Open,
    Fill,
    Select,
    Results,
}

/// What the fake portal offers and where it breaks.
#[derive(Debug, Clone)]
pub struct FakeScript {
    pub markets: MarketList,
    pub fail_at: Option<FailAt>,
}

impl Default for FakeScript {
    fn default() -> Self {
        Self {
            markets: vec!["Pune".to_string(), "Pune(Pimpri)".to_string()],
            fail_at: None,
        }
    }
}

/// One data row between the header block and the footer.
pub fn results_html() -> String {
    let tr = |cells: &[&str]| {
        let cells: String = cells.iter().map(|c| format!("<td>\n\n{c}</td>")).collect();
        format!("<tr>{cells}</tr>")
    };
    let rows = [
        tr(&["Market Wise Price", "Pune"]),
        tr(&["Commodity: Wheat", "State: Maharashtra"]),
        tr(&["From: 12-Oct-2026", "To: 12-Oct-2026"]),
        tr(&[
            "Sl no.", "District Name", "Market Name", "Commodity", "Variety", "Grade",
            "Min Price", "Max Price", "Modal Price", "Price Date",
        ]),
        tr(&["1", "Pune", "Pune", "Wheat", "Lokwan", "FAQ", "2,400", "2,900", "2,650", "12 Oct 2026"]),
        tr(&["Total", "1"]),
    ];
    format!("<table id=\"cphBody_GridPriceData\">{}</table>", rows.concat())
}

/// Hands out [`FakeForm`]s that share one event log.
#[derive(Clone)]
pub struct FakeLauncher {
    script: FakeScript,
    events: Arc<Mutex<Vec<String>>>,
    launches: Arc<Mutex<usize>>,
}

impl FakeLauncher {
    pub fn new(script: FakeScript) -> Self {
        Self {
            script,
            events: Arc::default(),
            launches: Arc::default(),
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn launches(&self) -> usize {
        *self.launches.lock().unwrap()
    }
}

#[async_trait]
impl FormLauncher for FakeLauncher {
    type Form = FakeForm;

    async fn launch(&self) -> ScrapeResult<FakeForm> {
        if self.script.fail_at == Some(FailAt::Launch) {
            return Err(ScrapeError::Failure("webdriver unreachable".into()));
        }
        *self.launches.lock().unwrap() += 1;
        Ok(FakeForm {
            script: self.script.clone(),
            events: self.events.clone(),
        })
    }
}

pub struct FakeForm {
    script: FakeScript,
    events: Arc<Mutex<Vec<String>>>,
}

impl FakeForm {
    fn step(&self, event: String, at: FailAt) -> ScrapeResult<()> {
        self.events.lock().unwrap().push(event.clone());
        if self.script.fail_at == Some(at) {
            return Err(ScrapeError::navigation(event, "timed out"));
        }
        Ok(())
    }
}

#[async_trait]
impl PortalForm for FakeForm {
    async fn open(&self) -> ScrapeResult<()> {
        self.step("open".into(), FailAt::Open)
    }

    async fn fill_filters(&self, state: &str, commodity: &str, _date: &str) -> ScrapeResult<()> {
        self.step(format!("fill {state}/{commodity}"), FailAt::Fill)
    }

    async fn market_options(&self) -> MarketList {
        self.events.lock().unwrap().push("markets".into());
        self.script.markets.clone()
    }

    async fn select_market_and_submit(&self, market: &str) -> ScrapeResult<()> {
        if !self.script.markets.iter().any(|m| m == market) {
            return Err(ScrapeError::navigation(
                format!("waiting for market '{market}'"),
                "not offered",
            ));
        }
        self.step(format!("select {market}"), FailAt::Select)
    }

    async fn results_page(&self) -> ScrapeResult<String> {
        self.step("results".into(), FailAt::Results)?;
        Ok(results_html())
    }

    async fn close(self) {
        self.events.lock().unwrap().push("close".into());
    }
}
