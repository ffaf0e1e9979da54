use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Unit every AGMARKNET price is quoted in.
pub const PRICE_UNIT: &str = "Quintal";

// ── Requests ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapeRequest {
    pub state: String,
    pub commodity: String,
    pub market: Option<String>,
}

impl ScrapeRequest {
    pub fn new(
        state: impl Into<String>,
        commodity: impl Into<String>,
        market: Option<String>,
    ) -> Self {
        Self {
            state: state.into(),
            commodity: commodity.into(),
            market: market.filter(|m| !m.trim().is_empty()),
        }
    }
}

/// Markets offered for a (state, commodity) pair, in dropdown order.
pub type MarketList = Vec<String>;

/// What the table parser knows about the page it is reading.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeContext {
    pub state: String,
    pub commodity: String,
    pub market: String,
    pub date: String, // dd-Mon-YYYY, as typed into the form
}

// ── Price record ──────────────────────────────────────────────────────────────

/// One grid row. Serialized with the report's own column captions, which is
/// what existing API clients key on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PriceRecord {
    #[serde(rename = "S.No")]
    pub serial: String,
    pub state: String,
    pub district: String,
    pub market: String,
    pub commodity: String,
    pub variety: String,
    pub grade: String,
    #[serde(rename = "Min Price")]
    pub min_price: String,
    #[serde(rename = "Max Price")]
    pub max_price: String,
    #[serde(rename = "Modal Price")]
    pub modal_price: String, // always parses to > 0
    pub date: String,
    #[serde(rename = "Scraped At")]
    pub scraped_at: NaiveDateTime,
    pub unit: String,
}

// ── Raw rows ──────────────────────────────────────────────────────────────────

/// Cell groups of one `<tr>` after delimiter splitting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTableRow {
    pub cells: Vec<String>,
}

impl RawTableRow {
    pub fn cell(&self, idx: usize) -> Option<&str> {
        self.cells.get(idx).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }
}
