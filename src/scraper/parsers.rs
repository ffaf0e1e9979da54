use crate::config::ColumnMode;
use crate::error::{ScrapeError, ScrapeResult};
use crate::models::{PriceRecord, RawTableRow, ScrapeContext};
use chrono::NaiveDateTime;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use super::cleaner::table_row_to_record;

/// Rows above the data: title, filters, date range, column header.
const HEADER_ROWS: usize = 4;
/// Below the data: the grid footer.
const FOOTER_ROWS: usize = 1;
const MIN_SURVIVING_ROWS: usize = HEADER_ROWS + 1;

// ── Column map ────────────────────────────────────────────────────────────────

/// Where each record field lives inside a split row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub serial: Option<usize>,
    pub district: Option<usize>,
    pub commodity: Option<usize>,
    pub variety: Option<usize>,
    pub grade: Option<usize>,
    pub min_price: usize,
    pub max_price: usize,
    pub modal_price: usize,
    pub date: usize,
}

impl ColumnMap {
    /// Legacy AGMARKNET grid layout. Index 0 is the empty group produced by
    /// the row's leading line break; 3 is the market name, taken from the
    /// request instead.
    pub const FIXED: ColumnMap = ColumnMap {
        serial: Some(1),
        district: Some(2),
        commodity: Some(4),
        variety: Some(5),
        grade: Some(6),
        min_price: 7,
        max_price: 8,
        modal_price: 9,
        date: 10,
    };

    /// Derive positions from a header row. `None` unless every price column
    /// and the date column can be located.
    pub fn from_header(row: &RawTableRow) -> Option<ColumnMap> {
        let names: Vec<String> = row.cells.iter().map(|c| c.to_lowercase()).collect();

        let modal_price = position(&names, |n| n.contains("modal"))?;
        let min_price = position(&names, |n| n.contains("min") && n.contains("price"))?;
        let max_price = position(&names, |n| n.contains("max") && n.contains("price"))?;
        let date = position(&names, |n| n.contains("date"))?;

        Some(ColumnMap {
            serial: position(&names, |n| {
                n.starts_with("sl") || n.contains("s.no") || n.contains("serial")
            }),
            district: position(&names, |n| n.contains("district")),
            commodity: position(&names, |n| n.contains("commodity")),
            variety: position(&names, |n| n.contains("variety")),
            grade: position(&names, |n| n.contains("grade")),
            min_price,
            max_price,
            modal_price,
            date,
        })
    }

    /// Cells a data row needs before it is considered.
    pub fn min_cells(&self) -> usize {
        [
            self.serial,
            self.district,
            self.commodity,
            self.variety,
            self.grade,
            Some(self.min_price),
            Some(self.max_price),
            Some(self.modal_price),
            Some(self.date),
        ]
        .into_iter()
        .flatten()
        .max()
        .map_or(0, |m| m + 1)
    }

    /// Header-derived positions only count when the header row is laid out
    /// like the data: same width and the same leading blank group. A header
    /// that splits differently would shift every field.
    fn resolve(mode: ColumnMode, header_block: &[RawTableRow], body: &[RawTableRow]) -> ColumnMap {
        if mode == ColumnMode::Fixed {
            return Self::FIXED;
        }
        let Some((header, map)) = header_block
            .iter()
            .find_map(|row| Self::from_header(row).map(|map| (row, map)))
        else {
            debug!("No usable header row, using fixed column layout");
            return Self::FIXED;
        };

        match body.iter().max_by_key(|row| row.len()) {
            Some(data) if aligned(header, data) => {
                debug!("Column map derived from header: {:?}", map);
                map
            }
            _ => {
                debug!(
                    "Header row ({} cells) does not line up with the data rows, using fixed column layout",
                    header.len()
                );
                Self::FIXED
            }
        }
    }
}

fn leading_blanks(row: &RawTableRow) -> usize {
    row.cells.iter().take_while(|c| c.is_empty()).count()
}

fn aligned(header: &RawTableRow, data: &RawTableRow) -> bool {
    header.len() == data.len() && leading_blanks(header) == leading_blanks(data)
}

fn position(names: &[String], pred: impl Fn(&str) -> bool) -> Option<usize> {
    names.iter().position(|n| pred(n.as_str()))
}

// ── Row splitting ─────────────────────────────────────────────────────────────

/// Split a row's text content into cell groups: line breaks become `_`,
/// double spaces vanish, `__` separates cells.
pub fn split_row_text(text: &str) -> RawTableRow {
    let flattened = text.replace("\r\n", "\n").replace('\n', "_").replace("  ", "");
    RawTableRow {
        cells: flattened
            .split("__")
            .map(|c| c.trim().to_string())
            .collect(),
    }
}

/// Every `<tr>` on the page that splits into more than one cell group.
pub fn extract_rows(html: &str) -> ScrapeResult<Vec<RawTableRow>> {
    let doc = Html::parse_document(html);
    let tr_sel = Selector::parse("tr")
        .map_err(|e| ScrapeError::Failure(format!("tr selector: {e:?}")))?;

    Ok(doc
        .select(&tr_sel)
        .map(|tr| split_row_text(&tr.text().collect::<String>()))
        .filter(|row| row.len() > 1)
        .collect())
}

// ── Results page ──────────────────────────────────────────────────────────────

/// Parse the post-submission page into price records. Rows that fail to
/// parse are logged and skipped.
pub fn parse_price_table(
    html: &str,
    ctx: &ScrapeContext,
    mode: ColumnMode,
    now: NaiveDateTime,
) -> ScrapeResult<Vec<PriceRecord>> {
    let rows = extract_rows(html)?;

    if rows.len() < MIN_SURVIVING_ROWS {
        warn!(
            "No data rows found in table ({} rows) for {} / {} / {}",
            rows.len(),
            ctx.state,
            ctx.commodity,
            ctx.market
        );
        return Ok(vec![]);
    }

    let (header_block, rest) = rows.split_at(HEADER_ROWS);
    let body = &rest[..rest.len().saturating_sub(FOOTER_ROWS)];
    let columns = ColumnMap::resolve(mode, header_block, body);

    let mut records = Vec::with_capacity(body.len());
    for (i, row) in body.iter().enumerate() {
        match table_row_to_record(i + 1, row, &columns, ctx, now) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => debug!("Dropping row {}: no modal price", i + 1),
            Err(e) => warn!("Skipping {}", e),
        }
    }

    debug!("{} of {} data rows kept", records.len(), body.len());
    Ok(records)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
