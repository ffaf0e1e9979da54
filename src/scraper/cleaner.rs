use crate::error::{ScrapeError, ScrapeResult};
use crate::models::{PRICE_UNIT, PriceRecord, RawTableRow, ScrapeContext};
use chrono::NaiveDateTime;

use super::parsers::ColumnMap;

// ── Prices ────────────────────────────────────────────────────────────────────

/// Normalise a price cell: keep digits and dots, re-render the parsed value
/// with at least one fractional digit.
/// " 1,234.50 Rs" → "1234.5" | "2000" → "2000.0" | "N/A" → "0" | "1.2.3" → "0"
pub fn clean_price(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    if cleaned.is_empty() {
        return "0".to_string();
    }
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => {
            let rendered = v.to_string();
            if rendered.contains('.') {
                rendered
            } else {
                format!("{rendered}.0")
            }
        }
        _ => "0".to_string(),
    }
}

fn cell_or(row: &RawTableRow, idx: Option<usize>, fallback: &str) -> String {
    idx.and_then(|i| row.cell(i))
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

// ── Table row → PriceRecord ───────────────────────────────────────────────────

/// Map one data row onto a record. `Ok(None)` means the row carries no
/// usable modal price and is dropped.
pub fn table_row_to_record(
    ordinal: usize,
    row: &RawTableRow,
    columns: &ColumnMap,
    ctx: &ScrapeContext,
    now: NaiveDateTime,
) -> ScrapeResult<Option<PriceRecord>> {
    if row.len() < columns.min_cells() {
        return Err(ScrapeError::Parse {
            row: ordinal,
            reason: format!("{} cells, need {}", row.len(), columns.min_cells()),
        });
    }

    let price = |idx: usize| row.cell(idx).map(clean_price).unwrap_or_else(|| "0".into());
    let modal_price = price(columns.modal_price);

    let modal: f64 = modal_price.parse().map_err(|e| ScrapeError::Parse {
        row: ordinal,
        reason: format!("modal price {modal_price:?}: {e}"),
    })?;
    if modal <= 0.0 {
        return Ok(None);
    }

    Ok(Some(PriceRecord {
        serial: cell_or(row, columns.serial, &ordinal.to_string()),
        state: ctx.state.clone(),
        district: cell_or(row, columns.district, ""),
        market: ctx.market.clone(),
        commodity: cell_or(row, columns.commodity, &ctx.commodity),
        variety: cell_or(row, columns.variety, ""),
        grade: cell_or(row, columns.grade, ""),
        min_price: price(columns.min_price),
        max_price: price(columns.max_price),
        modal_price,
        date: cell_or(row, Some(columns.date), &ctx.date),
        scraped_at: now,
        unit: PRICE_UNIT.to_string(),
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
