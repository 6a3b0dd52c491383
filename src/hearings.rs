use crate::extractor::FieldExtractor;
use crate::locator::TableLocator;
use crate::model::{HearingDate, HearingEvent};
use crate::page::Table;
use log::debug;

pub const DEFAULT_HEARING_KEYWORDS: [&str; 2] = ["PAROLE", "HEARING"];

/// Columns read from each hearing row, in order: date, action, status, outcome.
const HEARING_COLUMNS: usize = 4;

/// Converts the first table accepted by `locator` into hearing events.
///
/// The first row is the header. Shorter rows are skipped. No matching table
/// yields an empty list.
pub fn extract_hearings(
    tables: &[Table],
    locator: &TableLocator,
    extractor: &FieldExtractor,
) -> Vec<HearingEvent> {
    let Some(table) = locator.locate(tables) else {
        debug!("No hearings table among {} tables", tables.len());
        return Vec::new();
    };

    table
        .rows
        .iter()
        .skip(1)
        .filter(|cells| cells.len() >= HEARING_COLUMNS)
        .map(|cells| HearingEvent {
            date: hearing_date(&cells[0], extractor),
            action: cells[1].trim().to_string(),
            status: cells[2].trim().to_string(),
            outcome: cells[3].trim().to_string(),
        })
        .collect()
}

fn hearing_date(cell: &str, extractor: &FieldExtractor) -> HearingDate {
    let text = cell.trim();
    if text.is_empty() {
        return HearingDate::Missing;
    }
    match extractor.parse_date_token(text) {
        Some(date) => HearingDate::Canonical(date),
        None => HearingDate::Unparsed(text.to_string()),
    }
}
