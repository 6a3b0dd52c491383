use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use std::fmt;

/// External key of one individual (e.g. `D54803`). Always trimmed and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Identity(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Date cell of a hearing row.
///
/// Cells shaped like `M/D/YYYY` that form a real calendar date are kept in
/// canonical form. Anything else is preserved verbatim so no row is lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HearingDate {
    Canonical(NaiveDate),
    Unparsed(String),
    Missing,
}

pub const UNPARSED_DATE_NOTE: &str = "unparsed source date";

impl HearingDate {
    /// Text written to the store and to JSON output.
    pub fn as_text(&self) -> Option<String> {
        match self {
            HearingDate::Canonical(date) => Some(date.format("%Y-%m-%d").to_string()),
            HearingDate::Unparsed(raw) => Some(raw.clone()),
            HearingDate::Missing => None,
        }
    }

    pub fn note(&self) -> Option<&'static str> {
        match self {
            HearingDate::Unparsed(_) => Some(UNPARSED_DATE_NOTE),
            _ => None,
        }
    }

    /// Rebuilds a date from its stored text and note.
    pub fn from_stored(text: Option<String>, note: Option<String>) -> Self {
        match (text, note) {
            (None, _) => HearingDate::Missing,
            (Some(raw), Some(_)) => HearingDate::Unparsed(raw),
            (Some(raw), None) => match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
                Ok(date) => HearingDate::Canonical(date),
                Err(_) => HearingDate::Unparsed(raw),
            },
        }
    }
}

impl Serialize for HearingDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_text() {
            Some(text) => serializer.serialize_str(&text),
            None => serializer.serialize_none(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HearingEvent {
    pub date: HearingDate,
    pub action: String,
    pub status: String,
    pub outcome: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InmateRecord {
    #[serde(rename = "cdcr_number")]
    pub identity: Identity,
    pub name: Option<String>,
    pub age: Option<u32>,
    pub admission_date: Option<NaiveDate>,
    pub current_location: Option<String>,
    pub commitment_county: Option<String>,
    pub parole_eligible_date: Option<NaiveDate>,
    #[serde(rename = "board_of_parole_hearings")]
    pub hearings: Vec<HearingEvent>,
}

impl InmateRecord {
    /// A record with every optional field unknown.
    pub fn empty(identity: Identity) -> Self {
        InmateRecord {
            identity,
            name: None,
            age: None,
            admission_date: None,
            current_location: None,
            commitment_county: None,
            parole_eligible_date: None,
            hearings: Vec::new(),
        }
    }

    pub fn has_scalar_data(&self) -> bool {
        self.name.is_some()
            || self.age.is_some()
            || self.admission_date.is_some()
            || self.current_location.is_some()
            || self.commitment_county.is_some()
            || self.parole_eligible_date.is_some()
    }
}
