use chrono::NaiveDate;
use regex::Regex;

/// Facility words that mark a cell as the current housing location.
const LOCATION_KEYWORDS: [&str; 5] = ["PRISON", "FACILITY", "CENTER", "CAMP", "INSTITUTION"];
const COUNTY_MARKER: &str = "COUNTY";

pub const DEFAULT_ELIGIBILITY_LABELS: [&str; 2] = ["Parole Eligible Date:", "Eligible for Parole:"];

const MIN_AGE: u32 = 10;
const MAX_AGE: u32 = 120;

/// Tolerant field parsers for the portal's result and detail pages.
///
/// Every parser returns `None` when nothing usable is found. The first
/// candidate in input order wins.
pub struct FieldExtractor {
    date_regex: Regex,
    eligibility_regexes: Vec<Regex>,
}

impl FieldExtractor {
    pub fn new() -> Self {
        Self::with_eligibility_labels(&DEFAULT_ELIGIBILITY_LABELS)
    }

    pub fn with_eligibility_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        let eligibility_regexes = labels
            .iter()
            .map(|label| {
                let pattern = format!(r"(?i){}\s*(\d{{1,2}}/\d{{1,2}}/\d{{4}})", regex::escape(label.as_ref()));
                Regex::new(&pattern).unwrap()
            })
            .collect();

        FieldExtractor {
            // Whole cell must be M/D/YYYY, one or two digit month and day
            date_regex: Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").unwrap(),
            eligibility_regexes,
        }
    }

    pub fn parse_age<S: AsRef<str>>(&self, cells: &[S]) -> Option<u32> {
        cells.iter().find_map(|cell| {
            let text = cell.as_ref();
            if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            text.parse::<u32>()
                .ok()
                .filter(|age| (MIN_AGE..=MAX_AGE).contains(age))
        })
    }

    /// Canonical date for a single `M/D/YYYY` token, `None` for any other shape
    /// or an impossible calendar date.
    pub fn parse_date_token(&self, text: &str) -> Option<NaiveDate> {
        let caps = self.date_regex.captures(text.trim())?;
        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        let year: i32 = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    }

    pub fn parse_date<S: AsRef<str>>(&self, cells: &[S]) -> Option<NaiveDate> {
        cells
            .iter()
            .find_map(|cell| self.parse_date_token(cell.as_ref()))
    }

    pub fn parse_location<S: AsRef<str>>(&self, cells: &[S]) -> Option<String> {
        cells
            .iter()
            .map(|cell| cell.as_ref())
            .find(|text| {
                let upper = text.to_uppercase();
                LOCATION_KEYWORDS.iter().any(|keyword| upper.contains(keyword))
            })
            .map(str::to_string)
    }

    pub fn parse_county<S: AsRef<str>>(&self, cells: &[S]) -> Option<String> {
        cells
            .iter()
            .map(|cell| cell.as_ref())
            .find(|text| text.to_uppercase().contains(COUNTY_MARKER))
            .map(str::to_string)
    }

    /// Scans free text for the first label phrase followed by a valid date.
    /// A label whose date is not a real calendar day is passed over.
    pub fn parse_eligible_date(&self, text: &str) -> Option<NaiveDate> {
        self.eligibility_regexes.iter().find_map(|re| {
            let caps = re.captures(text)?;
            self.parse_date_token(caps.get(1)?.as_str())
        })
    }
}

impl Default for FieldExtractor {
    fn default() -> Self {
        Self::new()
    }
}
