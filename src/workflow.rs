//! Search workflow: one identity, one pass through the portal.
//!
//! The workflow is an explicit state machine. Each stage either advances to
//! the next one or faults; a fault ends the pass and the record keeps every
//! field captured by earlier stages. No fault escapes `acquire`.

use crate::delay_manager::{PacingPolicy, SettlePoint};
use crate::extractor::{FieldExtractor, DEFAULT_ELIGIBILITY_LABELS};
use crate::hearings::{extract_hearings, DEFAULT_HEARING_KEYWORDS};
use crate::locator::TableLocator;
use crate::model::{Identity, InmateRecord};
use crate::page::{Link, PageError, PageSession, Table};
use log::{debug, info, warn};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_PORTAL_URL: &str = "https://ciris.mt.cdcr.ca.gov/";

/// Everything that ties the workflow to one particular portal layout.
#[derive(Debug, Clone)]
pub struct PortalProfile {
    pub base_url: String,
    pub agree_selector: String,
    pub search_mode_selector: String,
    pub identity_input_selector: String,
    pub search_button_selector: String,
    pub page_text_selector: String,
    pub no_records_marker: String,
    pub results_table: TableLocator,
    pub hearings_table: TableLocator,
    pub eligibility_labels: Vec<String>,
    /// Only this many leading result cells are inspected.
    pub results_cell_limit: usize,
}

impl Default for PortalProfile {
    fn default() -> Self {
        PortalProfile {
            base_url: DEFAULT_PORTAL_URL.to_string(),
            agree_selector: r#"input[value="AGREE"]"#.to_string(),
            search_mode_selector: r#"input[value="CDCR"]"#.to_string(),
            identity_input_selector: r#"input[name="k_number"]"#.to_string(),
            search_button_selector: r#"input[type="submit"][value="SEARCH"]"#.to_string(),
            page_text_selector: "body".to_string(),
            no_records_marker: "no records found".to_string(),
            results_table: TableLocator::Index(1),
            hearings_table: TableLocator::header_keywords(DEFAULT_HEARING_KEYWORDS),
            eligibility_labels: DEFAULT_ELIGIBILITY_LABELS.iter().map(|l| l.to_string()).collect(),
            results_cell_limit: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub navigation: Duration,
    pub interaction: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            navigation: Duration::from_secs(30),
            interaction: Duration::from_secs(10),
        }
    }
}

/// Stages of one acquisition. The note on each stage is what the record
/// holds if that stage faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Load the portal root. On fault: identity only.
    Start,
    /// Accept the disclaimer. On fault: identity only.
    Disclaimer,
    /// Switch to search by CDCR number. On fault: identity only.
    ModeSelect,
    /// Type the identity. On fault: identity only.
    QueryEntry,
    /// Submit the search. On fault: identity only.
    Submit,
    /// Look for the no-records marker. On fault: identity only.
    ResultsCheck,
    /// Read name, age, admission date, location, county. On fault: identity only.
    ResultsParse,
    /// Open the detail page. On fault: the results fields.
    DetailNavigate,
    /// Read eligibility date and hearings. On fault: results fields, plus the
    /// eligibility date when only the table read failed.
    DetailParse,
    Done,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::Disclaimer => "disclaimer",
            Stage::ModeSelect => "mode_select",
            Stage::QueryEntry => "query_entry",
            Stage::Submit => "submit",
            Stage::ResultsCheck => "results_check",
            Stage::ResultsParse => "results_parse",
            Stage::DetailNavigate => "detail_navigate",
            Stage::DetailParse => "detail_parse",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one pass: the record plus how far the pass got.
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub record: InmateRecord,
    /// `Done`, or the stage that faulted.
    pub stage: Stage,
    pub fault: Option<String>,
    pub no_records: bool,
}

impl Acquisition {
    pub fn completed(&self) -> bool {
        self.fault.is_none()
    }
}

struct Pass {
    record: InmateRecord,
    detail_link: Option<Link>,
    no_records: bool,
}

pub struct SearchWorkflow {
    profile: PortalProfile,
    timeouts: Timeouts,
    pacing: PacingPolicy,
    extractor: FieldExtractor,
}

impl SearchWorkflow {
    pub fn new(profile: PortalProfile, timeouts: Timeouts, pacing: PacingPolicy) -> Self {
        let extractor = FieldExtractor::with_eligibility_labels(&profile.eligibility_labels);
        SearchWorkflow {
            profile,
            timeouts,
            pacing,
            extractor,
        }
    }

    pub fn acquire<P: PageSession + ?Sized>(&self, session: &mut P, identity: &Identity) -> Acquisition {
        let mut pass = Pass {
            record: InmateRecord::empty(identity.clone()),
            detail_link: None,
            no_records: false,
        };
        let mut stage = Stage::Start;

        while stage != Stage::Done {
            debug!("[{}] entering {}", identity, stage);
            match self.step(stage, session, &mut pass) {
                Ok(next) => stage = next,
                Err(e) => {
                    warn!(
                        "[{}] {} failed: {}. Keeping the fields captured so far.",
                        identity, stage, e
                    );
                    return Acquisition {
                        record: pass.record,
                        stage,
                        fault: Some(e.to_string()),
                        no_records: pass.no_records,
                    };
                }
            }
        }

        info!(
            "[{}] Acquired ({} hearings{})",
            identity,
            pass.record.hearings.len(),
            if pass.no_records { ", no records found" } else { "" }
        );
        Acquisition {
            record: pass.record,
            stage: Stage::Done,
            fault: None,
            no_records: pass.no_records,
        }
    }

    fn step<P: PageSession + ?Sized>(
        &self,
        stage: Stage,
        session: &mut P,
        pass: &mut Pass,
    ) -> Result<Stage, PageError> {
        let identity = pass.record.identity.clone();
        match stage {
            Stage::Start => {
                info!("[{}] Navigating to {}", identity, self.profile.base_url);
                session.navigate(&self.profile.base_url, self.timeouts.navigation)?;
                self.pacing.settle(SettlePoint::PortalLoaded);
                Ok(Stage::Disclaimer)
            }
            Stage::Disclaimer => {
                info!("[{}] Accepting disclaimer", identity);
                session.click(&self.profile.agree_selector, self.timeouts.interaction)?;
                self.pacing.settle(SettlePoint::DisclaimerAccepted);
                Ok(Stage::ModeSelect)
            }
            Stage::ModeSelect => {
                info!("[{}] Switching to CDCR number search", identity);
                session.click(&self.profile.search_mode_selector, self.timeouts.interaction)?;
                self.pacing.settle(SettlePoint::ModeSelected);
                Ok(Stage::QueryEntry)
            }
            Stage::QueryEntry => {
                info!("[{}] Entering CDCR number", identity);
                session.fill(&self.profile.identity_input_selector, identity.as_str())?;
                self.pacing.settle(SettlePoint::IdentityEntered);
                Ok(Stage::Submit)
            }
            Stage::Submit => {
                info!("[{}] Executing search", identity);
                session.click(&self.profile.search_button_selector, self.timeouts.interaction)?;
                self.pacing.settle(SettlePoint::SearchSubmitted);
                Ok(Stage::ResultsCheck)
            }
            Stage::ResultsCheck => {
                let text = session.text_content(&self.profile.page_text_selector)?;
                if text
                    .to_lowercase()
                    .contains(&self.profile.no_records_marker.to_lowercase())
                {
                    info!("[{}] No records found", identity);
                    pass.no_records = true;
                    Ok(Stage::Done)
                } else {
                    info!("[{}] Search returned results", identity);
                    Ok(Stage::ResultsParse)
                }
            }
            Stage::ResultsParse => {
                info!("[{}] Reading search results", identity);
                let tables = session.tables()?;
                match self.profile.results_table.locate(&tables) {
                    Some(table) => self.read_results(table, pass),
                    None => debug!("[{}] No results table among {} tables", identity, tables.len()),
                }
                Ok(Stage::DetailNavigate)
            }
            Stage::DetailNavigate => match pass.detail_link.take() {
                Some(link) => {
                    info!("[{}] Opening detailed record", identity);
                    session.follow_link(&link, self.timeouts.interaction)?;
                    self.pacing.settle(SettlePoint::DetailOpened);
                    Ok(Stage::DetailParse)
                }
                None => {
                    info!("[{}] No link to a detailed record", identity);
                    Ok(Stage::Done)
                }
            },
            Stage::DetailParse => {
                info!("[{}] Reading eligibility date and parole hearings", identity);
                let text = session.text_content(&self.profile.page_text_selector)?;
                pass.record.parole_eligible_date = self.extractor.parse_eligible_date(&text);

                let tables = session.tables()?;
                pass.record.hearings =
                    extract_hearings(&tables, &self.profile.hearings_table, &self.extractor);
                Ok(Stage::Done)
            }
            Stage::Done => Ok(Stage::Done),
        }
    }

    fn read_results(&self, table: &Table, pass: &mut Pass) {
        if let Some(link) = table.first_link() {
            let name = link.text.trim();
            if !name.is_empty() {
                pass.record.name = Some(name.to_string());
            }
            if link.href.is_some() {
                pass.detail_link = Some(link.clone());
            }
        }

        let cells: Vec<String> = table
            .cells()
            .take(self.profile.results_cell_limit)
            .map(|cell| cell.trim().to_string())
            .collect();
        if cells.len() > 1 {
            let record = &mut pass.record;
            record.age = self.extractor.parse_age(&cells);
            record.admission_date = self.extractor.parse_date(&cells);
            record.current_location = self.extractor.parse_location(&cells);
            record.commitment_county = self.extractor.parse_county(&cells);
        }
    }
}
