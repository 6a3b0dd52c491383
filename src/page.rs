//! Page-interaction capability used by the search workflow.
//!
//! A session is one continuous page context: form state, cookies and the
//! currently loaded page carry over from one call to the next. The workflow
//! only ever talks to this trait, so the concrete driver can be swapped
//! (see `http_session` for the HTTP implementation).

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PageError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid selector `{0}`")]
    InvalidSelector(String),

    #[error("no element matches `{0}`")]
    ElementNotFound(String),

    #[error("element `{0}` cannot be activated")]
    NotInteractive(String),

    #[error("no page is loaded")]
    NoPage,

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("failed to write page snapshot: {0}")]
    Snapshot(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub text: String,
    /// `None` for named anchors.
    pub href: Option<String>,
}

/// Snapshot of one `<table>`: its header cells, the data cells of every row
/// (header rows included, usually with no data cells) and its hyperlinks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub links: Vec<Link>,
}

impl Table {
    /// All data cells in document order.
    pub fn cells(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().flatten().map(String::as_str)
    }

    pub fn first_link(&self) -> Option<&Link> {
        self.links.first()
    }
}

pub trait PageSession {
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), PageError>;

    fn click(&mut self, selector: &str, timeout: Duration) -> Result<(), PageError>;

    fn fill(&mut self, selector: &str, text: &str) -> Result<(), PageError>;

    /// Visible text of the first element matching `selector`.
    fn text_content(&mut self, selector: &str) -> Result<String, PageError>;

    fn tables(&mut self) -> Result<Vec<Table>, PageError>;

    /// Activates a link previously read from a table snapshot.
    fn follow_link(&mut self, link: &Link, timeout: Duration) -> Result<(), PageError>;

    fn close(&mut self);
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted session: the portal is a fixed sequence of views and every
    //! call is recorded.

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum View {
        Blank,
        Portal,
        Results,
        Detail,
    }

    #[derive(Debug, Clone, Default)]
    pub struct Script {
        pub results_text: String,
        pub results_tables: Vec<Table>,
        pub detail_text: String,
        pub detail_tables: Vec<Table>,
    }

    pub struct FakeSession {
        pub script: Script,
        pub view: View,
        pub calls: Vec<String>,
        pub fail_on: Option<&'static str>,
        pub closed: bool,
    }

    pub const SEARCH_SELECTOR: &str = r#"input[type="submit"][value="SEARCH"]"#;

    impl FakeSession {
        pub fn new(script: Script) -> Self {
            FakeSession {
                script,
                view: View::Blank,
                calls: Vec::new(),
                fail_on: None,
                closed: false,
            }
        }

        pub fn failing_on(mut self, call: &'static str) -> Self {
            self.fail_on = Some(call);
            self
        }

        fn record(&mut self, call: &'static str, arg: &str) -> Result<(), PageError> {
            self.calls.push(format!("{call} {arg}"));
            if self.fail_on == Some(call) {
                return Err(PageError::Timeout(Duration::from_secs(1)));
            }
            Ok(())
        }
    }

    impl PageSession for FakeSession {
        fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<(), PageError> {
            self.record("navigate", url)?;
            self.view = View::Portal;
            Ok(())
        }

        fn click(&mut self, selector: &str, _timeout: Duration) -> Result<(), PageError> {
            self.record("click", selector)?;
            if selector == SEARCH_SELECTOR {
                self.view = View::Results;
            }
            Ok(())
        }

        fn fill(&mut self, selector: &str, text: &str) -> Result<(), PageError> {
            self.record("fill", &format!("{selector}={text}"))
        }

        fn text_content(&mut self, selector: &str) -> Result<String, PageError> {
            self.record("text_content", selector)?;
            Ok(match self.view {
                View::Results => self.script.results_text.clone(),
                View::Detail => self.script.detail_text.clone(),
                _ => String::new(),
            })
        }

        fn tables(&mut self) -> Result<Vec<Table>, PageError> {
            self.record("tables", "")?;
            Ok(match self.view {
                View::Results => self.script.results_tables.clone(),
                View::Detail => self.script.detail_tables.clone(),
                _ => Vec::new(),
            })
        }

        fn follow_link(&mut self, link: &Link, _timeout: Duration) -> Result<(), PageError> {
            self.record("follow_link", link.href.as_deref().unwrap_or(""))?;
            self.view = View::Detail;
            Ok(())
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    pub fn table(headers: &[&str], rows: &[&[&str]], links: &[(&str, &str)]) -> Table {
        Table {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|c| c.to_string()).collect())
                .collect(),
            links: links
                .iter()
                .map(|(text, href)| Link {
                    text: text.to_string(),
                    href: Some(href.to_string()),
                })
                .collect(),
        }
    }

    /// A portal that knows T97214 with two hearings.
    pub fn found_script() -> Script {
        Script {
            results_text: "Search Results 1 record".to_string(),
            results_tables: vec![
                table(&["Search"], &[&["CDCR Number"]], &[]),
                table(
                    &["Name", "CDCR #", "Age", "Admission Date", "Current Location", "Commitment County"],
                    &[
                        &[],
                        &[
                            "DOE, JOHN",
                            "T97214",
                            "58",
                            "04/12/1994",
                            "California Medical Facility",
                            "Los Angeles County",
                        ],
                    ],
                    &[("  DOE, JOHN ", "/Details?id=T97214")],
                ),
            ],
            detail_text: "DOE, JOHN\nParole Eligible Date: 11/3/2027\n".to_string(),
            detail_tables: vec![
                table(&["Offense"], &[&[], &["PC 187", "Murder", "x", "y"]], &[]),
                table(
                    &["Board of Parole Hearings"],
                    &[
                        &[],
                        &["3/14/2019", "Initial Hearing", "Held", "Denied 5 years"],
                        &["9/1/2024", "Subsequent Hearing", "Scheduled", ""],
                    ],
                    &[],
                ),
            ],
        }
    }
}
