//! Page session over plain HTTP.
//!
//! The portal is a classic server-rendered form site, so a cookie-keeping
//! client plus HTML form emulation is enough to walk it: links are followed,
//! radio and checkbox clicks are remembered, submit clicks post the enclosing
//! form with every successful control.

use crate::page::{Link, PageError, PageSession, Table};
use log::{debug, info, warn};
use rand::Rng;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, USER_AGENT};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
];

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// When false, every loaded page is logged with its title and written to
    /// `snapshot_dir` so the session can be followed from outside.
    pub headless: bool,
    pub snapshot_dir: PathBuf,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            headless: true,
            snapshot_dir: PathBuf::from("snapshots"),
        }
    }
}

struct LoadedPage {
    url: Url,
    html: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FormSubmission {
    method: FormMethod,
    action: Url,
    fields: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ClickAction {
    Follow(Url),
    Choose { name: String, value: String },
    Submit(FormSubmission),
    Focus,
}

pub struct HttpSession {
    client: Client,
    options: SessionOptions,
    current: Option<LoadedPage>,
    /// Control values set by `fill` and by radio/checkbox clicks on the
    /// current page. Cleared on every page load.
    form_values: HashMap<String, String>,
    pages_loaded: usize,
}

impl HttpSession {
    pub fn open(options: SessionOptions) -> Result<Self, PageError> {
        let user_agent = USER_AGENTS[rand::thread_rng().gen_range(0..USER_AGENTS.len())];

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(USER_AGENT, HeaderValue::from_static(user_agent));

        let client = Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .build()?;

        if !options.headless {
            fs::create_dir_all(&options.snapshot_dir)?;
            info!("Visible session: page snapshots go to {:?}", options.snapshot_dir);
        }

        Ok(HttpSession {
            client,
            options,
            current: None,
            form_values: HashMap::new(),
            pages_loaded: 0,
        })
    }

    fn page(&self) -> Result<&LoadedPage, PageError> {
        self.current.as_ref().ok_or(PageError::NoPage)
    }

    fn send(&mut self, request: RequestBuilder, timeout: Duration) -> Result<(), PageError> {
        let response = request.timeout(timeout).send().map_err(|e| classify(e, timeout))?;
        let status = response.status();
        let url = response.url().clone();
        if !status.is_success() {
            return Err(PageError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let html = response.text().map_err(|e| classify(e, timeout))?;
        self.loaded(url, html)
    }

    fn get(&mut self, url: Url, timeout: Duration) -> Result<(), PageError> {
        debug!("GET {}", url);
        let request = self.client.get(url);
        self.send(request, timeout)
    }

    fn submit(&mut self, submission: FormSubmission, timeout: Duration) -> Result<(), PageError> {
        debug!(
            "Submitting form to {} ({:?}, {} fields)",
            submission.action,
            submission.method,
            submission.fields.len()
        );
        let request = match submission.method {
            FormMethod::Get => {
                let mut url = submission.action;
                url.query_pairs_mut().clear().extend_pairs(&submission.fields);
                self.client.get(url)
            }
            FormMethod::Post => self.client.post(submission.action).form(&submission.fields),
        };
        self.send(request, timeout)
    }

    fn loaded(&mut self, url: Url, html: String) -> Result<(), PageError> {
        self.pages_loaded += 1;
        self.form_values.clear();

        if !self.options.headless {
            let title = page_title(&Html::parse_document(&html));
            info!("Page {}: {} ({})", self.pages_loaded, title, url);
            let path = self
                .options
                .snapshot_dir
                .join(format!("page-{:04}.html", self.pages_loaded));
            if let Err(e) = fs::write(&path, &html) {
                warn!("Could not write snapshot {:?}: {}", path, e);
            }
        }

        self.current = Some(LoadedPage { url, html });
        Ok(())
    }
}

impl PageSession for HttpSession {
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), PageError> {
        let url = Url::parse(url)?;
        self.get(url, timeout)
    }

    fn click(&mut self, selector: &str, timeout: Duration) -> Result<(), PageError> {
        let action = {
            let page = self.page()?;
            let doc = Html::parse_document(&page.html);
            plan_click(&doc, selector, &page.url, &self.form_values)?
        };
        match action {
            ClickAction::Follow(url) => self.get(url, timeout),
            ClickAction::Choose { name, value } => {
                debug!("Choosing {}={}", name, value);
                self.form_values.insert(name, value);
                Ok(())
            }
            ClickAction::Submit(submission) => self.submit(submission, timeout),
            ClickAction::Focus => Ok(()),
        }
    }

    fn fill(&mut self, selector: &str, text: &str) -> Result<(), PageError> {
        let name = {
            let page = self.page()?;
            fill_target(&Html::parse_document(&page.html), selector)?
        };
        self.form_values.insert(name, text.to_string());
        Ok(())
    }

    fn text_content(&mut self, selector: &str) -> Result<String, PageError> {
        let page = self.page()?;
        first_text(&Html::parse_document(&page.html), selector)
    }

    fn tables(&mut self) -> Result<Vec<Table>, PageError> {
        let page = self.page()?;
        Ok(parse_tables(&Html::parse_document(&page.html)))
    }

    fn follow_link(&mut self, link: &Link, timeout: Duration) -> Result<(), PageError> {
        let href = link
            .href
            .as_deref()
            .ok_or_else(|| PageError::NotInteractive(format!("<a>{}</a>", link.text)))?;
        let url = self.page()?.url.join(href)?;
        self.get(url, timeout)
    }

    fn close(&mut self) {
        info!("Closing session after {} pages", self.pages_loaded);
        self.current = None;
        self.form_values.clear();
    }
}

fn classify(e: reqwest::Error, timeout: Duration) -> PageError {
    if e.is_timeout() {
        PageError::Timeout(timeout)
    } else {
        PageError::Http(e)
    }
}

fn selector(raw: &str) -> Result<Selector, PageError> {
    Selector::parse(raw).map_err(|_| PageError::InvalidSelector(raw.to_string()))
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn page_title(doc: &Html) -> String {
    let title = Selector::parse("title").unwrap();
    doc.select(&title).next().map(text_of).unwrap_or_default()
}

fn first_text(doc: &Html, raw: &str) -> Result<String, PageError> {
    let sel = selector(raw)?;
    doc.select(&sel)
        .next()
        .map(|element| element.text().collect::<String>())
        .ok_or_else(|| PageError::ElementNotFound(raw.to_string()))
}

fn parse_tables(doc: &Html) -> Vec<Table> {
    let table_sel = Selector::parse("table").unwrap();
    let th_sel = Selector::parse("th").unwrap();
    let tr_sel = Selector::parse("tr").unwrap();
    let td_sel = Selector::parse("td").unwrap();
    let a_sel = Selector::parse("a").unwrap();

    doc.select(&table_sel)
        .map(|table| Table {
            headers: table.select(&th_sel).map(text_of).collect(),
            rows: table
                .select(&tr_sel)
                .map(|row| row.select(&td_sel).map(text_of).collect())
                .collect(),
            links: table
                .select(&a_sel)
                .map(|a| Link {
                    text: text_of(a),
                    href: a.value().attr("href").map(str::to_string),
                })
                .collect(),
        })
        .collect()
}

fn fill_target(doc: &Html, raw: &str) -> Result<String, PageError> {
    let sel = selector(raw)?;
    let element = doc
        .select(&sel)
        .next()
        .ok_or_else(|| PageError::ElementNotFound(raw.to_string()))?;
    match element.value().name() {
        "input" | "textarea" | "select" => element
            .value()
            .attr("name")
            .map(str::to_string)
            .ok_or_else(|| PageError::NotInteractive(raw.to_string())),
        _ => Err(PageError::NotInteractive(raw.to_string())),
    }
}

fn enclosing<'a>(element: ElementRef<'a>, tag: &str) -> Option<ElementRef<'a>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| ancestor.value().name() == tag)
}

fn plan_click(
    doc: &Html,
    raw: &str,
    base: &Url,
    values: &HashMap<String, String>,
) -> Result<ClickAction, PageError> {
    let sel = selector(raw)?;
    let element = doc
        .select(&sel)
        .next()
        .ok_or_else(|| PageError::ElementNotFound(raw.to_string()))?;
    let not_interactive = || PageError::NotInteractive(raw.to_string());
    let value = element.value();

    let submit = |submitter: ElementRef<'_>| -> Result<ClickAction, PageError> {
        let form = enclosing(submitter, "form").ok_or_else(not_interactive)?;
        Ok(ClickAction::Submit(build_submission(form, Some(submitter), base, values)?))
    };

    match value.name() {
        "a" => {
            let href = value.attr("href").ok_or_else(not_interactive)?;
            Ok(ClickAction::Follow(base.join(href)?))
        }
        "input" => {
            let kind = value.attr("type").unwrap_or("text").to_ascii_lowercase();
            match kind.as_str() {
                "radio" | "checkbox" => {
                    let name = value.attr("name").ok_or_else(not_interactive)?;
                    Ok(ClickAction::Choose {
                        name: name.to_string(),
                        value: value.attr("value").unwrap_or("on").to_string(),
                    })
                }
                "submit" | "image" => submit(element),
                "button" | "reset" | "hidden" => Err(not_interactive()),
                _ => Ok(ClickAction::Focus),
            }
        }
        "button" => {
            let kind = value.attr("type").unwrap_or("submit").to_ascii_lowercase();
            if kind == "submit" {
                submit(element)
            } else {
                Err(not_interactive())
            }
        }
        _ => match enclosing(element, "a").and_then(|a| a.value().attr("href")) {
            Some(href) => Ok(ClickAction::Follow(base.join(href)?)),
            None => Err(not_interactive()),
        },
    }
}

/// Collects the successful controls of `form`, in document order, with
/// pending values from `fill` and radio clicks taking precedence.
fn build_submission(
    form: ElementRef<'_>,
    submitter: Option<ElementRef<'_>>,
    base: &Url,
    values: &HashMap<String, String>,
) -> Result<FormSubmission, PageError> {
    let controls = Selector::parse("input, select, textarea").unwrap();
    let options = Selector::parse("option").unwrap();

    let method = match form.value().attr("method").map(str::to_ascii_lowercase).as_deref() {
        Some("post") => FormMethod::Post,
        _ => FormMethod::Get,
    };
    let action = match form.value().attr("action").map(str::trim) {
        Some(action) if !action.is_empty() => base.join(action)?,
        _ => base.clone(),
    };

    let mut fields = Vec::new();
    for control in form.select(&controls) {
        let attrs = control.value();
        if attrs.attr("disabled").is_some() {
            continue;
        }
        let Some(name) = attrs.attr("name") else {
            continue;
        };
        let pending = values.get(name);

        match attrs.name() {
            "input" => {
                let kind = attrs.attr("type").unwrap_or("text").to_ascii_lowercase();
                let own_value = attrs.attr("value").unwrap_or("");
                match kind.as_str() {
                    "submit" | "image" | "button" | "reset" | "file" => {}
                    "radio" | "checkbox" => {
                        let own_value = attrs.attr("value").unwrap_or("on");
                        let checked = match pending {
                            Some(chosen) => chosen == own_value,
                            None => attrs.attr("checked").is_some(),
                        };
                        if checked {
                            fields.push((name.to_string(), own_value.to_string()));
                        }
                    }
                    _ => {
                        let v = pending.map(String::as_str).unwrap_or(own_value);
                        fields.push((name.to_string(), v.to_string()));
                    }
                }
            }
            "select" => {
                let chosen = match pending {
                    Some(v) => Some(v.clone()),
                    None => {
                        let all: Vec<ElementRef<'_>> = control.select(&options).collect();
                        all.iter()
                            .find(|o| o.value().attr("selected").is_some())
                            .or_else(|| all.first())
                            .map(|o| o.value().attr("value").map(str::to_string).unwrap_or_else(|| text_of(*o)))
                    }
                };
                if let Some(v) = chosen {
                    fields.push((name.to_string(), v));
                }
            }
            "textarea" => {
                let v = pending.cloned().unwrap_or_else(|| control.text().collect());
                fields.push((name.to_string(), v));
            }
            _ => {}
        }
    }

    if let Some(submitter) = submitter {
        if let Some(name) = submitter.value().attr("name") {
            let v = submitter.value().attr("value").unwrap_or("");
            fields.push((name.to_string(), v.to_string()));
        }
    }

    Ok(FormSubmission {
        method,
        action,
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_PAGE: &str = r#"
        <html><head><title>Inmate Locator</title></head><body>
        <form method="POST" action="/Results">
            <input type="hidden" name="token" value="abc">
            <input type="radio" name="mode" value="NAME" checked>
            <input type="radio" name="mode" value="CDCR">
            <input type="text" name="k_number" value="">
            <input type="text" name="disabled_one" value="x" disabled>
            <select name="sort"><option value="a">A</option><option value="b" selected>B</option></select>
            <input type="submit" name="action" value="SEARCH">
        </form>
        <a href="help.html">Help</a>
        </body></html>"#;

    const RESULTS_PAGE: &str = r#"
        <html><body>
        <table><tr><th>Search</th></tr><tr><td>CDCR Number</td></tr></table>
        <table>
            <tr><th>Name</th><th>Age</th><th>Admission Date</th></tr>
            <tr><td><a href="Details?id=T97214"> DOE, JOHN </a></td><td> 58 </td><td>04/12/1994</td></tr>
        </table>
        <p>Parole Eligible Date: <b>11/03/2027</b></p>
        </body></html>"#;

    fn base() -> Url {
        Url::parse("https://portal.example/Search").unwrap()
    }

    #[test]
    fn tables_are_read_in_document_order() {
        let doc = Html::parse_document(RESULTS_PAGE);
        let tables = parse_tables(&doc);

        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].headers, vec!["Search"]);
        assert_eq!(tables[1].headers, vec!["Name", "Age", "Admission Date"]);
        assert_eq!(tables[1].rows.len(), 2);
        assert!(tables[1].rows[0].is_empty());
        assert_eq!(tables[1].rows[1], ["DOE, JOHN", "58", "04/12/1994"]);
        assert_eq!(tables[1].first_link().unwrap().href.as_deref(), Some("Details?id=T97214"));
        assert_eq!(tables[1].first_link().unwrap().text, "DOE, JOHN");
    }

    #[test]
    fn named_anchors_are_kept_in_table_links() {
        let doc = Html::parse_document(
            r#"<table><tr><td><a name="top">DOE, JOHN</a></td><td><a href="Details?id=T97214">View</a></td></tr></table>"#,
        );
        let tables = parse_tables(&doc);

        let first = tables[0].first_link().unwrap();
        assert_eq!(first.text, "DOE, JOHN");
        assert!(first.href.is_none());
        assert_eq!(tables[0].links[1].href.as_deref(), Some("Details?id=T97214"));
    }

    #[test]
    fn body_text_concatenates_text_nodes() {
        let doc = Html::parse_document(RESULTS_PAGE);
        let text = first_text(&doc, "body").unwrap();
        assert!(text.contains("Parole Eligible Date: 11/03/2027"));
        assert!(matches!(first_text(&doc, "#missing"), Err(PageError::ElementNotFound(_))));
    }

    #[test]
    fn submit_posts_form_with_pending_values() {
        let doc = Html::parse_document(SEARCH_PAGE);
        let mut values = HashMap::new();
        values.insert("mode".to_string(), "CDCR".to_string());
        values.insert("k_number".to_string(), "T97214".to_string());

        let action = plan_click(&doc, r#"input[type="submit"][value="SEARCH"]"#, &base(), &values).unwrap();
        let ClickAction::Submit(submission) = action else {
            panic!("expected a form submission, got {action:?}");
        };
        assert_eq!(submission.method, FormMethod::Post);
        assert_eq!(submission.action.as_str(), "https://portal.example/Results");
        let fields: Vec<(&str, &str)> = submission
            .fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(
            fields,
            vec![
                ("token", "abc"),
                ("mode", "CDCR"),
                ("k_number", "T97214"),
                ("sort", "b"),
                ("action", "SEARCH"),
            ]
        );
    }

    #[test]
    fn radio_click_is_remembered_not_submitted() {
        let doc = Html::parse_document(SEARCH_PAGE);
        let action = plan_click(&doc, r#"input[value="CDCR"]"#, &base(), &HashMap::new()).unwrap();
        assert_eq!(
            action,
            ClickAction::Choose {
                name: "mode".to_string(),
                value: "CDCR".to_string()
            }
        );
    }

    #[test]
    fn link_click_resolves_against_the_page() {
        let doc = Html::parse_document(SEARCH_PAGE);
        let action = plan_click(&doc, "a", &base(), &HashMap::new()).unwrap();
        assert_eq!(
            action,
            ClickAction::Follow(Url::parse("https://portal.example/help.html").unwrap())
        );
    }

    #[test]
    fn missing_or_bad_targets_are_faults() {
        let doc = Html::parse_document(SEARCH_PAGE);
        assert!(matches!(
            plan_click(&doc, r#"input[value="AGREE"]"#, &base(), &HashMap::new()),
            Err(PageError::ElementNotFound(_))
        ));
        assert!(matches!(
            plan_click(&doc, "input[", &base(), &HashMap::new()),
            Err(PageError::InvalidSelector(_))
        ));
        assert!(matches!(fill_target(&doc, "title"), Err(PageError::NotInteractive(_))));
        assert_eq!(fill_target(&doc, r#"input[name="k_number"]"#).unwrap(), "k_number");
    }

    #[test]
    fn session_without_a_page_reports_no_page() {
        let mut session = HttpSession::open(SessionOptions::default()).unwrap();
        assert!(matches!(session.tables(), Err(PageError::NoPage)));
        assert!(matches!(
            session.fill(r#"input[name="k_number"]"#, "T97214"),
            Err(PageError::NoPage)
        ));
    }
}
