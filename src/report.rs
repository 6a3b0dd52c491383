use crate::orchestrator::IdentityOutcome;
use chrono::Local;
use std::fs::OpenOptions;
use std::path::Path;

const HEADER: [&str; 7] = ["cdcr_number", "name", "outcome", "hearings", "stage", "error", "timestamp"];

/// Appends one CSV row per processed identity. Flushed after every row so a
/// partial report survives an interrupted run.
pub struct ReportWriter {
    writer: csv::Writer<std::fs::File>,
}

impl ReportWriter {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, csv::Error> {
        let path = path.as_ref();
        let file_exists = path.exists();
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if !file_exists {
            writer.write_record(HEADER)?;
            writer.flush()?;
        }
        Ok(ReportWriter { writer })
    }

    pub fn write(&mut self, outcome: &IdentityOutcome) -> Result<(), csv::Error> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let hearings = outcome.hearings.to_string();
        self.writer.write_record([
            outcome.identity.as_str(),
            outcome.name.as_deref().unwrap_or(""),
            outcome.label(),
            hearings.as_str(),
            outcome.stage.map(|s| s.as_str()).unwrap_or(""),
            outcome.error.as_deref().unwrap_or(""),
            timestamp.as_str(),
        ])?;
        self.writer.flush()?;
        Ok(())
    }
}
