use crate::model::Identity;
use log::{error, info};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct IdentityRow {
    #[serde(
        rename = "cdcr_number",
        alias = "CDCR",
        alias = "CDCR Number",
        alias = "cdcr",
        alias = "id"
    )]
    cdcr_number: Option<String>,
}

/// Reads identities from a CSV file with a `cdcr_number` column.
///
/// Rows that fail to parse are logged and skipped; blank values and
/// duplicates are dropped.
pub fn load_identities<P: AsRef<Path>>(path: P) -> Result<BTreeSet<Identity>, csv::Error> {
    let path = path.as_ref();
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut identities = BTreeSet::new();
    for result in rdr.deserialize::<IdentityRow>() {
        match result {
            Ok(row) => {
                if let Some(identity) = row.cdcr_number.as_deref().and_then(Identity::parse) {
                    identities.insert(identity);
                }
            }
            Err(e) => {
                error!("Error parsing CSV record: {}", e);
            }
        }
    }
    info!("Loaded {} identities from CSV {:?}", identities.len(), path);
    Ok(identities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_trimmed_unique_identities() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "CDCR Number,Notes").unwrap();
        writeln!(file, " T97214 ,first").unwrap();
        writeln!(file, "D54803,").unwrap();
        writeln!(file, "T97214,again").unwrap();
        writeln!(file, "   ,blank").unwrap();

        let identities: Vec<String> = load_identities(file.path())
            .unwrap()
            .iter()
            .map(|i| i.to_string())
            .collect();
        assert_eq!(identities, vec!["D54803", "T97214"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_identities("/definitely/not/here.csv").is_err());
    }
}
