//! Record store: inmate rows, their parole hearings, and the source
//! collection that names which identities to sync.

use crate::model::{HearingDate, HearingEvent, Identity, InmateRecord};
use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid source collection name `{0}`")]
    InvalidSource(String),
}

/// An inmate row as persisted, with its bookkeeping timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredInmate {
    pub record: InmateRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_scraped_at: DateTime<Utc>,
}

pub trait RecordStore {
    /// Distinct, trimmed, non-empty identities referenced by `source`.
    fn list_distinct_identities(&self, source: &str) -> Result<BTreeSet<Identity>, StoreError>;

    fn exists(&self, identity: &Identity) -> Result<bool, StoreError>;

    /// The stored row, with `record.hearings` left empty; see `hearings`.
    fn get(&self, identity: &Identity) -> Result<Option<StoredInmate>, StoreError>;

    /// Writes the scalar fields of `record`. Hearings are not touched.
    fn upsert(&self, record: &InmateRecord, synced_at: DateTime<Utc>) -> Result<(), StoreError>;

    fn delete_hearings(&self, identity: &Identity) -> Result<(), StoreError>;

    fn insert_hearings(&self, identity: &Identity, events: &[HearingEvent]) -> Result<(), StoreError>;

    fn hearings(&self, identity: &Identity) -> Result<Vec<HearingEvent>, StoreError>;

    /// Delete-then-insert of the full hearing set.
    fn replace_hearings(&self, identity: &Identity, events: &[HearingEvent]) -> Result<(), StoreError> {
        self.delete_hearings(identity)?;
        self.insert_hearings(identity, events)
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS transcripts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    cdcr_number TEXT
);
CREATE TABLE IF NOT EXISTS inmates (
    cdcr_number TEXT PRIMARY KEY,
    name TEXT,
    age INTEGER,
    admission_date TEXT,
    current_location TEXT,
    commitment_county TEXT,
    parole_eligible_date TEXT,
    last_scraped_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS board_of_parole_hearings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    cdcr_number TEXT NOT NULL,
    position INTEGER NOT NULL,
    hearing_date TEXT,
    date_note TEXT,
    action TEXT NOT NULL,
    status TEXT NOT NULL,
    outcome TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_hearings_cdcr ON board_of_parole_hearings(cdcr_number);
";

/// Column of the source collection that holds identities.
const SOURCE_COLUMN: &str = "cdcr_number";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        info!("Opened record store {:?}", path.as_ref());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteStore { conn })
    }

    /// Adds a row to the source collection.
    pub fn add_transcript(&self, cdcr_number: Option<&str>) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO transcripts (cdcr_number) VALUES (?1)",
            params![cdcr_number],
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn inmate_count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM inmates", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn valid_source_name(source: &str) -> bool {
    !source.is_empty()
        && source.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !source.starts_with(|c: char| c.is_ascii_digit())
}

impl RecordStore for SqliteStore {
    fn list_distinct_identities(&self, source: &str) -> Result<BTreeSet<Identity>, StoreError> {
        if !valid_source_name(source) {
            return Err(StoreError::InvalidSource(source.to_string()));
        }
        let sql = format!(
            "SELECT DISTINCT {col} FROM {source} WHERE {col} IS NOT NULL",
            col = SOURCE_COLUMN,
            source = source
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut identities = BTreeSet::new();
        for row in rows {
            if let Some(identity) = Identity::parse(&row?) {
                identities.insert(identity);
            }
        }
        Ok(identities)
    }

    fn exists(&self, identity: &Identity) -> Result<bool, StoreError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM inmates WHERE cdcr_number = ?1",
                params![identity.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn get(&self, identity: &Identity) -> Result<Option<StoredInmate>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT name, age, admission_date, current_location, commitment_county,
                        parole_eligible_date, created_at, updated_at, last_scraped_at
                 FROM inmates WHERE cdcr_number = ?1",
                params![identity.as_str()],
                |row| {
                    Ok(StoredInmate {
                        record: InmateRecord {
                            identity: identity.clone(),
                            name: row.get(0)?,
                            age: row.get(1)?,
                            admission_date: row.get::<_, Option<NaiveDate>>(2)?,
                            current_location: row.get(3)?,
                            commitment_county: row.get(4)?,
                            parole_eligible_date: row.get::<_, Option<NaiveDate>>(5)?,
                            hearings: Vec::new(),
                        },
                        created_at: row.get(6)?,
                        updated_at: row.get(7)?,
                        last_scraped_at: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn upsert(&self, record: &InmateRecord, synced_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO inmates
             (cdcr_number, name, age, admission_date, current_location, commitment_county,
              parole_eligible_date, last_scraped_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?8)
             ON CONFLICT(cdcr_number) DO UPDATE SET
                name = excluded.name,
                age = excluded.age,
                admission_date = excluded.admission_date,
                current_location = excluded.current_location,
                commitment_county = excluded.commitment_county,
                parole_eligible_date = excluded.parole_eligible_date,
                last_scraped_at = excluded.last_scraped_at,
                updated_at = excluded.updated_at",
            params![
                record.identity.as_str(),
                record.name,
                record.age,
                record.admission_date,
                record.current_location,
                record.commitment_county,
                record.parole_eligible_date,
                synced_at,
            ],
        )?;
        Ok(())
    }

    fn delete_hearings(&self, identity: &Identity) -> Result<(), StoreError> {
        self.conn.execute(
            "DELETE FROM board_of_parole_hearings WHERE cdcr_number = ?1",
            params![identity.as_str()],
        )?;
        Ok(())
    }

    fn insert_hearings(&self, identity: &Identity, events: &[HearingEvent]) -> Result<(), StoreError> {
        let mut stmt = self.conn.prepare(
            "INSERT INTO board_of_parole_hearings
             (cdcr_number, position, hearing_date, date_note, action, status, outcome)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for (position, event) in events.iter().enumerate() {
            stmt.execute(params![
                identity.as_str(),
                position as i64,
                event.date.as_text(),
                event.date.note(),
                event.action,
                event.status,
                event.outcome,
            ])?;
        }
        Ok(())
    }

    fn hearings(&self, identity: &Identity) -> Result<Vec<HearingEvent>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT hearing_date, date_note, action, status, outcome
             FROM board_of_parole_hearings
             WHERE cdcr_number = ?1
             ORDER BY position ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![identity.as_str()], |row| {
            Ok(HearingEvent {
                date: HearingDate::from_stored(row.get(0)?, row.get(1)?),
                action: row.get(2)?,
                status: row.get(3)?,
                outcome: row.get(4)?,
            })
        })?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    fn replace_hearings(&self, identity: &Identity, events: &[HearingEvent]) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        self.delete_hearings(identity)?;
        self.insert_hearings(identity, events)?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> Identity {
        Identity::parse(raw).unwrap()
    }

    fn event(date: HearingDate, action: &str) -> HearingEvent {
        HearingEvent {
            date,
            action: action.to_string(),
            status: "Held".to_string(),
            outcome: "Denied".to_string(),
        }
    }

    #[test]
    fn distinct_identities_skip_blank_and_duplicates() {
        let store = SqliteStore::open_in_memory().unwrap();
        for raw in [Some(" T97214 "), Some("D54803"), Some("T97214"), Some("   "), Some(""), None] {
            store.add_transcript(raw).unwrap();
        }

        let identities: Vec<String> = store
            .list_distinct_identities("transcripts")
            .unwrap()
            .into_iter()
            .map(|i| i.to_string())
            .collect();
        assert_eq!(identities, vec!["D54803", "T97214"]);
    }

    #[test]
    fn source_name_is_validated() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(
            store.list_distinct_identities("transcripts; DROP TABLE inmates"),
            Err(StoreError::InvalidSource(_))
        ));
        assert!(matches!(
            store.list_distinct_identities("no_such_table"),
            Err(StoreError::Sqlite(_))
        ));
    }

    #[test]
    fn upsert_round_trips_scalar_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut record = InmateRecord::empty(id("T97214"));
        record.name = Some("DOE, JOHN".to_string());
        record.age = Some(58);
        record.admission_date = NaiveDate::from_ymd_opt(1994, 4, 12);
        let now = Utc::now();

        assert!(!store.exists(&record.identity).unwrap());
        store.upsert(&record, now).unwrap();
        assert!(store.exists(&record.identity).unwrap());

        let stored = store.get(&record.identity).unwrap().unwrap();
        assert_eq!(stored.record, record);
        assert_eq!(stored.last_scraped_at, now);
        assert_eq!(stored.created_at, now);

        record.name = None;
        let later = now + chrono::Duration::seconds(5);
        store.upsert(&record, later).unwrap();
        let stored = store.get(&record.identity).unwrap().unwrap();
        assert!(stored.record.name.is_none());
        assert_eq!(stored.created_at, now);
        assert_eq!(stored.updated_at, later);
        assert_eq!(store.inmate_count().unwrap(), 1);
    }

    #[test]
    fn replace_hearings_swaps_the_whole_set() {
        let store = SqliteStore::open_in_memory().unwrap();
        let identity = id("T97214");
        let first = vec![
            event(HearingDate::Canonical(NaiveDate::from_ymd_opt(2019, 3, 14).unwrap()), "Initial"),
            event(HearingDate::Unparsed("TBD".to_string()), "Subsequent"),
        ];
        store.replace_hearings(&identity, &first).unwrap();
        assert_eq!(store.hearings(&identity).unwrap(), first);

        let second = vec![event(HearingDate::Missing, "Rescheduled")];
        store.replace_hearings(&identity, &second).unwrap();
        assert_eq!(store.hearings(&identity).unwrap(), second);
        assert!(store.hearings(&id("D54803")).unwrap().is_empty());
    }
}
