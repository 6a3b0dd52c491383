use crate::model::InmateRecord;
use crate::store::{RecordStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use log::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStatus {
    Inserted,
    Updated,
}

impl ReconcileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReconcileStatus::Inserted => "inserted",
            ReconcileStatus::Updated => "updated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub status: ReconcileStatus,
    pub synced_at: DateTime<Utc>,
    pub hearings_replaced: bool,
}

/// Merges one freshly acquired record into the store.
///
/// Scalar fields are last-write-wins, unknowns included. Stored hearings are
/// replaced only when the new record carries at least one hearing; an empty
/// list leaves earlier history in place.
pub fn reconcile<S: RecordStore + ?Sized>(
    store: &S,
    record: &InmateRecord,
) -> Result<Reconciliation, StoreError> {
    let identity = &record.identity;
    let existing = store.get(identity)?;

    let mut synced_at = Utc::now();
    let status = match &existing {
        Some(previous) => {
            // Keep sync times strictly increasing even under clock skew.
            if synced_at <= previous.last_scraped_at {
                synced_at = previous.last_scraped_at + Duration::microseconds(1);
            }
            info!("Updating existing inmate record for {}", identity);
            ReconcileStatus::Updated
        }
        None => {
            info!("Inserting new inmate record for {}", identity);
            ReconcileStatus::Inserted
        }
    };
    store.upsert(record, synced_at)?;

    let hearings_replaced = !record.hearings.is_empty();
    if hearings_replaced {
        info!(
            "Replacing parole hearings for {} with {} records",
            identity,
            record.hearings.len()
        );
        store.replace_hearings(identity, &record.hearings)?;
    }

    Ok(Reconciliation {
        status,
        synced_at,
        hearings_replaced,
    })
}
