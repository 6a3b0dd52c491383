pub mod config;
pub mod delay_manager;
pub mod extractor;
pub mod hearings;
pub mod http_session;
pub mod input_loader;
pub mod locator;
pub mod logger;
pub mod model;
pub mod orchestrator;
pub mod page;
pub mod reconcile;
pub mod report;
pub mod store;
pub mod workflow;

// Exporting types for convenience
pub use config::{Cli, ConfigError, RunMode, SyncConfig};
pub use extractor::FieldExtractor;
pub use http_session::{HttpSession, SessionOptions};
pub use model::{HearingDate, HearingEvent, Identity, InmateRecord};
pub use orchestrator::{BatchOrchestrator, BatchSummary, IdentitySource};
pub use page::{PageError, PageSession};
pub use reconcile::{reconcile, ReconcileStatus};
pub use store::{RecordStore, SqliteStore, StoreError};
pub use workflow::SearchWorkflow;
