use crate::delay_manager::PacingPolicy;
use crate::http_session::SessionOptions;
use crate::model::Identity;
use crate::orchestrator::IdentitySource;
use crate::workflow::{PortalProfile, Timeouts, DEFAULT_PORTAL_URL};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Sync CDCR inmate lookup records and parole hearings into SQLite.
#[derive(Debug, Parser)]
#[command(name = "cdcr-sync", version, about)]
pub struct Cli {
    /// Re-acquire identities that are already stored
    #[arg(long)]
    pub force: bool,

    /// Run the session visibly: log every page and keep HTML snapshots
    #[arg(long)]
    pub visible: bool,

    /// Sync exactly this CDCR number and print the record
    #[arg(long, value_name = "ID")]
    pub cdcr: Option<String>,

    /// SQLite database holding inmates, hearings and the source table
    #[arg(long, env = "CDCR_SYNC_DATABASE", value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// Table whose `cdcr_number` column lists the identities to sync
    #[arg(long, env = "CDCR_SYNC_SOURCE_TABLE", default_value = "transcripts")]
    pub source_table: String,

    /// Read identities from this CSV file instead of the source table
    #[arg(long, value_name = "CSV")]
    pub input: Option<PathBuf>,

    /// Append one row per processed identity to this CSV file
    #[arg(long, value_name = "CSV")]
    pub report: Option<PathBuf>,

    #[arg(long, env = "CDCR_PORTAL_URL", default_value = DEFAULT_PORTAL_URL)]
    pub portal_url: String,

    /// Pause between two identities, in seconds
    #[arg(long, default_value_t = 2)]
    pub pause_secs: u64,

    #[arg(long, default_value_t = 30)]
    pub navigation_timeout_secs: u64,

    #[arg(long, default_value_t = 10)]
    pub interaction_timeout_secs: u64,

    /// Where a visible session writes page snapshots
    #[arg(long, default_value = "snapshots")]
    pub snapshot_dir: PathBuf,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no database configured (pass --database or set CDCR_SYNC_DATABASE)")]
    MissingDatabase,

    #[error("invalid portal URL `{url}`: {source}")]
    InvalidPortalUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("`{0}` is not a usable CDCR number")]
    InvalidIdentity(String),

    #[error("identity file {0:?} does not exist")]
    MissingInput(PathBuf),

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    Single(Identity),
    Batch(IdentitySource),
}

/// Validated runtime configuration. Built once at startup; every fatal
/// configuration problem surfaces here, before any acquisition.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database: PathBuf,
    pub mode: RunMode,
    pub force_refresh: bool,
    pub headless: bool,
    pub report: Option<PathBuf>,
    pub profile: PortalProfile,
    pub timeouts: Timeouts,
    pub pacing: PacingPolicy,
    pub snapshot_dir: PathBuf,
}

impl SyncConfig {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let database = cli.database.ok_or(ConfigError::MissingDatabase)?;

        let portal = Url::parse(cli.portal_url.trim()).map_err(|source| ConfigError::InvalidPortalUrl {
            url: cli.portal_url.clone(),
            source,
        })?;

        if cli.navigation_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("--navigation-timeout-secs"));
        }
        if cli.interaction_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("--interaction-timeout-secs"));
        }

        let mode = match (cli.cdcr, cli.input) {
            (Some(raw), _) => {
                let identity = Identity::parse(&raw).ok_or(ConfigError::InvalidIdentity(raw))?;
                RunMode::Single(identity)
            }
            (None, Some(path)) => {
                if !path.is_file() {
                    return Err(ConfigError::MissingInput(path));
                }
                RunMode::Batch(IdentitySource::Csv(path))
            }
            (None, None) => RunMode::Batch(IdentitySource::Store {
                collection: cli.source_table,
            }),
        };

        let profile = PortalProfile {
            base_url: portal.to_string(),
            ..PortalProfile::default()
        };

        Ok(SyncConfig {
            database,
            mode,
            force_refresh: cli.force,
            headless: !cli.visible,
            report: cli.report,
            profile,
            timeouts: Timeouts {
                navigation: Duration::from_secs(cli.navigation_timeout_secs),
                interaction: Duration::from_secs(cli.interaction_timeout_secs),
            },
            pacing: PacingPolicy::new(Duration::from_secs(cli.pause_secs)),
            snapshot_dir: cli.snapshot_dir,
        })
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            headless: self.headless,
            snapshot_dir: self.snapshot_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["cdcr-sync"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_describe_a_store_batch() {
        let config = SyncConfig::from_cli(parse(&["--database", "sync.db", "--source-table", "transcripts"])).unwrap();

        assert_eq!(config.database, PathBuf::from("sync.db"));
        assert_eq!(
            config.mode,
            RunMode::Batch(IdentitySource::Store {
                collection: "transcripts".to_string()
            })
        );
        assert!(!config.force_refresh);
        assert!(config.headless);
        assert_eq!(config.timeouts, Timeouts::default());
        assert_eq!(config.pacing.identity_pause, Duration::from_secs(2));
        assert_eq!(config.profile.results_cell_limit, 20);
    }

    #[test]
    fn single_identity_mode_is_trimmed() {
        let config = SyncConfig::from_cli(parse(&[
            "--database",
            "sync.db",
            "--cdcr",
            " T97214 ",
            "--force",
            "--visible",
        ]))
        .unwrap();

        assert_eq!(config.mode, RunMode::Single(Identity::parse("T97214").unwrap()));
        assert!(config.force_refresh);
        assert!(!config.session_options().headless);
    }

    #[test]
    fn fatal_configuration_is_rejected() {
        assert!(matches!(
            SyncConfig::from_cli(parse(&["--database", "sync.db", "--cdcr", "   "])),
            Err(ConfigError::InvalidIdentity(_))
        ));
        assert!(matches!(
            SyncConfig::from_cli(parse(&["--database", "sync.db", "--portal-url", "not a url"])),
            Err(ConfigError::InvalidPortalUrl { .. })
        ));
        assert!(matches!(
            SyncConfig::from_cli(parse(&["--database", "sync.db", "--input", "/definitely/not/here.csv"])),
            Err(ConfigError::MissingInput(_))
        ));
        assert!(matches!(
            SyncConfig::from_cli(parse(&["--database", "sync.db", "--navigation-timeout-secs", "0"])),
            Err(ConfigError::ZeroTimeout(_))
        ));
    }
}
