use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

/// Installs the global logger. `RUST_LOG` directives override the default
/// level chosen by `verbose`.
pub fn init(verbose: bool) {
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };

    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level);
    if let Ok(directives) = std::env::var("RUST_LOG") {
        builder.parse_filters(&directives);
    }
    builder.init();

    log::debug!("Logger initialized at {}", level);
}
