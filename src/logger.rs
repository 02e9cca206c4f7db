use env_logger::{Builder, Target};
use log::LevelFilter;
use std::io::Write;

/// Initialise logging.
///
/// `level` ("info", "debug", ...) wins over `RUST_LOG`; the default is `info`.
pub fn init_logging(level: Option<&str>) {
    let log_level = level
        .and_then(|l| l.parse::<LevelFilter>().ok())
        .or_else(|| {
            std::env::var("RUST_LOG")
                .ok()
                .and_then(|v| v.parse::<LevelFilter>().ok())
        })
        .unwrap_or(LevelFilter::Info);

    // A second init (tests, embedding) keeps the first logger
    let _ = Builder::new()
        .filter_level(log_level)
        .target(Target::Stderr)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:5} {}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();
}
