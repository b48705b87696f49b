//! Logger setup for the command-line front end.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Initialize `env_logger` with elapsed-time prefixes on stderr.
///
/// Level is Info when `verbose`, Warn otherwise; `RUST_LOG` still applies.
/// Lines name the pipeline stage that emitted them:
/// `[HH:MM:SS] LEVEL stage: message`, e.g.
/// `[00:00:03] WARN feature: Dataset 'gut': fitting problem for feature 7 ...`.
pub fn init_logger(verbose: bool) {
    START_TIME.get_or_init(Instant::now);

    let level = if verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| {
            let elapsed = START_TIME.get_or_init(Instant::now).elapsed().as_secs();
            writeln!(
                buf,
                "[{:02}:{:02}:{:02}] {} {}: {}",
                elapsed / 3600,
                (elapsed % 3600) / 60,
                elapsed % 60,
                record.level(),
                stage(record.target()),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .init();
}

/// Last path segment of a log target: `zinb_daa::pipeline::batch` -> `batch`.
fn stage(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}
