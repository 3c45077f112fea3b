use crate::cli::{actions::Action, commands, dispatch, telemetry};
use anyhow::Result;
use clap::ArgMatches;

/// Map verbosity count to tracing level
const fn get_verbosity_level(verbosity: u8) -> Option<tracing::Level> {
    match verbosity {
        0 => None,
        1 => Some(tracing::Level::WARN),
        2 => Some(tracing::Level::INFO),
        3 => Some(tracing::Level::DEBUG),
        _ => Some(tracing::Level::TRACE),
    }
}

/// The louder of `-v` repetitions and `--log-level` / `SQLM_AUTH_LOG_LEVEL`.
fn verbosity(matches: &ArgMatches) -> u8 {
    let count = matches.get_count(commands::logging::ARG_VERBOSITY);
    let level = matches
        .get_one::<u8>(commands::logging::ARG_LOG_LEVEL)
        .copied()
        .unwrap_or(0);
    count.max(level)
}

/// Parse the command line, initialize telemetry and return the action to run.
///
/// # Errors
///
/// Returns an error if telemetry initialization or action dispatch fails
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    telemetry::init(get_verbosity_level(verbosity(&matches)))?;

    dispatch::handler(&matches)
}
