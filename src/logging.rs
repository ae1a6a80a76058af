use {
    std::{fs::OpenOptions, io, path::Path, sync::Mutex},
    tracing_subscriber::EnvFilter,
};

/// the environment variable holding the log filter, e.g. `PXTOP_LOG=pxtop=debug`.
pub const LOG_ENV: &str = "PXTOP_LOG";

/// installs the global subscriber.
///
/// with a log file, logs at `info` unless `PXTOP_LOG` says otherwise. without one logs would
/// land on the dashboard, so nothing is logged unless asked for.
pub fn init(log_file: Option<&Path>) -> io::Result<()> {
    let default = if log_file.is_some() { "info" } else { "off" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(io::stderr).try_init(),
    };

    // a subscriber is already installed; keep using it.
    if let Err(error) = result {
        tracing::debug!(%error, "logging already initialized");
    }

    Ok(())
}
