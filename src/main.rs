use {
    color_eyre::{Result, eyre::WrapErr},
    pxtop::{
        command::Heuristic,
        config::Config,
        logging,
        process::order_best_last,
        screen::to_screen_lines,
        snapshot::Snapshot,
        terminal::window_size,
        top::run_top_loop,
    },
    std::{
        io::{self, Write},
        time::Instant,
    },
    tracing::debug,
};

fn main() -> Result<()> {
    color_eyre::install()?;
    let config = Config::from_args(std::env::args_os()).unwrap_or_else(|error| error.exit());
    logging::init(config.log_file.as_deref()).wrap_err("opening the log file")?;
    debug!(?config, "starting");

    if config.top {
        return run_top_loop(&config).wrap_err("top mode");
    }

    list(&config)
}

/// prints the matching processes once, most interesting last.
fn list(config: &Config) -> Result<()> {
    let mut source = config.source.open();
    let snapshot = Snapshot::new(source.processes()?, &Heuristic, Instant::now());

    let filter = config.filter.as_deref();
    let processes = snapshot
        .into_processes()
        .into_iter()
        .filter(|p| p.matches(filter))
        .collect();
    let processes = order_best_last(processes);

    // piped output is not cropped.
    let columns = window_size().map(|(_, columns)| columns);

    let mut stdout = io::stdout().lock();
    for line in to_screen_lines(&processes, columns) {
        match writeln!(stdout, "{line}") {
            Err(error) if error.kind() == io::ErrorKind::BrokenPipe => return Ok(()),
            result => result?,
        }
    }

    Ok(())
}
