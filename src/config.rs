use {
    crate::source::{ProcessSource, PsSource, SysinfoSource},
    clap::{Parser, ValueEnum},
    std::{ffi::OsString, path::PathBuf, time::Duration},
};

/// ticks closer together than this would spend all their time listing processes.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(
    name = "px",
    version,
    about = "Lists processes, or watches them with --top"
)]
struct Cli {
    /// Only show processes run by this user, or whose command line contains this
    filter: Option<String>,

    /// Show a continuously refreshed process list
    #[arg(long)]
    top: bool,

    /// Milliseconds between refreshes in top mode
    #[arg(long, env = "PXTOP_INTERVAL", default_value_t = 1000, value_name = "MS")]
    interval: u64,

    /// Where process information comes from
    #[arg(long, value_enum, env = "PXTOP_SOURCE", default_value_t = SourceKind::Sysinfo)]
    source: SourceKind,

    /// Write diagnostics to this file instead of stderr
    #[arg(long, env = "PXTOP_LOG_FILE", value_name = "PATH")]
    log_file: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum SourceKind {
    /// Ask the operating system directly
    #[default]
    Sysinfo,
    /// Run ps(1)
    Ps,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub filter: Option<String>,
    pub top: bool,
    pub interval: Duration,
    pub source: SourceKind,
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// parses a command line, program name first.
    ///
    /// invoked as `ptop` (any name ending in `top`) without arguments, top mode is implied.
    pub fn from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args = args.into_iter().map(Into::into).collect::<Vec<OsString>>();
        let cli = Cli::try_parse_from(&args)?;

        let implied_top = args.len() == 1 && invoked_as_top(&args[0]);

        Ok(Self {
            filter: cli.filter.filter(|filter| !filter.is_empty()),
            top: cli.top || implied_top,
            interval: Duration::from_millis(cli.interval).max(MIN_INTERVAL),
            source: cli.source,
            log_file: cli.log_file,
        })
    }
}

fn invoked_as_top(argv0: &OsString) -> bool {
    std::path::Path::new(argv0)
        .file_stem()
        .is_some_and(|name| name.to_string_lossy().ends_with("top"))
}

impl SourceKind {
    pub fn open(self) -> Box<dyn ProcessSource> {
        match self {
            Self::Sysinfo => Box::new(SysinfoSource::new()),
            Self::Ps => Box::new(PsSource),
        }
    }
}
