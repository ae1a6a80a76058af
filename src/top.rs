//! top mode: a live, continuously refreshed process list.
//!
//! in top mode cpu times are counted from when top mode started rather than from when each
//! process started, so the list shows what is busy right now.

use {
    crate::{
        command::{CommandNamer, Heuristic},
        config::Config,
        error::Error,
        launches::LaunchCounter,
        process::{order_best_last, seconds_to_str},
        reconcile::reconcile,
        screen::get_screen_lines,
        snapshot::Snapshot,
        source::{ProcessSource, SystemLoad},
        terminal::{self, TerminalEvents, TerminalRenderer},
    },
    crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    std::{
        io,
        time::{Duration, Instant},
    },
    tracing::{debug, info, warn},
};

/// how often a new snapshot is taken.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// how long to wait for a key press at a time.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// consecutive failed acquisitions that end top mode.
pub const FAILURE_LIMIT: u32 = 3;

/// where the control loop is.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    /// waiting for the next tick or the next key press.
    Idle,
    /// acquiring and reconciling a new snapshot.
    Refreshing,
    /// drawing a frame.
    Rendering,
    Terminated,
}

/// things that wake the control loop up.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Stimulus {
    /// time for a new snapshot.
    Tick,
    Key(KeyEvent),
    /// the terminal has been resized.
    Resize { columns: u16, rows: u16 },
}

/// what a key press means.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command {
    Quit,
    StartFilter,
    PushFilter(char),
    PopFilter,
    EndFilter,
    ClearFilter,
    Ignore,
}

/// delivers stimuli to the control loop, one at a time.
pub trait StimulusSource {
    /// blocks until something happens, returning [`Stimulus::Tick`] once `deadline` passes.
    fn next(&mut self, deadline: Instant) -> io::Result<Stimulus>;
}

/// draws frames of plain text lines.
pub trait Renderer {
    /// the current `(rows, columns)` of the screen.
    fn size(&mut self) -> io::Result<(usize, usize)>;

    fn draw(&mut self, lines: &[String], columns: usize) -> io::Result<()>;

    /// gives the terminal back. calling this more than once must be harmless.
    fn restore(&mut self) -> io::Result<()>;
}

/// the state of one top mode session.
///
/// owned by the control loop; nothing else mutates it.
#[derive(Debug)]
pub struct Session {
    /// cpu times are counted from here.
    baseline: Snapshot,
    /// the last raw snapshot, for spotting new launches.
    previous: Snapshot,
    /// the last reconciled snapshot, for display.
    current: Snapshot,
    launches: LaunchCounter,
    load: Option<SystemLoad>,
    rows: usize,
    columns: usize,
    filter: String,
    editing_filter: bool,
    failures: u32,
}

/// a top mode control loop, with its collaborators.
pub struct TopMode<S, I, R> {
    source: S,
    stimuli: I,
    renderer: R,
    namer: Box<dyn CommandNamer>,
    interval: Duration,
    filter: String,
}

/// runs top mode on the terminal until the user quits.
pub fn run_top_loop(config: &Config) -> Result<(), Error> {
    let source = config.source.open();
    let renderer = TerminalRenderer::enter().map_err(Error::Terminal)?;

    TopMode::new(source, TerminalEvents::new(POLL_INTERVAL), renderer)
        .with_interval(config.interval)
        .with_filter(config.filter.clone().unwrap_or_default())
        .run()
        .map(drop)
}

// === impl Session ===

impl Session {
    /// takes the first snapshot, which becomes both the baseline and the current snapshot.
    pub fn start(
        source: &mut dyn ProcessSource,
        namer: &dyn CommandNamer,
        (rows, columns): (usize, usize),
    ) -> Result<Self, Error> {
        let baseline = Snapshot::new(source.processes()?, namer, Instant::now());
        let current = reconcile(&baseline, &baseline);
        info!(processes = baseline.len(), "baseline taken");

        Ok(Self {
            previous: baseline.clone(),
            current,
            baseline,
            launches: LaunchCounter::new(),
            load: source.load(),
            rows,
            columns,
            filter: String::new(),
            editing_filter: false,
            failures: 0,
        })
    }

    /// takes a new snapshot and folds it into the session.
    ///
    /// a failed acquisition keeps the previous snapshot, until [`FAILURE_LIMIT`] of them in a
    /// row end the session.
    pub fn refresh(
        &mut self,
        source: &mut dyn ProcessSource,
        namer: &dyn CommandNamer,
    ) -> Result<(), Error> {
        let rows = match source.processes() {
            Ok(rows) => rows,
            Err(error) => {
                self.failures += 1;
                warn!(%error, failures = self.failures, "process table acquisition failed");
                if self.failures >= FAILURE_LIMIT {
                    return Err(Error::TooManyFailures {
                        failures: self.failures,
                        last: error,
                    });
                }
                return Ok(());
            }
        };
        self.failures = 0;

        let snapshot = Snapshot::new(rows, namer, Instant::now());
        self.launches.track(&self.previous, &snapshot);
        self.current = reconcile(&self.baseline, &snapshot);
        self.previous = snapshot;
        self.load = source.load();

        Ok(())
    }

    /// counts cpu time from now on, instead of from when the session started.
    pub fn reset_baseline(&mut self) {
        debug!("resetting baseline");
        self.baseline = self.previous.clone();
        self.current = reconcile(&self.baseline, &self.previous);
    }

    pub fn resize(&mut self, rows: usize, columns: usize) {
        self.rows = rows;
        self.columns = columns;
    }

    /// applies a key command, returning the phase to go to next.
    pub fn apply(&mut self, command: Command) -> Phase {
        match command {
            Command::Quit => return Phase::Terminated,
            Command::Ignore => return Phase::Idle,
            Command::StartFilter => self.editing_filter = true,
            Command::EndFilter => self.editing_filter = false,
            Command::PushFilter(c) => self.filter.push(c),
            Command::PopFilter => {
                self.filter.pop();
            }
            Command::ClearFilter => self.filter.clear(),
        }
        Phase::Rendering
    }

    pub fn set_filter(&mut self, filter: impl Into<String>) {
        self.filter = filter.into();
    }

    /// the frame to draw, exactly `rows` lines long.
    pub fn screen_lines(&self) -> Vec<String> {
        let filter = Some(self.filter.as_str());
        let processes = self
            .current
            .iter()
            .filter(|p| p.matches(filter))
            .cloned()
            .collect::<Vec<_>>();

        get_screen_lines(
            &self.header(),
            &self.launches.screen_lines(),
            &order_best_last(processes),
            self.rows,
            self.columns,
        )
    }

    fn header(&self) -> String {
        let mut header = match self.load {
            Some(SystemLoad {
                one,
                five,
                fifteen,
                cores,
                memory_used_percent,
            }) => format!(
                "sysload: {one:.2} {five:.2} {fifteen:.2}  [{cores} cores]  ram: {memory_used_percent:.0}%"
            ),
            None => "sysload: n/a".to_string(),
        };

        let since = self
            .current
            .time()
            .saturating_duration_since(self.baseline.time());
        header.push_str(&format!(
            "  {} processes  cpu since {}",
            self.current.len(),
            seconds_to_str(since)
        ));

        if self.editing_filter {
            header.push_str(&format!("  filter: {}_", self.filter));
        } else if !self.filter.is_empty() {
            header.push_str(&format!("  filter: {}", self.filter));
        }

        header
    }

    pub fn baseline(&self) -> &Snapshot {
        &self.baseline
    }

    pub fn current(&self) -> &Snapshot {
        &self.current
    }

    pub fn launches(&self) -> &LaunchCounter {
        &self.launches
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.rows, self.columns)
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn editing_filter(&self) -> bool {
        self.editing_filter
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// maps a key press to a command.
pub fn command(key: KeyEvent, editing_filter: bool) -> Command {
    if key.kind != KeyEventKind::Press {
        return Command::Ignore;
    }
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Command::Quit;
    }

    if editing_filter {
        return match key.code {
            KeyCode::Esc | KeyCode::Enter => Command::EndFilter,
            KeyCode::Backspace => Command::PopFilter,
            KeyCode::Char(c) if !c.is_control() => Command::PushFilter(c),
            _ => Command::Ignore,
        };
    }

    match key.code {
        KeyCode::Char('q') => Command::Quit,
        KeyCode::Char('/') => Command::StartFilter,
        KeyCode::Char('x') => Command::ClearFilter,
        _ => Command::Ignore,
    }
}

// === impl TopMode ===

impl<S, I, R> TopMode<S, I, R>
where
    S: ProcessSource,
    I: StimulusSource,
    R: Renderer,
{
    pub fn new(source: S, stimuli: I, renderer: R) -> Self {
        Self {
            source,
            stimuli,
            renderer,
            namer: Box::new(Heuristic),
            interval: DEFAULT_INTERVAL,
            filter: String::new(),
        }
    }

    pub fn with_interval(self, interval: Duration) -> Self {
        Self { interval, ..self }
    }

    pub fn with_filter(self, filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            ..self
        }
    }

    pub fn with_namer(self, namer: impl CommandNamer + 'static) -> Self {
        Self {
            namer: Box::new(namer),
            ..self
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// runs until the user quits or a fatal error occurs, returning the final session.
    ///
    /// the renderer is restored exactly once, whichever way this ends.
    pub fn run(&mut self) -> Result<Session, Error> {
        let result = self.run_loop();
        let restored = self.renderer.restore().map_err(Error::Terminal);
        let session = result?;
        restored?;
        Ok(session)
    }

    fn run_loop(&mut self) -> Result<Session, Error> {
        let Self {
            source,
            stimuli,
            renderer,
            namer,
            interval,
            filter,
        } = self;

        let size = renderer.size().unwrap_or_else(|error| {
            debug!(%error, "no window size, using defaults");
            terminal::DEFAULT_SIZE
        });
        let mut session = Session::start(&mut *source, &**namer, size)?;
        session.set_filter(filter.clone());

        let mut next_tick = Instant::now() + *interval;
        let mut phase = Phase::Rendering;
        loop {
            phase = match phase {
                Phase::Idle => match stimuli.next(next_tick).map_err(Error::Terminal)? {
                    Stimulus::Tick => Phase::Refreshing,
                    Stimulus::Resize { columns, rows } => {
                        debug!(rows, columns, "resized");
                        session.resize(usize::from(rows), usize::from(columns));
                        Phase::Rendering
                    }
                    Stimulus::Key(key) => session.apply(command(key, session.editing_filter())),
                },
                Phase::Refreshing => {
                    session.refresh(&mut *source, &**namer)?;
                    // a slow acquisition delays the next tick rather than piling up ticks.
                    next_tick = Instant::now() + *interval;
                    Phase::Rendering
                }
                Phase::Rendering => {
                    let (_, columns) = session.dimensions();
                    renderer
                        .draw(&session.screen_lines(), columns)
                        .map_err(Error::Terminal)?;
                    Phase::Idle
                }
                Phase::Terminated => return Ok(session),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            error::AcquisitionError,
            process::{RawProcess, tests::raw},
            source::ScriptedSource,
        },
    };

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn failure() -> Result<Vec<RawProcess>, AcquisitionError> {
        Err(AcquisitionError::Io(io::Error::other("ps went away")))
    }

    #[test]
    fn keys() {
        assert_eq!(command(key(KeyCode::Char('q')), false), Command::Quit);
        assert_eq!(
            command(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL), false),
            Command::Quit
        );
        assert_eq!(command(key(KeyCode::Char('/')), false), Command::StartFilter);
        assert_eq!(command(key(KeyCode::Char('x')), false), Command::ClearFilter);
        assert_eq!(command(key(KeyCode::Char('z')), false), Command::Ignore);
        assert_eq!(command(key(KeyCode::Up), false), Command::Ignore);
    }

    #[test]
    fn keys_while_editing_the_filter() {
        assert_eq!(command(key(KeyCode::Char('q')), true), Command::PushFilter('q'));
        assert_eq!(command(key(KeyCode::Backspace), true), Command::PopFilter);
        assert_eq!(command(key(KeyCode::Enter), true), Command::EndFilter);
        assert_eq!(command(key(KeyCode::Esc), true), Command::EndFilter);
        assert_eq!(
            command(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL), true),
            Command::Quit
        );
    }

    #[test]
    fn key_releases_are_ignored() {
        let mut release = key(KeyCode::Char('q'));
        release.kind = KeyEventKind::Release;
        assert_eq!(command(release, false), Command::Ignore);
    }

    #[test]
    fn unrecognized_keys_have_no_side_effects() {
        let mut source = ScriptedSource::new([Ok(vec![raw(1, 0, "init")])]);
        let mut session = Session::start(&mut source, &Heuristic, (10, 80)).unwrap();
        let before = session.screen_lines();

        assert_eq!(session.apply(Command::Ignore), Phase::Idle);
        assert_eq!(session.screen_lines(), before);
        assert_eq!(session.filter(), "");
    }

    #[test]
    fn filter_editing() {
        let mut source = ScriptedSource::new([Ok(vec![raw(1, 0, "init"), raw(2, 0, "bash")])]);
        let mut session = Session::start(&mut source, &Heuristic, (10, 80)).unwrap();

        assert_eq!(session.apply(Command::StartFilter), Phase::Rendering);
        for c in "bax".chars() {
            session.apply(Command::PushFilter(c));
        }
        session.apply(Command::PopFilter);
        session.apply(Command::EndFilter);
        assert_eq!(session.filter(), "ba");
        assert!(!session.editing_filter());

        let lines = session.screen_lines();
        assert!(lines[0].ends_with("filter: ba"));
        assert!(lines.iter().any(|l| l.ends_with(" bash")));
        assert!(!lines.iter().any(|l| l.ends_with(" init")));

        session.apply(Command::ClearFilter);
        assert_eq!(session.filter(), "");
    }

    #[test]
    fn start_counts_from_zero() {
        let mut source = ScriptedSource::new([Ok(vec![raw(1, 5_000, "init")])]);
        let session = Session::start(&mut source, &Heuristic, (10, 80)).unwrap();
        assert_eq!(session.current().get(1).unwrap().cpu_time(), Duration::ZERO);
        assert_eq!(session.baseline().get(1).unwrap().cpu_time(), Duration::from_secs(5));
    }

    #[test]
    fn start_fails_without_a_snapshot() {
        let mut source = ScriptedSource::new([failure()]);
        let error = Session::start(&mut source, &Heuristic, (10, 80)).unwrap_err();
        assert!(matches!(error, Error::Acquisition(_)));
    }

    #[test]
    fn transient_failures_keep_the_previous_snapshot() {
        let mut source = ScriptedSource::new([
            Ok(vec![raw(1, 1_000, "init")]),
            Ok(vec![raw(1, 3_000, "init")]),
            failure(),
            failure(),
            Ok(vec![raw(1, 4_000, "init")]),
        ]);
        let mut session = Session::start(&mut source, &Heuristic, (10, 80)).unwrap();

        session.refresh(&mut source, &Heuristic).unwrap();
        let cpu = |s: &Session| s.current().get(1).unwrap().cpu_time();
        assert_eq!(cpu(&session), Duration::from_secs(2));

        session.refresh(&mut source, &Heuristic).unwrap();
        session.refresh(&mut source, &Heuristic).unwrap();
        assert_eq!(session.failures(), 2);
        assert_eq!(cpu(&session), Duration::from_secs(2));

        session.refresh(&mut source, &Heuristic).unwrap();
        assert_eq!(session.failures(), 0);
        assert_eq!(cpu(&session), Duration::from_secs(3));
    }

    #[test]
    fn three_failures_in_a_row_are_fatal() {
        let mut source =
            ScriptedSource::new([Ok(vec![raw(1, 0, "init")]), failure(), failure(), failure()]);
        let mut session = Session::start(&mut source, &Heuristic, (10, 80)).unwrap();

        session.refresh(&mut source, &Heuristic).unwrap();
        session.refresh(&mut source, &Heuristic).unwrap();
        let error = session.refresh(&mut source, &Heuristic).unwrap_err();
        assert!(matches!(error, Error::TooManyFailures { failures: 3, .. }));
    }

    #[test]
    fn reset_baseline_counts_from_now() {
        let mut source = ScriptedSource::new([
            Ok(vec![raw(1, 1_000, "init")]),
            Ok(vec![raw(1, 6_000, "init")]),
            Ok(vec![raw(1, 7_000, "init")]),
        ]);
        let mut session = Session::start(&mut source, &Heuristic, (10, 80)).unwrap();
        session.refresh(&mut source, &Heuristic).unwrap();
        assert_eq!(session.current().get(1).unwrap().cpu_time(), Duration::from_secs(5));

        session.reset_baseline();
        assert_eq!(session.current().get(1).unwrap().cpu_time(), Duration::ZERO);

        session.refresh(&mut source, &Heuristic).unwrap();
        assert_eq!(session.current().get(1).unwrap().cpu_time(), Duration::from_secs(1));
    }

    #[test]
    fn launches_are_tracked_between_raw_snapshots() {
        let init = RawProcess {
            start_time: 10,
            ..raw(1, 0, "/sbin/init")
        };
        let shell = RawProcess {
            ppid: Some(1),
            start_time: 20,
            ..raw(2, 0, "/bin/bash")
        };
        let mut source = ScriptedSource::new([
            Ok(vec![init.clone()]),
            Ok(vec![init.clone(), shell.clone()]),
            Ok(vec![init, shell]),
        ]);
        let mut session = Session::start(&mut source, &Heuristic, (30, 80)).unwrap();
        session.refresh(&mut source, &Heuristic).unwrap();
        session.refresh(&mut source, &Heuristic).unwrap();

        assert_eq!(session.launches().screen_lines(), ["init -> bash"]);
        assert_eq!(session.screen_lines()[2], "  init -> bash");
    }
}
