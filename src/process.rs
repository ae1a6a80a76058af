use {
    crate::command::CommandNamer,
    std::{cmp::Ordering, time::Duration},
};

/// identifies one running process instance.
///
/// pids are recycled by the operating system, so the start time is part of the identity.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ProcessKey {
    pub pid: u32,
    pub start_time: u64,
}

/// the primitive fields of one process-table row, as reported by a process source.
#[derive(Clone, Debug, PartialEq)]
pub struct RawProcess {
    pub pid: u32,
    pub ppid: Option<u32>,
    /// seconds since the epoch, or any other representation that is stable for one process.
    pub start_time: u64,
    pub username: String,
    pub cpu_time: Duration,
    pub memory_percent: f64,
    pub cmdline: String,
}

/// one process at one sampling instant.
#[derive(Clone, Debug, PartialEq)]
pub struct Process {
    pid: u32,
    ppid: Option<u32>,
    parent: Option<ProcessKey>,
    start_time: u64,
    username: String,
    cpu_time: Duration,
    memory_percent: f64,
    cmdline: String,
    command: String,
    score: f64,
    cpu_time_s: String,
    memory_percent_s: String,
}

// === impl Process ===

impl Process {
    pub fn new(raw: RawProcess, namer: &dyn CommandNamer) -> Self {
        let RawProcess {
            pid,
            ppid,
            start_time,
            username,
            cpu_time,
            memory_percent,
            cmdline,
        } = raw;

        let memory_percent = if memory_percent.is_nan() {
            0.0
        } else {
            memory_percent.clamp(0.0, 100.0)
        };
        let command = namer.command_name(&cmdline);

        Self {
            pid,
            ppid,
            parent: None,
            start_time,
            username,
            cpu_time,
            memory_percent,
            cmdline,
            command,
            score: score(cpu_time, memory_percent),
            cpu_time_s: seconds_to_str(cpu_time),
            memory_percent_s: format!("{memory_percent:.0}%"),
        }
    }

    /// returns a copy of this process with a different cpu time, and a score to match.
    pub fn with_cpu_time(&self, cpu_time: Duration) -> Self {
        Self {
            cpu_time,
            score: score(cpu_time, self.memory_percent),
            cpu_time_s: seconds_to_str(cpu_time),
            ..self.clone()
        }
    }

    pub(crate) fn set_parent(&mut self, parent: Option<ProcessKey>) {
        self.parent = parent;
    }

    pub fn key(&self) -> ProcessKey {
        ProcessKey {
            pid: self.pid,
            start_time: self.start_time,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn ppid(&self) -> Option<u32> {
        self.ppid
    }

    /// the process that launched this one, if it is known and still running.
    pub fn parent(&self) -> Option<ProcessKey> {
        self.parent
    }

    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn cpu_time(&self) -> Duration {
        self.cpu_time
    }

    pub fn memory_percent(&self) -> f64 {
        self.memory_percent
    }

    pub fn cmdline(&self) -> &str {
        &self.cmdline
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// how interesting this process is. higher is more interesting, and it is always positive.
    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn cpu_time_s(&self) -> &str {
        &self.cpu_time_s
    }

    pub fn memory_percent_s(&self) -> &str {
        &self.memory_percent_s
    }

    /// returns true if this process should be shown for the given filter.
    ///
    /// a process matches if there is no filter, if the filter is its username, or if the
    /// filter is a substring of its command line. a lowercase filter also matches the command
    /// line in any case; one with capitals only matches those exact capitals.
    pub fn matches(&self, filter: Option<&str>) -> bool {
        let Some(filter) = filter.filter(|f| !f.is_empty()) else {
            return true;
        };

        self.username == filter
            || self.cmdline.contains(filter)
            || self.cmdline.to_lowercase().contains(filter)
    }
}

fn score(cpu_time: Duration, memory_percent: f64) -> f64 {
    (cpu_time.as_secs_f64() + 1.0) * (memory_percent + 1.0)
}

/// orders processes by `(score, cmdline)`, least interesting first.
pub fn cmp_best_last(a: &Process, b: &Process) -> Ordering {
    a.score
        .total_cmp(&b.score)
        .then_with(|| a.cmdline.cmp(&b.cmdline))
}

/// returns the processes with the most interesting one last.
///
/// the end of the list is where your eyes are when the prompt comes back.
pub fn order_best_last(mut processes: Vec<Process>) -> Vec<Process> {
    processes.sort_by(cmp_best_last);
    processes
}

/// formats a cpu or elapsed time for humans: `1.25s`, `3m07s`, `2h05m`, `4d02h`.
pub fn seconds_to_str(time: Duration) -> String {
    let seconds = time.as_secs();

    if seconds < 60 {
        // chop, don't round, to at most three decimals.
        let millis = format!("{:03}", time.subsec_millis());
        let decimals = match millis.trim_end_matches('0') {
            "" => "0",
            decimals => decimals,
        };
        return format!("{seconds}.{decimals}s");
    }

    if seconds < 3600 {
        return format!("{}m{:02}s", seconds / 60, seconds % 60);
    }

    if seconds < 86400 {
        return format!("{}h{:02}m", seconds / 3600, (seconds % 3600) / 60);
    }

    format!("{}d{:02}h", seconds / 86400, (seconds % 86400) / 3600)
}

#[cfg(test)]
pub(crate) mod tests {
    use {super::*, crate::command::Heuristic};

    pub(crate) fn raw(pid: u32, cpu_millis: u64, cmdline: &str) -> RawProcess {
        RawProcess {
            pid,
            ppid: None,
            start_time: 1_457_343_191,
            username: "root".to_string(),
            cpu_time: Duration::from_millis(cpu_millis),
            memory_percent: 0.0,
            cmdline: cmdline.to_string(),
        }
    }

    pub(crate) fn process(pid: u32, cpu_millis: u64, cmdline: &str) -> Process {
        Process::new(raw(pid, cpu_millis, cmdline), &Heuristic)
    }

    #[test]
    fn derived_fields() {
        let p = Process::new(
            RawProcess {
                memory_percent: 4.6,
                ..raw(47536, 30, "/usr/sbin/cupsd -l")
            },
            &Heuristic,
        );
        assert_eq!(p.command(), "cupsd");
        assert_eq!(p.cpu_time_s(), "0.03s");
        assert_eq!(p.memory_percent_s(), "5%");
        assert_eq!(p.key(), ProcessKey { pid: 47536, start_time: 1_457_343_191 });
        assert!((p.score() - 1.03 * 5.6).abs() < 1e-9);
    }

    #[test]
    fn score_is_always_positive() {
        let idle = process(1, 0, "idle");
        assert_eq!(idle.score(), 1.0);

        let weird = Process::new(
            RawProcess {
                memory_percent: f64::NAN,
                ..raw(2, 0, "nan")
            },
            &Heuristic,
        );
        assert!(weird.score() > 0.0);

        let negative = Process::new(
            RawProcess {
                memory_percent: -5.0,
                ..raw(3, 0, "negative")
            },
            &Heuristic,
        );
        assert!(negative.score() > 0.0);
    }

    #[test]
    fn with_cpu_time_rescores() {
        let p = process(7, 20_000, "busy");
        let adjusted = p.with_cpu_time(Duration::from_secs(18));
        assert_eq!(adjusted.cpu_time(), Duration::from_secs(18));
        assert_eq!(adjusted.cpu_time_s(), "18.0s");
        assert_eq!(adjusted.score(), 19.0);
        assert_eq!(adjusted.cmdline(), p.cmdline());
    }

    #[test]
    fn match_none_and_empty() {
        let p = process(1, 0, "/usr/bin/Some Command");
        assert!(p.matches(None));
        assert!(p.matches(Some("")));
    }

    #[test]
    fn match_username_exactly() {
        let p = process(1, 0, "/bin/true");
        assert!(p.matches(Some("root")));
        assert!(!p.matches(Some("roo")));
        assert!(!p.matches(Some("toor")));
    }

    #[test]
    fn match_cmdline_substrings() {
        let p = process(1, 0, "/usr/bin/SomeCommand --flag");
        assert!(p.matches(Some("SomeCommand")));
        assert!(p.matches(Some("somecommand")));
        assert!(p.matches(Some("--flag")));
        assert!(p.matches(Some("usr/bin/some")));
        assert!(!p.matches(Some("other")));
    }

    #[test]
    fn capitals_in_the_filter_are_taken_literally() {
        let p = process(1, 0, "/usr/bin/SomeCommand --flag");
        assert!(!p.matches(Some("SOMECOMMAND")));
        assert!(!p.matches(Some("Somecommand")));
        assert!(!p.matches(Some("ROOT")));
    }

    #[test]
    fn order_best_last_sorts_by_score_then_cmdline() {
        let ordered = order_best_last(vec![
            process(1, 5_000, "b"),
            process(2, 0, "z"),
            process(3, 5_000, "a"),
            process(4, 60_000, "c"),
        ]);
        let pids = ordered.iter().map(Process::pid).collect::<Vec<_>>();
        assert_eq!(pids, [2, 3, 1, 4]);

        let again = order_best_last(ordered.clone());
        assert_eq!(again, ordered);

        for pair in ordered.windows(2) {
            assert_ne!(cmp_best_last(&pair[0], &pair[1]), Ordering::Greater);
        }
        let mut reversed = ordered.clone();
        reversed.reverse();
        for pair in reversed.windows(2) {
            assert_ne!(cmp_best_last(&pair[0], &pair[1]), Ordering::Less);
        }
    }

    #[test]
    fn format_seconds() {
        for (millis, expected) in [
            (0, "0.0s"),
            (30, "0.03s"),
            (5_000, "5.0s"),
            (1_234, "1.234s"),
            (59_999, "59.999s"),
            (60_000, "1m00s"),
            (187_000, "3m07s"),
            (3_599_000, "59m59s"),
            (3_600_000, "1h00m"),
            (7_500_000, "2h05m"),
            (86_400_000, "1d00h"),
            (352_800_000, "4d02h"),
        ] {
            assert_eq!(seconds_to_str(Duration::from_millis(millis)), expected);
        }
    }

    #[test]
    fn format_seconds_chops_instead_of_rounding() {
        assert_eq!(seconds_to_str(Duration::from_micros(1_999_900)), "1.999s");
    }
}
