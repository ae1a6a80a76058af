//! sources of process-table rows.

use {
    crate::{
        error::{AcquisitionError, ParseError},
        process::RawProcess,
    },
    std::{
        collections::{HashSet, VecDeque},
        io,
        process::Command,
        time::Duration,
    },
    sysinfo::{
        CpuRefreshKind, MemoryRefreshKind, ProcessRefreshKind, ProcessesToUpdate, RefreshKind,
        System, UpdateKind, Users,
    },
    tracing::debug,
};

pub use self::ps::{parse_cpu_time, parse_ps_line, parse_ps_output, parse_start_time};

/// a source of process-table rows.
pub trait ProcessSource {
    /// returns one row per live process.
    fn processes(&mut self) -> Result<Vec<RawProcess>, AcquisitionError>;

    /// system-wide load, as of the last call to [`ProcessSource::processes`].
    fn load(&mut self) -> Option<SystemLoad> {
        None
    }
}

impl<S: ProcessSource + ?Sized> ProcessSource for Box<S> {
    fn processes(&mut self) -> Result<Vec<RawProcess>, AcquisitionError> {
        (**self).processes()
    }

    fn load(&mut self) -> Option<SystemLoad> {
        (**self).load()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SystemLoad {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
    pub cores: usize,
    pub memory_used_percent: f64,
}

// === impl SysinfoSource ===

/// rows read through `sysinfo`.
pub struct SysinfoSource {
    system: System,
    users: Users,
    /// uids that had no user the last time users were read.
    unknown_uids: HashSet<String>,
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoSource {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::nothing())
                .with_memory(MemoryRefreshKind::nothing().with_ram()),
        );
        Self {
            system,
            users: Users::new_with_refreshed_list(),
            unknown_uids: HashSet::new(),
        }
    }
}

impl ProcessSource for SysinfoSource {
    fn processes(&mut self) -> Result<Vec<RawProcess>, AcquisitionError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(AcquisitionError::Unsupported);
        }

        self.system.refresh_memory();
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_cpu()
                .with_memory()
                .with_user(UpdateKind::OnlyIfNotSet)
                .with_cmd(UpdateKind::OnlyIfNotSet)
                .without_tasks(),
        );

        let Self {
            system,
            users,
            unknown_uids,
        } = self;

        // users added since the list was read show up as uids nobody has heard of.
        let new_uid = system
            .processes()
            .values()
            .filter_map(|p| p.user_id())
            .filter(|uid| users.get_user_by_id(uid).is_none())
            .fold(false, |new, uid| unknown_uids.insert(uid.to_string()) || new);
        if new_uid {
            debug!("unknown uid, rereading users");
            users.refresh();
        }

        let total_mem = system.total_memory().max(1) as f64;

        let rows = system
            .processes()
            .values()
            .map(|p| {
                let cmdline = p
                    .cmd()
                    .iter()
                    .map(|s| s.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" ");
                let cmdline = if cmdline.is_empty() {
                    format!("[{}]", p.name().to_string_lossy())
                } else {
                    cmdline
                };
                let username = p
                    .user_id()
                    .map(|uid| {
                        users
                            .get_user_by_id(uid)
                            .map(|user| user.name().to_string())
                            .unwrap_or_else(|| uid.to_string())
                    })
                    .unwrap_or_else(|| "-".to_string());

                RawProcess {
                    pid: p.pid().as_u32(),
                    ppid: p.parent().map(|ppid| ppid.as_u32()),
                    start_time: p.start_time(),
                    username,
                    cpu_time: Duration::from_millis(p.accumulated_cpu_time()),
                    memory_percent: (p.memory() as f64 / total_mem * 100.0).clamp(0.0, 100.0),
                    cmdline,
                }
            })
            .collect();

        Ok(rows)
    }

    fn load(&mut self) -> Option<SystemLoad> {
        let load = System::load_average();
        let total = self.system.total_memory();
        let memory_used_percent = if total == 0 {
            0.0
        } else {
            self.system.used_memory() as f64 / total as f64 * 100.0
        };

        Some(SystemLoad {
            one: load.one,
            five: load.five,
            fifteen: load.fifteen,
            cores: self.system.cpus().len().max(1),
            memory_used_percent,
        })
    }
}

// === impl PsSource ===

/// rows read by running `ps(1)`.
#[derive(Default)]
pub struct PsSource;

impl PsSource {
    const ARGS: [&str; 15] = [
        "-A", "-o", "pid=", "-o", "ppid=", "-o", "lstart=", "-o", "user=", "-o", "time=", "-o",
        "%mem=", "-o", "command=",
    ];
}

impl ProcessSource for PsSource {
    fn processes(&mut self) -> Result<Vec<RawProcess>, AcquisitionError> {
        let output = Command::new("ps")
            .args(Self::ARGS)
            // month and weekday names are parsed below.
            .env("LC_ALL", "C")
            .env_remove("LANG")
            .output()?;

        if !output.status.success() {
            return Err(AcquisitionError::Status {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(parse_ps_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// parsing of `ps -o pid=,ppid=,lstart=,user=,time=,%mem=,command=` output.
mod ps {
    use super::*;

    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];

    /// start times outside these years are not believed.
    const YEARS: std::ops::RangeInclusive<u64> = 1970..=9999;

    /// pid, ppid, five start time words, user, time and memory, then the command line.
    const FIELDS: usize = 10;

    /// parses every row, skipping the ones that cannot be understood.
    pub fn parse_ps_output(output: &str) -> Vec<RawProcess> {
        output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match parse_ps_line(line) {
                Ok(row) => Some(row),
                Err(error) => {
                    debug!(%error, "skipping process table row");
                    None
                }
            })
            .collect()
    }

    pub fn parse_ps_line(line: &str) -> Result<RawProcess, ParseError> {
        let Some((fields, cmdline)) = split_fields(line, FIELDS) else {
            return Err(ParseError::Fields {
                line: line.to_string(),
            });
        };
        let [pid, ppid, lstart @ .., user, time, mem] = fields.as_slice() else {
            unreachable!("split_fields returns exactly {FIELDS} fields");
        };

        let ppid = ppid.parse::<u32>()?;
        Ok(RawProcess {
            pid: pid.parse()?,
            ppid: (ppid != 0).then_some(ppid),
            start_time: parse_start_time(&lstart.join(" "))?,
            username: user.to_string(),
            cpu_time: parse_cpu_time(time)?,
            memory_percent: mem.parse()?,
            cmdline: cmdline.to_string(),
        })
    }

    /// splits off `n` whitespace separated words, returning them and the non-empty rest.
    fn split_fields(line: &str, n: usize) -> Option<(Vec<&str>, &str)> {
        let mut rest = line;
        let mut fields = Vec::with_capacity(n);
        for _ in 0..n {
            rest = rest.trim_start();
            let end = rest.find(char::is_whitespace)?;
            fields.push(&rest[..end]);
            rest = &rest[end..];
        }

        let rest = rest.trim();
        (!rest.is_empty()).then_some((fields, rest))
    }

    /// parses `ps`'s cpu time column: `1:02.03`, `01:23:45` or `123-01:23:45`.
    ///
    /// without hours the minutes may run past 59, the way macOS prints long cpu times.
    pub fn parse_cpu_time(time: &str) -> Result<Duration, ParseError> {
        let error = || ParseError::CpuTime {
            time: time.to_string(),
        };

        let (days, clock) = match time.split_once('-') {
            Some((days, clock)) => (Some(number(days).ok_or_else(error)?), clock),
            None => (None, time),
        };

        let parts = clock.split(':').collect::<Vec<_>>();
        let (hours, minutes, seconds) = match (days, parts.as_slice()) {
            (None, [minutes, seconds]) => (0, number(minutes), *seconds),
            (_, [hours, minutes, seconds]) => (
                number(hours).ok_or_else(error)?,
                number(minutes).filter(|m| *m < 60),
                *seconds,
            ),
            _ => return Err(error()),
        };
        let minutes = minutes.ok_or_else(error)?;

        let (whole, fraction) = seconds.split_once('.').unwrap_or((seconds, ""));
        let whole = number(whole).filter(|s| *s < 60).ok_or_else(error)?;
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(error());
        }
        let millis = format!("{fraction:0<3}")[..3].parse::<u64>().map_err(|_| error())?;

        let seconds = days
            .unwrap_or(0)
            .checked_mul(86400)
            .and_then(|s| s.checked_add(hours.checked_mul(3600)?))
            .and_then(|s| s.checked_add(minutes.checked_mul(60)?))
            .and_then(|s| s.checked_add(whole))
            .ok_or_else(error)?;
        Duration::from_secs(seconds)
            .checked_add(Duration::from_millis(millis))
            .ok_or_else(error)
    }

    /// parses `ps`'s `lstart` column, `Mon Mar  7 09:33:11 2016`, into seconds since the
    /// epoch, ignoring the time zone.
    pub fn parse_start_time(lstart: &str) -> Result<u64, ParseError> {
        let error = || ParseError::StartTime {
            time: lstart.to_string(),
        };

        let words = lstart.split_whitespace().collect::<Vec<_>>();
        let [_weekday, month, day, clock, year] = words.as_slice() else {
            return Err(error());
        };

        let month = MONTHS
            .iter()
            .position(|m| m == month)
            .ok_or_else(error)? as u64
            + 1;
        let day = number(day).filter(|d| (1..=31).contains(d)).ok_or_else(error)?;
        let year = number(year).filter(|y| YEARS.contains(y)).ok_or_else(error)?;

        let hms = clock.split(':').map(number).collect::<Option<Vec<_>>>();
        let Some(&[hours, minutes, seconds]) = hms.as_deref() else {
            return Err(error());
        };
        if hours >= 24 || minutes >= 60 || seconds >= 60 {
            return Err(error());
        }

        let days = days_from_civil(year, month, day);
        Ok(days * 86400 + hours * 3600 + minutes * 60 + seconds)
    }

    /// days since 1970-01-01 of a proleptic gregorian date, for years in [`YEARS`].
    fn days_from_civil(year: u64, month: u64, day: u64) -> u64 {
        let year = if month <= 2 { year - 1 } else { year };
        let era = year / 400;
        let year_of_era = year - era * 400;
        let shifted_month = (month + 9) % 12;
        let day_of_year = (153 * shifted_month + 2) / 5 + day - 1;
        let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
        era * 146_097 + day_of_era - 719_468
    }

    fn number(digits: &str) -> Option<u64> {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

// === impl ScriptedSource ===

/// a process source that replays a fixed script of acquisitions.
///
/// once the script runs out, every acquisition fails.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: VecDeque<Result<Vec<RawProcess>, AcquisitionError>>,
    acquisitions: usize,
}

impl ScriptedSource {
    pub fn new(script: impl IntoIterator<Item = Result<Vec<RawProcess>, AcquisitionError>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            acquisitions: 0,
        }
    }

    /// how many times [`ProcessSource::processes`] has been called.
    pub fn acquisitions(&self) -> usize {
        self.acquisitions
    }
}

impl ProcessSource for ScriptedSource {
    fn processes(&mut self) -> Result<Vec<RawProcess>, AcquisitionError> {
        self.acquisitions += 1;
        self.script.pop_front().unwrap_or_else(|| {
            Err(AcquisitionError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "script exhausted",
            )))
        })
    }
}
