use std::{
    fmt::{self, Display},
    io,
    num::{ParseFloatError, ParseIntError},
    process::ExitStatus,
};

/// reading the process table failed.
#[derive(Debug)]
pub enum AcquisitionError {
    Io(io::Error),
    /// the process listing command exited unsuccessfully.
    Status {
        status: ExitStatus,
        stderr: String,
    },
    /// the process listing library does not support this platform.
    Unsupported,
}

/// one process-table row could not be understood.
///
/// bad rows are skipped; they never fail a whole snapshot.
#[derive(Debug, Eq, PartialEq)]
pub enum ParseError {
    /// the row has too few columns.
    Fields { line: String },
    Pid(ParseIntError),
    StartTime { time: String },
    CpuTime { time: String },
    MemoryPercent(ParseFloatError),
}

/// errors that end top mode.
#[derive(Debug)]
pub enum Error {
    Acquisition(AcquisitionError),
    /// the terminal could not be set up, drawn to, or read from.
    Terminal(io::Error),
    TooManyFailures {
        failures: u32,
        last: AcquisitionError,
    },
}

// === impl AcquisitionError ===

impl std::error::Error for AcquisitionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(io) => Some(io),
            Self::Status { .. } | Self::Unsupported => None,
        }
    }
}

impl Display for AcquisitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(io) => write!(f, "reading the process table: {io}"),
            Self::Status { status, stderr } if stderr.trim().is_empty() => {
                write!(f, "ps {status}")
            }
            Self::Status { status, stderr } => write!(f, "ps {status}: {}", stderr.trim()),
            Self::Unsupported => f.write_str("process listing is not supported on this platform"),
        }
    }
}

impl From<io::Error> for AcquisitionError {
    fn from(io: io::Error) -> Self {
        Self::Io(io)
    }
}

// === impl ParseError ===

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Pid(pid) => Some(pid),
            Self::MemoryPercent(mem) => Some(mem),
            Self::Fields { .. } | Self::StartTime { .. } | Self::CpuTime { .. } => None,
        }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fields { line } => write!(f, "too few columns: <{line}>"),
            Self::Pid(pid) => write!(f, "bad pid: {pid}"),
            Self::StartTime { time } => write!(f, "unparsable start time: <{time}>"),
            Self::CpuTime { time } => write!(f, "unparsable cpu time: <{time}>"),
            Self::MemoryPercent(mem) => write!(f, "bad memory percentage: {mem}"),
        }
    }
}

impl From<ParseIntError> for ParseError {
    fn from(pid: ParseIntError) -> Self {
        Self::Pid(pid)
    }
}

impl From<ParseFloatError> for ParseError {
    fn from(mem: ParseFloatError) -> Self {
        Self::MemoryPercent(mem)
    }
}

// === impl Error ===

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Acquisition(error) => Some(error),
            Self::Terminal(io) => Some(io),
            Self::TooManyFailures { last, .. } => Some(last),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acquisition(error) => Display::fmt(error, f),
            Self::Terminal(io) => write!(f, "terminal: {io}"),
            Self::TooManyFailures { failures, .. } => {
                write!(f, "process table acquisition failed {failures} times in a row")
            }
        }
    }
}

impl From<AcquisitionError> for Error {
    fn from(error: AcquisitionError) -> Self {
        Self::Acquisition(error)
    }
}
