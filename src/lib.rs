//! process listing, and a live top-style view of what is running.
//!
//! [`process`] models one process and how interesting it is, [`snapshot`] a point-in-time
//! process table, and [`reconcile`] turns two snapshots into cpu time spent in between.
//! [`launches`] counts which binaries get launched from where, and [`top`] drives the
//! live view, laid out by [`screen`].

pub mod command;
pub mod config;
pub mod error;
pub mod launches;
pub mod logging;
pub mod process;
pub mod reconcile;
pub mod screen;
pub mod snapshot;
pub mod source;
pub mod terminal;
pub mod top;

pub use {
    config::Config,
    error::{AcquisitionError, Error, ParseError},
    process::{Process, ProcessKey, RawProcess},
    reconcile::reconcile,
    snapshot::Snapshot,
    source::ProcessSource,
    top::run_top_loop,
};
