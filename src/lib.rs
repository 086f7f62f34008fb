//! Intune device lifecycle cleanup
//!
//! Classifies stale, orphaned and duplicate devices from a Microsoft Graph
//! snapshot, plans retire/delete actions under exclusions and a run cap,
//! and executes or reports them.

pub mod cmd;
pub mod config;
pub mod error;
pub mod executor;
pub mod graph;
pub mod lifecycle;
pub mod report;

pub use error::{Error, Result, SweepError};
