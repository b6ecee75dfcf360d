//! Cluster job-scheduler data model and client surface.
//!
//! Units are schedulable jobs: a name, an ordered option list (the unit file
//! content) and a desired/current lifecycle state pair. The scheduler owns
//! the durable copies; this crate models them and exposes the collaborator
//! seam the rolling updater drives.

mod client;
mod error;
mod state;
mod unit;

pub use client::{HttpScheduler, JobScheduler};
pub use error::SchedulerError;
pub use state::{JobState, MachineState, RuntimeState};
pub use unit::{
    check_minimum_requirements, mangle_unit_name, validate_name, validate_options, Unit, UnitFile,
    UnitNameInfo, UnitOption,
};
