//! Example client for a JEVis energy-management system.
//!
//! Connects to the JEVis database as an application user, then runs a small
//! set of operations against it: list objects of a class, describe a class,
//! write the local disk capacity as a measurement and create a new object.

pub mod config;
pub mod disk;
pub mod report;
pub mod runner;
pub mod session;

pub use report::{Event, RecordingReporter, Reporter, Severity, TracingReporter};
pub use runner::{ClassDescription, ExampleRunner, OperationError, RunSummary};
pub use session::{Session, SessionError};
