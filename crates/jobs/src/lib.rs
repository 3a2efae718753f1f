//! vidlayer Jobs
//!
//! Asynchronous render jobs. The [`Orchestrator`] validates a request, records
//! it as `Pending`, and runs compile, command build, and engine execution in
//! its own Tokio task. Callers poll [`Orchestrator::status`] and
//! [`Orchestrator::result`], which only ever read the job table.

pub mod job;
pub mod orchestrator;

pub use job::*;
pub use orchestrator::*;
