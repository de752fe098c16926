//! Client side of the job protocol: submits a job, remembers it across
//! restarts, and polls the status endpoint until it resolves.

pub mod api;
pub mod poller;
pub mod session;
