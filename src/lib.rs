//! Distributed Task Broker Library
//!
//! Accepts tasks from originators, splits them into sub-tasks and pushes those to a
//! dynamically registering pool of workers. The binary (`main.rs`) only parses the
//! configuration, installs logging and serves the HTTP API around `broker::Broker`.
//!
//! ## Architecture Modules
//! Five network engines share one state store:
//!
//! - **`state`**: The shared worker/task/assignment store plus the JSON status and
//!   completion API over it.
//! - **`registration`**: UDP `REGISTER` / `HEARTBEAT` listener that populates the worker
//!   registry.
//! - **`submission`**: TCP listener taking one task line per connection, answering with
//!   the assigned id and handing the task to dispatch.
//! - **`dispatch`**: Split-and-dispatch engine with round-robin assignment over a bounded
//!   worker pool.
//! - **`multicast`**: Best-effort UDP multicast of each task's full configuration before
//!   its sub-tasks go out.
//! - **`progress`**: Single-task readiness loop pushing progress lines to connected
//!   workers every two seconds and ingesting their `RESULT` reports.
//!
//! `broker` assembles them; `config` holds every tunable.

pub mod broker;
pub mod config;
pub mod dispatch;
pub mod multicast;
pub mod progress;
pub mod registration;
pub mod state;
pub mod submission;
