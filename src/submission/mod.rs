//! Task Submission Module
//!
//! The reliable TCP entry point for originators.
//!
//! ## Per-connection flow
//! 1. Read one metadata line, e.g. `Name:Sum | Data:1,2,3 | SubTasks:3`.
//! 2. Create the task in the state store.
//! 3. Answer `TASK_ACCEPTED:<id>`.
//! 4. Run the dispatch engine for the new task on the same pooled job.
//!
//! The accept loop only accepts; every connection is handled on the shared
//! `WorkerPool`, so a slow originator never stalls later ones.

pub mod listener;
pub mod protocol;
