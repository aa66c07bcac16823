//! Split-and-Dispatch Module
//!
//! Turns one accepted task into sub-tasks and pushes each to a registered worker.
//!
//! ## Flow of `process_task`
//! 1. **Snapshot**: read the worker list once; abort if it is empty.
//! 2. **Split**: `min(requested, workers)` labeled partitions of the payload.
//! 3. **Announce**: multicast the full task config, then pause for a short grace period.
//!    This orders the announcement before dispatch on the sending side only; receivers
//!    never acknowledge it.
//! 4. **Fan out**: assign partition `i` to worker `i mod workers`, record the assignment
//!    and submit a dispatch job to the shared `WorkerPool`.
//!
//! `process_task` returns once every job is submitted. Each job opens its own connection,
//! sends one `TASK` line and waits for one acknowledgment line. Failures are logged per
//! sub-task and never retried; the assignment stays pending until the worker reports
//! completion.
//!
//! ## Submodules
//! - **`engine`**: `DispatchEngine` and the per-sub-task dispatch call.
//! - **`pool`**: Bounded pool shared with the submission listener.
//! - **`protocol`**: Partition labels and the `TASK` / `ACK` line format.
//! - **`types`**: Assignments, tickets and error types.

pub mod engine;
pub mod pool;
pub mod protocol;
pub mod types;
