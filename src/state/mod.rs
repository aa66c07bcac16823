//! Broker State Module
//!
//! The single in-memory view of workers and tasks shared by every network engine.
//!
//! ## Core Concepts
//! - **Workers**: Registered over UDP, keyed by `address:port`, never removed.
//! - **Tasks**: Created on submission with a clamped sub-task count; completion is
//!   tracked with an atomic counter plus a per-sub-task result map.
//! - **Assignments**: Per-worker set of pending `taskId-subTaskId` keys. Worker status
//!   (IDLE / ACTIVE / BUSY) is always derived from the size of this set.
//!
//! All operations take `&self` and are safe to call from any task concurrently.
//! Nothing here performs I/O.
//!
//! ## Submodules
//! - **`store`**: The `StateStore` itself.
//! - **`types`**: Worker/task records and read-only snapshot DTOs.
//! - **`handlers`**: Axum handlers exposing snapshots, the completion endpoint and
//!   validated task submission.
//! - **`protocol`**: HTTP endpoint paths and request/response bodies.

pub mod handlers;
pub mod protocol;
pub mod store;
pub mod types;
