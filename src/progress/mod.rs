//! Progress Broadcast Module
//!
//! One long-lived task multiplexes the progress listener and every connected worker
//! socket. It doubles as a timer: each iteration waits for readiness for at most
//! `POLL_TIMEOUT`, then pushes a `PROGRESS` line to all workers once
//! `BROADCAST_INTERVAL` has elapsed, then handles the ready socket.
//!
//! Workers may push `RESULT:<taskId>:<subId>:<result>` lines back over the same
//! connection; these are forwarded to the state store.
//!
//! Only one task is tracked at a time (`CurrentTask`). The dispatch engine moves it to
//! whichever task started most recently, so concurrent tasks overwrite each other's
//! broadcasts.

pub mod engine;
pub mod protocol;

#[cfg(test)]
mod tests;
