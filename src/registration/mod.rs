//! Worker Registration Module
//!
//! Connectionless registration and heartbeat handling over UDP.
//!
//! Workers announce the TCP port they accept sub-tasks on with `REGISTER:<port>`; the
//! broker records `sender_ip:port` in the state store and answers `REGISTERED`.
//! `HEARTBEAT` is answered with `ACK` and changes nothing: heartbeats do not expire
//! workers.

pub mod listener;
pub mod protocol;
