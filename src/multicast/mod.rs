//! Task Config Multicast Module
//!
//! Announces each task's split configuration to every worker that joined the multicast
//! group, ahead of point-to-point dispatch. Sending is advisory: a failed datagram is
//! reported to the caller as `false` and never interrupts dispatch.

pub mod multicaster;
