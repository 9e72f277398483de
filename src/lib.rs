//! SSH host health monitoring service.
//!
//! Polls remote Linux hosts over pooled SSH sessions for CPU, memory,
//! uptime and disk usage, and exposes the samples through a small HTTP
//! API together with a ping-based reachability check.

pub mod monitor;
