//! Wiring for the alarm monitor daemon: configuration, the recurring poll
//! scheduler, and the administrative CLI operations.

pub mod admin;
pub mod config;
pub mod poll;
pub mod seed;
