//! Weightfetch shared library: model catalog, configuration, progress
//! tracking and the transfer queue used by the `weightfetch` binary.

pub mod catalog;
pub mod config;
pub mod errors;
pub mod models;
pub mod progress;
pub mod task_queue;
