//! A marker on a canvas shared between processes.
//!
//! The writer owns the marker position and draws it into a POSIX shared memory canvas guarded
//! by a named semaphore, optionally taking its moves from a peer over TCP. The mirror copies
//! the canvas on a timer and finds the marker again from the raw pixels. The supervisor runs
//! one of each and stops both as soon as either exits.

pub mod canvas;
pub mod cli;
pub mod config;
pub mod detect;
pub mod error;
pub mod input;
pub mod link;
pub mod logging;
pub mod mirror;
pub mod mutex;
pub mod protocol;
pub mod shm;
pub mod snapshot;
pub mod store;
pub mod supervisor;
pub mod view;
pub mod writer;

pub use error::{Error, Result};
