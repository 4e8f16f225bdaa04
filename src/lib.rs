//! IETF document lifecycle and ballot tracking.
//!
//! Documents move along several independent state axes. Every change is an
//! append-only event; the stored document is a cache of the latest ones.
//! [`Tracker`] is the entry point for all operations.

pub mod action_holders;
pub mod archive;
pub mod ballot;
pub mod clock;
pub mod error;
pub mod expiry;
pub mod model;
pub mod notify;
pub mod registry;
pub mod storage;
pub mod tags;
pub mod tracker;

#[cfg(test)]
mod testing;

pub use error::TrackerError;
pub use registry::Registry;
pub use storage::Storage;
pub use tracker::{Tracker, TransitionRequest, TransitionResult};
