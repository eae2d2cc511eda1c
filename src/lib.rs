//! M1 Restore
//!
//! Restores factory sounds and demo sequences to a Korg M1 / M1ex over MIDI
//! System Exclusive, sending the dump in paced chunks the instrument can keep
//! up with.

pub mod app;
pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod midi;
pub mod payload;
pub mod transfer;

#[cfg(test)]
mod testing;

pub use app::RestoreSession;
pub use error::{RestoreError, Result};
