//! Error types for loading and sending preset data.

use std::path::PathBuf;
use thiserror::Error;

/// Shown whenever the MIDI backend cannot be opened.
pub const CAPABILITY_HINT: &str = "Could not access MIDI devices. Please ensure a supported MIDI \
     backend is available (ALSA, CoreMIDI or WinMM) and that this program has permission to use it.";

/// Every failure the restore flow can report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RestoreError {
    /// MIDI access unsupported or denied. Terminal for this run.
    #[error("{hint} ({0})", hint = CAPABILITY_HINT)]
    Capability(String),

    /// Bundled asset could not be read.
    #[error("Error loading factory data from {}: {reason}", .path.display())]
    DeviceLoad { path: PathBuf, reason: String },

    /// User-supplied file could not be read.
    #[error("Error reading {}: {reason}", .path.display())]
    FileRead { path: PathBuf, reason: String },

    /// Send attempted without an endpoint and/or a payload.
    #[error("{0}")]
    Precondition(String),

    /// A chunk failed mid-transfer. Nothing is retried or resumed.
    #[error(
        "Error sending data to Korg M1 (chunk {chunk}, offset {offset}): {reason}. \
         Please check your connection and try again."
    )]
    Transmission {
        chunk: usize,
        offset: usize,
        reason: String,
    },

    /// The send was dropped before the last chunk went out.
    #[error("Transfer interrupted after {offset} bytes. Please restart the transfer.")]
    Interrupted { offset: usize },

    /// A second send was requested while one is in flight.
    #[error("A transfer is already in progress")]
    Busy,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl RestoreError {
    pub fn missing_selection() -> Self {
        RestoreError::Precondition(
            "No MIDI output device selected or no data loaded. \
             Please check your connections and try again."
                .to_string(),
        )
    }

    /// Whether the error ends the session (no in-app recovery).
    pub fn is_terminal(&self) -> bool {
        matches!(self, RestoreError::Capability(_))
    }
}

impl From<midir::InitError> for RestoreError {
    fn from(e: midir::InitError) -> Self {
        RestoreError::Capability(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RestoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transmission_message_wraps_reason() {
        let err = RestoreError::Transmission {
            chunk: 0,
            offset: 0,
            reason: "port closed".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("port closed"));
        assert!(msg.starts_with("Error sending data to Korg M1"));
    }

    #[test]
    fn test_capability_is_terminal() {
        assert!(RestoreError::Capability("denied".into()).is_terminal());
        assert!(!RestoreError::missing_selection().is_terminal());
        assert!(!RestoreError::Busy.is_terminal());
    }
}
