//! Transfer status and per-attempt session state

use std::fmt;
use std::time::Duration;

use crate::device::EndpointInfo;
use crate::error::RestoreError;
use crate::payload::PresetPayload;

/// Coarse status of the restore flow
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransferStatus {
    /// Nothing loaded yet
    #[default]
    Waiting,
    /// Payload loaded, ready to send
    Ready,
    /// Chunks are going out
    Uploading,
    /// Every chunk was dispatched
    Success,
    /// Something failed; the message is meant for the user
    Error(String),
}

impl TransferStatus {
    pub fn is_uploading(&self) -> bool {
        matches!(self, TransferStatus::Uploading)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, TransferStatus::Error(_))
    }

    pub fn title(&self) -> &'static str {
        match self {
            TransferStatus::Waiting => "Ready to Update",
            TransferStatus::Ready => "Data Loaded",
            TransferStatus::Uploading => "Uploading Presets",
            TransferStatus::Success => "Update Complete",
            TransferStatus::Error(_) => "Error",
        }
    }

    pub fn description(&self) -> &str {
        match self {
            TransferStatus::Waiting => {
                "Ensure your Korg M1 is connected via MIDI and powered on before proceeding."
            }
            TransferStatus::Ready => "Select an output and send the data to your M1.",
            TransferStatus::Uploading => {
                "Please wait while the data is being uploaded to your Korg M1..."
            }
            TransferStatus::Success => {
                "Data has been successfully sent to your Korg M1. The M1 restarts when the dump is complete."
            }
            TransferStatus::Error(message) => message.as_str(),
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStatus::Waiting => f.write_str("waiting"),
            TransferStatus::Ready => f.write_str("ready"),
            TransferStatus::Uploading => f.write_str("uploading"),
            TransferStatus::Success => f.write_str("success"),
            TransferStatus::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// State of one send attempt.
///
/// While `status` is `Uploading`, `cursor < payload.len()`.
#[derive(Debug, Clone, Default)]
pub struct TransferSession {
    pub status: TransferStatus,
    pub endpoint: Option<EndpointInfo>,
    pub payload: Option<PresetPayload>,
    /// Bytes already dispatched
    pub cursor: usize,
    pub chunks_sent: usize,
    pub last_error: Option<RestoreError>,
}

impl TransferSession {
    pub fn payload_len(&self) -> usize {
        self.payload.as_ref().map_or(0, PresetPayload::len)
    }

    /// Fraction of the payload dispatched, 0.0..=1.0
    pub fn progress(&self) -> f32 {
        match self.payload_len() {
            0 => 0.0,
            len => self.cursor as f32 / len as f32,
        }
    }
}

/// Outcome of a completed send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub endpoint: String,
    pub bytes: usize,
    pub chunks: usize,
    pub elapsed: Duration,
}

impl fmt::Display for TransferReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes in {} chunks to {} ({:.1}s)",
            self.bytes,
            self.chunks,
            self.endpoint,
            self.elapsed.as_secs_f32()
        )
    }
}
