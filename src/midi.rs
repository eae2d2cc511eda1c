//! MIDI utilities
//!
//! Hex formatting for logs and a quick look at the SysEx framing of a payload.
//! Nothing here gates a transfer: payloads are sent exactly as loaded.

/// Start of System Exclusive
pub const SYSEX_START: u8 = 0xF0;

/// End of System Exclusive
pub const SYSEX_END: u8 = 0xF7;

/// Korg manufacturer ID
pub const KORG_ID: u8 = 0x42;

/// Framing overview of a raw SysEx dump
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SysexSummary {
    /// Complete F0..F7 frames
    pub frames: usize,
    /// Frames whose manufacturer byte is Korg's
    pub korg_frames: usize,
    /// Bytes outside of any frame
    pub stray_bytes: usize,
    /// The dump ends inside an open frame
    pub truncated: bool,
}

impl SysexSummary {
    /// Scan a byte buffer for SysEx frames
    pub fn scan(data: &[u8]) -> Self {
        let mut summary = Self::default();
        let mut frame_start: Option<usize> = None;

        for (i, &byte) in data.iter().enumerate() {
            match (byte, frame_start) {
                (SYSEX_START, _) => {
                    // A new F0 inside an open frame abandons the old one
                    frame_start = Some(i);
                }
                (SYSEX_END, Some(start)) => {
                    summary.frames += 1;
                    if data.get(start + 1) == Some(&KORG_ID) {
                        summary.korg_frames += 1;
                    }
                    frame_start = None;
                }
                (_, None) => summary.stray_bytes += 1,
                _ => {}
            }
        }

        summary.truncated = frame_start.is_some();
        summary
    }

    pub fn looks_like_korg_dump(&self) -> bool {
        self.frames > 0 && self.korg_frames == self.frames && !self.truncated
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format at most `max` leading bytes, marking the cut
pub fn format_hex_preview(data: &[u8], max: usize) -> String {
    if data.len() <= max {
        format_hex(data)
    } else {
        format!("{} .. (+{} bytes)", format_hex(&data[..max]), data.len() - max)
    }
}
