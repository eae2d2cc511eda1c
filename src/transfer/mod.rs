//! Chunked SysEx transfer engine
//!
//! Sends a payload to an output endpoint in fixed-size chunks with a fixed
//! pause between them. The M1 has no flow control and a small receive
//! buffer, so the pause must not be shortened. Only one send may be in
//! flight; a second one is rejected.
//!
//! The engine also owns the coarse status (`waiting`, `ready`, `uploading`,
//! `success`, `error`) and converts every load or send failure into an
//! `error` status with a user-facing message.

pub mod session;


use parking_lot::RwLock;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, error, info, trace, warn};

use crate::config::TransferConfig;
use crate::device::{EndpointInfo, OutputSink};
use crate::error::{RestoreError, Result};
use crate::midi::format_hex_preview;
use crate::payload::{self, AssetSource, DataKind, Model, PresetPayload};

pub use session::{TransferReport, TransferSession, TransferStatus};

/// Type alias for status change callbacks
pub type StatusCallback = Arc<dyn Fn(&TransferStatus) + Send + Sync>;

/// Destination of a send: the selected endpoint and its opened sink
pub struct SendTarget<'a> {
    pub endpoint: &'a EndpointInfo,
    pub sink: &'a mut dyn OutputSink,
}

/// Chunking, pacing and status reporting for one endpoint at a time
pub struct TransferEngine {
    config: TransferConfig,
    session: RwLock<TransferSession>,
    in_flight: AtomicBool,
    status_callbacks: RwLock<Vec<StatusCallback>>,
}

/// Releases the in-flight flag; marks an abandoned upload as interrupted
struct InFlightGuard<'a> {
    engine: &'a TransferEngine,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let offset = {
            let session = self.engine.session.read();
            session.status.is_uploading().then_some(session.cursor)
        };
        if let Some(offset) = offset {
            warn!("Transfer dropped while uploading at offset {}", offset);
            self.engine.fail(RestoreError::Interrupted { offset });
        }
        self.engine.in_flight.store(false, Ordering::Release);
    }
}

impl TransferEngine {
    pub fn new(config: TransferConfig) -> Self {
        Self {
            config,
            session: RwLock::new(TransferSession::default()),
            in_flight: AtomicBool::new(false),
            status_callbacks: RwLock::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn status(&self) -> TransferStatus {
        self.session.read().status.clone()
    }

    /// Snapshot of the current (or last) session
    pub fn session(&self) -> TransferSession {
        self.session.read().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Subscribe to status transitions
    pub fn subscribe_status(&self, callback: StatusCallback) {
        self.status_callbacks.write().push(callback);
    }

    fn emit_status(&self, status: &TransferStatus) {
        for callback in self.status_callbacks.read().iter() {
            callback(status);
        }
    }

    /// Apply `update` to the session and emit the status if it changed
    fn update_session(&self, update: impl FnOnce(&mut TransferSession)) {
        let changed = {
            let mut session = self.session.write();
            let before = session.status.clone();
            update(&mut session);
            (session.status != before).then(|| session.status.clone())
        };
        if let Some(status) = changed {
            debug!("Transfer status -> {}", status);
            self.emit_status(&status);
        }
    }

    /// Record `err` and switch to the `error` status
    pub fn fail(&self, err: RestoreError) {
        error!("{}", err);
        self.update_session(|session| {
            session.status = TransferStatus::Error(err.to_string());
            session.last_error = Some(err);
        });
    }

    /// Report a load failure unless a transfer is running
    fn fail_load(&self, err: RestoreError) {
        if self.is_busy() {
            warn!("Load failed during transfer: {}", err);
        } else {
            self.fail(err);
        }
    }

    /// A payload was loaded: `ready`, unless a transfer is in flight or
    /// MIDI is unusable for this run
    pub fn payload_loaded(&self, payload: &PresetPayload) {
        info!(
            "Loaded {} ({} bytes, {} chunks)",
            payload.origin(),
            payload.len(),
            payload.chunk_count(self.config.chunk_size)
        );

        let sysex = payload.summary();
        if !payload.is_empty() && !sysex.looks_like_korg_dump() {
            warn!(
                "{} does not look like a Korg SysEx dump ({} frames, {} Korg, {} stray bytes{}); sending it as-is",
                payload.origin(),
                sysex.frames,
                sysex.korg_frames,
                sysex.stray_bytes,
                if sysex.truncated { ", unterminated" } else { "" }
            );
        }

        if self.is_busy() {
            return;
        }
        self.update_session(|session| {
            if session.last_error.as_ref().is_some_and(RestoreError::is_terminal) {
                return;
            }
            session.status = TransferStatus::Ready;
            session.last_error = None;
        });
    }

    /// An endpoint was selected: clears a recoverable error
    pub fn endpoint_selected(&self, payload_loaded: bool) {
        if self.is_busy() {
            return;
        }
        self.update_session(|session| {
            let terminal = session.last_error.as_ref().is_some_and(RestoreError::is_terminal);
            if session.status.is_error() && !terminal {
                session.status = if payload_loaded {
                    TransferStatus::Ready
                } else {
                    TransferStatus::Waiting
                };
                session.last_error = None;
            }
        });
    }

    /// Load a bundled dump, reporting `ready` or `error`
    pub async fn load_bundled(
        &self,
        source: &dyn AssetSource,
        model: Model,
        kind: DataKind,
    ) -> Result<PresetPayload> {
        match payload::load_bundled(source, model, kind).await {
            Ok(payload) => {
                self.payload_loaded(&payload);
                Ok(payload)
            }
            Err(e) => {
                self.fail_load(e.clone());
                Err(e)
            }
        }
    }

    /// Take a user file's raw bytes as the payload. Never fails.
    pub fn load_user_bytes(&self, name: impl Into<String>, raw: Vec<u8>) -> PresetPayload {
        let payload = PresetPayload::from_user_bytes(name, raw);
        self.payload_loaded(&payload);
        payload
    }

    /// Read a user file completely and take it as the payload
    pub async fn load_user_file(&self, path: &Path) -> Result<PresetPayload> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) => {
                let err = RestoreError::FileRead {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                };
                self.fail_load(err.clone());
                return Err(err);
            }
        };

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(self.load_user_bytes(name, raw))
    }

    fn acquire(&self) -> Result<InFlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| RestoreError::Busy)?;
        Ok(InFlightGuard { engine: self })
    }

    /// Send `payload` to `target` in paced chunks.
    ///
    /// Fails fast, without entering `uploading`, when either is missing.
    /// The first chunk that cannot be dispatched aborts the transfer; the
    /// remaining chunks are never sent and nothing is retried.
    pub async fn send(
        &self,
        target: Option<SendTarget<'_>>,
        payload: Option<&PresetPayload>,
    ) -> Result<TransferReport> {
        let _guard = self.acquire().inspect_err(|_| {
            warn!("Send rejected: a transfer is already in progress");
        })?;

        let (mut target, payload) = match (target, payload) {
            (Some(target), Some(payload)) => (target, payload),
            _ => {
                let err = RestoreError::missing_selection();
                self.fail(err.clone());
                return Err(err);
            }
        };

        let chunk_size = self.config.chunk_size.max(1);
        let delay = self.config.chunk_delay();
        let total_chunks = payload.chunk_count(chunk_size);
        let started = Instant::now();

        info!(
            "Sending {} bytes to {} ({} chunks of {} bytes, {:?} apart)",
            payload.len(),
            target.endpoint.name,
            total_chunks,
            chunk_size,
            delay
        );

        let empty = payload.is_empty();
        self.update_session(|session| {
            *session = TransferSession {
                status: if empty {
                    TransferStatus::Success
                } else {
                    TransferStatus::Uploading
                },
                endpoint: Some(target.endpoint.clone()),
                payload: Some(payload.clone()),
                ..TransferSession::default()
            };
        });

        let mut offset = 0;
        for (index, chunk) in payload.chunks(chunk_size).enumerate() {
            if let Err(e) = target.sink.send(chunk) {
                let err = RestoreError::Transmission {
                    chunk: index,
                    offset,
                    reason: format!("{:#}", e),
                };
                self.fail(err.clone());
                return Err(err);
            }

            offset += chunk.len();
            trace!(
                "Chunk {}/{} sent: {}",
                index + 1,
                total_chunks,
                format_hex_preview(chunk, 8)
            );

            let done = offset == payload.len();
            self.update_session(|session| {
                session.cursor = offset;
                session.chunks_sent = index + 1;
                if done {
                    session.status = TransferStatus::Success;
                }
            });

            if !done {
                sleep(delay).await;
            }
        }

        let report = TransferReport {
            endpoint: target.endpoint.name.clone(),
            bytes: payload.len(),
            chunks: total_chunks,
            elapsed: started.elapsed(),
        };
        info!("Transfer complete: {}", report);
        Ok(report)
    }
}
