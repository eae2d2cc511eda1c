//! Test doubles for the MIDI platform and output sinks

use anyhow::anyhow;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

use crate::device::{EndpointInfo, MidiPlatform, OutputSink};
use crate::error::{RestoreError, Result};

/// Chunks written to a sink, with the time each arrived
#[derive(Debug, Default)]
pub struct SendLog {
    pub chunks: Vec<(Instant, Vec<u8>)>,
    pub attempts: usize,
}

impl SendLog {
    pub fn sizes(&self) -> Vec<usize> {
        self.chunks.iter().map(|(_, c)| c.len()).collect()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.chunks.iter().flat_map(|(_, c)| c.iter().copied()).collect()
    }
}

/// Sink that records every chunk and optionally fails on the nth attempt
pub struct RecordingSink {
    log: Arc<Mutex<SendLog>>,
    fail_on: Option<usize>,
}

impl RecordingSink {
    pub fn new() -> (Self, Arc<Mutex<SendLog>>) {
        let log = Arc::new(Mutex::new(SendLog::default()));
        (
            Self {
                log: log.clone(),
                fail_on: None,
            },
            log,
        )
    }

    /// Fail the `attempt`th send (0-based)
    pub fn failing_at(attempt: usize) -> (Self, Arc<Mutex<SendLog>>) {
        let (mut sink, log) = Self::new();
        sink.fail_on = Some(attempt);
        (sink, log)
    }
}

impl OutputSink for RecordingSink {
    fn send(&mut self, data: &[u8]) -> anyhow::Result<()> {
        let mut log = self.log.lock();
        let attempt = log.attempts;
        log.attempts += 1;

        if self.fail_on == Some(attempt) {
            return Err(anyhow!("device unplugged"));
        }

        log.chunks.push((Instant::now(), data.to_vec()));
        Ok(())
    }
}

/// In-memory platform whose port list tests can change at will
pub struct FakePlatform {
    ports: Mutex<Vec<EndpointInfo>>,
    available: bool,
    pub log: Arc<Mutex<SendLog>>,
}

impl FakePlatform {
    pub fn with_ports(ports: &[(&str, &str)]) -> Self {
        Self {
            ports: Mutex::new(Self::endpoints(ports)),
            available: true,
            log: Arc::new(Mutex::new(SendLog::default())),
        }
    }

    /// Platform whose MIDI backend cannot be opened
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::with_ports(&[])
        }
    }

    pub fn set_ports(&self, ports: &[(&str, &str)]) {
        *self.ports.lock() = Self::endpoints(ports);
    }

    fn endpoints(ports: &[(&str, &str)]) -> Vec<EndpointInfo> {
        ports
            .iter()
            .map(|(id, name)| EndpointInfo::new(*id, *name))
            .collect()
    }
}

impl MidiPlatform for FakePlatform {
    fn output_endpoints(&self) -> Result<Vec<EndpointInfo>> {
        if !self.available {
            return Err(RestoreError::Capability("no MIDI backend".to_string()));
        }
        Ok(self.ports.lock().clone())
    }

    fn open(&self, endpoint: &EndpointInfo) -> Result<Box<dyn OutputSink>> {
        if !self.ports.lock().iter().any(|p| p.id == endpoint.id) {
            return Err(RestoreError::Precondition(format!(
                "MIDI output '{}' is no longer available",
                endpoint.name
            )));
        }
        Ok(Box::new(RecordingSink {
            log: self.log.clone(),
            fail_on: None,
        }))
    }
}
