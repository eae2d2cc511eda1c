//! `midir` backed MIDI platform

use anyhow::Context;
use midir::{MidiOutput, MidiOutputConnection, PortInfoError};
use tracing::{debug, info};

use super::{EndpointInfo, MidiPlatform, OutputSink};
use crate::error::{RestoreError, Result};

/// Enumerates and opens output ports through `midir`
#[derive(Debug, Clone)]
pub struct MidirPlatform {
    client_name: String,
}

impl MidirPlatform {
    /// The backend is opened on each listing, so a missing MIDI stack shows
    /// up as a `Capability` error from `output_endpoints`
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }

    fn midi_output(&self, suffix: &str) -> Result<MidiOutput> {
        Ok(MidiOutput::new(&format!("{}-{}", self.client_name, suffix))?)
    }
}

impl MidiPlatform for MidirPlatform {
    fn output_endpoints(&self) -> Result<Vec<EndpointInfo>> {
        let midi_out = self.midi_output("Scanner")?;

        let mut endpoints = Vec::new();
        for port in midi_out.ports() {
            endpoints.push(endpoint_for(port.id(), midi_out.port_name(&port)));
        }

        debug!("Found {} MIDI output ports", endpoints.len());
        Ok(endpoints)
    }

    fn open(&self, endpoint: &EndpointInfo) -> Result<Box<dyn OutputSink>> {
        let midi_out = self.midi_output("Output")?;

        let port = midi_out.find_port_by_id(endpoint.id.clone()).ok_or_else(|| {
            RestoreError::Precondition(format!(
                "MIDI output '{}' is no longer available. Please reconnect it and select it again.",
                endpoint.name
            ))
        })?;

        let connection = midi_out
            .connect(&port, &self.client_name)
            .map_err(|e| RestoreError::Transmission {
                chunk: 0,
                offset: 0,
                reason: format!("could not open '{}': {}", endpoint.name, e),
            })?;

        info!("Connected to output port: {}", endpoint.name);
        Ok(Box::new(MidirSink { connection }))
    }
}

/// Ports whose name cannot be read are still listed, under their id
fn endpoint_for(id: String, name: std::result::Result<String, PortInfoError>) -> EndpointInfo {
    match name {
        Ok(name) => EndpointInfo::new(id, name),
        Err(e) => {
            debug!("No name for MIDI output {}: {}", id, e);
            EndpointInfo::new(id.clone(), id)
        }
    }
}

/// Open output connection
pub struct MidirSink {
    connection: MidiOutputConnection,
}

impl OutputSink for MidirSink {
    fn send(&mut self, data: &[u8]) -> anyhow::Result<()> {
        self.connection
            .send(data)
            .context("MIDI output rejected the data")
    }
}
