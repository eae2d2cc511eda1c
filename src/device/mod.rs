//! MIDI output endpoints and the device registry
//!
//! The registry holds whatever the platform reports right now. A selection
//! is kept by endpoint id only, and is dropped as soon as that id disappears
//! from a refreshed set, so nothing is ever sent to a port that went away.

pub mod midir_platform;
pub mod watcher;

use std::collections::HashSet;
use std::fmt;

use crate::error::Result;

pub use midir_platform::MidirPlatform;
pub use watcher::{DeviceChange, DeviceWatcher};

/// Liveness of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Connected,
    Disconnected,
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortState::Connected => f.write_str("connected"),
            PortState::Disconnected => f.write_str("disconnected"),
        }
    }
}

/// Descriptor of a MIDI output port. Holds no platform handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    pub id: String,
    pub name: String,
    pub manufacturer: Option<String>,
    pub state: PortState,
}

impl EndpointInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            manufacturer: None,
            state: PortState::Connected,
        }
    }
}

impl fmt::Display for EndpointInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.name,
            self.manufacturer.as_deref().unwrap_or("Unknown manufacturer")
        )
    }
}

/// Currently available output endpoints, in platform enumeration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointSet {
    endpoints: Vec<EndpointInfo>,
}

impl EndpointSet {
    pub fn iter(&self) -> impl Iterator<Item = &EndpointInfo> {
        self.endpoints.iter()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.endpoints.iter().any(|e| e.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&EndpointInfo> {
        self.endpoints.iter().find(|e| e.id == id)
    }

    /// Resolve a user query: exact id, then list index, then
    /// case-insensitive name substring.
    pub fn find(&self, query: &str) -> Option<&EndpointInfo> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }

        if let Some(endpoint) = self.get(query) {
            return Some(endpoint);
        }

        if let Ok(index) = query.parse::<usize>() {
            if let Some(endpoint) = self.endpoints.get(index) {
                return Some(endpoint);
            }
        }

        let pattern = query.to_lowercase();
        self.endpoints
            .iter()
            .find(|e| e.name.to_lowercase().contains(&pattern))
    }

    /// Endpoints added and removed relative to `previous`, by id
    pub fn diff(&self, previous: &EndpointSet) -> (Vec<EndpointInfo>, Vec<EndpointInfo>) {
        let old_ids: HashSet<&str> = previous.iter().map(|e| e.id.as_str()).collect();
        let new_ids: HashSet<&str> = self.iter().map(|e| e.id.as_str()).collect();

        let added = self
            .iter()
            .filter(|e| !old_ids.contains(e.id.as_str()))
            .cloned()
            .collect();
        let removed = previous
            .iter()
            .filter(|e| !new_ids.contains(e.id.as_str()))
            .map(|e| EndpointInfo {
                state: PortState::Disconnected,
                ..e.clone()
            })
            .collect();

        (added, removed)
    }
}

/// Replace the known set with exactly what the platform reported
pub fn refresh(raw: Vec<EndpointInfo>) -> EndpointSet {
    EndpointSet { endpoints: raw }
}

/// Keep `current` only if its id is still present in `set`
pub fn reconcile_selection(
    current: Option<EndpointInfo>,
    set: &EndpointSet,
) -> Option<EndpointInfo> {
    current.filter(|selected| set.contains_id(&selected.id))
}

/// Byte-sequence send primitive of an opened endpoint
pub trait OutputSink {
    fn send(&mut self, data: &[u8]) -> anyhow::Result<()>;
}

/// Host MIDI capability: enumerate output ports and open one
pub trait MidiPlatform: Send + Sync {
    /// Output ports available at this instant
    fn output_endpoints(&self) -> Result<Vec<EndpointInfo>>;

    /// Open a connection to `endpoint` for sending
    fn open(&self, endpoint: &EndpointInfo) -> Result<Box<dyn OutputSink>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(id: &str, name: &str) -> EndpointInfo {
        EndpointInfo::new(id, name)
    }

    #[test]
    fn test_refresh_keeps_everything() {
        let set = refresh(vec![
            endpoint("a", "UM-ONE"),
            endpoint("b", "Midi Through Port-0"),
        ]);
        assert_eq!(set.len(), 2);
        assert!(set.contains_id("b"));
    }

    #[test]
    fn test_selection_dropped_when_port_disappears() {
        let selected = Some(endpoint("a", "UM-ONE"));
        let set = refresh(vec![endpoint("b", "Midi Through Port-0")]);
        assert_eq!(reconcile_selection(selected, &set), None);
    }

    #[test]
    fn test_selection_kept_when_port_present() {
        let selected = Some(endpoint("a", "UM-ONE"));
        let set = refresh(vec![endpoint("b", "Other"), endpoint("a", "UM-ONE")]);
        assert_eq!(reconcile_selection(selected.clone(), &set), selected);
    }

    #[test]
    fn test_no_selection_stays_none() {
        let set = refresh(vec![endpoint("a", "UM-ONE")]);
        assert_eq!(reconcile_selection(None, &set), None);
    }

    #[test]
    fn test_find_by_id_index_and_name() {
        let set = refresh(vec![
            endpoint("hw:1,0,0", "Midi Through Port-0"),
            endpoint("hw:2,0,0", "UM-ONE MIDI 1"),
        ]);

        assert_eq!(set.find("hw:2,0,0").map(|e| e.name.as_str()), Some("UM-ONE MIDI 1"));
        assert_eq!(set.find("0").map(|e| e.id.as_str()), Some("hw:1,0,0"));
        assert_eq!(set.find("um-one").map(|e| e.id.as_str()), Some("hw:2,0,0"));
        assert!(set.find("korg").is_none());
        assert!(set.find("  ").is_none());
    }

    #[test]
    fn test_diff_reports_added_and_removed() {
        let old = refresh(vec![endpoint("a", "A"), endpoint("b", "B")]);
        let new = refresh(vec![endpoint("b", "B"), endpoint("c", "C")]);

        let (added, removed) = new.diff(&old);
        assert_eq!(added.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), vec!["c"]);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, "a");
        assert_eq!(removed[0].state, PortState::Disconnected);
    }

    #[test]
    fn test_display_without_manufacturer() {
        assert_eq!(endpoint("a", "UM-ONE").to_string(), "UM-ONE (Unknown manufacturer)");
    }
}
