//! Restore session: selection state around the transfer engine
//!
//! Tracks the available outputs, the selected output and model, and the
//! loaded payload (whose origin names the data kind), and routes user
//! actions to the engine.

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::TransferConfig;
use crate::device::{reconcile_selection, refresh, DeviceChange, EndpointInfo, EndpointSet, MidiPlatform};
use crate::error::{RestoreError, Result};
use crate::payload::{AssetSource, DataKind, Model, PresetPayload};
use crate::transfer::{SendTarget, TransferEngine, TransferReport};

pub struct RestoreSession {
    platform: Arc<dyn MidiPlatform>,
    assets: Arc<dyn AssetSource>,
    engine: TransferEngine,
    endpoints: EndpointSet,
    selected: Option<EndpointInfo>,
    model: Option<Model>,
    payload: Option<PresetPayload>,
}

impl RestoreSession {
    /// Create the session and take the initial output listing. When MIDI is
    /// unusable the engine is left in a terminal `error` status.
    pub fn new(
        platform: Arc<dyn MidiPlatform>,
        assets: Arc<dyn AssetSource>,
        transfer: TransferConfig,
    ) -> Self {
        let mut session = Self {
            platform,
            assets,
            engine: TransferEngine::new(transfer),
            endpoints: EndpointSet::default(),
            selected: None,
            model: None,
            payload: None,
        };

        match session.platform.output_endpoints() {
            Ok(raw) => {
                session.set_endpoints(refresh(raw));
            }
            Err(e) => session.engine.fail(e),
        }
        session
    }

    pub fn engine(&self) -> &TransferEngine {
        &self.engine
    }

    pub fn endpoints(&self) -> &EndpointSet {
        &self.endpoints
    }

    pub fn selected(&self) -> Option<&EndpointInfo> {
        self.selected.as_ref()
    }

    pub fn model(&self) -> Option<Model> {
        self.model
    }

    pub fn payload(&self) -> Option<&PresetPayload> {
        self.payload.as_ref()
    }

    /// MIDI access failed for this run
    pub fn capability_error(&self) -> Option<RestoreError> {
        self.engine
            .session()
            .last_error
            .filter(RestoreError::is_terminal)
    }

    /// Replace the endpoint set and drop a selection that disappeared.
    /// Returns the endpoint that was deselected, if any.
    pub fn set_endpoints(&mut self, set: EndpointSet) -> Option<EndpointInfo> {
        let previous = self.selected.take();
        self.selected = reconcile_selection(previous.clone(), &set);
        self.endpoints = set;

        match (previous, &self.selected) {
            (Some(lost), None) => {
                warn!("Selected MIDI output '{}' is no longer available", lost.name);
                Some(lost)
            }
            _ => None,
        }
    }

    pub fn apply_device_change(&mut self, change: DeviceChange) -> Option<EndpointInfo> {
        self.set_endpoints(change.set)
    }

    /// Select an output by id, index or name substring
    pub fn select_endpoint(&mut self, query: &str) -> Result<&EndpointInfo> {
        let endpoint = self.endpoints.find(query).cloned().ok_or_else(|| {
            RestoreError::Precondition(format!(
                "No MIDI output matches '{}'. Use 'ports' to list the available devices.",
                query
            ))
        })?;

        info!("Selected MIDI output: {}", endpoint);
        self.engine.endpoint_selected(self.payload.is_some());
        Ok(&*self.selected.insert(endpoint))
    }

    pub fn select_model(&mut self, model: Model) {
        info!("Selected model: {}", model);
        self.model = Some(model);
    }

    /// Load the bundled dump of `kind` for the selected model
    pub async fn load_bundled(&mut self, kind: DataKind) -> Result<&PresetPayload> {
        let Some(model) = self.model else {
            let err = RestoreError::Precondition(
                "Select your M1 model before choosing the data to restore.".to_string(),
            );
            self.engine.fail(err.clone());
            return Err(err);
        };

        let payload = self
            .engine
            .load_bundled(self.assets.as_ref(), model, kind)
            .await?;
        Ok(&*self.payload.insert(payload))
    }

    /// Load any file as the payload
    pub async fn load_file(&mut self, path: &Path) -> Result<&PresetPayload> {
        let payload = self.engine.load_user_file(path).await?;
        Ok(&*self.payload.insert(payload))
    }

    /// Take raw bytes as the payload
    pub fn load_bytes(&mut self, name: &str, raw: Vec<u8>) -> &PresetPayload {
        let payload = self.engine.load_user_bytes(name, raw);
        &*self.payload.insert(payload)
    }

    /// Send the loaded payload to the selected output
    pub async fn send(&self) -> Result<TransferReport> {
        let (Some(endpoint), Some(payload)) = (self.selected.as_ref(), self.payload.as_ref()) else {
            return self.engine.send(None, self.payload.as_ref()).await;
        };

        if self.engine.is_busy() {
            return Err(RestoreError::Busy);
        }

        let mut sink = match self.platform.open(endpoint) {
            Ok(sink) => sink,
            Err(e) => {
                self.engine.fail(e.clone());
                return Err(e);
            }
        };

        self.engine
            .send(
                Some(SendTarget {
                    endpoint,
                    sink: sink.as_mut(),
                }),
                Some(payload),
            )
            .await
    }

    /// Status lines: device, model, payload, status
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        let device = self
            .selected
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "none selected".to_string());

        let model = self
            .model
            .map(|m| m.display_name().to_string())
            .unwrap_or_else(|| "none selected".to_string());

        let data = match &self.payload {
            Some(payload) => {
                let sysex = payload.summary();
                format!(
                    "{}, {} bytes, {} chunks, {} SysEx frames ({} Korg){}",
                    payload.origin(),
                    payload.len(),
                    payload.chunk_count(self.engine.config().chunk_size),
                    sysex.frames,
                    sysex.korg_frames,
                    if sysex.truncated { " (last frame unterminated)" } else { "" }
                )
            }
            None => "nothing loaded".to_string(),
        };

        let session = self.engine.session();
        let mut status = session.status.to_string();
        if session.status.is_uploading() {
            status = format!("{} ({:.0}%)", status, session.progress() * 100.0);
        }

        vec![
            ("Device", device),
            ("Model", model),
            ("Data", data),
            ("Status", status),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::DirAssetSource;
    use crate::testing::FakePlatform;
    use crate::transfer::TransferStatus;
    use tempfile::TempDir;

    fn fast_config() -> TransferConfig {
        TransferConfig {
            chunk_size: 256,
            chunk_delay_ms: 1,
        }
    }

    fn session_with(platform: Arc<FakePlatform>, assets: &Path) -> RestoreSession {
        RestoreSession::new(platform, Arc::new(DirAssetSource::new(assets)), fast_config())
    }

    fn write_asset(root: &Path, model: Model, kind: DataKind, data: &[u8]) {
        let path = root.join(crate::payload::asset_path(model, kind));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }

    #[tokio::test]
    async fn test_full_restore_flow() {
        let temp_dir = TempDir::new().unwrap();
        write_asset(temp_dir.path(), Model::M1, DataKind::Sounds, &[0x11; 700]);

        let platform = Arc::new(FakePlatform::with_ports(&[("a", "Through"), ("b", "UM-ONE")]));
        let mut session = session_with(platform.clone(), temp_dir.path());

        session.select_endpoint("um-one").unwrap();
        session.select_model(Model::M1);
        session.load_bundled(DataKind::Sounds).await.unwrap();
        assert_eq!(session.engine().status(), TransferStatus::Ready);

        let report = session.send().await.unwrap();
        assert_eq!(report.chunks, 3);
        assert_eq!(report.endpoint, "UM-ONE");
        assert_eq!(platform.log.lock().sizes(), vec![256, 256, 188]);
        assert_eq!(session.engine().status(), TransferStatus::Success);
    }

    #[tokio::test]
    async fn test_send_with_nothing_loaded() {
        let temp_dir = TempDir::new().unwrap();
        let platform = Arc::new(FakePlatform::with_ports(&[("a", "UM-ONE")]));
        let mut session = session_with(platform.clone(), temp_dir.path());
        session.select_endpoint("0").unwrap();

        let err = session.send().await.unwrap_err();
        assert!(matches!(err, RestoreError::Precondition(_)));
        assert_eq!(platform.log.lock().attempts, 0);
        assert!(session.engine().status().is_error());
    }

    #[tokio::test]
    async fn test_unplugged_selection_is_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let platform = Arc::new(FakePlatform::with_ports(&[("a", "UM-ONE"), ("b", "Through")]));
        let mut session = session_with(platform.clone(), temp_dir.path());
        session.select_endpoint("a").unwrap();
        session.load_bytes("dump.syx", vec![0xF0, 0x42, 0xF7]);

        platform.set_ports(&[("b", "Through")]);
        let lost = session.set_endpoints(refresh(platform.output_endpoints().unwrap()));

        assert_eq!(lost.map(|e| e.id), Some("a".to_string()));
        assert!(session.selected().is_none());
        assert!(matches!(
            session.send().await.unwrap_err(),
            RestoreError::Precondition(_)
        ));
    }

    #[tokio::test]
    async fn test_bundled_load_requires_model() {
        let temp_dir = TempDir::new().unwrap();
        let platform = Arc::new(FakePlatform::with_ports(&[]));
        let mut session = session_with(platform, temp_dir.path());

        let err = session.load_bundled(DataKind::Sequences).await.unwrap_err();
        assert!(matches!(err, RestoreError::Precondition(_)));
        assert!(session.payload().is_none());
    }

    #[tokio::test]
    async fn test_missing_asset_keeps_previous_payload() {
        let temp_dir = TempDir::new().unwrap();
        let platform = Arc::new(FakePlatform::with_ports(&[("a", "UM-ONE")]));
        let mut session = session_with(platform, temp_dir.path());
        session.load_bytes("mine.syx", vec![1, 2, 3]);
        session.select_model(Model::M1ex);

        assert!(session.load_bundled(DataKind::Sounds).await.is_err());
        assert_eq!(session.payload().map(PresetPayload::len), Some(3));
        assert!(session.engine().status().is_error());
    }

    #[test]
    fn test_select_unknown_endpoint() {
        let temp_dir = TempDir::new().unwrap();
        let platform = Arc::new(FakePlatform::with_ports(&[("a", "UM-ONE")]));
        let mut session = session_with(platform, temp_dir.path());

        assert!(session.select_endpoint("korg").is_err());
        assert!(session.selected().is_none());
    }

    #[test]
    fn test_summary_lines() {
        let temp_dir = TempDir::new().unwrap();
        let platform = Arc::new(FakePlatform::with_ports(&[("a", "UM-ONE")]));
        let mut session = session_with(platform, temp_dir.path());
        session.select_endpoint("a").unwrap();
        session.load_bytes("dump.syx", vec![0xF0, 0x42, 0x30, 0xF7]);

        let summary = session.summary();
        assert_eq!(summary[0], ("Device", "UM-ONE (Unknown manufacturer)".to_string()));
        assert_eq!(summary[1], ("Model", "none selected".to_string()));
        assert!(summary[2].1.contains("4 bytes, 1 chunks, 1 SysEx frames (1 Korg)"));
        assert_eq!(summary[3], ("Status", "ready".to_string()));
    }

    #[test]
    fn test_initial_listing() {
        let temp_dir = TempDir::new().unwrap();
        let platform = Arc::new(FakePlatform::with_ports(&[("a", "Through"), ("b", "UM-ONE")]));
        let session = session_with(platform, temp_dir.path());

        assert_eq!(session.endpoints().len(), 2);
        assert!(session.capability_error().is_none());
        assert_eq!(session.engine().status(), TransferStatus::Waiting);
    }

    #[tokio::test]
    async fn test_missing_midi_backend_is_terminal() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("backup.syx");
        std::fs::write(&path, [0xF0, 0x42, 0x30, 0xF7]).unwrap();

        let mut session = session_with(Arc::new(FakePlatform::unavailable()), temp_dir.path());
        assert!(session.endpoints().is_empty());
        assert!(matches!(
            session.capability_error(),
            Some(RestoreError::Capability(_))
        ));

        session.load_file(&path).await.unwrap();
        assert!(session.engine().status().is_error());
        assert!(session.capability_error().is_some());
    }
}
