//! Preset payloads and the bundled factory data
//!
//! A payload is a fully materialised, immutable SysEx dump. It comes either
//! from the bundled asset directory (`{model}/{kind}.syx`) or from any file
//! the user points at. User files are taken as-is: no extension, size or
//! content checks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{RestoreError, Result};
use crate::midi::SysexSummary;

/// Target hardware model
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    M1,
    M1ex,
}

impl Model {
    pub const ALL: [Model; 2] = [Model::M1, Model::M1ex];

    /// Lower-case key used in asset paths
    pub fn key(&self) -> &'static str {
        match self {
            Model::M1 => "m1",
            Model::M1ex => "m1ex",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Model::M1 => "M1/M1R",
            Model::M1ex => "M1ex/M1Rex",
        }
    }

    /// Nominal size of a factory sound dump
    pub fn sound_size(&self) -> usize {
        match self {
            Model::M1 => 32768,
            Model::M1ex => 65536,
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Model {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "m1" | "m1r" => Ok(Model::M1),
            "m1ex" | "m1rex" => Ok(Model::M1ex),
            other => Err(format!(
                "Unknown model '{}' (expected one of: {})",
                other,
                Model::ALL.map(|m| m.key()).join(", ")
            )),
        }
    }
}

/// Which factory dump to restore
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    #[serde(alias = "factory-sounds")]
    Sounds,
    #[serde(alias = "factory-sequences")]
    Sequences,
}

impl DataKind {
    pub fn file_stem(&self) -> &'static str {
        match self {
            DataKind::Sounds => "factory-sounds",
            DataKind::Sequences => "factory-sequences",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DataKind::Sounds => "Factory Sounds",
            DataKind::Sequences => "Demo Sequences",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for DataKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sounds" | "factory-sounds" => Ok(DataKind::Sounds),
            "sequences" | "seq" | "factory-sequences" => Ok(DataKind::Sequences),
            other => Err(format!(
                "Unknown data kind '{}' (expected sounds or sequences)",
                other
            )),
        }
    }
}

/// Relative path of a bundled dump: `{model-key}/{kind-stem}.syx`
pub fn asset_path(model: Model, kind: DataKind) -> PathBuf {
    PathBuf::from(model.key()).join(format!("{}.syx", kind.file_stem()))
}

/// Where a payload came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadOrigin {
    Bundled { model: Model, kind: DataKind },
    UserFile { name: String },
}

impl fmt::Display for PayloadOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadOrigin::Bundled { model, kind } => write!(f, "{} for {}", kind, model),
            PayloadOrigin::UserFile { name } => write!(f, "file '{}'", name),
        }
    }
}

/// Immutable SysEx dump, cheap to clone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetPayload {
    data: Arc<[u8]>,
    origin: PayloadOrigin,
}

impl PresetPayload {
    pub fn new(data: impl Into<Arc<[u8]>>, origin: PayloadOrigin) -> Self {
        Self {
            data: data.into(),
            origin,
        }
    }

    /// Payload from a user-supplied file's raw bytes. Never fails.
    pub fn from_user_bytes(name: impl Into<String>, raw: Vec<u8>) -> Self {
        Self::new(raw, PayloadOrigin::UserFile { name: name.into() })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn origin(&self) -> &PayloadOrigin {
        &self.origin
    }

    /// Contiguous chunks in payload order, the last one holding the remainder.
    ///
    /// Panics if `chunk_size` is 0.
    pub fn chunks(&self, chunk_size: usize) -> std::slice::Chunks<'_, u8> {
        self.data.chunks(chunk_size)
    }

    pub fn chunk_count(&self, chunk_size: usize) -> usize {
        self.len().div_ceil(chunk_size)
    }

    pub fn summary(&self) -> SysexSummary {
        SysexSummary::scan(&self.data)
    }
}

/// Source of bundled factory dumps
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Read the asset at `relative` completely
    async fn fetch(&self, relative: &Path) -> Result<Vec<u8>>;

    /// Human-readable location, for messages
    fn describe(&self, relative: &Path) -> String;
}

/// Assets laid out on disk under a root directory
#[derive(Debug, Clone)]
pub struct DirAssetSource {
    root: PathBuf,
}

impl DirAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl AssetSource for DirAssetSource {
    async fn fetch(&self, relative: &Path) -> Result<Vec<u8>> {
        let full = self.root.join(relative);
        debug!("Reading bundled asset {}", full.display());
        tokio::fs::read(&full)
            .await
            .map_err(|e| RestoreError::DeviceLoad {
                path: full,
                reason: e.to_string(),
            })
    }

    fn describe(&self, relative: &Path) -> String {
        self.root.join(relative).display().to_string()
    }
}

/// Load a bundled dump for `model` / `kind`
pub async fn load_bundled(
    source: &dyn AssetSource,
    model: Model,
    kind: DataKind,
) -> Result<PresetPayload> {
    let relative = asset_path(model, kind);
    let data = source.fetch(&relative).await?;

    if kind == DataKind::Sounds && data.len() != model.sound_size() {
        warn!(
            "{} is {} bytes, expected {} for {}",
            source.describe(&relative),
            data.len(),
            model.sound_size(),
            model
        );
    }

    Ok(PresetPayload::new(data, PayloadOrigin::Bundled { model, kind }))
}
