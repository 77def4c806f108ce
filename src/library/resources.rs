// Track resources
// Resolves opaque track ids into media the engine can open

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use super::scanner::DirectoryScanner;
use crate::audio::MediaSource;

/// Opaque identifier of a playable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u32);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("resource {0} not found")]
    NotFound(TrackId),

    #[error("resource file missing: {}", .0.display())]
    Missing(PathBuf),
}

/// Turns track ids into something playable.
pub trait ResourceResolver: Send + Sync {
    fn open(&self, id: TrackId) -> Result<MediaSource, ResourceError>;

    /// Human-readable name used in log lines.
    fn entry_name(&self, id: TrackId) -> Option<String>;
}

#[derive(Debug, Clone)]
struct RawResource {
    name: String,
    path: PathBuf,
}

/// Directory-backed resources, one id per audio file.
///
/// Ids start at [`RawResources::FIRST_ID`] and follow registration order.
#[derive(Debug, Clone, Default)]
pub struct RawResources {
    entries: BTreeMap<TrackId, RawResource>,
}

impl RawResources {
    pub const FIRST_ID: u32 = 0x7f0b_0000;

    pub fn new() -> Self {
        Self::default()
    }

    /// Register every supported audio file below `directory`, sorted by path.
    pub fn scan<P: AsRef<Path>>(directory: P) -> anyhow::Result<Self> {
        let mut resources = Self::new();
        for path in DirectoryScanner::scan(directory)? {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "unknown".to_string());
            resources.register(name, path);
        }
        debug!("Registered {} raw resources", resources.len());
        Ok(resources)
    }

    pub fn register(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> TrackId {
        let id = TrackId(Self::FIRST_ID + self.entries.len() as u32);
        self.entries.insert(
            id,
            RawResource {
                name: name.into(),
                path: path.into(),
            },
        );
        id
    }

    pub fn ids(&self) -> Vec<TrackId> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResourceResolver for RawResources {
    fn open(&self, id: TrackId) -> Result<MediaSource, ResourceError> {
        let entry = self.entries.get(&id).ok_or(ResourceError::NotFound(id))?;
        if !entry.path.is_file() {
            return Err(ResourceError::Missing(entry.path.clone()));
        }
        Ok(MediaSource::new(entry.path.clone()))
    }

    fn entry_name(&self, id: TrackId) -> Option<String> {
        self.entries.get(&id).map(|e| e.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn scan_assigns_ids_in_path_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("beta.mp3"), b"").unwrap();
        fs::write(dir.path().join("alpha.ogg"), b"").unwrap();
        fs::write(dir.path().join("readme.txt"), b"").unwrap();

        let resources = RawResources::scan(dir.path()).unwrap();
        let ids = resources.ids();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], TrackId(RawResources::FIRST_ID));
        assert_eq!(resources.entry_name(ids[0]).as_deref(), Some("alpha"));
        assert_eq!(resources.entry_name(ids[1]).as_deref(), Some("beta"));
        assert_eq!(
            resources.open(ids[1]).unwrap().path,
            dir.path().join("beta.mp3")
        );
    }

    #[test]
    fn unknown_id_is_not_found() {
        let resources = RawResources::new();
        let err = resources.open(TrackId(42)).unwrap_err();
        assert!(matches!(err, ResourceError::NotFound(TrackId(42))));
        assert!(resources.entry_name(TrackId(42)).is_none());
    }

    #[test]
    fn deleted_file_is_reported_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.wav");
        fs::write(&path, b"").unwrap();

        let mut resources = RawResources::new();
        let id = resources.register("gone", &path);
        fs::remove_file(&path).unwrap();

        assert!(matches!(resources.open(id), Err(ResourceError::Missing(_))));
    }

    #[test]
    fn track_id_displays_as_hex() {
        assert_eq!(TrackId(0x7f0b0001).to_string(), "0x7f0b0001");
    }
}
