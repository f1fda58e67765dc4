//! Persistent registry of the last paired scale.
//!
//! Holds at most one device identity, written whenever the user completes
//! an explicit pairing, so later sessions can target the same scale without
//! a new discovery gesture. Losing this cache only forces a fresh pairing,
//! never data loss, so storage failures are logged and degraded to "no
//! remembered device" rather than propagated.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use scalelink_types::DeviceIdentity;

/// File-backed registry of the last successfully paired scale.
///
/// The backing store is a single JSON record; absence of the file means
/// "no remembered device". The client façade is the only writer.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    path: PathBuf,
}

impl DeviceRegistry {
    /// Registry at the default per-user location
    /// (`<data dir>/scalelink/device.json`).
    pub fn open_default() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            path: base.join("scalelink").join("device.json"),
        }
    }

    /// Registry at a custom path (tests, kiosk images with fixed layouts).
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remember a device, overwriting any prior entry.
    pub fn save(&self, identity: &DeviceIdentity) {
        if let Err(e) = self.try_save(identity) {
            warn!("Failed to persist scale identity: {}", e);
        } else {
            debug!("Remembered scale {}", identity);
        }
    }

    fn try_save(&self, identity: &DeviceIdentity) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(identity)?;
        fs::write(&self.path, json)
    }

    /// The remembered device, if any.
    ///
    /// A missing file means none; an unreadable or corrupt file is treated
    /// the same way, after a warning.
    pub fn load(&self) -> Option<DeviceIdentity> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read scale registry: {}", e);
                return None;
            }
        };

        match serde_json::from_slice(&data) {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!("Corrupt scale registry entry, ignoring: {}", e);
                None
            }
        }
    }

    /// Forget the remembered device.
    pub fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Cleared remembered scale"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to clear scale registry: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_in(dir: &tempfile::TempDir) -> DeviceRegistry {
        DeviceRegistry::with_path(dir.path().join("device.json"))
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(&dir);
        let identity = DeviceIdentity::with_name("AA:BB:CC:DD:EE:FF", "Refill Scale 01");

        registry.save(&identity);
        assert_eq!(registry.load(), Some(identity));
    }

    #[test]
    fn test_load_without_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(registry_in(&dir).load(), None);
    }

    #[test]
    fn test_save_overwrites_previous_entry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(&dir);

        registry.save(&DeviceIdentity::with_name("AA:BB", "Old Scale"));
        let newer = DeviceIdentity::with_name("CC:DD", "New Scale");
        registry.save(&newer);

        assert_eq!(registry.load(), Some(newer));
    }

    #[test]
    fn test_clear_removes_entry_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(&dir);

        registry.save(&DeviceIdentity::new("AA:BB"));
        registry.clear();
        assert_eq!(registry.load(), None);

        // Clearing an empty registry is fine.
        registry.clear();
    }

    #[test]
    fn test_corrupt_file_degrades_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(&dir);

        fs::write(registry.path(), b"not json at all").unwrap();
        assert_eq!(registry.load(), None);
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DeviceRegistry::with_path(dir.path().join("nested/deeper/device.json"));

        registry.save(&DeviceIdentity::new("AA:BB"));
        assert!(registry.load().is_some());
    }
}
