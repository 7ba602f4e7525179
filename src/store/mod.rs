//! Persisted settings
//!
//! The only protocol-adjacent value that survives a restart is the antenna
//! delay calibration constant.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::core::{Error, Result};

/// Key the antenna delay is stored under
pub const ANTENNA_DELAY_KEY: &str = "antennaDelay";

/// Small integer key/value store
pub trait Preferences {
    fn get_int(&self, key: &str) -> Option<i32>;

    fn put_int(&mut self, key: &str, value: i32) -> Result<()>;
}

/// Preferences held in memory only
#[derive(Debug, Clone, Default)]
pub struct MemoryPreferences {
    values: BTreeMap<String, i32>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Preferences for MemoryPreferences {
    fn get_int(&self, key: &str) -> Option<i32> {
        self.values.get(key).copied()
    }

    fn put_int(&mut self, key: &str, value: i32) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

/// Preferences persisted to a bincode file.
///
/// Every write rewrites the whole file through a temporary sibling and a
/// rename, so a crash leaves either the old or the new contents.
#[derive(Debug)]
pub struct FilePreferences {
    path: PathBuf,
    values: BTreeMap<String, i32>,
}

impl FilePreferences {
    /// Opens the store at `path`; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match fs::read(&path) {
            Ok(bytes) => bincode::deserialize(&bytes).map_err(|e| {
                Error::storage(format!("Failed to decode {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), entries = values.len(), "Preferences loaded");
        Ok(FilePreferences { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        let bytes = bincode::serialize(&self.values)
            .map_err(|e| Error::storage(format!("Failed to encode preferences: {}", e)))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Preferences for FilePreferences {
    fn get_int(&self, key: &str) -> Option<i32> {
        self.values.get(key).copied()
    }

    fn put_int(&mut self, key: &str, value: i32) -> Result<()> {
        let previous = self.values.insert(key.to_string(), value);
        if let Err(e) = self.persist() {
            match previous {
                Some(old) => self.values.insert(key.to_string(), old),
                None => self.values.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }
}

impl<P: Preferences + ?Sized> Preferences for Box<P> {
    fn get_int(&self, key: &str) -> Option<i32> {
        (**self).get_int(key)
    }

    fn put_int(&mut self, key: &str, value: i32) -> Result<()> {
        (**self).put_int(key, value)
    }
}

/// Reads and writes the antenna delay calibration constant
#[derive(Debug)]
pub struct AntennaCalibration<P> {
    prefs: P,
    default: u16,
}

impl<P: Preferences> AntennaCalibration<P> {
    pub fn new(prefs: P, default: u16) -> Self {
        AntennaCalibration { prefs, default }
    }

    /// Stored delay, or the default when nothing usable is stored
    pub fn load(&self) -> u16 {
        match self.prefs.get_int(ANTENNA_DELAY_KEY) {
            Some(value) => u16::try_from(value).unwrap_or_else(|_| {
                warn!(value, default = self.default, "Stored antenna delay out of range, using default");
                self.default
            }),
            None => self.default,
        }
    }

    /// Persists a new delay
    pub fn store(&mut self, delay: u16) -> Result<()> {
        self.prefs.put_int(ANTENNA_DELAY_KEY, i32::from(delay))
    }

    pub fn preferences(&self) -> &P {
        &self.prefs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibration_defaults() {
        let calibration = AntennaCalibration::new(MemoryPreferences::new(), 16436);
        assert_eq!(calibration.load(), 16436);
    }

    #[test]
    fn test_calibration_store_and_load() {
        let mut calibration = AntennaCalibration::new(MemoryPreferences::new(), 16436);
        calibration.store(16512).unwrap();
        assert_eq!(calibration.load(), 16512);
        assert_eq!(calibration.preferences().get_int(ANTENNA_DELAY_KEY), Some(16512));
    }

    #[test]
    fn test_out_of_range_value_falls_back() {
        let mut prefs = MemoryPreferences::new();
        prefs.put_int(ANTENNA_DELAY_KEY, -5).unwrap();
        let calibration = AntennaCalibration::new(prefs, 16436);
        assert_eq!(calibration.load(), 16436);
    }

    #[test]
    fn test_file_preferences_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dw1000.prefs");

        {
            let mut prefs = FilePreferences::open(&path).unwrap();
            assert_eq!(prefs.get_int(ANTENNA_DELAY_KEY), None);
            prefs.put_int(ANTENNA_DELAY_KEY, 16450).unwrap();
        }

        let prefs = FilePreferences::open(&path).unwrap();
        assert_eq!(prefs.get_int(ANTENNA_DELAY_KEY), Some(16450));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.prefs");
        fs::write(&path, [0xFFu8; 3]).unwrap();

        assert!(matches!(FilePreferences::open(&path), Err(Error::Storage(_))));
    }

    #[test]
    fn test_failed_write_keeps_old_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("prefs.bin");
        let mut prefs = FilePreferences::open(&path).unwrap();

        assert!(prefs.put_int(ANTENNA_DELAY_KEY, 1).is_err());
        assert_eq!(prefs.get_int(ANTENNA_DELAY_KEY), None);
    }
}
