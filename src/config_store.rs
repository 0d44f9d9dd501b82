use std::{
    fs, io,
    path::{Component, Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::fan_curve::{BreakpointTable, DEFAULT_TABLE};

pub const CONFIG_FILE_NAME: &str = "config.dat";

type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to create config directory {path:?}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("Failed to read config file {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("Failed to write config file {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

// Persist the fan curve table as a raw fixed size image
// inside the configuration directory
#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigStore {
    // Create a new store rooted in the given directory
    pub fn new(config_dir: &Path) -> Self {
        Self {
            config_dir: config_dir.to_path_buf(),
            config_path: config_dir.join(CONFIG_FILE_NAME),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    // Load the stored table.
    // A missing directory or file is materialized with the default
    // table, an unreadable table image falls back to the default one
    pub fn load(&self) -> Result<BreakpointTable> {
        debug!("Loading fan curve from: {:?}", self.config_path);

        if !self.config_dir.exists() {
            self.save(None)?;
            info!("Missing config dir");

            return Ok(DEFAULT_TABLE);
        }

        if !self.config_path.exists() {
            self.save(None)?;
            info!("Missing config file");

            return Ok(DEFAULT_TABLE);
        }

        let bytes = fs::read(&self.config_path).map_err(|source| {
            error!("Error reading config file: {source}");
            ConfigError::Read {
                path: self.config_path.clone(),
                source,
            }
        })?;

        info!("config file exist");

        match BreakpointTable::from_bytes(&bytes) {
            Ok(table) => Ok(table),
            Err(err) => {
                warn!(
                    "Invalid config file, using the default fan curve: {err}"
                );

                Ok(DEFAULT_TABLE)
            }
        }
    }

    // Overwrite the stored table, None stores the default table
    pub fn save(&self, table: Option<&BreakpointTable>) -> Result<()> {
        let table = table.unwrap_or(&DEFAULT_TABLE);

        create_dir_recursive(&self.config_dir).map_err(|source| {
            error!("Error creating config directory: {source}");
            ConfigError::CreateDir {
                path: self.config_dir.clone(),
                source,
            }
        })?;

        fs::write(&self.config_path, table.to_bytes()).map_err(|source| {
            error!("Error writing config file: {source}");
            ConfigError::Write {
                path: self.config_path.clone(),
                source,
            }
        })?;

        debug!("Fan curve saved to: {:?}", self.config_path);

        Ok(())
    }
}

// Create every missing directory along the given path,
// one segment at a time
pub fn create_dir_recursive(path: &Path) -> io::Result<()> {
    let mut current = PathBuf::new();

    for component in path.components() {
        current.push(component);

        // Roots and prefixes always exist
        if !matches!(component, Component::Normal(_)) {
            continue;
        }

        if !current.exists() {
            debug!("Creating directory: {:?}", current);
            fs::create_dir(&current)?;
        } else if !current.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{current:?} exists and is not a directory"),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::fan_curve::TemperaturePoint;

    fn test_dir(name: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("fancontrol_store_{name}"));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn first_run_materializes_default_table() {
        let dir = test_dir("first_run").join("nested/config/");
        let store = ConfigStore::new(&dir);

        assert_eq!(store.load().unwrap(), DEFAULT_TABLE);
        assert_eq!(fs::read(store.config_path()).unwrap().len(), 40);

        // The second load reads the file written by the first one
        assert_eq!(store.load().unwrap(), DEFAULT_TABLE);
    }

    #[test]
    fn missing_file_in_existing_dir() {
        let dir = test_dir("missing_file");
        fs::create_dir_all(&dir).unwrap();
        let store = ConfigStore::new(&dir);

        assert_eq!(store.load().unwrap(), DEFAULT_TABLE);
        assert!(store.config_path().exists());
    }

    #[test]
    fn save_then_load_returns_same_table() {
        let store = ConfigStore::new(&test_dir("round_trip"));
        let table = BreakpointTable::new([
            TemperaturePoint::new(30, 0.2),
            TemperaturePoint::new(45, 0.35),
            TemperaturePoint::new(55, 0.5),
            TemperaturePoint::new(70, 0.8),
            TemperaturePoint::new(90, 0.95),
        ])
        .unwrap();

        store.save(Some(&table)).unwrap();

        assert_eq!(fs::read(store.config_path()).unwrap(), table.to_bytes());
        assert_eq!(store.load().unwrap(), table);
    }

    #[test]
    fn save_none_stores_default_table() {
        let store = ConfigStore::new(&test_dir("save_none"));

        store.save(None).unwrap();

        assert_eq!(
            fs::read(store.config_path()).unwrap(),
            DEFAULT_TABLE.to_bytes()
        );
    }

    #[test]
    fn corrupted_file_falls_back_to_default() {
        let store = ConfigStore::new(&test_dir("corrupted"));
        store.save(None).unwrap();

        fs::write(store.config_path(), b"not a fan curve").unwrap();
        assert_eq!(store.load().unwrap(), DEFAULT_TABLE);

        // Right size, unsorted temperatures
        let mut bytes = DEFAULT_TABLE.to_bytes();
        bytes[..4].copy_from_slice(&90i32.to_ne_bytes());
        fs::write(store.config_path(), bytes).unwrap();
        assert_eq!(store.load().unwrap(), DEFAULT_TABLE);

        // The corrupted file is left in place
        assert_eq!(fs::read(store.config_path()).unwrap(), bytes);
    }

    #[test]
    fn save_fails_when_store_cannot_be_opened() {
        let dir = test_dir("unwritable");
        let store = ConfigStore::new(&dir);

        // A directory where the file should be
        fs::create_dir_all(store.config_path()).unwrap();

        assert!(matches!(
            store.save(None),
            Err(ConfigError::Write { .. })
        ));
        assert!(matches!(store.load(), Err(ConfigError::Read { .. })));
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn store_failures_are_logged() {
        let store = ConfigStore::new(&test_dir("logged_failure"));
        fs::create_dir_all(store.config_path()).unwrap();

        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            assert!(store.save(None).is_err());
            assert!(store.load().is_err());
        });

        let logs = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("ERROR"), "{logs}");
        assert!(logs.contains("Error writing config file"), "{logs}");
        assert!(logs.contains("Error reading config file"), "{logs}");
    }

    #[test]
    fn create_dir_recursive_creates_every_segment() {
        let root = test_dir("mkdir");
        let path = root.join("a/b/c");

        create_dir_recursive(&path).unwrap();
        assert!(path.is_dir());

        // Already existing paths are fine
        create_dir_recursive(&path).unwrap();

        let file = root.join("file");
        fs::write(&file, b"").unwrap();
        assert!(create_dir_recursive(&file.join("sub")).is_err());
    }
}
