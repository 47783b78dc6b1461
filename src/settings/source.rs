//! Settings storage
//!
//! Settings documents are JSON files in the config directory. The runtime
//! configuration cell reloads through `SettingsSource`; admin collaborators
//! persist changes through it.

use super::gateway::{GatewaySettings, PaymentGateway};
use super::schema::validate;
use super::{SettingsDocument, SettingsError};
use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

const SETTINGS_FILE: &str = "settings.json";

/// Where the base settings document is loaded from and persisted to
pub trait SettingsSource: Send + Sync {
    /// Read and validate a brand-new settings document
    fn load(&self) -> Result<SettingsDocument, SettingsError>;

    /// Merge `patch` into the stored document, validate and persist it
    fn update(&self, patch: &Map<String, Value>) -> Result<SettingsDocument, SettingsError>;
}

/// Settings documents stored as JSON files in one directory
#[derive(Debug, Clone)]
pub struct FileSettingsSource {
    dir: PathBuf,
}

impl FileSettingsSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Read a raw JSON document from the config directory
    pub fn read_document(&self, name: &str) -> Result<Value, SettingsError> {
        let path = self.dir.join(name);
        let raw = fs::read(&path).map_err(|source| SettingsError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| SettingsError::Parse { path, source })
    }

    /// Read and validate the settings document of `gateway`
    pub fn load_gateway(&self, gateway: PaymentGateway) -> Result<GatewaySettings, SettingsError> {
        let document = self.read_document(gateway.document_name())?;
        Ok(GatewaySettings::validate_for(gateway, document)?)
    }

    fn write_document(&self, name: &str, value: &Value) -> Result<(), SettingsError> {
        let path = self.dir.join(name);
        let staging = self.dir.join(format!(".{}.tmp", name));
        let body = serde_json::to_vec_pretty(value).map_err(|source| SettingsError::Parse {
            path: path.clone(),
            source,
        })?;
        // write aside and rename so readers never see a half-written file
        fs::write(&staging, body)
            .and_then(|_| fs::rename(&staging, &path))
            .map_err(|source| SettingsError::Write { path, source })
    }
}

impl SettingsSource for FileSettingsSource {
    fn load(&self) -> Result<SettingsDocument, SettingsError> {
        let document = self.read_document(SETTINGS_FILE)?;
        debug!("Loaded {} from {}", SETTINGS_FILE, self.dir.display());
        Ok(validate(document)?)
    }

    fn update(&self, patch: &Map<String, Value>) -> Result<SettingsDocument, SettingsError> {
        let mut document = self.read_document(SETTINGS_FILE)?;
        merge(&mut document, patch);
        let validated: SettingsDocument = validate(document.clone())?;
        self.write_document(SETTINGS_FILE, &document)?;
        Ok(validated)
    }
}

fn merge(document: &mut Value, patch: &Map<String, Value>) {
    if let Value::Object(target) = document {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// In-memory settings source used by tests
#[cfg(test)]
pub struct MemorySettingsSource {
    document: std::sync::Mutex<Value>,
    loads: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MemorySettingsSource {
    pub fn new(document: Value) -> Self {
        Self {
            document: std::sync::Mutex::new(document),
            loads: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Overwrite the stored document without validating it
    pub fn replace(&self, document: Value) {
        *self.document.lock().unwrap() = document;
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl SettingsSource for MemorySettingsSource {
    fn load(&self) -> Result<SettingsDocument, SettingsError> {
        self.loads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let document = self.document.lock().unwrap().clone();
        Ok(validate(document)?)
    }

    fn update(&self, patch: &Map<String, Value>) -> Result<SettingsDocument, SettingsError> {
        let mut document = self.document.lock().unwrap();
        let mut candidate = document.clone();
        merge(&mut candidate, patch);
        let validated = validate(candidate.clone())?;
        *document = candidate;
        Ok(validated)
    }
}
