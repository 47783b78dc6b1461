//! Runtime configuration cell
//!
//! Holds the settings document every request reads. Handlers that change the
//! persisted settings mark their response dirty; the pipeline's reload stage
//! strips the marker and reloads after the response has been handed back.
//! A reload builds a brand-new document and only then swaps the shared
//! reference, so a reader sees either the old document or the new one in full.

use crate::settings::{SettingsDocument, SettingsError, SettingsSource};
use axum::response::Response;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Response marker requesting a settings reload once the response is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigDirty;

/// The settings document captured at the start of a request
#[derive(Debug, Clone)]
pub struct ConfigSnapshot(pub Arc<SettingsDocument>);

pub struct ConfigCell {
    current: RwLock<Arc<SettingsDocument>>,
    source: Arc<dyn SettingsSource>,
    /// Serializes reloads; readers never take it
    reload_lock: Mutex<()>,
    generation: AtomicU64,
}

impl ConfigCell {
    pub fn new(initial: SettingsDocument, source: Arc<dyn SettingsSource>) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            source,
            reload_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// The last successfully swapped-in document
    pub fn get(&self) -> Arc<SettingsDocument> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&current)
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot(self.get())
    }

    /// Number of completed swaps since startup
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn source(&self) -> &Arc<dyn SettingsSource> {
        &self.source
    }

    /// Flag `response` as having changed persisted configuration
    pub fn mark_dirty(response: &mut Response) {
        response.extensions_mut().insert(ConfigDirty);
    }

    #[cfg(test)]
    pub fn is_dirty(response: &Response) -> bool {
        response.extensions().get::<ConfigDirty>().is_some()
    }

    /// Remove the dirty marker, reporting whether it was present
    pub fn take_dirty(response: &mut Response) -> bool {
        response.extensions_mut().remove::<ConfigDirty>().is_some()
    }

    /// Load a fresh document from the source and swap it in.
    ///
    /// On failure the current document stays active.
    pub fn reload(&self) -> Result<Arc<SettingsDocument>, SettingsError> {
        let _serial = self.reload_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let fresh = Arc::new(self.source.load()?);
        {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            *current = Arc::clone(&fresh);
        }
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!("Settings swapped in (generation {})", generation);
        Ok(fresh)
    }

    /// Strip the dirty marker from `response` and, if it was there, reload in
    /// the background.
    ///
    /// The response itself is untouched otherwise; the returned handle
    /// resolves once the reload has finished or failed.
    pub fn reload_if_dirty(self: &Arc<Self>, response: &mut Response) -> Option<JoinHandle<()>> {
        if !Self::take_dirty(response) {
            return None;
        }
        let cell = Arc::clone(self);
        Some(tokio::task::spawn_blocking(move || match cell.reload() {
            Ok(fresh) => info!("🔄 Settings reloaded (theme: {})", fresh.theme),
            Err(e) => warn!("Settings reload failed, keeping current settings: {}", e),
        }))
    }
}
