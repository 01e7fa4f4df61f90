//! Single-shot scans of a user-selected image.
//!
//! Uploads are persisted server-side so they show up in history. Only one
//! scan runs at a time; the loading flag is cleared on every exit path.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::client::{InferenceClient, InferenceFailure, SubmitOptions};
use crate::detect::DetectionResult;
use crate::ingest::{CaptureError, SelectedImage};
use crate::store::{Resolution, SharedDetectionStore};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("a scan is already in progress")]
    Busy,
    #[error("result discarded: a newer scan or image replaced it")]
    Superseded,
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Inference(#[from] InferenceFailure),
}

pub struct Scanner {
    client: Arc<dyn InferenceClient>,
    store: SharedDetectionStore,
    loading: AtomicBool,
}

/// Clears the loading flag when dropped.
struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Scanner {
    pub fn new(client: Arc<dyn InferenceClient>, store: SharedDetectionStore) -> Self {
        Self {
            client,
            store,
            loading: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &SharedDetectionStore {
        &self.store
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Load an image and drop whatever result was on display.
    pub fn select(&self, path: &Path) -> Result<SelectedImage, ScanError> {
        let image = SelectedImage::open(path)?;
        self.store.clear();
        log::info!("selected {} ({})", image.filename(), image.dims());
        Ok(image)
    }

    /// Submit `image` for detection and display the result.
    ///
    /// On failure the selected image is untouched and the previous result,
    /// if any, stays on display.
    pub fn scan(&self, image: &SelectedImage) -> Result<Arc<DetectionResult>, ScanError> {
        if self
            .loading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ScanError::Busy);
        }
        let _loading = LoadingGuard(&self.loading);

        let ticket = self.store.dispatch();
        let result = match self.client.submit(image.frame(), SubmitOptions::persisted()) {
            Ok(result) => result,
            Err(err) => {
                log::warn!("scan of {} failed: {}", image.filename(), err);
                return Err(err.into());
            }
        };
        match self.store.resolve(ticket, result) {
            Resolution::Accepted(result) => {
                log::info!(
                    "scan {} of {}: {} detections",
                    result.id(),
                    image.filename(),
                    result.boxes().len()
                );
                Ok(result)
            }
            Resolution::Stale => Err(ScanError::Superseded),
        }
    }
}
