//! Run-wide media staging.

use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use decksync_common::Result;
use decksync_media::{MediaRef, MediaRequest, MediaResolver};
use decksync_store::NoteStore;

/// Resolves media and uploads it to the store, once per request per run.
///
/// Before fetching, the store is asked whether the located filename is
/// already present; if so the stored file is reused as is. Degraded
/// resolutions are remembered as "no artifact". Store errors are not
/// remembered and reach the caller.
pub struct MediaStager {
    resolver: MediaResolver,
    cache: Mutex<HashMap<MediaRequest, Option<MediaRef>>>,
}

impl MediaStager {
    /// Create a stager around a resolver.
    pub fn new(resolver: MediaResolver) -> Self {
        Self {
            resolver,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, request: &MediaRequest) -> Option<Option<MediaRef>> {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(request)
            .cloned()
    }

    fn remember(&self, request: &MediaRequest, media: Option<MediaRef>) -> Option<MediaRef> {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(request.clone(), media.clone());
        media
    }

    /// Number of requests settled so far.
    pub fn cached_count(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Resolve a request and make sure its artifact is in the store.
    ///
    /// Returns `Ok(None)` when there is nothing to attach.
    ///
    /// # Errors
    /// - The store fails while checking or uploading media
    pub async fn stage(
        &self,
        request: &MediaRequest,
        store: &dyn NoteStore,
    ) -> Result<Option<MediaRef>> {
        if let Some(hit) = self.cached(request) {
            return Ok(hit);
        }

        let Some(located) = self.resolver.locate(request).await else {
            return Ok(self.remember(request, None));
        };

        let existing = store.find_media(&located.filename).await?;
        if existing.iter().any(|name| name == &located.filename) {
            debug!("Reusing stored media {}", located.filename);
            return Ok(self.remember(request, Some(MediaRef::new(located.kind, located.filename))));
        }

        let Some(artifact) = self.resolver.fetch(&located).await else {
            return Ok(self.remember(request, None));
        };

        let stored = store.store_media(&artifact.filename, &artifact.data).await?;
        debug!("Uploaded {} as {}", artifact.filename, stored);
        Ok(self.remember(request, Some(MediaRef::new(artifact.kind, stored))))
    }
}
