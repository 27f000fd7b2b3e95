use crate::{error::Result, token::BearerToken};
use async_lock::{Mutex, RwLock};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::debug;

type Slot = Arc<Mutex<Option<Arc<BearerToken>>>>;

/// Bearer tokens keyed by audience.
///
/// Each audience has its own lock around the check-then-populate sequence, so
/// concurrent requests for an audience that is not cached yet run the
/// acquisition once and share its result. Audiences never wait on each other.
#[derive(Debug)]
pub struct TokenCache {
    entries: RwLock<HashMap<String, Slot>>,
    expiry_margin: Duration,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            expiry_margin: Duration::ZERO,
        }
    }

    /// Treat tokens expiring within `margin` as already gone.
    #[must_use]
    pub fn with_expiry_margin(mut self, margin: Duration) -> Self {
        self.expiry_margin = margin;
        self
    }

    /// Return the cached token for `audience`, or run `acquire` and cache what
    /// it produces.
    ///
    /// Errors from `acquire` are returned as-is and leave the entry empty, so
    /// the next call starts over.
    pub async fn get_token<'a, F, Fut>(
        &self,
        audience: &'a str,
        acquire: F,
    ) -> Result<Arc<BearerToken>>
    where
        F: FnOnce(&'a str) -> Fut + Send,
        Fut: Future<Output = Result<BearerToken>> + Send,
    {
        let slot = self.slot(audience).await;
        let mut entry = slot.lock().await;
        if let Some(token) = entry.as_ref() {
            if !token.expires_within(self.expiry_margin) {
                debug!(audience, "token cache hit");
                return Ok(Arc::clone(token));
            }
            debug!(audience, expires_on = %token.expires_on(), "cached token expired");
        }
        *entry = None;

        let token = Arc::new(acquire(audience).await?);
        *entry = Some(Arc::clone(&token));
        Ok(token)
    }

    /// Cached, unexpired token for `audience`, without acquiring one.
    ///
    /// Returns `None` while an acquisition for the audience is in progress.
    pub async fn peek(&self, audience: &str) -> Option<Arc<BearerToken>> {
        let slot = Arc::clone(self.entries.read().await.get(audience)?);
        let entry = slot.try_lock()?;
        entry
            .as_ref()
            .filter(|token| !token.expires_within(self.expiry_margin))
            .cloned()
    }

    /// Forget the token for `audience`.
    pub async fn invalidate(&self, audience: &str) {
        let slot = self.entries.read().await.get(audience).cloned();
        if let Some(slot) = slot {
            *slot.lock().await = None;
        }
    }

    /// Forget every token.
    ///
    /// Audiences with an acquisition in progress keep their slot, so callers
    /// already waiting on it still share the token being acquired.
    pub async fn clear(&self) {
        let slots = self
            .entries
            .read()
            .await
            .values()
            .cloned()
            .collect::<Vec<_>>();
        for slot in slots {
            if let Some(mut entry) = slot.try_lock() {
                *entry = None;
            }
        }
    }

    async fn slot(&self, audience: &str) -> Slot {
        if let Some(slot) = self.entries.read().await.get(audience) {
            return Arc::clone(slot);
        }
        let mut entries = self.entries.write().await;
        Arc::clone(entries.entry(audience.to_owned()).or_default())
    }
}
