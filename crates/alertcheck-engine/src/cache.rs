use crate::error::Result;
use alertcheck_common::window::Window;
use std::collections::HashMap;
use std::future::Future;

/// Presence results of one reconciliation pass, keyed by
/// `(selector, window)`.
///
/// A pass creates the cache empty and drops it when it ends, so nothing is
/// ever evicted and no result outlives its pass.
#[derive(Debug, Default)]
pub struct CycleCache {
    entries: HashMap<(String, Window), bool>,
    hits: u64,
    misses: u64,
}

impl CycleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored presence for `(selector, window)`, or runs
    /// `probe` once, stores its result and returns it.
    ///
    /// A failing `probe` stores nothing.
    pub async fn get_or_probe<F, Fut>(
        &mut self,
        selector: &str,
        window: &Window,
        probe: F,
    ) -> Result<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let key = (selector.to_string(), window.clone());
        if let Some(&present) = self.entries.get(&key) {
            self.hits += 1;
            tracing::debug!(vector = %selector, window = %window, incache = true, "Presence lookup");
            return Ok(present);
        }

        self.misses += 1;
        tracing::debug!(vector = %selector, window = %window, incache = false, "Presence lookup");
        let present = probe().await?;
        self.entries.insert(key, present);
        Ok(present)
    }

    pub fn get(&self, selector: &str, window: &Window) -> Option<bool> {
        self.entries
            .get(&(selector.to_string(), window.clone()))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
