//! Registry of loaded detector models.
//!
//! Replaces the global mutable cache the platform started with: an
//! injected object with an owned lifecycle. Entries are handed out as
//! `Arc` clones, so a model stays alive for any run still holding a
//! reference even after it is removed from the registry — nothing is ever
//! unloaded under a concurrent evaluation.

use crate::store::Detector;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Thread-safe map of model name to loaded detector.
#[derive(Default)]
pub struct ModelRegistry {
    models: Mutex<HashMap<String, Arc<dyn Detector>>>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.names())
            .finish()
    }
}

impl ModelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a detector under its own name, replacing any previous
    /// entry. Runs holding the previous `Arc` keep it alive.
    pub fn register(&self, detector: Arc<dyn Detector>) {
        let mut models = lock(&self.models);
        models.insert(detector.name().to_string(), detector);
    }

    /// Look up a detector by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Detector>> {
        lock(&self.models).get(name).cloned()
    }

    /// Remove a detector from the registry. Existing references stay
    /// valid; the model is dropped when the last one goes away.
    pub fn remove(&self, name: &str) -> bool {
        lock(&self.models).remove(name).is_some()
    }

    /// Registered model names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.models).keys().cloned().collect();
        names.sort();
        names
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
