use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use lunar_config::ComponentModel;

/// How long a cached component result stays valid.
pub const RESULT_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// Executed component models keyed by [`crate::ComponentWrapper::cache_key`].
///
/// Clones share the same entries.
#[derive(Debug, Clone)]
pub struct ResultCache {
  ttl: Duration,
  entries: Arc<Mutex<HashMap<String, (Instant, ComponentModel)>>>,
}

impl Default for ResultCache {
  fn default() -> Self {
    Self::with_ttl(RESULT_CACHE_TTL)
  }
}

impl ResultCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_ttl(ttl: Duration) -> Self {
    Self {
      ttl,
      entries: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, (Instant, ComponentModel)>> {
    self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// A fresh entry for `key`. Expired entries are dropped on lookup.
  pub fn get(&self, key: &str) -> Option<ComponentModel> {
    let mut entries = self.lock();
    match entries.get(key) {
      Some((stored, model)) if stored.elapsed() < self.ttl => Some(model.clone()),
      Some(_) => {
        entries.remove(key);
        None
      }
      None => None,
    }
  }

  /// Store `model` under `key`, dropping every expired entry.
  pub fn insert(&self, key: impl Into<String>, model: ComponentModel) {
    let mut entries = self.lock();
    entries.retain(|_, (stored, _)| stored.elapsed() < self.ttl);
    entries.insert(key.into(), (Instant::now(), model));
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  pub fn clear(&self) {
    self.lock().clear();
  }
}
