use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine start-up parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of queued actions per partition; `None` is unbounded.
    pub queue_capacity: Option<usize>,
    /// How long an idle worker sleeps before re-checking its queue.
    pub idle_wait_ms: u64,
    /// Signal the owning worker on every enqueue.
    pub wake_workers: bool,
    /// Objects pre-allocated in each object cache.
    pub cache_init_count: usize,
    /// Free-list shards per object cache.
    pub cache_shards: usize,
}

impl EngineConfig {
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: None,
            idle_wait_ms: 50,
            wake_workers: true,
            cache_init_count: 64,
            cache_shards: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "queue_capacity": 128, "wake_workers": false }"#).unwrap();
        assert_eq!(config.queue_capacity, Some(128));
        assert!(!config.wake_workers);
        assert_eq!(config.idle_wait(), Duration::from_millis(50));
        assert_eq!(config.cache_shards, 16);
    }
}
