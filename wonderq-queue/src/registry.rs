//! Name-keyed queue registry

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::info;

use crate::error::QueueError;
use crate::queue::{Queue, QueueConfig};

#[derive(Debug, Default)]
pub struct QueueRegistry {
    queues: DashMap<String, Queue>,
    defaults: QueueConfig,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose queues are created with `defaults` unless told otherwise
    pub fn with_defaults(defaults: QueueConfig) -> Self {
        Self {
            queues: DashMap::new(),
            defaults,
        }
    }

    pub fn defaults(&self) -> &QueueConfig {
        &self.defaults
    }

    pub fn create_queue(&self, name: &str) -> Result<Queue, QueueError> {
        self.create_queue_with_config(name, self.defaults.clone())
    }

    pub fn create_queue_with_config(
        &self,
        name: &str,
        config: QueueConfig,
    ) -> Result<Queue, QueueError> {
        match self.queues.entry(name.to_string()) {
            Entry::Occupied(_) => Err(QueueError::AlreadyExists(name.to_string())),
            Entry::Vacant(entry) => {
                info!(
                    name = %name,
                    lease_ms = config.lease_duration.as_millis(),
                    "Creating queue"
                );
                let queue = Queue::new(name, config);
                entry.insert(queue.clone());
                Ok(queue)
            }
        }
    }

    pub fn get_queue(&self, name: &str) -> Result<Queue, QueueError> {
        self.queues
            .get(name)
            .map(|q| q.value().clone())
            .ok_or_else(|| QueueError::NotFound(name.to_string()))
    }

    /// Names of all registered queues, sorted
    pub fn list_queues(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.iter().map(|q| q.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_create_and_get_queue() {
        let registry = QueueRegistry::new();

        let created = registry.create_queue("wonderq").unwrap();
        assert_eq!(created.name(), "wonderq");

        let fetched = registry.get_queue("wonderq").unwrap();
        created.push(json!({"message": "shared"}));
        assert_eq!(fetched.available_count(), 1);
    }

    #[test]
    fn test_duplicate_queue_fails() {
        let registry = QueueRegistry::new();
        registry.create_queue("wonderq").unwrap();

        let result = registry.create_queue("wonderq");
        assert!(matches!(result, Err(QueueError::AlreadyExists(name)) if name == "wonderq"));
    }

    #[test]
    fn test_get_nonexistent_queue_fails() {
        let registry = QueueRegistry::new();

        let result = registry.get_queue("missing");
        assert!(matches!(result, Err(QueueError::NotFound(name)) if name == "missing"));
    }

    #[test]
    fn test_queues_inherit_registry_defaults() {
        let defaults = QueueConfig {
            lease_duration: Duration::from_millis(250),
            receive_batch: 3,
        };
        let registry = QueueRegistry::with_defaults(defaults.clone());

        let queue = registry.create_queue("orders").unwrap();
        assert_eq!(queue.config(), &defaults);

        let custom = QueueConfig {
            lease_duration: Duration::from_secs(5),
            ..defaults
        };
        let other = registry
            .create_queue_with_config("invoices", custom.clone())
            .unwrap();
        assert_eq!(other.config(), &custom);
    }

    #[test]
    fn test_list_queues_sorted() {
        let registry = QueueRegistry::new();
        registry.create_queue("zeta").unwrap();
        registry.create_queue("alpha").unwrap();

        assert_eq!(registry.list_queues(), vec!["alpha", "zeta"]);
    }
}
