/// Flow-scoped processor registry
///
/// Built once from a shared list of processors. Processors belonging to other
/// flows are skipped so the same list can seed one registry per flow. The table
/// is never mutated after `build`, so lookups need no locking.

use crate::entity::EntityKey;
use crate::error::{ConfigError, RoutingError};
use crate::flow::Flow;
use crate::processor::Processor;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub struct ProcessorRegistry {
    flow: Flow,
    processors: HashMap<EntityKey, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn build<'a, I>(flow: Flow, processors: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = &'a Arc<dyn Processor>>,
    {
        let mut table: HashMap<EntityKey, Arc<dyn Processor>> = HashMap::new();

        for processor in processors {
            if processor.flow() != flow {
                tracing::debug!(
                    entity = processor.entity_name(),
                    processor_flow = %processor.flow(),
                    %flow,
                    "skipping processor from another flow"
                );
                continue;
            }

            let key = processor.entity_key().ok_or(ConfigError::MissingEntityKey {
                entity: processor.entity_name(),
            })?;

            if let Some(existing) = table.get(&key) {
                return Err(ConfigError::DuplicateEntityKey {
                    key,
                    existing: existing.entity_name(),
                    duplicate: processor.entity_name(),
                });
            }

            table.insert(key, Arc::clone(processor));
        }

        tracing::debug!(%flow, processors = table.len(), "processor registry built");

        Ok(ProcessorRegistry {
            flow,
            processors: table,
        })
    }

    /// Look up the processor for a wire type code
    pub fn resolve(&self, key: EntityKey) -> Result<&Arc<dyn Processor>, RoutingError> {
        self.processors
            .get(&key)
            .ok_or(RoutingError::UnknownEntityKey {
                key,
                flow: self.flow,
            })
    }

    pub fn flow(&self) -> Flow {
        self.flow
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Registered keys in ascending order
    pub fn keys(&self) -> Vec<EntityKey> {
        let mut keys: Vec<EntityKey> = self.processors.keys().copied().collect();
        keys.sort_unstable();
        keys
    }
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("flow", &self.flow)
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{HeartbeatUpdate, MarketUpdate};
    use crate::handler::Handlers;
    use crate::processor::processor;

    #[test]
    fn test_build_and_resolve() {
        let handlers = Arc::new(Handlers::new());
        let processors = vec![
            processor::<MarketUpdate>(Flow::InPlay, &handlers),
            processor::<HeartbeatUpdate>(Flow::InPlay, &handlers),
        ];

        let registry = ProcessorRegistry::build(Flow::InPlay, &processors).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.keys(), vec![EntityKey::new(3), EntityKey::new(32)]);
        assert_eq!(
            registry.resolve(EntityKey::new(3)).unwrap().entity_name(),
            "MarketUpdate"
        );
    }

    #[test]
    fn test_empty_registry() {
        let processors: Vec<Arc<dyn Processor>> = Vec::new();
        let registry = ProcessorRegistry::build(Flow::PreMatch, &processors).unwrap();
        assert!(registry.is_empty());
        assert!(registry.resolve(EntityKey::new(1)).is_err());
    }
}
