use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::comments::repository::RepositoryError;
use crate::domain::comments::EntityKind;
use crate::types::EntityId;

/// Looks up instances of one commentable entity kind by natural key.
#[async_trait]
pub trait EntityResolver: Send + Sync {
    fn kind(&self) -> EntityKind;

    /// Every id whose natural key equals `key`. Callers decide what zero or
    /// several matches mean.
    async fn find_by_natural_key(&self, key: &str) -> Result<Vec<EntityId>, RepositoryError>;
}

#[derive(Clone, Default)]
pub struct EntityRegistry {
    resolvers: HashMap<EntityKind, Arc<dyn EntityResolver>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `resolver` under its own kind, replacing any previous one.
    pub fn register(mut self, resolver: Arc<dyn EntityResolver>) -> Self {
        self.resolvers.insert(resolver.kind(), resolver);
        self
    }

    /// Maps a type name to a registered kind. `None` if the name does not parse
    /// or nothing is registered for it.
    pub fn kind_for(&self, type_name: &str) -> Option<EntityKind> {
        let kind = type_name.parse::<EntityKind>().ok()?;
        self.resolvers.contains_key(&kind).then_some(kind)
    }

    pub fn resolver(&self, kind: EntityKind) -> Option<&Arc<dyn EntityResolver>> {
        self.resolvers.get(&kind)
    }

    pub fn kinds(&self) -> Vec<EntityKind> {
        let mut kinds: Vec<EntityKind> = self.resolvers.keys().copied().collect();
        kinds.sort_by_key(|kind| kind.as_str());
        kinds
    }
}

impl std::fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::EntityRegistry;
    use crate::comments::memory::MemoryEntityResolver;
    use crate::domain::comments::EntityKind;

    #[test]
    fn kind_for_requires_registration() {
        let registry = EntityRegistry::new().register(Arc::new(MemoryEntityResolver::new(
            EntityKind::Post,
        )));
        assert_eq!(registry.kind_for("post"), Some(EntityKind::Post));
        assert_eq!(registry.kind_for("POST "), Some(EntityKind::Post));
        assert_eq!(registry.kind_for("profile"), None);
        assert_eq!(registry.kind_for("article"), None);
    }

    #[test]
    fn kinds_are_sorted_by_name() {
        let registry = EntityRegistry::new()
            .register(Arc::new(MemoryEntityResolver::new(EntityKind::Profile)))
            .register(Arc::new(MemoryEntityResolver::new(EntityKind::Post)));
        assert_eq!(registry.kinds(), vec![EntityKind::Post, EntityKind::Profile]);
    }
}
