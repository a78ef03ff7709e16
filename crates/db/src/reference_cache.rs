use std::sync::Arc;

use tokio::sync::RwLock;

use tradepost_core::domain::reference::{
    Category, Condition, Manufacturer, RefTable, Unit, Vocabulary,
};

use crate::repositories::{ReferenceRepository, RepositoryError};

/// Read-through cache over the reference vocabulary. Extraction loads the
/// vocabulary on every task, so the snapshot is kept until a write to one
/// of the reference tables invalidates it.
pub struct ReferenceCache {
    repository: Arc<dyn ReferenceRepository>,
    snapshot: RwLock<Option<Arc<Vocabulary>>>,
}

impl ReferenceCache {
    pub fn new(repository: Arc<dyn ReferenceRepository>) -> Self {
        Self { repository, snapshot: RwLock::new(None) }
    }

    pub async fn vocabulary(&self) -> Result<Arc<Vocabulary>, RepositoryError> {
        if let Some(cached) = self.snapshot.read().await.clone() {
            return Ok(cached);
        }

        let mut slot = self.snapshot.write().await;
        // Another task may have filled the slot while we waited for the lock.
        if let Some(cached) = slot.clone() {
            return Ok(cached);
        }

        let loaded = Arc::new(self.repository.load_vocabulary().await?);
        *slot = Some(loaded.clone());
        Ok(loaded)
    }

    /// Drops the cached snapshot. The vocabulary is loaded as one unit, so
    /// a write to any table discards the whole snapshot.
    pub async fn invalidate(&self, _table: RefTable) {
        *self.snapshot.write().await = None;
    }

    pub async fn save_category(&self, category: Category) -> Result<(), RepositoryError> {
        self.repository.save_category(category).await?;
        self.invalidate(RefTable::Categories).await;
        Ok(())
    }

    pub async fn save_manufacturer(&self, manufacturer: Manufacturer) -> Result<(), RepositoryError> {
        self.repository.save_manufacturer(manufacturer).await?;
        self.invalidate(RefTable::Manufacturers).await;
        Ok(())
    }

    pub async fn save_unit(&self, unit: Unit) -> Result<(), RepositoryError> {
        self.repository.save_unit(unit).await?;
        self.invalidate(RefTable::Units).await;
        Ok(())
    }

    pub async fn save_condition(&self, condition: Condition) -> Result<(), RepositoryError> {
        self.repository.save_condition(condition).await?;
        self.invalidate(RefTable::Conditions).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tradepost_core::domain::reference::{Category, CategoryId, RefTable, Vocabulary};

    use super::ReferenceCache;
    use crate::repositories::{InMemoryReferenceRepository, ReferenceRepository};

    fn category(id: &str, name: &str) -> Category {
        Category { id: CategoryId(id.to_string()), name: name.to_string(), aliases: Vec::new() }
    }

    #[tokio::test]
    async fn snapshot_is_served_until_invalidated() {
        let repository = Arc::new(InMemoryReferenceRepository::with_vocabulary(Vocabulary {
            categories: vec![category("cat-pipe", "Pipe")],
            ..Vocabulary::default()
        }));
        let cache = ReferenceCache::new(repository.clone());

        let first = cache.vocabulary().await.expect("load vocabulary");
        assert_eq!(first.categories.len(), 1);

        // Writes that bypass the cache stay invisible until invalidation.
        repository.save_category(category("cat-valve", "Valve")).await.expect("save category");
        let stale = cache.vocabulary().await.expect("cached vocabulary");
        assert_eq!(stale.categories.len(), 1);

        cache.invalidate(RefTable::Categories).await;
        let fresh = cache.vocabulary().await.expect("reload vocabulary");
        assert_eq!(fresh.categories.len(), 2);
    }

    #[tokio::test]
    async fn writes_through_the_cache_invalidate_the_snapshot() {
        let repository = Arc::new(InMemoryReferenceRepository::default());
        let cache = ReferenceCache::new(repository);

        let empty = cache.vocabulary().await.expect("load vocabulary");
        assert!(empty.categories.is_empty());

        cache.save_category(category("cat-pump", "Pump")).await.expect("save category");

        let reloaded = cache.vocabulary().await.expect("reload vocabulary");
        assert_eq!(reloaded.categories.len(), 1);
        assert!(reloaded.find_category("pump").is_some());
    }
}
