//! Application storage.

use grantstore_storage::DynDocumentStore;
use tracing::{debug, instrument};

use crate::counter::CounterService;
use crate::models::{Application, EntityKind};
use crate::table::DocumentTable;
use crate::{StoreResult, require};

/// Application storage operations.
#[derive(Clone)]
pub struct ApplicationStore {
    table: DocumentTable<Application>,
    counters: CounterService,
}

impl ApplicationStore {
    #[must_use]
    pub fn new(store: DynDocumentStore) -> Self {
        Self {
            table: DocumentTable::new(store.clone()),
            counters: CounterService::new(store),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the counter cannot be read.
    pub async fn count(&self) -> StoreResult<i64> {
        self.counters.count(EntityKind::Application).await
    }

    /// # Errors
    ///
    /// Returns an error if the application has no id or a write fails.
    #[instrument(skip(self, application), fields(id = %application.id()))]
    pub async fn create(&self, application: &Application) -> StoreResult<()> {
        require("application id", application.id())?;
        self.table.put(application).await?;
        self.counters.increment(EntityKind::Application).await?;
        debug!(client_id = ?application.client_id, "Application created");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the application has no id or a write fails.
    #[instrument(skip(self, application), fields(id = %application.id()))]
    pub async fn delete(&self, application: &Application) -> StoreResult<()> {
        require("application id", application.id())?;
        self.table.delete(application).await?;
        self.counters.decrement(EntityKind::Application).await?;
        debug!("Application deleted");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the application no longer exists and `Conflict`
    /// if it changed since it was read.
    #[instrument(skip(self, application), fields(id = %application.id()))]
    pub async fn update(&self, application: &mut Application) -> StoreResult<()> {
        require("application id", application.id())?;
        self.table.update_versioned(application, |_| {}).await
    }

    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty id, or the read error.
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> StoreResult<Option<Application>> {
        require("id", id)?;
        self.table.get(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreConfig;

    fn store() -> ApplicationStore {
        let schema = StoreConfig::default().table_schema();
        ApplicationStore::new(grantstore_db_memory::create_document_store(schema))
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let applications = store();
        let mut application = Application::new().with_client_id("portal");
        applications.create(&application).await.unwrap();
        assert_eq!(applications.count().await.unwrap(), 1);

        let mut stale = application.clone();
        application.permissions.push("ept:token".into());
        applications.update(&mut application).await.unwrap();

        let stored = applications.find_by_id(application.id()).await.unwrap().unwrap();
        assert_eq!(stored.permissions, vec!["ept:token".to_string()]);

        let err = applications.update(&mut stale).await.unwrap_err();
        assert!(err.is_conflict());

        applications.delete(&application).await.unwrap();
        assert_eq!(applications.count().await.unwrap(), 0);
        assert!(applications.find_by_id(application.id()).await.unwrap().is_none());
    }
}
