//! Token storage.
//!
//! Tokens share the subject and application indexes with authorizations and
//! alone populate the `AuthorizationId` index, which pruning uses to find
//! authorizations nothing refers to any more.

use std::sync::Arc;

use futures_util::Stream;
use grantstore_storage::{DynDocumentStore, KeyCondition};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::config::StoreConfig;
use crate::counter::CounterService;
use crate::models::{EntityKind, Token, expiry_for_status};
use crate::table::DocumentTable;
use crate::{StoreResult, require};

/// Token storage operations.
#[derive(Clone)]
pub struct TokenStore {
    table: DocumentTable<Token>,
    counters: CounterService,
    config: Arc<StoreConfig>,
}

impl TokenStore {
    #[must_use]
    pub fn new(store: DynDocumentStore, config: Arc<StoreConfig>) -> Self {
        Self {
            table: DocumentTable::new(store.clone()),
            counters: CounterService::new(store),
            config,
        }
    }

    /// # Errors
    ///
    /// Returns an error if the counter cannot be read.
    pub async fn count(&self) -> StoreResult<i64> {
        self.counters.count(EntityKind::Token).await
    }

    /// # Errors
    ///
    /// Returns an error if the token has no id or a write fails.
    #[instrument(skip(self, token), fields(id = %token.id()))]
    pub async fn create(&self, token: &Token) -> StoreResult<()> {
        require("token id", token.id())?;
        self.table.put(token).await?;
        self.counters.increment(EntityKind::Token).await?;
        debug!("Token created");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the token has no id or a write fails.
    #[instrument(skip(self, token), fields(id = %token.id()))]
    pub async fn delete(&self, token: &Token) -> StoreResult<()> {
        require("token id", token.id())?;
        self.table.delete(token).await?;
        self.counters.decrement(EntityKind::Token).await?;
        debug!("Token deleted");
        Ok(())
    }

    /// Saves changes to a token, with the same concurrency and expiry rules
    /// as authorization updates.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the token no longer exists and `Conflict` if it
    /// changed since it was read.
    #[instrument(skip(self, token), fields(id = %token.id()))]
    pub async fn update(&self, token: &mut Token) -> StoreResult<()> {
        require("token id", token.id())?;
        let non_valid_ttl = self.config.non_valid_ttl;
        self.table
            .update_versioned(token, |next| {
                let expiry = expiry_for_status(
                    next.status.as_deref(),
                    non_valid_ttl,
                    OffsetDateTime::now_utc(),
                );
                next.set_ttl(expiry);
            })
            .await
    }

    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty id, or the read error.
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> StoreResult<Option<Token>> {
        require("id", id)?;
        self.table.get(id).await
    }

    /// Tokens issued under an authorization.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty id.
    pub fn find_by_authorization_id(
        &self,
        authorization_id: &str,
        cancel: CancellationToken,
    ) -> StoreResult<impl Stream<Item = StoreResult<Token>> + Send + 'static> {
        require("authorization id", authorization_id)?;
        Ok(self.by_index(&self.config.indexes.authorization_id, authorization_id, cancel))
    }

    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty id.
    pub fn find_by_application_id(
        &self,
        application_id: &str,
        cancel: CancellationToken,
    ) -> StoreResult<impl Stream<Item = StoreResult<Token>> + Send + 'static> {
        require("application id", application_id)?;
        Ok(self.by_index(&self.config.indexes.application_id, application_id, cancel))
    }

    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty subject.
    pub fn find_by_subject(
        &self,
        subject: &str,
        cancel: CancellationToken,
    ) -> StoreResult<impl Stream<Item = StoreResult<Token>> + Send + 'static> {
        require("subject", subject)?;
        Ok(self.by_index(&self.config.indexes.subject, subject, cancel))
    }

    fn by_index(
        &self,
        index: &str,
        value: &str,
        cancel: CancellationToken,
    ) -> impl Stream<Item = StoreResult<Token>> + Send + 'static {
        let request = DocumentTable::<Token>::index_query(index, KeyCondition::hash(value));
        self.table.stream(request, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::statuses;
    use futures_util::TryStreamExt;

    fn store() -> TokenStore {
        let config = StoreConfig::default();
        let backend = grantstore_db_memory::create_document_store(config.table_schema());
        TokenStore::new(backend, Arc::new(config))
    }

    #[tokio::test]
    async fn test_create_find_delete() {
        let tokens = store();
        let token = Token::new()
            .with_authorization_id("auth-1")
            .with_subject("alice")
            .with_status(statuses::VALID);
        tokens.create(&token).await.unwrap();
        assert_eq!(tokens.count().await.unwrap(), 1);

        assert_eq!(tokens.find_by_id(token.id()).await.unwrap(), Some(token.clone()));

        let by_authorization: Vec<Token> = tokens
            .find_by_authorization_id("auth-1", CancellationToken::new())
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(by_authorization, vec![token.clone()]);

        tokens.delete(&token).await.unwrap();
        assert_eq!(tokens.count().await.unwrap(), 0);
        assert_eq!(tokens.find_by_id(token.id()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_redeemed_token_gets_expiry() {
        let tokens = store();
        let mut token = Token::new().with_status(statuses::VALID);
        tokens.create(&token).await.unwrap();

        token.status = Some(statuses::REDEEMED.to_string());
        token.set_redemption_date(Some(OffsetDateTime::now_utc()));
        tokens.update(&mut token).await.unwrap();

        let stored = tokens.find_by_id(token.id()).await.unwrap().unwrap();
        assert!(stored.ttl().is_some());
        assert_eq!(stored.concurrency_token(), token.concurrency_token());
    }
}
