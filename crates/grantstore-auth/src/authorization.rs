//! Authorization storage.
//!
//! Authorizations live under the `AUTHORIZATION` partition. Lookups by
//! subject go through the subject index, whose range attribute is the
//! composite `SearchKey`; each extra predicate (client, status, type)
//! narrows the range condition. Anything the indexes cannot express is
//! either filtered in memory over an index query (scopes) or served by the
//! explicit full-partition helpers [`get`](AuthorizationStore::get) and
//! [`list_with`](AuthorizationStore::list_with).

use std::sync::Arc;

use async_stream::try_stream;
use futures_util::{Stream, TryStreamExt, future};
use grantstore_storage::{
    ContinuationToken, DynDocumentStore, Filter, KeyCondition, QueryPage, RangeCondition,
};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::config::StoreConfig;
use crate::counter::CounterService;
use crate::cursor::CursorMap;
use crate::models::{
    Authorization, Document, EntityKind, Token, attributes, authorization_types,
    expiry_for_status, search_key, statuses,
};
use crate::table::DocumentTable;
use crate::{StoreError, StoreResult, require, timestamp};

/// Authorization storage operations.
#[derive(Clone)]
pub struct AuthorizationStore {
    table: DocumentTable<Authorization>,
    tokens: DocumentTable<Token>,
    counters: CounterService,
    cursors: Arc<CursorMap>,
    config: Arc<StoreConfig>,
}

impl AuthorizationStore {
    /// Create a new authorization store over a backend.
    #[must_use]
    pub fn new(store: DynDocumentStore, config: Arc<StoreConfig>, cursors: Arc<CursorMap>) -> Self {
        Self {
            table: DocumentTable::new(store.clone()),
            tokens: DocumentTable::new(store.clone()),
            counters: CounterService::new(store),
            cursors,
            config,
        }
    }

    // -------------------------------------------------------------------------
    // Counting
    // -------------------------------------------------------------------------

    /// Advisory number of stored authorizations.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter cannot be read.
    #[instrument(skip(self))]
    pub async fn count(&self) -> StoreResult<i64> {
        self.counters.count(EntityKind::Authorization).await
    }

    /// Counting over an arbitrary projection is not offered.
    ///
    /// # Errors
    ///
    /// Always returns `NotSupported`.
    pub fn count_with<F>(&self, _query: F) -> StoreResult<i64> {
        Err(StoreError::not_supported(
            "counting authorizations over an arbitrary query",
        ))
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Stores a new authorization and bumps the counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the record has no id or a write fails.
    #[instrument(skip(self, authorization), fields(id = %authorization.id()))]
    pub async fn create(&self, authorization: &Authorization) -> StoreResult<()> {
        require("authorization id", authorization.id())?;

        self.table.put(authorization).await?;
        self.cursors.invalidate();
        self.counters.increment(EntityKind::Authorization).await?;

        debug!("Authorization created");
        Ok(())
    }

    /// Deletes an authorization and lowers the counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the record has no id or a write fails.
    #[instrument(skip(self, authorization), fields(id = %authorization.id()))]
    pub async fn delete(&self, authorization: &Authorization) -> StoreResult<()> {
        require("authorization id", authorization.id())?;

        self.table.delete(authorization).await?;
        self.cursors.invalidate();
        self.counters.decrement(EntityKind::Authorization).await?;

        debug!("Authorization deleted");
        Ok(())
    }

    /// Saves changes to an authorization the caller previously read.
    ///
    /// The write succeeds only if the stored record still carries the
    /// caller's concurrency token. On success the caller's copy receives the
    /// new token and, when its status is not `valid`, an expiry
    /// `non_valid_ttl` from now.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record no longer exists and `Conflict` if
    /// it changed since it was read.
    #[instrument(skip(self, authorization), fields(id = %authorization.id()))]
    pub async fn update(&self, authorization: &mut Authorization) -> StoreResult<()> {
        require("authorization id", authorization.id())?;

        let non_valid_ttl = self.config.non_valid_ttl;
        self.table
            .update_versioned(authorization, |next| {
                let expiry = expiry_for_status(
                    next.status.as_deref(),
                    non_valid_ttl,
                    OffsetDateTime::now_utc(),
                );
                next.set_ttl(expiry);
            })
            .await?;

        debug!(status = ?authorization.status, "Authorization updated");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty id, or the read error.
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> StoreResult<Option<Authorization>> {
        require("id", id)?;
        self.table.get(id).await
    }

    /// Every authorization granted by `subject`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty subject.
    pub fn find_by_subject(
        &self,
        subject: &str,
        cancel: CancellationToken,
    ) -> StoreResult<impl Stream<Item = StoreResult<Authorization>> + Send + 'static> {
        require("subject", subject)?;
        Ok(self.by_subject(subject, None, cancel))
    }

    /// Authorizations granted by `subject` to `client`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty argument.
    pub fn find(
        &self,
        subject: &str,
        client: &str,
        cancel: CancellationToken,
    ) -> StoreResult<impl Stream<Item = StoreResult<Authorization>> + Send + 'static> {
        require("subject", subject)?;
        require("client", client)?;
        let range = RangeCondition::BeginsWith(format!("APPLICATION#{client}#"));
        Ok(self.by_subject(subject, Some(range), cancel))
    }

    /// Authorizations granted by `subject` to `client` with the given status.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty argument.
    pub fn find_with_status(
        &self,
        subject: &str,
        client: &str,
        status: &str,
        cancel: CancellationToken,
    ) -> StoreResult<impl Stream<Item = StoreResult<Authorization>> + Send + 'static> {
        require("subject", subject)?;
        require("client", client)?;
        require("status", status)?;
        let range = RangeCondition::BeginsWith(format!("APPLICATION#{client}#STATUS#{status}#"));
        Ok(self.by_subject(subject, Some(range), cancel))
    }

    /// Authorizations granted by `subject` to `client` with the given status
    /// and type.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty argument.
    pub fn find_with_type(
        &self,
        subject: &str,
        client: &str,
        status: &str,
        kind: &str,
        cancel: CancellationToken,
    ) -> StoreResult<impl Stream<Item = StoreResult<Authorization>> + Send + 'static> {
        require("subject", subject)?;
        require("client", client)?;
        require("status", status)?;
        require("type", kind)?;
        let range = RangeCondition::Equals(search_key(Some(client), Some(status), Some(kind)));
        Ok(self.by_subject(subject, Some(range), cancel))
    }

    /// Like [`find_with_type`](Self::find_with_type), keeping only records
    /// that were granted every one of `scopes`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty argument.
    pub fn find_with_scopes<S: AsRef<str>>(
        &self,
        subject: &str,
        client: &str,
        status: &str,
        kind: &str,
        scopes: &[S],
        cancel: CancellationToken,
    ) -> StoreResult<impl Stream<Item = StoreResult<Authorization>> + Send + 'static> {
        let scopes: Vec<String> = scopes.iter().map(|scope| scope.as_ref().to_string()).collect();
        let matches = self.find_with_type(subject, client, status, kind, cancel)?;
        Ok(matches.try_filter(move |authorization| future::ready(authorization.has_scopes(scopes.as_slice()))))
    }

    /// Every authorization granted to an application.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty id.
    pub fn find_by_application_id(
        &self,
        application_id: &str,
        cancel: CancellationToken,
    ) -> StoreResult<impl Stream<Item = StoreResult<Authorization>> + Send + 'static> {
        require("application id", application_id)?;
        let request = DocumentTable::<Authorization>::index_query(
            &self.config.indexes.application_id,
            KeyCondition::hash(application_id),
        );
        Ok(self.table.stream(request, cancel))
    }

    fn by_subject(
        &self,
        subject: &str,
        range: Option<RangeCondition>,
        cancel: CancellationToken,
    ) -> impl Stream<Item = StoreResult<Authorization>> + Send + 'static {
        let key = KeyCondition {
            hash_value: subject.to_string(),
            range,
        };
        let request =
            DocumentTable::<Authorization>::index_query(&self.config.indexes.subject, key);
        self.table.stream(request, cancel)
    }

    // -------------------------------------------------------------------------
    // Full-partition access
    // -------------------------------------------------------------------------

    /// Loads every authorization. Stops early, with what it has, on cancellation.
    ///
    /// # Errors
    ///
    /// Returns the first backend or decoding error.
    #[instrument(skip(self, cancel))]
    pub async fn list_all_records(
        &self,
        cancel: CancellationToken,
    ) -> StoreResult<Vec<Authorization>> {
        self.table
            .collect(DocumentTable::<Authorization>::partition_scan(), cancel)
            .await
    }

    /// Runs `query` over every stored authorization and returns its first result.
    ///
    /// This loads the whole partition; use it only for predicates the
    /// indexed lookups cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error if loading the partition fails.
    pub async fn get<F, I, S, R>(&self, query: F, state: S) -> StoreResult<Option<R>>
    where
        F: FnOnce(std::vec::IntoIter<Authorization>, S) -> I,
        I: Iterator<Item = R>,
    {
        let records = self.list_all_records(CancellationToken::new()).await?;
        Ok(query(records.into_iter(), state).next())
    }

    /// Runs `query` over every stored authorization and returns all results.
    ///
    /// Loads the whole partition, like [`get`](Self::get).
    ///
    /// # Errors
    ///
    /// Returns an error if loading the partition fails.
    pub async fn list_with<F, I, S, R>(&self, query: F, state: S) -> StoreResult<Vec<R>>
    where
        F: FnOnce(std::vec::IntoIter<Authorization>, S) -> I,
        I: Iterator<Item = R>,
    {
        let records = self.list_all_records(CancellationToken::new()).await?;
        Ok(query(records.into_iter(), state).collect())
    }

    /// Streams up to `count` authorizations after skipping `offset`, in
    /// partition order.
    ///
    /// The skipped records are re-walked from the start of the scan on every
    /// call, so the page always matches positions `[offset, offset + count)`
    /// of the partition as it is now. A listing that fills `count` records
    /// the key it stopped at; see [`resume_point`](Self::resume_point).
    pub fn list(
        &self,
        count: Option<usize>,
        offset: Option<usize>,
        cancel: CancellationToken,
    ) -> impl Stream<Item = StoreResult<Authorization>> + Send + 'static {
        let offset = offset.unwrap_or(0);
        debug!(offset, ?count, "Listing authorizations");
        self.scan(None, offset, count, cancel)
    }

    /// Streams up to `count` authorizations following `start` in partition
    /// order, or from the beginning when `start` is `None`.
    ///
    /// Continuation tokens name the last key returned, so records created or
    /// removed elsewhere in the meantime neither repeat nor skip the rest.
    pub fn list_from(
        &self,
        start: Option<ContinuationToken>,
        count: Option<usize>,
        cancel: CancellationToken,
    ) -> impl Stream<Item = StoreResult<Authorization>> + Send + 'static {
        self.scan(start, 0, count, cancel)
    }

    /// Key at which an earlier [`list`](Self::list) ending after `position`
    /// records stopped, usable with [`list_from`](Self::list_from).
    ///
    /// Cleared whenever this store creates, deletes or prunes records.
    #[must_use]
    pub fn resume_point(&self, position: usize) -> Option<ContinuationToken> {
        self.cursors.get(position)
    }

    fn scan(
        &self,
        start: Option<ContinuationToken>,
        skip: usize,
        count: Option<usize>,
        cancel: CancellationToken,
    ) -> impl Stream<Item = StoreResult<Authorization>> + Send + 'static {
        let store = self.table.store().clone();
        let cursors = self.cursors.clone();
        let from_start = start.is_none();

        try_stream! {
            let mut request = DocumentTable::<Authorization>::partition_scan().starting_after(start);
            let mut skipped = 0usize;
            let mut yielded = 0usize;

            while count.is_none_or(|count| yielded < count) {
                if cancel.is_cancelled() {
                    debug!(yielded, "Listing cancelled");
                    break;
                }

                let QueryPage { items, next } = store.query(&request).await.map_err(StoreError::from)?;
                for item in items {
                    if cancel.is_cancelled() || count.is_some_and(|count| yielded >= count) {
                        break;
                    }
                    if skipped < skip {
                        skipped += 1;
                        continue;
                    }

                    let record = Authorization::from_item(item)?;
                    yielded += 1;
                    if from_start && count == Some(yielded) {
                        cursors.record(skip + yielded, ContinuationToken::after(record.key()));
                    }
                    yield record;
                }

                match next {
                    Some(next) => request.start = Some(next),
                    None => break,
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Pruning
    // -------------------------------------------------------------------------

    /// Deletes authorizations created before `threshold` that are no longer
    /// useful, and returns the remaining count.
    ///
    /// Non-`valid` authorizations are always removed. Valid ad-hoc ones are
    /// removed when no token references them. Cancellation observed before
    /// the deletes start aborts with nothing deleted.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` on early cancellation, or the first backend error.
    #[instrument(skip(self, cancel))]
    pub async fn prune(
        &self,
        threshold: OffsetDateTime,
        cancel: &CancellationToken,
    ) -> StoreResult<i64> {
        let request = DocumentTable::<Authorization>::partition_scan().with_filter(
            Filter::less_than(attributes::CREATION_DATE, timestamp::encode_utc(threshold)),
        );
        let records = self.table.collect(request, cancel.clone()).await?;
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let mut scheduled = Vec::new();
        let mut candidates = Vec::new();
        for record in records {
            if record.status.as_deref() != Some(statuses::VALID) {
                scheduled.push(record.key());
            } else if record.kind.as_deref() == Some(authorization_types::AD_HOC) {
                candidates.push(record);
            }
        }

        for candidate in &candidates {
            if cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }
            let request = DocumentTable::<Token>::index_query(
                &self.config.indexes.authorization_id,
                KeyCondition::hash(candidate.id()),
            );
            if !self.tokens.any(request).await? {
                scheduled.push(candidate.key());
            }
        }

        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let store = self.table.store();
        for chunk in scheduled.chunks(self.config.batch_write_size) {
            store.batch_delete(chunk).await?;
        }

        let deleted = i64::try_from(scheduled.len()).unwrap_or(i64::MAX);
        if deleted > 0 {
            self.cursors.invalidate();
        }

        let remaining = (self.count().await? - deleted).max(0);
        self.counters
            .set(EntityKind::Authorization, remaining)
            .await?;

        info!(
            deleted,
            remaining,
            candidates = candidates.len(),
            "Pruned authorizations"
        );
        Ok(remaining)
    }
}
