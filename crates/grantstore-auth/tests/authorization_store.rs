//! Authorization store behavior against the in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{StreamExt, TryStreamExt};
use grantstore_auth::models::{authorization_types, statuses};
use grantstore_auth::{
    Authorization, AuthorizationStore, GrantStore, StoreConfig, StoreError, Token,
};
use grantstore_db_memory::{InMemoryDocumentStore, StorageOptions};
use grantstore_storage::DynDocumentStore;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::macros::datetime;
use tokio_util::sync::CancellationToken;

fn setup(config: StoreConfig, page_size: usize) -> (GrantStore, Arc<InMemoryDocumentStore>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let options = StorageOptions {
        page_size,
        ..StorageOptions::default()
    };
    let backend = Arc::new(InMemoryDocumentStore::with_options(
        config.table_schema(),
        options,
    ));
    let store: DynDocumentStore = backend.clone();
    let grants = GrantStore::new(store, config).unwrap();
    (grants, backend)
}

fn grant(subject: &str, client: &str, status: &str, kind: &str) -> Authorization {
    Authorization::new()
        .with_subject(subject)
        .with_application_id(client)
        .with_status(status)
        .with_kind(kind)
        .with_creation_date(OffsetDateTime::now_utc())
}

async fn ids<S>(stream: S) -> Vec<String>
where
    S: futures_util::Stream<Item = Result<Authorization, StoreError>>,
{
    let mut ids: Vec<String> = stream
        .map_ok(|authorization| authorization.id().to_string())
        .try_collect()
        .await
        .unwrap();
    ids.sort();
    ids
}

fn sorted(mut ids: Vec<String>) -> Vec<String> {
    ids.sort();
    ids
}

#[tokio::test]
async fn test_find_by_id_after_create() {
    let (grants, _) = setup(StoreConfig::default(), 100);
    let authorizations = grants.authorizations();

    let mut created = grant("alice", "app1", statuses::VALID, authorization_types::PERMANENT)
        .with_scopes(["openid", "profile"])
        .with_creation_date(datetime!(2024-03-05 13:45:12.345678 UTC));
    let mut properties = Map::new();
    properties.insert("nonce".into(), Value::from("n-0S6_WzA2Mj"));
    created.set_properties(&properties).unwrap();
    authorizations.create(&created).await.unwrap();

    let found = authorizations
        .find_by_id(created.id())
        .await
        .unwrap()
        .unwrap();
    assert!(!found.concurrency_token().is_empty());
    assert_eq!(found, created);
    assert_eq!(found.properties().unwrap(), properties);

    assert_eq!(authorizations.count().await.unwrap(), 1);
    assert!(
        authorizations
            .find_by_id("no-such-id")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_delete_removes_record_and_decrements() {
    let (grants, _) = setup(StoreConfig::default(), 100);
    let authorizations = grants.authorizations();

    let first = grant("alice", "app1", statuses::VALID, authorization_types::PERMANENT);
    let second = grant("bob", "app1", statuses::VALID, authorization_types::PERMANENT);
    authorizations.create(&first).await.unwrap();
    authorizations.create(&second).await.unwrap();
    assert_eq!(authorizations.count().await.unwrap(), 2);

    authorizations.delete(&first).await.unwrap();
    assert_eq!(authorizations.count().await.unwrap(), 1);
    assert!(authorizations.find_by_id(first.id()).await.unwrap().is_none());
    assert!(authorizations.find_by_id(second.id()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_update_with_current_token_renews_it() {
    let (grants, _) = setup(StoreConfig::default(), 100);
    let authorizations = grants.authorizations();

    let mut authorization = grant("alice", "app1", statuses::VALID, authorization_types::PERMANENT);
    authorizations.create(&authorization).await.unwrap();
    let original_token = authorization.concurrency_token().to_string();

    authorization.set_scopes(["openid", "offline_access"]);
    authorizations.update(&mut authorization).await.unwrap();

    assert_ne!(authorization.concurrency_token(), original_token);
    let stored = authorizations
        .find_by_id(authorization.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, authorization);
    assert_eq!(stored.scopes(), ["openid", "offline_access"]);
    assert_eq!(stored.ttl(), None);
}

#[tokio::test]
async fn test_update_with_stale_token_conflicts() {
    let (grants, _) = setup(StoreConfig::default(), 100);
    let authorizations = grants.authorizations();

    let mut winner = grant("alice", "app1", statuses::VALID, authorization_types::PERMANENT);
    authorizations.create(&winner).await.unwrap();
    let mut loser = winner.clone();

    winner.status = Some(statuses::REVOKED.to_string());
    authorizations.update(&mut winner).await.unwrap();
    let stored_before = authorizations.find_by_id(winner.id()).await.unwrap();
    assert!(winner.ttl().is_some());
    assert_eq!(stored_before.as_ref(), Some(&winner));

    loser.subject = Some("mallory".to_string());
    let loser_token = loser.concurrency_token().to_string();
    let err = authorizations.update(&mut loser).await.unwrap_err();
    assert!(err.is_conflict(), "unexpected error: {err}");
    assert_eq!(loser.concurrency_token(), loser_token);

    let stored_after = authorizations.find_by_id(winner.id()).await.unwrap();
    assert_eq!(stored_after, stored_before);
    assert_eq!(stored_after.unwrap().subject.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_update_of_deleted_record_is_not_found() {
    let (grants, _) = setup(StoreConfig::default(), 100);
    let authorizations = grants.authorizations();

    let mut authorization = grant("alice", "app1", statuses::VALID, authorization_types::AD_HOC);
    authorizations.create(&authorization).await.unwrap();
    authorizations.delete(&authorization).await.unwrap();

    let err = authorizations.update(&mut authorization).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_find_with_status_returns_only_matching_status() {
    let (grants, _) = setup(StoreConfig::default(), 100);
    let authorizations = grants.authorizations();

    let first = grant("alice", "app1", statuses::VALID, authorization_types::PERMANENT);
    let second = grant("alice", "app1", statuses::VALID, authorization_types::AD_HOC);
    let revoked = grant("alice", "app1", statuses::REVOKED, authorization_types::PERMANENT);
    for authorization in [&first, &second, &revoked] {
        authorizations.create(authorization).await.unwrap();
    }

    let found = ids(
        authorizations
            .find_with_status("alice", "app1", statuses::VALID, CancellationToken::new())
            .unwrap(),
    )
    .await;
    assert_eq!(
        found,
        sorted(vec![first.id().to_string(), second.id().to_string()])
    );

    let all_for_client = ids(
        authorizations
            .find("alice", "app1", CancellationToken::new())
            .unwrap(),
    )
    .await;
    assert_eq!(all_for_client.len(), 3);
}

#[tokio::test]
async fn test_subject_lookups_narrow_by_each_predicate() {
    let (grants, _) = setup(StoreConfig::default(), 2);
    let authorizations = grants.authorizations();

    let permanent = grant("alice", "app1", statuses::VALID, authorization_types::PERMANENT);
    let ad_hoc = grant("alice", "app1", statuses::VALID, authorization_types::AD_HOC);
    let other_client = grant("alice", "app10", statuses::VALID, authorization_types::PERMANENT);
    let other_subject = grant("bob", "app1", statuses::VALID, authorization_types::PERMANENT);
    for authorization in [&permanent, &ad_hoc, &other_client, &other_subject] {
        authorizations.create(authorization).await.unwrap();
    }

    let by_subject = ids(
        authorizations
            .find_by_subject("alice", CancellationToken::new())
            .unwrap(),
    )
    .await;
    assert_eq!(by_subject.len(), 3);

    let by_client = ids(
        authorizations
            .find("alice", "app1", CancellationToken::new())
            .unwrap(),
    )
    .await;
    assert_eq!(
        by_client,
        sorted(vec![permanent.id().to_string(), ad_hoc.id().to_string()])
    );

    let by_type = ids(
        authorizations
            .find_with_type(
                "alice",
                "app1",
                statuses::VALID,
                authorization_types::AD_HOC,
                CancellationToken::new(),
            )
            .unwrap(),
    )
    .await;
    assert_eq!(by_type, vec![ad_hoc.id().to_string()]);
}

#[tokio::test]
async fn test_find_with_scopes_requires_every_scope() {
    let (grants, _) = setup(StoreConfig::default(), 100);
    let authorizations = grants.authorizations();

    let broad = grant("alice", "app1", statuses::VALID, authorization_types::PERMANENT)
        .with_scopes(["openid", "profile", "email"]);
    let narrow = grant("alice", "app1", statuses::VALID, authorization_types::PERMANENT)
        .with_scopes(["openid"]);
    authorizations.create(&broad).await.unwrap();
    authorizations.create(&narrow).await.unwrap();

    let found = ids(
        authorizations
            .find_with_scopes(
                "alice",
                "app1",
                statuses::VALID,
                authorization_types::PERMANENT,
                &["email", "openid"],
                CancellationToken::new(),
            )
            .unwrap(),
    )
    .await;
    assert_eq!(found, vec![broad.id().to_string()]);

    let everything = ids(
        authorizations
            .find_with_scopes::<&str>(
                "alice",
                "app1",
                statuses::VALID,
                authorization_types::PERMANENT,
                &[],
                CancellationToken::new(),
            )
            .unwrap(),
    )
    .await;
    assert_eq!(everything.len(), 2);
}

#[tokio::test]
async fn test_index_lookups_never_return_tokens() {
    let (grants, _) = setup(StoreConfig::default(), 100);
    let authorizations = grants.authorizations();
    let tokens = grants.tokens();

    let authorization = grant("alice", "app1", statuses::VALID, authorization_types::AD_HOC);
    authorizations.create(&authorization).await.unwrap();

    let token = Token::new()
        .with_subject("alice")
        .with_application_id("app1")
        .with_authorization_id(authorization.id())
        .with_status(statuses::VALID)
        .with_kind(authorization_types::AD_HOC);
    tokens.create(&token).await.unwrap();

    let by_subject = ids(
        authorizations
            .find_by_subject("alice", CancellationToken::new())
            .unwrap(),
    )
    .await;
    assert_eq!(by_subject, vec![authorization.id().to_string()]);

    let by_type = ids(
        authorizations
            .find_with_type(
                "alice",
                "app1",
                statuses::VALID,
                authorization_types::AD_HOC,
                CancellationToken::new(),
            )
            .unwrap(),
    )
    .await;
    assert_eq!(by_type, vec![authorization.id().to_string()]);

    let by_application = ids(
        authorizations
            .find_by_application_id("app1", CancellationToken::new())
            .unwrap(),
    )
    .await;
    assert_eq!(by_application, vec![authorization.id().to_string()]);

    let tokens_for_subject: Vec<Token> = tokens
        .find_by_subject("alice", CancellationToken::new())
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(tokens_for_subject, vec![token]);
}

#[tokio::test]
async fn test_list_returns_requested_window() {
    let (grants, _) = setup(StoreConfig::default(), 3);
    let authorizations = grants.authorizations();
    for n in 0..10 {
        authorizations
            .create(&grant(
                &format!("subject-{n}"),
                "app1",
                statuses::VALID,
                authorization_types::PERMANENT,
            ))
            .await
            .unwrap();
    }

    let all: Vec<String> = authorizations
        .list_all_records(CancellationToken::new())
        .await
        .unwrap()
        .iter()
        .map(|authorization| authorization.id().to_string())
        .collect();
    assert_eq!(all.len(), 10);

    for (count, offset) in [(4, 0), (4, 3), (2, 8), (5, 7)] {
        let window: Vec<String> = authorizations
            .list(Some(count), Some(offset), CancellationToken::new())
            .map_ok(|authorization| authorization.id().to_string())
            .try_collect()
            .await
            .unwrap();
        let end = (offset + count).min(all.len());
        assert_eq!(window, all[offset..end], "count={count} offset={offset}");
    }

    let everything: Vec<Authorization> = authorizations
        .list(None, None, CancellationToken::new())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(everything.len(), 10);

    let nothing: Vec<Authorization> = authorizations
        .list(Some(0), Some(2), CancellationToken::new())
        .try_collect()
        .await
        .unwrap();
    assert!(nothing.is_empty());
}

async fn seed(authorizations: &AuthorizationStore, n: usize) {
    for i in 0..n {
        authorizations
            .create(&grant(
                &format!("subject-{i}"),
                "app1",
                statuses::VALID,
                authorization_types::PERMANENT,
            ))
            .await
            .unwrap();
    }
}

async fn page(authorizations: &AuthorizationStore, count: usize, offset: usize) -> Vec<String> {
    authorizations
        .list(Some(count), Some(offset), CancellationToken::new())
        .map_ok(|authorization| authorization.id().to_string())
        .try_collect()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_offset_pages_reflect_records_expired_between_pages() {
    let config = StoreConfig {
        non_valid_ttl: Duration::from_nanos(1),
        ..StoreConfig::default()
    };
    let (grants, _) = setup(config, 4);
    let authorizations = grants.authorizations();
    seed(&authorizations, 6).await;

    let first = page(&authorizations, 2, 0).await;
    assert_eq!(first.len(), 2);

    let mut expiring = authorizations.find_by_id(&first[0]).await.unwrap().unwrap();
    expiring.status = Some(statuses::REVOKED.to_string());
    authorizations.update(&mut expiring).await.unwrap();

    let remaining = page(&authorizations, 10, 0).await;
    assert_eq!(remaining.len(), 5);
    assert!(!remaining.contains(&first[0]));

    assert_eq!(page(&authorizations, 2, 2).await, remaining[2..4]);
}

#[tokio::test]
async fn test_offset_pages_reflect_deletes_by_another_store() {
    let config = StoreConfig::default();
    let (grants, backend) = setup(config.clone(), 4);
    let authorizations = grants.authorizations();
    seed(&authorizations, 6).await;

    let other_store: DynDocumentStore = backend.clone();
    let other = GrantStore::new(other_store, config).unwrap().authorizations();

    let first = page(&authorizations, 2, 0).await;
    let gone = other.find_by_id(&first[0]).await.unwrap().unwrap();
    other.delete(&gone).await.unwrap();

    let remaining = page(&other, 10, 0).await;
    assert_eq!(remaining.len(), 5);
    assert_eq!(page(&authorizations, 2, 2).await, remaining[2..4]);
}

#[tokio::test]
async fn test_resume_point_continues_after_outside_deletes() {
    let config = StoreConfig::default();
    let (grants, backend) = setup(config.clone(), 4);
    let authorizations = grants.authorizations();
    seed(&authorizations, 6).await;
    let everything = page(&authorizations, 10, 0).await;

    let first = page(&authorizations, 2, 0).await;
    assert_eq!(first, everything[..2]);
    let resume = authorizations.resume_point(2).unwrap();

    let other_store: DynDocumentStore = backend.clone();
    let other = GrantStore::new(other_store, config).unwrap().authorizations();
    let gone = other.find_by_id(&first[0]).await.unwrap().unwrap();
    other.delete(&gone).await.unwrap();

    let next: Vec<String> = authorizations
        .list_from(Some(resume), Some(2), CancellationToken::new())
        .map_ok(|authorization| authorization.id().to_string())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(next, everything[2..4]);

    let from_start: Vec<String> = authorizations
        .list_from(None, None, CancellationToken::new())
        .map_ok(|authorization| authorization.id().to_string())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(from_start, everything[1..]);
}

#[tokio::test]
async fn test_cancelled_list_yields_partial_results() {
    let (grants, _) = setup(StoreConfig::default(), 2);
    let authorizations = grants.authorizations();
    for _ in 0..6 {
        authorizations
            .create(&grant("alice", "app1", statuses::VALID, authorization_types::PERMANENT))
            .await
            .unwrap();
    }

    let cancel = CancellationToken::new();
    let stream = authorizations.list(None, None, cancel.clone());
    futures_util::pin_mut!(stream);

    let mut seen = 0;
    while let Some(next) = stream.next().await {
        next.unwrap();
        seen += 1;
        if seen == 1 {
            cancel.cancel();
        }
    }
    assert_eq!(seen, 1);

    let already_cancelled: Vec<Authorization> = authorizations
        .list(None, None, cancel)
        .try_collect()
        .await
        .unwrap();
    assert!(already_cancelled.is_empty());
}

#[tokio::test]
async fn test_in_memory_query_helpers() {
    let (grants, _) = setup(StoreConfig::default(), 2);
    let authorizations = grants.authorizations();
    let with_email = grant("alice", "app1", statuses::VALID, authorization_types::PERMANENT)
        .with_scopes(["email"]);
    authorizations.create(&with_email).await.unwrap();
    authorizations
        .create(&grant("bob", "app2", statuses::INACTIVE, authorization_types::AD_HOC))
        .await
        .unwrap();
    authorizations
        .create(&grant("carol", "app2", statuses::VALID, authorization_types::AD_HOC))
        .await
        .unwrap();

    let first_with_scope = authorizations
        .get(
            |records, scope: &str| {
                records.filter(move |authorization| authorization.has_scopes(&[scope]))
            },
            "email",
        )
        .await
        .unwrap();
    assert_eq!(first_with_scope.map(|a| a.id().to_string()), Some(with_email.id().to_string()));

    let mut subjects = authorizations
        .list_with(
            |records, client: String| {
                records
                    .filter(move |authorization| authorization.application_id.as_deref() == Some(client.as_str()))
                    .filter_map(|authorization| authorization.subject)
            },
            "app2".to_string(),
        )
        .await
        .unwrap();
    subjects.sort();
    assert_eq!(subjects, vec!["bob", "carol"]);

    let err = authorizations
        .count_with(|records: std::vec::IntoIter<Authorization>| records.count())
        .unwrap_err();
    assert!(err.is_not_supported());
}

#[tokio::test]
async fn test_non_valid_records_expire_from_backend() {
    let config = StoreConfig {
        non_valid_ttl: Duration::from_nanos(1),
        ..StoreConfig::default()
    };
    let (grants, backend) = setup(config, 100);
    let authorizations = grants.authorizations();

    let mut authorization = grant("alice", "app1", statuses::VALID, authorization_types::AD_HOC);
    authorizations.create(&authorization).await.unwrap();

    authorization.status = Some(statuses::REJECTED.to_string());
    authorizations.update(&mut authorization).await.unwrap();
    assert!(authorization.ttl().is_some());

    assert!(
        authorizations
            .find_by_id(authorization.id())
            .await
            .unwrap()
            .is_none()
    );
    assert!(backend.purge_expired().await >= 1);
}
