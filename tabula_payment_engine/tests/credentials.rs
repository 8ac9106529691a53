use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tabula_payment_engine::{
    credentials::{
        CredentialError,
        CredentialManager,
        RefreshedToken,
        Sealer,
        SecretMaterial,
        TokenRefresher,
    },
    db_types::ProviderId,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    SqliteLedger,
};

mod support;

struct CountingRefresher {
    calls: AtomicUsize,
}

#[async_trait]
impl TokenRefresher for CountingRefresher {
    async fn refresh(
        &self,
        _provider: &ProviderId,
        _material: &SecretMaterial,
    ) -> Result<RefreshedToken, CredentialError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Simulate a slow token endpoint so concurrent callers pile up on the lock.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        Ok(RefreshedToken {
            access_token: "fresh-token".to_string(),
            refresh_token: Some("next-refresh-token".to_string()),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }
}

fn stale_oauth_material() -> SecretMaterial {
    SecretMaterial::OAuth2 {
        client_id: "client".to_string(),
        client_secret: "shhh".to_string(),
        access_token: "stale-token".to_string(),
        refresh_token: "refresh-token".to_string(),
        webhook_secret: "whsec_vantage".to_string(),
    }
}

async fn new_store() -> SqliteLedger {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteLedger::new(url, 5).await.expect("Error creating database")
}

#[tokio::test]
async fn concurrent_callers_trigger_exactly_one_refresh() {
    let store = new_store().await;
    let provider = ProviderId::from("vantage");
    let refresher = Arc::new(CountingRefresher { calls: AtomicUsize::new(0) });
    let manager = CredentialManager::new(store, Sealer::new(support::TEST_KEY))
        .with_refresher(provider.clone(), refresher.clone());
    // Stored token expired an hour ago.
    manager
        .store_material(&provider, &stale_oauth_material(), Some(Utc::now() - Duration::hours(1)))
        .await
        .expect("Error storing credential");
    let mut tasks = Vec::new();
    for _ in 0..10 {
        let manager = manager.clone();
        let provider = provider.clone();
        tasks.push(tokio::spawn(async move { manager.get_valid_credential(&provider).await }));
    }
    for task in tasks {
        let credential = task.await.unwrap().expect("credential fetch failed");
        assert_eq!(credential.access_token(), Some("fresh-token"));
    }
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1, "only the winner may hit the token endpoint");
}

#[tokio::test]
async fn fresh_tokens_skip_the_endpoint_entirely() {
    let store = new_store().await;
    let provider = ProviderId::from("vantage");
    let refresher = Arc::new(CountingRefresher { calls: AtomicUsize::new(0) });
    let manager = CredentialManager::new(store, Sealer::new(support::TEST_KEY))
        .with_refresher(provider.clone(), refresher.clone());
    manager
        .store_material(&provider, &stale_oauth_material(), Some(Utc::now() + Duration::hours(2)))
        .await
        .expect("Error storing credential");
    let credential = manager.get_valid_credential(&provider).await.expect("credential fetch failed");
    assert_eq!(credential.access_token(), Some("stale-token"));
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn refresh_without_a_refresher_fails_cleanly() {
    let store = new_store().await;
    let provider = ProviderId::from("vantage");
    let manager = CredentialManager::new(store, Sealer::new(support::TEST_KEY));
    manager
        .store_material(&provider, &stale_oauth_material(), Some(Utc::now() - Duration::hours(1)))
        .await
        .expect("Error storing credential");
    let err = manager.get_valid_credential(&provider).await.unwrap_err();
    assert!(matches!(err, CredentialError::RefreshUnsupported(_)));
}

#[tokio::test]
async fn missing_credentials_are_not_found() {
    let store = new_store().await;
    let manager = CredentialManager::new(store, Sealer::new(support::TEST_KEY));
    let err = manager.get_valid_credential(&ProviderId::from("meridian")).await.unwrap_err();
    assert!(matches!(err, CredentialError::NotFound(_)));
}
