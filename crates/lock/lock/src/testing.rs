use std::time::Duration;

use crate::backend::LockBackend;
use crate::error::LockError;

const TTL: Duration = Duration::from_secs(10);

/// Run the backend contract conformance test suite.
///
/// Call this from your backend's test module with a fresh backend. Keys are
/// prefixed with `conformance:` so a shared store can be used.
///
/// # Errors
///
/// Returns an error if the backend fails a call; contract violations panic.
pub async fn run_backend_conformance_tests(backend: &dyn LockBackend) -> Result<(), LockError> {
    test_ping(backend).await?;
    test_set_if_absent_new(backend).await?;
    test_set_if_absent_existing(backend).await?;
    test_compare_and_delete_owner(backend).await?;
    test_compare_and_delete_other_owner(backend).await?;
    test_compare_and_delete_missing(backend).await?;
    test_compare_and_expire(backend).await?;
    Ok(())
}

async fn test_ping(backend: &dyn LockBackend) -> Result<(), LockError> {
    backend.ping().await
}

async fn test_set_if_absent_new(backend: &dyn LockBackend) -> Result<(), LockError> {
    let key = "conformance:set-new";
    let created = backend.set_if_absent(key, "owner-a", TTL).await?;
    assert!(created, "set_if_absent on a new key should return true");
    assert_eq!(backend.get(key).await?.as_deref(), Some("owner-a"));
    backend.compare_and_delete(key, "owner-a").await?;
    Ok(())
}

async fn test_set_if_absent_existing(backend: &dyn LockBackend) -> Result<(), LockError> {
    let key = "conformance:set-existing";
    assert!(backend.set_if_absent(key, "owner-a", TTL).await?);
    let created = backend.set_if_absent(key, "owner-b", TTL).await?;
    assert!(
        !created,
        "set_if_absent on an existing key should return false"
    );
    assert_eq!(
        backend.get(key).await?.as_deref(),
        Some("owner-a"),
        "original value should remain"
    );
    backend.compare_and_delete(key, "owner-a").await?;
    Ok(())
}

async fn test_compare_and_delete_owner(backend: &dyn LockBackend) -> Result<(), LockError> {
    let key = "conformance:delete-owner";
    assert!(backend.set_if_absent(key, "owner-a", TTL).await?);
    let deleted = backend.compare_and_delete(key, "owner-a").await?;
    assert_eq!(deleted, 1, "owner should delete its key");
    assert!(backend.get(key).await?.is_none(), "key should be gone");

    let deleted = backend.compare_and_delete(key, "owner-a").await?;
    assert_eq!(deleted, 0, "second delete should be a no-op");
    Ok(())
}

async fn test_compare_and_delete_other_owner(
    backend: &dyn LockBackend,
) -> Result<(), LockError> {
    let key = "conformance:delete-other";
    assert!(backend.set_if_absent(key, "owner-b", TTL).await?);
    let deleted = backend.compare_and_delete(key, "owner-a").await?;
    assert_eq!(deleted, 0, "non-owner must not delete the key");
    assert_eq!(backend.get(key).await?.as_deref(), Some("owner-b"));
    backend.compare_and_delete(key, "owner-b").await?;
    Ok(())
}

async fn test_compare_and_delete_missing(backend: &dyn LockBackend) -> Result<(), LockError> {
    let deleted = backend
        .compare_and_delete("conformance:delete-missing", "owner-a")
        .await?;
    assert_eq!(deleted, 0, "deleting a missing key should report 0");
    Ok(())
}

async fn test_compare_and_expire(backend: &dyn LockBackend) -> Result<(), LockError> {
    let key = "conformance:expire";
    assert!(backend.set_if_absent(key, "owner-a", TTL).await?);

    let updated = backend
        .compare_and_expire(key, "owner-a", Duration::from_secs(20))
        .await?;
    assert_eq!(updated, 1, "owner should extend its key");

    let updated = backend
        .compare_and_expire(key, "owner-b", Duration::from_secs(20))
        .await?;
    assert_eq!(updated, 0, "non-owner must not extend the key");

    let updated = backend
        .compare_and_expire("conformance:expire-missing", "owner-a", TTL)
        .await?;
    assert_eq!(updated, 0, "extending a missing key should report 0");

    backend.compare_and_delete(key, "owner-a").await?;
    Ok(())
}
