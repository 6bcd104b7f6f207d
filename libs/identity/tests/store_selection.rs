use cws_core::CustomerId;
use cws_identity::{FileIdentityStore, IdentityStore, store_for_path};

#[tokio::test]
async fn explicit_path_selects_a_durable_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("widget").join("identity.json");

    let store = store_for_path(Some(path.clone())).unwrap();
    assert!(store.get().await.unwrap().is_none());
    store.set(&CustomerId::from("cust-env")).await.unwrap();

    let reopened = FileIdentityStore::new(&path);
    assert_eq!(
        reopened.get().await.unwrap(),
        Some(CustomerId::from("cust-env"))
    );
}

#[cfg(feature = "store_sqlite")]
#[tokio::test]
async fn sqlite_extension_selects_the_sqlite_store() {
    use cws_identity::SqliteIdentityStore;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("widget").join("identity.db");

    let store = store_for_path(Some(path.clone())).unwrap();
    store.set(&CustomerId::from("cust-db")).await.unwrap();

    let reopened = SqliteIdentityStore::open(&path).unwrap();
    assert_eq!(
        reopened.get().await.unwrap(),
        Some(CustomerId::from("cust-db"))
    );
}
