//! Postgres credential-store tests.
//!
//! Require a live database; run with:
//! `DATABASE_URL=postgres://... cargo test -- --ignored`

use chrono::{Duration, Utc};
use uuid::Uuid;

use wayline_server::store::{create_pool, run_migrations, CredentialStore, PgCredentialStore};

async fn store_with_admin() -> (PgCredentialStore, Uuid) {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for ignored tests");
    let pool = create_pool(&url).await.unwrap();
    run_migrations(&pool).await.unwrap();

    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO admins (id, email, role, password_hash)
         VALUES ($1, $2, 'operator', 'x')",
    )
    .bind(id)
    .bind(format!("{id}@wayline.test"))
    .execute(&pool)
    .await
    .unwrap();

    (PgCredentialStore::new(pool), id)
}

#[tokio::test]
#[ignore]
async fn test_increment_is_atomic_under_concurrency() {
    let (store, id) = store_with_admin().await;

    let (a, b, c) = tokio::join!(
        store.increment_failed_attempts(id),
        store.increment_failed_attempts(id),
        store.increment_failed_attempts(id),
    );
    let mut counts = [a.unwrap(), b.unwrap(), c.unwrap()];
    counts.sort_unstable();
    assert_eq!(counts, [1, 2, 3]);
}

#[tokio::test]
#[ignore]
async fn test_consume_backup_code_is_first_wins() {
    let (store, id) = store_with_admin().await;
    store
        .set_backup_codes(id, &["d1".into(), "d2".into()])
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        store.consume_backup_code(id, "d1"),
        store.consume_backup_code(id, "d1"),
    );
    assert_eq!(
        [a.unwrap(), b.unwrap()].iter().filter(|ok| **ok).count(),
        1
    );
    assert!(store.consume_backup_code(id, "d2").await.unwrap());
}

#[tokio::test]
#[ignore]
async fn test_lockout_roundtrip() {
    let (store, id) = store_with_admin().await;

    store.increment_failed_attempts(id).await.unwrap();
    store
        .set_lockout(id, Some(Utc::now() + Duration::minutes(15)))
        .await
        .unwrap();

    let admin = store.find_by_id(id).await.unwrap().unwrap();
    assert!(admin.is_locked(Utc::now()));
    assert_eq!(admin.failed_attempts, 0);

    store.set_lockout(id, None).await.unwrap();
    let admin = store.find_by_id(id).await.unwrap().unwrap();
    assert!(!admin.is_locked(Utc::now()));
}
