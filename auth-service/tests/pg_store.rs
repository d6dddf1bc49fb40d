#![cfg(feature = "integration")]

mod support;

use std::sync::Arc;

use anyhow::Result;
use auth_service::store::{
    CredentialChanges, CredentialStore, NewCredential, PgCredentialStore, StoreError,
};
use axum::http::{Method, StatusCode};
use common_auth::Role;
use serde_json::json;
use support::{test_pool, TestApp};
use uuid::Uuid;

fn unique_identifier(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires AUTH_TEST_DATABASE_URL"]
async fn pg_store_enforces_unique_identifier() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let store = PgCredentialStore::new(pool);
    let identifier = unique_identifier("dup");

    let created = store
        .insert(NewCredential {
            identifier: identifier.clone(),
            secret_hash: "$argon2id$placeholder".into(),
            role: Role::User,
        })
        .await?;
    assert_eq!(created.role, Role::User);

    let second = store
        .insert(NewCredential {
            identifier: identifier.clone(),
            secret_hash: "$argon2id$other".into(),
            role: Role::Admin,
        })
        .await;
    assert!(matches!(second, Err(StoreError::Conflict(found)) if found == identifier));

    store.delete(created.id).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires AUTH_TEST_DATABASE_URL"]
async fn pg_store_updates_and_deletes() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let store = PgCredentialStore::new(pool);
    let created = store
        .insert(NewCredential {
            identifier: unique_identifier("upd"),
            secret_hash: "$argon2id$placeholder".into(),
            role: Role::User,
        })
        .await?;

    let updated = store
        .update(
            created.id,
            CredentialChanges {
                role: Some(Role::Admin),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(updated.role, Role::Admin);
    assert_eq!(updated.secret_hash, created.secret_hash);

    let by_identifier = store.find_by_identifier(&created.identifier).await?;
    assert_eq!(by_identifier.map(|c| c.id), Some(created.id));

    store.delete(created.id).await?;
    assert!(store.find_by_id(created.id).await?.is_none());
    assert!(matches!(
        store.delete(created.id).await,
        Err(StoreError::NotFound(_))
    ));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires AUTH_TEST_DATABASE_URL"]
async fn login_flow_against_postgres() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let app = TestApp::with_store(Arc::new(PgCredentialStore::new(pool)));
    let identifier = unique_identifier("flow");

    let registered = app
        .send(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "identifier": identifier, "secret": "password123" })),
        )
        .await;
    assert_eq!(registered.status, StatusCode::CREATED);

    let login = app
        .send(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "identifier": identifier, "secret": "password123" })),
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);

    let id = registered.body["id"].as_str().expect("id").parse::<Uuid>()?;
    app.service.delete_credential(id).await?;
    Ok(())
}
