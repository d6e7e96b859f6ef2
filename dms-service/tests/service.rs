mod support;

use std::sync::Arc;

use common::errors::AppError;
use common::models::database::PASSWORD_MASK;
use common::models::{ConnectionStatus, RegisterDatabaseRequest, Vendor};
use common::utils::query_validator::MAX_QUERY_LENGTH;
use dms_service::{DatabaseService, DatabaseServiceTrait};

use support::{ctx, fake_registry, postgres, FakeBackend};

fn service() -> (DatabaseService, Arc<FakeBackend>) {
    let (registry, backend) = fake_registry();
    (DatabaseService::new(registry), backend)
}

#[tokio::test]
async fn test_register_then_query() {
    let (service, _backend) = service();

    let registered = service.register_database(&ctx(), postgres("pg1")).await.unwrap();
    assert_eq!(registered.status, ConnectionStatus::Connected);
    assert_eq!(registered.password, PASSWORD_MASK);

    let result = service.execute_query(&ctx(), "pg1", "SELECT 1").await.unwrap();
    assert_eq!(result.columns(), ["?column?"]);
    assert_eq!(result.rows()[0]["?column?"], serde_json::json!(1));
}

#[tokio::test]
async fn test_reads_are_always_masked() {
    let (service, _backend) = service();
    service.register_database(&ctx(), postgres("pg1")).await.unwrap();

    let listed = service.list_databases().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].password, PASSWORD_MASK);

    let info = service.get_database_info("pg1").await.unwrap();
    assert_eq!(info.password, PASSWORD_MASK);
    assert!(!format!("{info:?}").contains("s3cret"));
}

#[tokio::test]
async fn test_out_of_range_port_fails_before_connecting() {
    let (service, backend) = service();
    let mut db = postgres("pg1");
    db.port = 70000;

    let err = service.register_database(&ctx(), db).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(backend.connects(), 0);
    assert!(service.list_databases().await.is_empty());
}

#[tokio::test]
async fn test_missing_fields_fail_validation() {
    let (service, backend) = service();
    let mut db = postgres("pg1");
    db.password.clear();

    let err = service.register_database(&ctx(), db).await.unwrap_err();
    assert!(err.is_validation());
    assert_eq!(backend.connects(), 0);
}

#[test]
fn test_unknown_vendor_tag_never_reaches_the_service() {
    let request: RegisterDatabaseRequest = serde_json::from_value(serde_json::json!({
        "id": "m1",
        "name": "app",
        "type": "mongo",
        "host": "h",
        "username": "u",
        "password": "p"
    }))
    .unwrap();
    assert!(matches!(
        request.into_database(),
        Err(AppError::InvalidDatabaseType(tag)) if tag == "mongo"
    ));
}

#[tokio::test]
async fn test_vendor_without_adapter_is_rejected() {
    let (service, backend) = service();
    let mut db = postgres("ora");
    db.vendor = Vendor::Oracle11g;

    let err = service.register_database(&ctx(), db).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidDatabaseType(_)));
    assert_eq!(backend.connects(), 0);
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let (service, _backend) = service();
    service.register_database(&ctx(), postgres("pg1")).await.unwrap();
    let err = service
        .register_database(&ctx(), postgres("pg1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyConnected(_)));
}

#[tokio::test]
async fn test_query_input_is_validated() {
    let (service, _backend) = service();
    service.register_database(&ctx(), postgres("pg1")).await.unwrap();

    for query in ["", "   "] {
        let err = service.execute_query(&ctx(), "pg1", query).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "{query:?}");
    }

    let too_long = "x".repeat(MAX_QUERY_LENGTH + 1);
    assert!(matches!(
        service.execute_query(&ctx(), "pg1", &too_long).await,
        Err(AppError::Validation(_))
    ));

    assert!(matches!(
        service.execute_query(&ctx(), "", "SELECT 1").await,
        Err(AppError::Validation(_))
    ));
}

#[tokio::test]
async fn test_query_gate_distinguishes_unknown_from_unhealthy() {
    let (service, backend) = service();

    let err = service.execute_query(&ctx(), "pg1", "SELECT 1").await.unwrap_err();
    assert!(matches!(err, AppError::DatabaseNotFound(_)));

    service.register_database(&ctx(), postgres("pg1")).await.unwrap();
    backend.force_close("pg1");
    let err = service.execute_query(&ctx(), "pg1", "SELECT 1").await.unwrap_err();
    assert!(matches!(err, AppError::NotConnected(_)));
    assert_eq!(
        service.get_database_info("pg1").await.unwrap().status,
        ConnectionStatus::Disconnected
    );
}

#[tokio::test]
async fn test_unhealthy_connection_can_still_be_disconnected() {
    let (service, backend) = service();
    service.register_database(&ctx(), postgres("pg1")).await.unwrap();
    backend.break_ping("pg1");

    service.disconnect_database(&ctx(), "pg1").await.unwrap();
    assert!(matches!(
        service.get_database_info("pg1").await,
        Err(AppError::DatabaseNotFound(_))
    ));
    // The id can be registered again.
    service.register_database(&ctx(), postgres("pg1")).await.unwrap();
}

#[tokio::test]
async fn test_disconnect_unknown_and_empty_ids() {
    let (service, _backend) = service();
    assert!(matches!(
        service.disconnect_database(&ctx(), "nope").await,
        Err(AppError::DatabaseNotFound(_))
    ));
    assert!(matches!(
        service.disconnect_database(&ctx(), " ").await,
        Err(AppError::Validation(_))
    ));
}

#[tokio::test]
async fn test_catalog_operations() {
    let (service, _backend) = service();
    service.register_database(&ctx(), postgres("pg1")).await.unwrap();

    assert_eq!(
        service.get_tables(&ctx(), "pg1").await.unwrap(),
        vec!["orders", "users"]
    );
    assert_eq!(
        service.get_columns(&ctx(), "pg1", "users").await.unwrap(),
        vec!["id", "name"]
    );
    assert!(matches!(
        service.get_columns(&ctx(), "pg1", "").await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        service.get_tables(&ctx(), "other").await,
        Err(AppError::DatabaseNotFound(_))
    ));
}

#[tokio::test]
async fn test_shutdown_empties_the_registry() {
    let (service, backend) = service();
    for id in ["a", "b"] {
        service.register_database(&ctx(), postgres(id)).await.unwrap();
    }
    backend.fail_close("a");

    let err = service.shutdown(&ctx()).await.unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with("errors during disconnect: failed to close a:"));
    assert!(message.contains("close refused"));
    assert!(!message.contains("failed to close b"));
    assert_eq!(service.connection_count().await, 0);
}
