use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use serde_json::json;

use attack_compare_service::storage::{CounterRow, CounterStore, StoreError, TableAuth, TableClient};

use crate::test_utils::spawn_fake_server;

/// Request as seen by the fake table service
#[derive(Debug, Clone)]
struct SeenRequest {
    method: Method,
    path: String,
    if_match: Option<String>,
    version: Option<String>,
}

type Seen = Arc<Mutex<Vec<SeenRequest>>>;

fn odata_error(status: StatusCode, code: &str, message: &str) -> Response {
    let body = json!({"odata.error": {"code": code, "message": {"lang": "en-US", "value": message}}});
    (status, body.to_string()).into_response()
}

async fn fake_table(State(seen): State<Seen>, method: Method, uri: Uri, headers: HeaderMap) -> Response {
    let path = uri.path().to_string();
    seen.lock().unwrap().push(SeenRequest {
        method: method.clone(),
        path: path.clone(),
        if_match: headers.get("if-match").and_then(|v| v.to_str().ok()).map(str::to_string),
        version: headers.get("x-ms-version").and_then(|v| v.to_str().ok()).map(str::to_string),
    });

    match (method, path.as_str()) {
        (Method::POST, "/Tables") => odata_error(StatusCode::CONFLICT, "TableAlreadyExists", "exists"),
        (Method::POST, "/RateLimits") => StatusCode::CREATED.into_response(),
        (Method::PUT, _) => StatusCode::NO_CONTENT.into_response(),
        (Method::GET, p) if p.contains("RowKey='present'") => {
            let body = json!({"PartitionKey": "2024-01-01", "RowKey": "present", "Count": 4});
            (StatusCode::OK, body.to_string()).into_response()
        }
        (Method::GET, p) if p.contains("RowKey='missing'") => {
            odata_error(StatusCode::NOT_FOUND, "ResourceNotFound", "gone")
        }
        (Method::GET, p) if p.contains("RowKey='uncounted'") => {
            let body = json!({"PartitionKey": "2024-01-01", "RowKey": "uncounted"});
            (StatusCode::OK, body.to_string()).into_response()
        }
        _ => odata_error(StatusCode::FORBIDDEN, "AuthorizationFailure", "nope"),
    }
}

fn fake_client() -> (TableClient, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback(fake_table).with_state(seen.clone());
    let addr = spawn_fake_server(app);

    let client = TableClient::new(
        &format!("http://{}", addr),
        "RateLimits",
        TableAuth::Sas("sv=2019-02-02&sig=test".to_string()),
    )
    .unwrap();
    (client, seen)
}

#[tokio::test]
async fn test_existing_table_counts_as_created() {
    let (client, seen) = fake_client();

    client.ensure_table_exists().await.unwrap();
    client.ensure_table_exists().await.unwrap();

    // The second call is skipped once the table is known.
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method, Method::POST);
    assert_eq!(seen[0].version.as_deref(), Some("2019-02-02"));
}

#[tokio::test]
async fn test_get_row_reads_count() {
    let (client, _) = fake_client();

    let row = client.get_row("2024-01-01", "present").await.unwrap();
    assert_eq!(
        row,
        Some(CounterRow {
            partition: "2024-01-01".to_string(),
            key: "present".to_string(),
            count: 4,
        })
    );
}

#[tokio::test]
async fn test_get_row_absent_only_on_not_found() {
    let (client, _) = fake_client();

    assert_eq!(client.get_row("2024-01-01", "missing").await.unwrap(), None);

    let err = client.get_row("2024-01-01", "denied").await.unwrap_err();
    assert!(matches!(err, StoreError::Status { status: 403, .. }));
    assert_eq!(err.to_string(), "storage returned 403 (AuthorizationFailure): nope");
}

#[tokio::test]
async fn test_get_row_without_count_is_malformed() {
    let (client, _) = fake_client();

    assert!(matches!(
        client.get_row("2024-01-01", "uncounted").await,
        Err(StoreError::MalformedRow(_))
    ));
}

#[tokio::test]
async fn test_create_and_update_use_expected_verbs() {
    let (client, seen) = fake_client();

    client.create_row("2024-01-01", "198.51.100.4", 1).await.unwrap();
    client.update_row("2024-01-01", "198.51.100.4", 2).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].method, Method::POST);
    assert_eq!(seen[0].path, "/RateLimits");
    assert_eq!(seen[0].if_match, None);

    assert_eq!(seen[1].method, Method::PUT);
    assert_eq!(
        seen[1].path,
        "/RateLimits(PartitionKey='2024-01-01',RowKey='198.51.100.4')"
    );
    assert_eq!(seen[1].if_match.as_deref(), Some("*"));
}

#[tokio::test]
async fn test_url_syntax_in_key_stays_in_path() {
    let (client, seen) = fake_client();

    let _ = client.get_row("2024-01-01", "1.2.3.4#x?y").await;

    let seen = seen.lock().unwrap();
    assert_eq!(
        seen[0].path,
        "/RateLimits(PartitionKey='2024-01-01',RowKey='1.2.3.4%23x%3Fy')"
    );
}
