use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::{json, Value};

use attack_compare_service::config::ModelConfig;
use attack_compare_service::model::{CompletionModel, GeminiClient, ModelError};

use crate::test_utils::spawn_fake_server;

type Seen = Arc<Mutex<Vec<(String, Value)>>>;

async fn fake_gemini(State(seen): State<Seen>, uri: Uri, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    seen.lock().unwrap().push((uri.path().to_string(), body));

    let key = headers
        .get("x-goog-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    match key {
        "good" => {
            let reply = json!({"candidates": [
                {"content": {"parts": [{"text": "{\"summary\": "}, {"text": "\"up\"}"}]}},
                {"content": {"parts": [{"text": "second candidate"}]}}
            ]});
            (StatusCode::OK, reply.to_string()).into_response()
        }
        "empty" => (StatusCode::OK, json!({"candidates": []}).to_string()).into_response(),
        _ => {
            let error = json!({"error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}});
            (StatusCode::BAD_REQUEST, error.to_string()).into_response()
        }
    }
}

fn fake_client(api_key: &str) -> (GeminiClient, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback(fake_gemini).with_state(seen.clone());
    let addr = spawn_fake_server(app);

    let config = ModelConfig {
        base_url: format!("http://{}/v1beta", addr),
        ..ModelConfig::default()
    };
    (GeminiClient::new(api_key, &config).unwrap(), seen)
}

#[tokio::test]
async fn test_first_candidate_parts_are_joined() {
    let (client, seen) = fake_client("good");

    let text = client.generate("compare these").await.unwrap();
    assert_eq!(text, "{\"summary\": \"up\"}");

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].0, "/v1beta/models/gemini-2.5-flash:generateContent");
    assert_eq!(seen[0].1["contents"][0]["parts"][0]["text"], "compare these");
    assert_eq!(seen[0].1["generationConfig"]["responseMimeType"], "application/json");
}

#[tokio::test]
async fn test_provider_error_message_is_surfaced() {
    let (client, _) = fake_client("bad");

    let err = client.generate("compare these").await.unwrap_err();
    assert!(matches!(err, ModelError::Api { status: 400, .. }));
    assert_eq!(err.to_string(), "400 API key not valid");
}

#[tokio::test]
async fn test_reply_without_text_is_an_error() {
    let (client, _) = fake_client("empty");

    assert!(matches!(
        client.generate("compare these").await,
        Err(ModelError::EmptyResponse)
    ));
}
