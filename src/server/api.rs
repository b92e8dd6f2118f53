use crate::cli::ServeArgs;
use crate::models::chat::{ ChatReply, Turn };
use crate::relay::{ ChatRelay, RelayReply };

use std::error::Error;
use std::net::SocketAddr;
use axum::{
    body::Body,
    extract::{ rejection::JsonRejection, State },
    http::{ header, StatusCode },
    response::{ IntoResponse, Response },
    routing::post,
    Json,
    Router,
};
use futures::TryStreamExt;
use tower_http::cors::{ Any, CorsLayer };
use log::{ debug, info, warn, error };
use uuid::Uuid;

/// Body returned for any provider failure; details stay in the server log.
pub const UPSTREAM_ERROR_MESSAGE: &str = "Error handling chat request";

#[derive(Clone)]
pub struct AppState {
    pub relay: ChatRelay,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new().route("/api/chat", post(chat_handler)).layer(cors).with_state(state)
}

pub async fn start_http_server(
    addr: &str,
    relay: ChatRelay,
    args: &ServeArgs
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = addr.parse::<SocketAddr>()?;
    let app = router(AppState { relay });

    if args.enable_tls {
        let (cert_path, key_path) = match (&args.tls_cert_path, &args.tls_key_path) {
            (Some(cert), Some(key)) => (cert, key),
            _ => {
                error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
                return Err("TLS enabled without cert/key".into());
            }
        };
        info!("TLS enabled. Loading certificate from '{}' and key from '{}'", cert_path, key_path);
        let tls_config = axum_server::tls_rustls::RustlsConfig
            ::from_pem_file(cert_path, key_path).await?;

        info!("Starting HTTPS chat relay on: https://{}", addr);
        axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
            e
        })?;
        info!("Starting HTTP chat relay on: http://{}", addr);
        axum::serve(listener, app.into_make_service()).await?;
    }

    Ok(())
}

async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<Vec<Turn>>, JsonRejection>
) -> Response {
    let request_id = Uuid::new_v4();

    let Json(turns) = match payload {
        Ok(turns) => turns,
        Err(rejection) => {
            warn!("[{}] Rejected malformed chat payload: {}", request_id, rejection.body_text());
            return (StatusCode::BAD_REQUEST, rejection.body_text()).into_response();
        }
    };

    info!(
        "[{}] Received request payload: {}",
        request_id,
        serde_json::to_string_pretty(&turns).unwrap_or_default()
    );

    match state.relay.send_conversation(&turns).await {
        Ok(RelayReply::Text(text)) => {
            info!("[{}] Received model reply: {}", request_id, text);
            (StatusCode::OK, Json(ChatReply { text })).into_response()
        }
        Ok(RelayReply::Fragments(stream)) => {
            info!("[{}] Streaming model reply", request_id);
            let stream = stream.inspect_ok(move |fragment| {
                debug!("[{}] Forwarding fragment: {:?}", request_id, fragment);
            });
            (
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                Body::from_stream(stream),
            ).into_response()
        }
        Err(e) if e.is_client_error() => {
            warn!("[{}] Invalid conversation: {}", request_id, e);
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
        Err(e) => {
            error!("[{}] Error handling POST request: {}", request_id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, UPSTREAM_ERROR_MESSAGE).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::chat::{ BoxError, ChatClient, CompletionResponse, FragmentStream };
    use crate::llm::LlmType;
    use crate::relay::ResponseMode;
    use async_trait::async_trait;
    use axum::http::Request;
    use futures::stream;
    use std::sync::atomic::{ AtomicUsize, Ordering };
    use std::sync::Arc;
    use tower::ServiceExt;

    enum Script {
        Reply(Vec<&'static str>),
        Fail,
        BreakAfter(&'static str),
    }

    struct MockClient {
        script: Script,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatClient for MockClient {
        async fn complete(&self, _turns: &[Turn]) -> Result<CompletionResponse, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                Script::Reply(parts) => Ok(CompletionResponse { response: parts.concat() }),
                _ => Err("invalid credentials".into()),
            }
        }

        async fn stream_completion(&self, _turns: &[Turn]) -> Result<FragmentStream, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let items: Vec<Result<String, BoxError>> = match &self.script {
                Script::Reply(parts) => parts.iter().map(|p| Ok(p.to_string())).collect(),
                Script::Fail => {
                    return Err("invalid credentials".into());
                }
                Script::BreakAfter(first) => vec![Ok(first.to_string()), Err("connection reset".into())],
            };
            Ok(Box::pin(stream::iter(items)))
        }

        fn get_model(&self) -> String {
            "mock".to_string()
        }

        fn get_llm_type(&self) -> LlmType {
            LlmType::Bedrock
        }
    }

    fn app(script: Script, mode: ResponseMode) -> (Router, Arc<MockClient>) {
        let client = Arc::new(MockClient { script, calls: AtomicUsize::new(0) });
        let relay = ChatRelay::new(client.clone(), mode);
        (router(AppState { relay }), client)
    }

    fn post_chat(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.expect("read body");
        String::from_utf8(bytes.to_vec()).expect("utf-8 body")
    }

    #[tokio::test]
    async fn buffered_reply_is_json_text() {
        let (app, _) = app(Script::Reply(vec!["Hello"]), ResponseMode::Buffered);

        let resp = app.oneshot(post_chat(r#"[{"role":"user","content":"hi"}]"#)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(json, serde_json::json!({ "text": "Hello" }));
    }

    #[tokio::test]
    async fn streamed_reply_concatenates_fragments() {
        let (app, _) = app(Script::Reply(vec!["He", "llo"]), ResponseMode::Streaming);

        let resp = app.oneshot(post_chat(r#"[{"role":"user","content":"hi"}]"#)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_text(resp).await, "Hello");
    }

    #[tokio::test]
    async fn wrong_first_role_is_bad_request() {
        let (app, client) = app(Script::Reply(vec!["unused"]), ResponseMode::Buffered);

        let resp = app
            .oneshot(post_chat(r#"[{"role":"assistant","content":"hi"}]"#)).await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(resp).await.contains("must start with a user message"));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn repeated_roles_are_bad_request() {
        let (app, client) = app(Script::Reply(vec!["unused"]), ResponseMode::Streaming);

        let body = r#"[{"role":"user","content":"a"},{"role":"user","content":"b"}]"#;
        let resp = app.oneshot(post_chat(body)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(resp).await.contains("must alternate"));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_and_malformed_payloads_are_rejected() {
        let (app, client) = app(Script::Reply(vec!["unused"]), ResponseMode::Buffered);

        let resp = app.clone().oneshot(post_chat("[]")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app.oneshot(post_chat(r#"[{"role":"system","content":"x"}]"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn provider_failure_hides_details() {
        let (app, client) = app(Script::Fail, ResponseMode::Buffered);

        let resp = app.oneshot(post_chat(r#"[{"role":"user","content":"hi"}]"#)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(resp).await, UPSTREAM_ERROR_MESSAGE);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mid_stream_failure_aborts_body() {
        let (app, _) = app(Script::BreakAfter("He"), ResponseMode::Streaming);

        let resp = app.oneshot(post_chat(r#"[{"role":"user","content":"hi"}]"#)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert!(axum::body::to_bytes(resp.into_body(), usize::MAX).await.is_err());
    }

    #[tokio::test]
    async fn stream_that_fails_to_open_is_server_error() {
        let (app, client) = app(Script::Fail, ResponseMode::Streaming);

        let resp = app.oneshot(post_chat(r#"[{"role":"user","content":"hi"}]"#)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(resp).await, UPSTREAM_ERROR_MESSAGE);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_openai_stream_is_server_error() {
        use crate::llm::chat::openai::OpenAIChatClient;

        let provider = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::UNAUTHORIZED, "invalid api key") })
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let provider_addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, provider).await.unwrap();
        });

        let client = OpenAIChatClient::new(
            "sk-test".into(),
            None,
            Some(format!("http://{}/v1", provider_addr))
        ).unwrap();
        let relay = ChatRelay::new(Arc::new(client), ResponseMode::Streaming);
        let app = router(AppState { relay });

        let resp = app.oneshot(post_chat(r#"[{"role":"user","content":"hi"}]"#)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(resp).await, UPSTREAM_ERROR_MESSAGE);
    }
}
