//! HTTP surface: `POST /mcp`, `DELETE /mcp` and `GET /health`.

use std::convert::Infallible;
use std::sync::Arc;

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{ALLOW, CONTENT_TYPE, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use tracing::debug;

use super::dispatch::{DispatchReply, Dispatcher};
use crate::protocol::{HEALTH_PATH, MCP_PATH, SESSION_HEADER};

/// Largest accepted JSON-RPC request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

fn json_response(status: StatusCode, body: Vec<u8>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn reply_response(reply: &DispatchReply) -> Response<Full<Bytes>> {
    let mut response = if reply.body.is_some() {
        json_response(reply.status, reply.body_bytes())
    } else {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = reply.status;
        response
    };
    if let Some(value) = reply.session_id.as_deref().and_then(|id| HeaderValue::from_str(id).ok()) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

fn plain(status: StatusCode, text: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(text.as_bytes())));
    *response.status_mut() = status;
    response
}

/// Route one HTTP request to the dispatcher.
pub async fn route<B>(
    dispatcher: Arc<Dispatcher>,
    request: Request<B>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let session_id = request
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let response = match (request.method(), request.uri().path()) {
        (&Method::GET, HEALTH_PATH) => {
            let report = dispatcher.health().await;
            let status =
                if report.is_healthy() { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
            json_response(status, serde_json::to_vec(&report).unwrap_or_default())
        }
        (&Method::POST, MCP_PATH) => match Limited::new(request.into_body(), MAX_BODY_BYTES).collect().await {
            Ok(body) => {
                let reply = dispatcher.handle(session_id.as_deref(), &body.to_bytes()).await;
                reply_response(&reply)
            }
            Err(e) if e.is::<LengthLimitError>() => {
                debug!(limit = MAX_BODY_BYTES, "Rejecting oversized request body");
                plain(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
            }
            Err(e) => {
                debug!(error = %e, "Failed to read request body");
                plain(StatusCode::BAD_REQUEST, "Failed to read request body")
            }
        },
        (&Method::DELETE, MCP_PATH) => reply_response(&dispatcher.terminate(session_id.as_deref()).await),
        (_, MCP_PATH) => {
            let mut response = plain(StatusCode::METHOD_NOT_ALLOWED, "Use POST for JSON-RPC requests.");
            response.headers_mut().insert(ALLOW, HeaderValue::from_static("POST, DELETE"));
            response
        }
        (_, HEALTH_PATH) => {
            let mut response = plain(StatusCode::METHOD_NOT_ALLOWED, "Use GET for health checks.");
            response.headers_mut().insert(ALLOW, HeaderValue::from_static("GET"));
            response
        }
        _ => plain(StatusCode::NOT_FOUND, "Not found"),
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{JsonRpcRequest, methods};
    use crate::service::{InstanceInfo, SessionService};
    use crate::store::MemoryStore;
    use serde_json::Value;
    use std::time::Duration;

    fn dispatcher() -> Arc<Dispatcher> {
        let service = SessionService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(InstanceInfo::new("mcp-server-1")),
            Duration::from_secs(1800),
        );
        Arc::new(Dispatcher::new(service))
    }

    fn post(session_id: Option<&str>, request: &JsonRpcRequest) -> Request<Full<Bytes>> {
        let mut builder = Request::builder().method(Method::POST).uri(MCP_PATH);
        if let Some(id) = session_id {
            builder = builder.header(SESSION_HEADER, id);
        }
        builder.body(Full::new(Bytes::from(serde_json::to_vec(request).unwrap()))).unwrap()
    }

    async fn body_json(response: Response<Full<Bytes>>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_ok() {
        let request = Request::builder().uri(HEALTH_PATH).body(Full::new(Bytes::new())).unwrap();
        let response = route(dispatcher(), request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["store"], "memory");
    }

    #[tokio::test]
    async fn test_initialize_sets_session_header() {
        let dispatcher = dispatcher();
        let response =
            route(dispatcher.clone(), post(None, &JsonRpcRequest::new(1, methods::INITIALIZE, None)))
                .await
                .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let session_id = response.headers().get(SESSION_HEADER).unwrap().to_str().unwrap().to_string();

        let response =
            route(dispatcher, post(Some(&session_id), &JsonRpcRequest::new(2, methods::PING, None)))
                .await
                .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(SESSION_HEADER).unwrap(), session_id.as_str());
    }

    #[tokio::test]
    async fn test_unknown_session_is_404() {
        let response =
            route(dispatcher(), post(Some("nope"), &JsonRpcRequest::new(2, methods::PING, None)))
                .await
                .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_wrong_method_and_path() {
        let request = Request::builder().method(Method::GET).uri(MCP_PATH).body(Full::new(Bytes::new())).unwrap();
        let response = route(dispatcher(), request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let request = Request::builder().uri("/other").body(Full::new(Bytes::new())).unwrap();
        let response = route(dispatcher(), request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_terminates_session() {
        let dispatcher = dispatcher();
        let response =
            route(dispatcher.clone(), post(None, &JsonRpcRequest::new(1, methods::INITIALIZE, None)))
                .await
                .unwrap();
        let session_id = response.headers().get(SESSION_HEADER).unwrap().clone();

        let request = Request::builder()
            .method(Method::DELETE)
            .uri(MCP_PATH)
            .header(SESSION_HEADER, session_id)
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = route(dispatcher.clone(), request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(dispatcher.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let dispatcher = dispatcher();
        let request = Request::builder()
            .method(Method::POST)
            .uri(MCP_PATH)
            .body(Full::new(Bytes::from(vec![b' '; MAX_BODY_BYTES + 1])))
            .unwrap();
        let response = route(dispatcher.clone(), request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(dispatcher.session_count().await, 0);

        let mut padded = serde_json::to_vec(&JsonRpcRequest::new(1, methods::INITIALIZE, None)).unwrap();
        padded.resize(MAX_BODY_BYTES, b' ');
        let request = Request::builder()
            .method(Method::POST)
            .uri(MCP_PATH)
            .body(Full::new(Bytes::from(padded)))
            .unwrap();
        let response = route(dispatcher, request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
