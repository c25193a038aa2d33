use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zproxy_core::{
    Core, ModelRegistry, REQUEST_ID_HEADER, UpstreamClientConfig, UpstreamConfig, UpstreamGateway,
};

const SSE_BODY: &str = concat!(
    "data: {\"choices\":[{\"delta\":{\"content\":\"he\"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"llo\"}}]}\n\n",
    "data: [DONE]\n\n",
);

struct Proxy {
    base: String,
    shutdown: CancellationToken,
    client: wreq::Client,
}

impl Proxy {
    async fn start(upstream_base: &str, api_key: &str) -> Self {
        let shutdown = CancellationToken::new();
        let gateway = UpstreamGateway::new(&UpstreamClientConfig::default()).unwrap();
        let core = Core::new(
            Arc::new(ModelRegistry::builtin()),
            gateway,
            UpstreamConfig {
                api_key: api_key.to_string(),
                base_url: upstream_base.to_string(),
            },
            shutdown.clone(),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = core.router();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            base: format!("http://{addr}"),
            shutdown,
            client: wreq::Client::builder().build().unwrap(),
        }
    }

    async fn post(&self, route: &str, body: impl Into<String>) -> (u16, wreq::header::HeaderMap, Vec<u8>) {
        let response = self
            .client
            .post(format!("{}{route}", self.base))
            .header("content-type", "application/json")
            .body(body.into())
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await.unwrap().to_vec();
        (status, headers, body)
    }

    async fn chat(&self, body: Value) -> (u16, wreq::header::HeaderMap, Vec<u8>) {
        self.post("/v1/chat/completions", body.to_string()).await
    }
}

async fn upstream_with(template: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(template)
        .mount(&server)
        .await;
    server
}

async fn forwarded_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}

fn error_message(body: &[u8]) -> String {
    let value: Value = serde_json::from_slice(body).unwrap();
    value["error"].as_str().unwrap().to_string()
}

fn user_chat(model: &str) -> Value {
    json!({"model": model, "messages": [{"role": "user", "content": "hi"}]})
}

#[tokio::test]
async fn invalid_requests_never_reach_upstream() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;
    let proxy = Proxy::start(&upstream.uri(), "k").await;

    let cases = [
        ("{not json", "Invalid JSON: "),
        ("[]", "Invalid JSON: "),
        (r#"{"messages":[{"role":"user"}]}"#, "model is required"),
        (r#"{"model":"GLM-4.6"}"#, "messages is required and must be non-empty"),
        (
            r#"{"model":"GLM-4.6","messages":[]}"#,
            "messages is required and must be non-empty",
        ),
        (
            r#"{"model":"GLM-4.6","messages":["hi"]}"#,
            "message 0 must be an object",
        ),
        (
            r#"{"model":"GLM-4.6","messages":[{"role":"user"},{"content":"x"}]}"#,
            "message 1 requires a role",
        ),
        (
            r#"{"model":"GLM-4.6","messages":[{"role":"wizard"}]}"#,
            "message 0 has invalid role: wizard",
        ),
    ];

    for (body, expected) in cases {
        let (status, _, response) = proxy.post("/v1/chat/completions", body).await;
        assert_eq!(status, 400, "{body}");
        let message = error_message(&response);
        assert!(message.starts_with(expected), "{body}: {message}");
    }
}

#[tokio::test]
async fn unknown_model_is_404_with_original_name() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;
    let proxy = Proxy::start(&upstream.uri(), "k").await;

    let (status, _, body) = proxy.chat(user_chat("GPT-Unknown")).await;
    assert_eq!(status, 404);
    assert_eq!(error_message(&body), "model 'GPT-Unknown' not found");

    let (status, _, body) = proxy.chat(user_chat(" GLM-4.6 ")).await;
    assert_eq!(status, 404);
    assert_eq!(error_message(&body), "model ' GLM-4.6 ' not found");
}

#[tokio::test]
async fn forwards_lowercase_model_with_thinking_and_key() {
    let upstream = upstream_with(
        ResponseTemplate::new(200).set_body_raw(r#"{"id":"x","choices":[]}"#, "application/json"),
    )
    .await;
    let proxy = Proxy::start(&upstream.uri(), "secret-key").await;

    for model in ["GLM-4.6", "glm-4.6", "Glm-4.6"] {
        let (status, _, _) = proxy.chat(user_chat(model)).await;
        assert_eq!(status, 200);
    }

    let requests = upstream.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    for request in &requests {
        assert_eq!(
            request.headers.get("authorization").unwrap(),
            "Bearer secret-key"
        );
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(body["model"], "glm-4.6");
        assert_eq!(body["thinking"], json!({"type": "enabled"}));
        assert_eq!(body["messages"], json!([{"role": "user", "content": "hi"}]));
    }
}

#[tokio::test]
async fn empty_api_key_sends_no_authorization() {
    let upstream = upstream_with(
        ResponseTemplate::new(200).set_body_raw("{}", "application/json"),
    )
    .await;
    let proxy = Proxy::start(&upstream.uri(), "").await;

    let (status, _, _) = proxy.chat(user_chat("GLM-4.5")).await;
    assert_eq!(status, 200);
    let requests = upstream.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn tool_stream_only_for_streaming_tool_calls_on_capable_models() {
    let upstream = upstream_with(
        ResponseTemplate::new(200).set_body_raw(SSE_BODY, "text/event-stream"),
    )
    .await;
    let proxy = Proxy::start(&upstream.uri(), "k").await;
    let tools = json!([{"type": "function", "function": {"name": "lookup"}}]);

    let cases = [
        (json!({"model": "GLM-4.6", "stream": true, "tools": tools}), true),
        (json!({"model": "GLM-4.7", "stream": true, "tools": tools}), true),
        (json!({"model": "GLM-4.6", "stream": false, "tools": tools}), false),
        (json!({"model": "GLM-4.6", "tools": tools}), false),
        (json!({"model": "GLM-4.6", "stream": true, "tools": []}), false),
        (json!({"model": "GLM-4.6", "stream": true}), false),
        (json!({"model": "GLM-4.5", "stream": true, "tools": tools}), false),
    ];
    for (mut body, _) in cases.clone() {
        body["messages"] = json!([{"role": "user", "content": "hi"}]);
        let (status, _, _) = proxy.chat(body).await;
        assert_eq!(status, 200);
    }

    let forwarded = forwarded_bodies(&upstream).await;
    assert_eq!(forwarded.len(), cases.len());
    for ((request, expected), body) in cases.iter().zip(&forwarded) {
        assert_eq!(
            body.get("tool_stream") == Some(&Value::Bool(true)),
            *expected,
            "{request}"
        );
        if !expected {
            assert!(body.get("tool_stream").is_none(), "{request}");
        }
    }
}

#[tokio::test]
async fn streaming_body_is_relayed_verbatim() {
    let upstream = upstream_with(
        ResponseTemplate::new(200).set_body_raw(SSE_BODY, "text/event-stream"),
    )
    .await;
    let proxy = Proxy::start(&upstream.uri(), "k").await;

    let mut request = user_chat("GLM-4.6");
    request["stream"] = json!(true);
    let (status, headers, body) = proxy.post("/api/chat", request.to_string()).await;

    assert_eq!(status, 200);
    assert_eq!(String::from_utf8(body).unwrap(), SSE_BODY);
    assert!(
        headers["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(headers["x-accel-buffering"], "no");
    assert!(headers.get(REQUEST_ID_HEADER).is_some());
}

#[tokio::test]
async fn non_streaming_body_and_headers_pass_through() {
    let payload = r#"{"id":"chatcmpl-1","choices":[{"message":{"role":"assistant","content":"ok"}}]}"#;
    let upstream = upstream_with(
        ResponseTemplate::new(200)
            .insert_header("x-ratelimit-remaining", "41")
            .set_body_raw(payload, "application/json"),
    )
    .await;
    let proxy = Proxy::start(&upstream.uri(), "k").await;

    let mut request = user_chat("GLM-4.6");
    request["stream"] = json!(false);
    let (status, headers, body) = proxy.chat(request).await;

    assert_eq!(status, 200);
    assert_eq!(body, payload.as_bytes());
    assert_eq!(headers["content-type"], "application/json");
    assert_eq!(headers["x-ratelimit-remaining"], "41");
    assert!(headers.get("x-accel-buffering").is_none());
}

#[tokio::test]
async fn missing_upstream_content_type_follows_stream_flag() {
    let upstream = upstream_with(ResponseTemplate::new(200).set_body_bytes(SSE_BODY.as_bytes())).await;
    let proxy = Proxy::start(&upstream.uri(), "k").await;

    let (_, headers, body) = proxy.chat(user_chat("GLM-4.6")).await;
    assert_eq!(headers["content-type"], "text/event-stream");
    assert_eq!(body, SSE_BODY.as_bytes());

    let mut request = user_chat("GLM-4.6");
    request["stream"] = json!(false);
    let (_, headers, _) = proxy.chat(request).await;
    assert_eq!(headers["content-type"], "application/json");
}

#[tokio::test]
async fn upstream_error_status_is_passed_through() {
    let payload = r#"{"error":{"code":"1113","message":"Insufficient balance"}}"#;
    let upstream = upstream_with(
        ResponseTemplate::new(429).set_body_raw(payload, "application/json"),
    )
    .await;
    let proxy = Proxy::start(&upstream.uri(), "k").await;

    let (status, _, body) = proxy.chat(user_chat("GLM-4.6")).await;
    assert_eq!(status, 429);
    assert_eq!(body, payload.as_bytes());
}

#[tokio::test]
async fn unreachable_upstream_is_502() {
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = closed.local_addr().unwrap();
    drop(closed);
    let proxy = Proxy::start(&format!("http://{addr}"), "k").await;

    let (status, headers, body) = proxy.chat(user_chat("GLM-4.6")).await;
    assert_eq!(status, 502);
    assert_eq!(error_message(&body), "Failed to connect to upstream server");
    assert!(headers.get(REQUEST_ID_HEADER).is_some());
}

#[tokio::test]
async fn shutdown_while_waiting_on_upstream_is_499() {
    let upstream = upstream_with(
        ResponseTemplate::new(200)
            .set_delay(Duration::from_secs(10))
            .set_body_raw("{}", "application/json"),
    )
    .await;
    let proxy = Arc::new(Proxy::start(&upstream.uri(), "k").await);

    let pending = {
        let proxy = proxy.clone();
        tokio::spawn(async move { proxy.chat(user_chat("GLM-4.6")).await })
    };
    tokio::time::sleep(Duration::from_millis(300)).await;
    proxy.shutdown.cancel();

    let (status, _, body) = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, 499);
    assert_eq!(error_message(&body), "request canceled");
}

#[tokio::test]
async fn identical_requests_produce_identical_upstream_bodies() {
    let upstream = upstream_with(
        ResponseTemplate::new(200).set_body_raw("{}", "application/json"),
    )
    .await;
    let proxy = Proxy::start(&upstream.uri(), "k").await;

    let request = json!({
        "model": "glm-4.7",
        "stream": true,
        "temperature": 0.2,
        "tools": [{"type": "function", "function": {"name": "f"}}],
        "messages": [{"role": "system", "content": "be brief"}, {"role": "user", "content": "hi"}],
    });
    let (_, first_headers, _) = proxy.chat(request.clone()).await;
    let (_, second_headers, _) = proxy.chat(request).await;

    let forwarded = forwarded_bodies(&upstream).await;
    assert_eq!(forwarded.len(), 2);
    assert_eq!(forwarded[0], forwarded[1]);
    assert_eq!(forwarded[0]["temperature"], json!(0.2));
    assert_ne!(
        first_headers[REQUEST_ID_HEADER],
        second_headers[REQUEST_ID_HEADER]
    );
}

const SSE_HEAD: &[u8] =
    b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n";

/// Hand-driven upstream: one connection, whose lifetime the test observes.
async fn bind_raw_upstream() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    (listener, base)
}

/// Accepts one connection and reads a complete request (head and body) off it.
async fn accept_request(listener: &TcpListener) -> (TcpStream, String) {
    let (mut socket, _) = listener.accept().await.unwrap();
    let mut received = Vec::new();
    let mut scratch = [0u8; 4096];
    loop {
        let n = socket.read(&mut scratch).await.unwrap();
        assert!(n > 0, "connection closed before a full request arrived");
        received.extend_from_slice(&scratch[..n]);
        let Some(head_end) = received.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&received[..head_end]).to_ascii_lowercase();
        let body_len = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if received.len() >= head_end + 4 + body_len {
            return (socket, String::from_utf8_lossy(&received).into_owned());
        }
    }
}

fn chunked(frame: &[u8]) -> Vec<u8> {
    let mut out = format!("{:x}\r\n", frame.len()).into_bytes();
    out.extend_from_slice(frame);
    out.extend_from_slice(b"\r\n");
    out
}

/// Waits for the proxy to close its side. With `frame`, keeps streaming that
/// frame meanwhile, like a generation still in progress.
async fn upstream_closed_within(socket: &mut TcpStream, frame: Option<&[u8]>, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    let mut scratch = [0u8; 1024];
    while tokio::time::Instant::now() < deadline {
        tokio::select! {
            read = socket.read(&mut scratch) => {
                if matches!(read, Ok(0) | Err(_)) {
                    return true;
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(50)) => {
                if let Some(frame) = frame
                    && socket.write_all(&chunked(frame)).await.is_err()
                {
                    return true;
                }
            }
        }
    }
    false
}

#[tokio::test]
async fn client_gone_before_upstream_headers_closes_upstream_call() {
    let (upstream, base) = bind_raw_upstream().await;
    let proxy = Arc::new(Proxy::start(&base, "k").await);

    let pending = {
        let proxy = proxy.clone();
        tokio::spawn(async move { proxy.chat(user_chat("GLM-4.6")).await })
    };
    let (mut socket, request) = accept_request(&upstream).await;
    assert!(request.starts_with("POST /chat/completions"), "{request}");

    // The upstream never answers; the caller hangs up instead.
    pending.abort();

    assert!(
        upstream_closed_within(&mut socket, None, Duration::from_secs(5)).await,
        "upstream call outlived the caller"
    );
    assert!(!proxy.shutdown.is_cancelled());
}

#[tokio::test]
async fn client_gone_mid_stream_closes_upstream_call() {
    let (upstream, base) = bind_raw_upstream().await;
    let proxy = Proxy::start(&base, "k").await;
    let client = wreq::Client::builder().build().unwrap();

    let mut request = user_chat("GLM-4.6");
    request["stream"] = json!(true);
    let call = tokio::spawn(
        client
            .post(format!("{}/v1/chat/completions", proxy.base))
            .header("content-type", "application/json")
            .body(request.to_string())
            .send(),
    );

    let (mut socket, _) = accept_request(&upstream).await;
    let frame: &[u8] = b"data: {\"choices\":[{\"delta\":{\"content\":\"he\"}}]}\n\n";
    socket.write_all(SSE_HEAD).await.unwrap();
    socket.write_all(&chunked(frame)).await.unwrap();

    let response = call.await.unwrap().unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let mut body = response.bytes_stream();
    let first = body.next().await.unwrap().unwrap();
    assert!(frame.starts_with(&first), "unexpected first chunk {first:?}");

    drop(body);
    drop(client);

    assert!(
        upstream_closed_within(&mut socket, Some(frame), Duration::from_secs(5)).await,
        "relay kept reading upstream after the caller left"
    );
    assert!(!proxy.shutdown.is_cancelled());
}
