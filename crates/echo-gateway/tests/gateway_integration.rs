// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Gateway in front of a real echo runtime, both on ephemeral ports

use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use echo_gateway::{ApiServer, Config};
use echo_runtime::proto::echo_service_server::{EchoService, EchoServiceServer};
use echo_runtime::{RuntimeConfig, RuntimeServer, ShutdownController, StringMessage};
use futures::Stream;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, Response, StatusCode, header};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Status, Streaming};

type HttpClient = Client<HttpConnector, Full<Bytes>>;

struct TestStack {
    gateway: SocketAddr,
    http: HttpClient,
    controller: ShutdownController,
}

async fn start_runtime(config: RuntimeConfig, controller: &ShutdownController) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(RuntimeServer::new(config).serve(listener, controller.clone()));
    addr
}

async fn start_gateway(rpc_endpoint: SocketAddr, controller: &ShutdownController) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let config = Config::default()
        .with_rpc_endpoint(rpc_endpoint.to_string())
        .with_request_timeout(Duration::from_secs(5))
        .with_docs_file(Some(PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/docs/echo_service.swagger.json"))));
    let server = ApiServer::new(config, controller.subscribe()).unwrap();
    tokio::spawn(server.serve(listener));
    addr
}

async fn start_stack(runtime: RuntimeConfig) -> TestStack {
    let controller = ShutdownController::new();
    let rpc = start_runtime(runtime, &controller).await;
    let gateway = start_gateway(rpc, &controller).await;

    TestStack {
        gateway,
        http: Client::builder(TokioExecutor::new()).build_http(),
        controller,
    }
}

impl TestStack {
    async fn send(&self, method: Method, path: &str, body: &str) -> Response<hyper::body::Incoming> {
        let request = Request::builder()
            .method(method)
            .uri(format!("http://{}{}", self.gateway, path))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap();
        timeout(Duration::from_secs(10), self.http.request(request)).await.unwrap().unwrap()
    }
}

impl Drop for TestStack {
    fn drop(&mut self) {
        self.controller.shutdown();
    }
}

async fn body_text(response: Response<hyper::body::Incoming>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn fast_runtime() -> RuntimeConfig {
    RuntimeConfig::default().with_repeat_count(5).with_stream_interval(Duration::ZERO)
}

#[tokio::test]
async fn test_post_echo_returns_json_message() {
    let stack = start_stack(fast_runtime()).await;

    let response = stack.send(Method::POST, "/v1/example/echo", r#"{"value":"hi"}"#).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");

    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body, serde_json::json!({"value": "hi"}));
}

#[tokio::test]
async fn test_get_echo_uses_path_parameter() {
    let stack = start_stack(fast_runtime()).await;

    let response = stack.send(Method::GET, "/v1/example/echo/hello", "").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, r#"{"value":"hello"}"#);
}

#[tokio::test]
async fn test_server_stream_renders_ndjson_lines() {
    let stack = start_stack(fast_runtime()).await;

    let response = stack.send(Method::POST, "/v1/example/echo/stream", r#"{"value":"y"}"#).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/x-ndjson");

    let text = body_text(response).await;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines, vec![r#"{"value":"y"}"#; 5]);
}

#[tokio::test]
async fn test_server_stream_with_zero_repeats_is_empty() {
    let stack = start_stack(fast_runtime().with_repeat_count(0)).await;

    let response = stack.send(Method::GET, "/v1/example/echo/z/stream", "").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "");
}

#[tokio::test]
async fn test_first_streamed_line_arrives_before_completion() {
    let runtime = RuntimeConfig::default().with_repeat_count(5).with_stream_interval(Duration::from_secs(60));
    let stack = start_stack(runtime).await;

    let response = stack.send(Method::GET, "/v1/example/echo/slow/stream", "").await;
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body();
    let frame = timeout(Duration::from_secs(5), body.frame()).await.unwrap().unwrap().unwrap();
    assert_eq!(frame.into_data().unwrap(), Bytes::from_static(b"{\"value\":\"slow\"}\n"));
}

type ResponseStream = Pin<Box<dyn Stream<Item = Result<StringMessage, Status>> + Send>>;

/// Runtime stand-in whose server streams send one message, then report when
/// the gateway stops listening
#[derive(Clone)]
struct DisconnectRecorder {
    disconnected: mpsc::UnboundedSender<String>,
}

#[tonic::async_trait]
impl EchoService for DisconnectRecorder {
    type EchoServerStreamStream = ResponseStream;
    type EchoBiDiStreamStream = ResponseStream;

    async fn echo(&self, request: tonic::Request<StringMessage>) -> Result<tonic::Response<StringMessage>, Status> {
        Ok(tonic::Response::new(request.into_inner()))
    }

    async fn echo_server_stream(&self, request: tonic::Request<StringMessage>) -> Result<tonic::Response<Self::EchoServerStreamStream>, Status> {
        let message = request.into_inner();
        let disconnected = self.disconnected.clone();
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(async move {
            let value = message.value.clone();
            if tx.send(Ok(message)).await.is_ok() {
                tx.closed().await;
            }
            let _ = disconnected.send(value);
        });

        let responses: ResponseStream = Box::pin(futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }));
        Ok(tonic::Response::new(responses))
    }

    async fn echo_client_stream(&self, _request: tonic::Request<Streaming<StringMessage>>) -> Result<tonic::Response<StringMessage>, Status> {
        Err(Status::unimplemented("not recorded"))
    }

    async fn echo_bi_di_stream(&self, _request: tonic::Request<Streaming<StringMessage>>) -> Result<tonic::Response<Self::EchoBiDiStreamStream>, Status> {
        Err(Status::unimplemented("not recorded"))
    }
}

#[tokio::test]
async fn test_client_disconnect_stops_runtime_stream() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let rpc = listener.local_addr().unwrap();
    let (disconnected, mut recorded) = mpsc::unbounded_channel();
    tokio::spawn(
        Server::builder()
            .add_service(EchoServiceServer::new(DisconnectRecorder { disconnected }))
            .serve_with_incoming(TcpListenerStream::new(listener)),
    );

    let controller = ShutdownController::new();
    let gateway = start_gateway(rpc, &controller).await;

    let mut socket = TcpStream::connect(gateway).await.unwrap();
    socket
        .write_all(b"GET /v1/example/echo/gone/stream HTTP/1.1\r\nHost: gateway\r\n\r\n")
        .await
        .unwrap();

    // Read until the first NDJSON line has arrived, then hang up mid-stream
    let mut received = Vec::new();
    let mut chunk = [0u8; 1024];
    while !String::from_utf8_lossy(&received).contains("{\"value\":\"gone\"}") {
        let read = timeout(Duration::from_secs(5), socket.read(&mut chunk)).await.unwrap().unwrap();
        assert!(read > 0, "gateway closed before the first line");
        received.extend_from_slice(&chunk[..read]);
    }
    drop(socket);

    let value = timeout(Duration::from_secs(5), recorded.recv()).await.expect("runtime stream kept running").unwrap();
    assert_eq!(value, "gone");
    controller.shutdown();
}

#[tokio::test]
async fn test_gateway_shutdown_ends_open_streams() {
    let runtime_controller = ShutdownController::new();
    let runtime = RuntimeConfig::default().with_repeat_count(5).with_stream_interval(Duration::from_secs(60));
    let rpc = start_runtime(runtime, &runtime_controller).await;

    let gateway_controller = ShutdownController::new();
    let gateway = start_gateway(rpc, &gateway_controller).await;
    let http: HttpClient = Client::builder(TokioExecutor::new()).build_http();

    let request = Request::builder()
        .method(Method::GET)
        .uri(format!("http://{}/v1/example/echo/open/stream", gateway))
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = timeout(Duration::from_secs(10), http.request(request)).await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body();
    let first = timeout(Duration::from_secs(5), body.frame()).await.unwrap().unwrap().unwrap();
    assert_eq!(first.into_data().unwrap(), Bytes::from_static(b"{\"value\":\"open\"}\n"));

    gateway_controller.shutdown();

    // The runtime is still up; only the gateway's shutdown can end the stream this soon
    let rest = timeout(Duration::from_secs(5), body.collect()).await.unwrap().unwrap().to_bytes();
    let marker: serde_json::Value = serde_json::from_slice(rest.trim_ascii_end()).unwrap();
    assert_eq!(marker["error"]["code"], 1);
    runtime_controller.shutdown();
}

#[tokio::test]
async fn test_unsupported_shapes_answer_501() {
    let stack = start_stack(fast_runtime()).await;

    for path in ["/v1/example/echo/client-stream", "/v1/example/echo/bidi"] {
        let response = stack.send(Method::POST, path, r#"{"value":"x"}"#).await;
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/problem+json");
    }
}

#[tokio::test]
async fn test_routing_errors() {
    let stack = start_stack(fast_runtime()).await;

    assert_eq!(stack.send(Method::GET, "/v1/example/nothing", "").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(stack.send(Method::DELETE, "/v1/example/echo", "").await.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(stack.send(Method::POST, "/v1/example/echo", "{oops").await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_docs_route_serves_swagger_document() {
    let stack = start_stack(fast_runtime()).await;

    let response = stack.send(Method::GET, "/swagger", "").await;
    assert_eq!(response.status(), StatusCode::OK);

    let document: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(document["swagger"], "2.0");
    assert!(document["paths"]["/v1/example/echo"].is_object());
}

#[tokio::test]
async fn test_unreachable_runtime_is_service_unavailable() {
    // Reserve a port and release it so nothing is listening there
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();

    let controller = ShutdownController::new();
    let gateway = start_gateway(closed, &controller).await;
    let http: HttpClient = Client::builder(TokioExecutor::new()).build_http();

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("http://{}/v1/example/echo", gateway))
        .body(Full::new(Bytes::from_static(br#"{"value":"anyone?"}"#)))
        .unwrap();
    let response = timeout(Duration::from_secs(10), http.request(request)).await.unwrap().unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    controller.shutdown();
}
