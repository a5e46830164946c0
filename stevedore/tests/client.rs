//! Container client tests against a scripted fake runtime daemon.

#![cfg(unix)]

use std::path::PathBuf;

use tokio::io::BufReader;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

use stevedore::runtime::ContainerClient;
use stevedore_shared::protocol::{self, BindMountMode, BindMountSpec, Request, Response, ResponseData};
use stevedore_shared::{AgentError, Transport};

struct FakeRuntime {
    socket_path: PathBuf,
    _dir: tempfile::TempDir,
    listener: UnixListener,
    /// Requests observed by the fake, in arrival order.
    seen: mpsc::UnboundedReceiver<Request>,
    seen_tx: mpsc::UnboundedSender<Request>,
}

impl FakeRuntime {
    fn bind() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("runtime.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();
        let (seen_tx, seen) = mpsc::unbounded_channel();
        Self {
            socket_path,
            _dir: dir,
            listener,
            seen,
            seen_tx,
        }
    }

    fn client(&self) -> ContainerClient {
        ContainerClient::new(Transport::Unix {
            socket_path: self.socket_path.clone(),
        })
    }

    /// Accept one connection and answer requests from the given script,
    /// closing the connection when the script runs out.
    async fn serve_one(&mut self, responses: Vec<Response>) {
        let (stream, _) = self.listener.accept().await.unwrap();
        serve_connection(stream, responses, self.seen_tx.clone()).await;
    }

    /// Accept one connection and drop it without answering anything.
    async fn refuse_one(&mut self) {
        let (stream, _) = self.listener.accept().await.unwrap();
        drop(stream);
    }
}

async fn serve_connection(
    stream: UnixStream,
    responses: Vec<Response>,
    seen: mpsc::UnboundedSender<Request>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    for response in responses {
        let request = match protocol::read_request(&mut reader).await {
            Ok(Some(request)) => request,
            _ => return,
        };
        let _ = seen.send(request);
        if protocol::write_response(&mut write_half, &response)
            .await
            .is_err()
        {
            return;
        }
    }
}

fn created(handle: &str) -> Response {
    Response::ok_with_data(ResponseData::Created {
        handle: handle.to_string(),
    })
}

#[tokio::test]
async fn create_resolves_mount_defaults_and_stores_handle() {
    let mut runtime = FakeRuntime::bind();
    let client = runtime.client();

    let server = tokio::spawn(async move {
        runtime.serve_one(vec![created("h-1")]).await;
        runtime.seen.recv().await.unwrap()
    });

    let mounts = vec![
        BindMountSpec::new("/host/app"),
        BindMountSpec::new("/host/cache")
            .dst_path("/tmp/cache")
            .mode(BindMountMode::ReadWrite),
    ];
    let handle = client.create(&mounts).await.unwrap();
    assert_eq!(handle.as_str(), "h-1");
    assert_eq!(client.handle().unwrap().as_str(), "h-1");

    let request = server.await.unwrap();
    let Request::Create { bind_mounts } = request else {
        panic!("expected create, got {request:?}");
    };
    assert_eq!(bind_mounts.len(), 2);
    // Unspecified destination mirrors the source; unspecified mode is ro.
    assert_eq!(bind_mounts[0].dst_path, "/host/app");
    assert_eq!(bind_mounts[0].mode, BindMountMode::ReadOnly);
    assert_eq!(bind_mounts[1].dst_path, "/tmp/cache");
    assert_eq!(bind_mounts[1].mode, BindMountMode::ReadWrite);
}

#[tokio::test]
async fn retries_after_dropped_connection() {
    let mut runtime = FakeRuntime::bind();
    let client = runtime.client();

    let server = tokio::spawn(async move {
        runtime.refuse_one().await;
        runtime.serve_one(vec![Response::ok()]).await;
    });

    let request = Request::Stop {
        handle: "h-1".to_string(),
    };
    let data = client.call_with_retry("app", &request).await.unwrap();
    assert!(data.is_none());
    server.await.unwrap();
}

#[tokio::test]
async fn error_response_is_not_retried() {
    let mut runtime = FakeRuntime::bind();
    let client = runtime.client();

    let server = tokio::spawn(async move {
        runtime
            .serve_one(vec![Response::error("no such container")])
            .await;
    });

    let request = Request::Stop {
        handle: "h-1".to_string(),
    };
    let err = client.call_with_retry("app", &request).await.unwrap_err();
    assert!(matches!(err, AgentError::Protocol(msg) if msg.contains("no such container")));
    server.await.unwrap();
}

#[tokio::test]
async fn nonzero_script_exit_carries_output() {
    let mut runtime = FakeRuntime::bind();
    let client = runtime.client();

    let server = tokio::spawn(async move {
        runtime
            .serve_one(vec![
                created("h-1"),
                Response::ok_with_data(ResponseData::Run {
                    exit_status: 42,
                    stdout: "partial".to_string(),
                    stderr: "boom".to_string(),
                }),
            ])
            .await;
    });

    client.create(&[]).await.unwrap();
    let err = client
        .run_script("startup", "./start.sh", false, false)
        .await
        .unwrap_err();
    let AgentError::ScriptFailed {
        exit_status,
        stdout,
        stderr,
    } = err
    else {
        panic!("expected script failure, got {err:?}");
    };
    assert_eq!(exit_status, 42);
    assert_eq!(stdout, "partial");
    assert_eq!(stderr, "boom");
    server.await.unwrap();
}

#[tokio::test]
async fn reuses_one_connection_per_channel() {
    let mut runtime = FakeRuntime::bind();
    let client = runtime.client();

    // A single served connection answers all three calls; a second dial
    // would hang the test since nothing accepts it.
    let server = tokio::spawn(async move {
        runtime
            .serve_one(vec![created("h-1"), Response::ok(), Response::ok()])
            .await;
    });

    client.create(&[]).await.unwrap();
    client.limit_cpu(512).await.unwrap();
    client.limit_memory(64 * 1024 * 1024).await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn destroy_clears_handle_even_on_error() {
    let mut runtime = FakeRuntime::bind();
    let client = runtime.client();

    let server = tokio::spawn(async move {
        runtime
            .serve_one(vec![created("h-1"), Response::error("destroy failed")])
            .await;
    });

    client.create(&[]).await.unwrap();
    assert!(client.handle().is_some());
    client.destroy().await;
    assert!(client.handle().is_none());
    server.await.unwrap();

    // A second destroy has no handle and sends nothing.
    client.destroy().await;
}
