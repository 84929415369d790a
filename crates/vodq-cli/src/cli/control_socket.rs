//! Control socket: server (during `vodq run`) and client (every other command).
//! Protocol: one JSON `ControlRequest` per line in, one JSON `ControlResponse` line out.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use vodq_core::control::{ControlRequest, ControlResponse};
use vodq_core::orchestrator::Orchestrator;

/// Binds `path` (replacing a stale socket file) and serves requests against
/// `orch` until the returned task is aborted.
pub fn spawn_control_server(
    orch: Arc<Orchestrator>,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)
        .with_context(|| format!("bind control socket {}", path.display()))?;
    tracing::debug!(path = %path.display(), "control socket listening");

    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let orch = Arc::clone(&orch);
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(&orch, stream).await {
                            tracing::debug!("control connection: {:#}", e);
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

async fn serve_connection(orch: &Orchestrator, stream: UnixStream) -> Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let resp = match serde_json::from_str::<ControlRequest>(line) {
            Ok(req) => orch.handle(req).await,
            Err(e) => ControlResponse::bad_request(format!("malformed request: {}", e)),
        };
        let mut out = serde_json::to_vec(&resp)?;
        out.push(b'\n');
        write.write_all(&out).await?;
    }
    Ok(())
}

/// Sends one request and reads the single-line response.
pub async fn send_request(socket_path: &Path, req: &ControlRequest) -> Result<ControlResponse> {
    let stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("connect to {}", socket_path.display()))?;
    let (read, mut write) = stream.into_split();
    let mut msg = serde_json::to_vec(req)?;
    msg.push(b'\n');
    write.write_all(&msg).await?;

    let mut reader = BufReader::new(read);
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        anyhow::bail!("control socket closed without a response");
    }
    Ok(serde_json::from_str(line.trim())?)
}

/// True when a `vodq run` is accepting connections on `socket_path`.
/// A leftover socket file from a crashed run is not live.
pub async fn is_live(socket_path: &Path) -> bool {
    socket_path.exists() && UnixStream::connect(socket_path).await.is_ok()
}
