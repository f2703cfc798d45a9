//! Newline-delimited JSON transport over stdio.
//!
//! Each request is handled on its own task. Requests of one session run one after another in
//! arrival order; different sessions run concurrently. Responses are written by a single
//! writer task in completion order, so clients correlate them by `id`.

mod handler;
mod io;
mod protocol;

use std::{collections::HashMap, sync::Arc};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, oneshot},
    task::JoinSet,
};

use crate::{
    cli::Args,
    core::{context::SessionId, orchestrator::AccessOrchestrator, registry::ConnectionRegistry},
    error::{AppError, AppResult},
};

pub use handler::BridgeHandler;
use io::{NdjsonReader, NdjsonWriter};
use protocol::BridgeRequest;

pub async fn run(args: Args) -> AppResult<()> {
    let registry = Arc::new(ConnectionRegistry::new(args.drivers()));
    let orchestrator = Arc::new(AccessOrchestrator::new(registry, args.orchestrator_config()));
    let handler = Arc::new(BridgeHandler::new(orchestrator));
    tracing::info!(profile = %args.profile, sql_access = %args.sql_access, "bridge ready");
    serve(tokio::io::stdin(), tokio::io::stdout(), handler).await?;
    Ok(())
}

/// Closes when the newest request of a session has finished.
type Tails = HashMap<SessionId, oneshot::Receiver<()>>;

/// Serves requests from `input` until end of input, then returns `output` once every
/// in-flight response has been written.
pub async fn serve<R, W>(input: R, output: W, handler: Arc<BridgeHandler>) -> AppResult<W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(NdjsonWriter::new(output).drain(rx));
    let mut reader = NdjsonReader::new(input);
    let mut inflight = JoinSet::new();
    let mut tails = Tails::new();

    while let Some(line) = reader.read_line().await? {
        reap(&mut inflight, &mut tails);
        if line.trim().is_empty() {
            continue;
        }

        let req: BridgeRequest = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                let _ = tx.send(io::protocol_error(format!("malformed request: {e}")));
                continue;
            }
        };

        let (done, tail) = oneshot::channel::<()>();
        let prev = tails.insert(req.session_id(), tail);
        let handler = handler.clone();
        let tx = tx.clone();
        inflight.spawn(async move {
            if let Some(prev) = prev {
                // Resolves with an error once the previous request drops its sender.
                let _ = prev.await;
            }
            let resp = handler.handle(req).await;
            let _ = tx.send(resp);
            drop(done);
        });
    }

    while let Some(joined) = inflight.join_next().await {
        log_join(joined);
    }
    drop(tx);
    writer
        .await
        .map_err(|e| AppError::Internal(format!("writer task failed: {e}")))?
}

/// Drops finished request tasks and the tails of sessions with nothing in flight.
fn reap(inflight: &mut JoinSet<()>, tails: &mut Tails) {
    while let Some(joined) = inflight.try_join_next() {
        log_join(joined);
    }
    tails.retain(|_, tail| matches!(tail.try_recv(), Err(oneshot::error::TryRecvError::Empty)));
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error=%e, "request task failed");
    }
}
