//! Maelstrom stdio runtime.
//!
//! Reads one JSON envelope per line, performs the init handshake, then hands
//! every envelope to the [`BroadcastService`]. Replies to our own RPCs are
//! routed inline; requests run on their own tasks so a slow handler never
//! stalls the reader. All outbound envelopes go through one unbounded channel
//! drained by a single writer task, so output lines never interleave.
//!
//! The run ends on input EOF or when the shutdown flag turns true. The
//! scheduler is stopped, outstanding request tasks are awaited, and the writer
//! drains whatever is queued before returning.

use std::sync::Arc;

use murmur_core::{
    BroadcastError, BroadcastService, Body, Envelope, ErrorCode, GossipConfig, GossipScheduler,
    MalformedEnvelope, Node, NodeId, Payload,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::error::NodeError;

/// What a finished run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// This node's id, if the init handshake happened.
    pub node_id: Option<NodeId>,
    /// Non-empty input lines read.
    pub received: u64,
    /// Envelopes written to the output.
    pub written: u64,
    /// Gossip rounds run by the scheduler.
    pub ticks: u64,
}

struct Running {
    service: Arc<BroadcastService>,
    scheduler: JoinHandle<u64>,
}

/// Per-run state between input lines.
struct Session {
    config: GossipConfig,
    outbound: mpsc::UnboundedSender<Envelope>,
    stop: watch::Receiver<bool>,
    running: Option<Running>,
    requests: JoinSet<()>,
}

impl Session {
    fn on_line(&mut self, line: &str) -> Result<(), NodeError> {
        match Envelope::parse(line) {
            Ok(envelope) => match &self.running {
                Some(running) => {
                    if envelope.is_reply() {
                        running.service.dispatch(envelope)?;
                    } else {
                        let service = Arc::clone(&running.service);
                        self.requests.spawn(async move {
                            if let Err(error) = service.dispatch(envelope) {
                                warn!(%error, "failed to send reply");
                            }
                        });
                    }
                    Ok(())
                }
                None => self.before_init(envelope),
            },
            Err(malformed) => self.reject_malformed(&malformed),
        }
    }

    /// Handles an envelope that arrived before the node was initialised.
    fn before_init(&mut self, envelope: Envelope) -> Result<(), NodeError> {
        let Envelope { src, dest, body } = envelope;
        match body.payload {
            Payload::Init { node_id, node_ids } => {
                info!(node = %node_id, members = node_ids.len(), "initialised");
                let node = Arc::new(Node::new(
                    node_id,
                    node_ids,
                    Arc::new(self.outbound.clone()),
                ));
                if body.msg_id.is_some() {
                    node.reply_to(&src, body.msg_id, Payload::InitOk)?;
                }

                let service = Arc::new(BroadcastService::new(node, self.config.clone()));
                let scheduler = tokio::spawn(
                    GossipScheduler::new(Arc::clone(&service)).run(self.stop.clone()),
                );
                self.running = Some(Running { service, scheduler });
                Ok(())
            }
            _ if body.in_reply_to.is_some() => {
                debug!(%src, "dropping reply received before init");
                Ok(())
            }
            payload => {
                let Some(msg_id) = body.msg_id else {
                    debug!(%src, kind = payload.kind(), "dropping request received before init");
                    return Ok(());
                };
                let error = BroadcastError::NotInitialized;
                warn!(%src, kind = payload.kind(), "request before init");
                self.send_error(dest, src, msg_id, error.code(), error.to_string())
            }
        }
    }

    fn reject_malformed(&self, malformed: &MalformedEnvelope) -> Result<(), NodeError> {
        let Some((requester, msg_id)) = malformed.reply_target() else {
            warn!(error = %malformed.error, "dropping undecodable line");
            return Ok(());
        };
        warn!(src = %requester, msg_id, error = %malformed.error, "malformed request");

        let from = match (&self.running, &malformed.dest) {
            (Some(running), _) => running.service.node().id().clone(),
            (None, Some(dest)) => dest.clone(),
            (None, None) => return Ok(()),
        };
        self.send_error(
            from,
            requester.clone(),
            msg_id,
            ErrorCode::MalformedRequest,
            malformed.error.to_string(),
        )
    }

    fn send_error(
        &self,
        src: NodeId,
        dest: NodeId,
        in_reply_to: u64,
        code: ErrorCode,
        text: String,
    ) -> Result<(), NodeError> {
        let envelope = Envelope {
            src,
            dest,
            body: Body::new(Payload::error(code, text)).in_reply_to(in_reply_to),
        };
        self.outbound
            .send(envelope)
            .map_err(|_| NodeError::Broadcast(BroadcastError::TransportClosed))
    }
}

/// Runs a node over `input` and `output` until EOF or shutdown.
///
/// # Errors
///
/// Returns an error if reading input or writing output fails.
pub async fn run<R, W>(
    config: GossipConfig,
    input: R,
    output: W,
    mut shutdown: watch::Receiver<bool>,
) -> Result<RunSummary, NodeError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outbound, rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = watch::channel(false);
    let writer = tokio::spawn(write_envelopes(rx, output, stop_rx.clone()));

    let mut session = Session {
        config,
        outbound,
        stop: stop_rx,
        running: None,
        requests: JoinSet::new(),
    };
    let mut lines = input.lines();
    let mut received = 0;
    let mut watching = true;

    let outcome = loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("input closed");
                        break Ok(());
                    }
                    Err(error) => break Err(NodeError::Io(error)),
                };
                if line.trim().is_empty() {
                    continue;
                }
                received += 1;
                while session.requests.try_join_next().is_some() {}
                if let Err(error) = session.on_line(&line) {
                    break Err(error);
                }
            }
            changed = shutdown.changed(), if watching => match changed {
                Ok(()) if *shutdown.borrow() => {
                    info!("shutdown requested");
                    break Ok(());
                }
                Ok(()) => {}
                Err(_) => watching = false,
            }
        }
    };

    while session.requests.join_next().await.is_some() {}
    let _ = stop_tx.send(true);

    let mut summary = RunSummary {
        received,
        ..RunSummary::default()
    };
    if let Some(running) = session.running.take() {
        summary.node_id = Some(running.service.node().id().clone());
        summary.ticks = running.scheduler.await?;
    }
    drop(session);
    summary.written = writer.await??;

    outcome?;
    info!(received = summary.received, written = summary.written, ticks = summary.ticks, "node stopped");
    Ok(summary)
}

/// Writes envelopes as JSON lines until the channel closes or `stop` is set.
///
/// On stop the channel is closed to new sends and everything already queued
/// is still written.
async fn write_envelopes<W>(
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    mut output: W,
    mut stop: watch::Receiver<bool>,
) -> Result<u64, NodeError>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    loop {
        tokio::select! {
            envelope = rx.recv() => match envelope {
                Some(envelope) => {
                    if write_envelope(&mut output, &envelope).await? {
                        written += 1;
                    }
                }
                None => break,
            },
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    rx.close();
                    while let Some(envelope) = rx.recv().await {
                        if write_envelope(&mut output, &envelope).await? {
                            written += 1;
                        }
                    }
                    break;
                }
            }
        }
    }
    output.flush().await?;
    Ok(written)
}

async fn write_envelope<W>(output: &mut W, envelope: &Envelope) -> Result<bool, NodeError>
where
    W: AsyncWrite + Unpin,
{
    let line = match envelope.to_json() {
        Ok(line) => line,
        Err(error) => {
            warn!(dest = %envelope.dest, %error, "dropping unencodable envelope");
            return Ok(false);
        }
    };
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(true)
}
