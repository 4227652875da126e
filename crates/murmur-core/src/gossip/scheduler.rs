//! Periodic anti-entropy.
//!
//! Each tick snapshots the store once and, for every neighbor, sends the ids
//! that neighbor is not yet known to hold. Neighbors with an empty delta are
//! skipped. Each exchange runs on its own task, so a slow or dead neighbor
//! never holds up the tick or the other neighbors.
//!
//! Nothing is retried explicitly. An exchange that times out records nothing,
//! so the same ids (plus anything broadcast since) show up in the next tick's
//! delta.

use crate::error::BroadcastError;
use crate::message::Payload;
use crate::protocol::{MessageId, NodeId};
use crate::service::BroadcastService;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// Result of one gossip exchange with one neighbor.
#[derive(Debug)]
pub enum ExchangeOutcome {
    /// The neighbor replied; the sent ids are now recorded as known to it.
    Acknowledged {
        /// The neighbor.
        peer: NodeId,
        /// Number of ids sent.
        sent: usize,
        /// Number of ids from the reply that were new to this node.
        learned: usize,
    },
    /// No reply arrived in time. Nothing was recorded.
    TimedOut {
        /// The neighbor.
        peer: NodeId,
    },
    /// The exchange failed for another reason. Nothing was recorded.
    Failed {
        /// The neighbor.
        peer: NodeId,
        /// What went wrong.
        error: BroadcastError,
    },
}

impl ExchangeOutcome {
    /// Returns the neighbor this exchange was with.
    #[must_use]
    pub const fn peer(&self) -> &NodeId {
        match self {
            Self::Acknowledged { peer, .. } | Self::TimedOut { peer } | Self::Failed { peer, .. } => {
                peer
            }
        }
    }

    /// Returns true if the neighbor acknowledged the exchange.
    #[must_use]
    pub const fn is_acknowledged(&self) -> bool {
        matches!(self, Self::Acknowledged { .. })
    }
}

/// The sends started by one tick.
#[derive(Debug, Default)]
pub struct GossipRound {
    targets: Vec<NodeId>,
    skipped: usize,
    inflight: Vec<JoinHandle<ExchangeOutcome>>,
}

impl GossipRound {
    /// Neighbors a gossip request was sent to this tick.
    #[must_use]
    pub fn targets(&self) -> &[NodeId] {
        &self.targets
    }

    /// Number of neighbors skipped because they already knew everything.
    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.skipped
    }

    /// Returns true if nothing was sent.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.targets.is_empty()
    }

    /// Waits for every exchange started this tick to finish.
    ///
    /// Dropping a round instead leaves its exchanges running in the background.
    pub async fn settle(self) -> Vec<ExchangeOutcome> {
        join_all(self.inflight)
            .await
            .into_iter()
            .filter_map(|joined| match joined {
                Ok(outcome) => Some(outcome),
                Err(error) => {
                    warn!(%error, "gossip exchange task did not complete");
                    None
                }
            })
            .collect()
    }
}

/// Drives anti-entropy for one node.
#[derive(Debug, Clone)]
pub struct GossipScheduler {
    service: Arc<BroadcastService>,
}

impl GossipScheduler {
    /// Creates a scheduler for `service`.
    #[must_use]
    pub const fn new(service: Arc<BroadcastService>) -> Self {
        Self { service }
    }

    /// Runs one gossip round.
    ///
    /// Must be called from within a Tokio runtime; exchanges are spawned.
    pub fn tick(&self) -> GossipRound {
        let mut round = GossipRound::default();
        let neighbors = self.service.topology().neighbors();
        if neighbors.is_empty() {
            return round;
        }

        let snapshot = self.service.store().snapshot();
        for neighbor in neighbors {
            let mut delta = self.service.knowledge().delta(&neighbor, &snapshot);
            if delta.is_empty() {
                round.skipped += 1;
                continue;
            }
            if let Some(max) = self.service.config().max_ids_per_gossip {
                delta.truncate(max);
            }

            trace!(peer = %neighbor, ids = delta.len(), "gossiping");
            round.targets.push(neighbor.clone());
            let service = Arc::clone(&self.service);
            round
                .inflight
                .push(tokio::spawn(exchange(service, neighbor, delta)));
        }
        round
    }

    /// Ticks on the configured interval until `shutdown` turns true or its
    /// sender is dropped. Returns the number of ticks run.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let interval = self.service.config().interval;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(node = %self.service.node().id(), ?interval, "gossip scheduler started");

        let mut ticks = 0;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let round = self.tick();
                    ticks += 1;
                    if !round.is_idle() {
                        trace!(tick = ticks, targets = round.targets().len(), skipped = round.skipped(), "gossip round");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(node = %self.service.node().id(), ticks, "gossip scheduler stopped");
        ticks
    }

    /// Starts [`GossipScheduler::run`] on a background task.
    #[must_use]
    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(rx));
        SchedulerHandle { shutdown, task }
    }
}

/// Handle to a scheduler started with [`GossipScheduler::spawn`].
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<u64>,
}

impl SchedulerHandle {
    /// Signals the scheduler to stop and waits for it. Returns the tick count.
    pub async fn stop(self) -> u64 {
        let _ = self.shutdown.send(true);
        self.task.await.unwrap_or_default()
    }
}

async fn exchange(
    service: Arc<BroadcastService>,
    peer: NodeId,
    sent: Vec<MessageId>,
) -> ExchangeOutcome {
    let timeout = service.config().rpc_timeout;
    let reply = service
        .node()
        .rpc(&peer, Payload::Gossip { ids: sent.clone() }, timeout)
        .await;

    match reply {
        Ok(Payload::GossipOk { ids: returned }) => {
            service.knowledge().mark_known(&peer, &sent);
            let learned = service.store().merge(returned.iter().copied());
            service.knowledge().mark_known(&peer, &returned);
            debug!(%peer, sent = sent.len(), learned = learned.len(), "gossip acknowledged");
            ExchangeOutcome::Acknowledged {
                peer,
                sent: sent.len(),
                learned: learned.len(),
            }
        }
        Ok(other) => {
            let error = BroadcastError::UnexpectedReply {
                peer: peer.clone(),
                kind: other.kind().to_string(),
            };
            debug!(%peer, %error, "gossip failed");
            ExchangeOutcome::Failed { peer, error }
        }
        Err(BroadcastError::Timeout { .. }) => {
            debug!(%peer, ids = sent.len(), "gossip timed out, will retry next tick");
            ExchangeOutcome::TimedOut { peer }
        }
        Err(error) => {
            debug!(%peer, %error, "gossip failed");
            ExchangeOutcome::Failed { peer, error }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gossip::GossipConfig;
    use crate::message::{Body, Envelope, TopologyMap};
    use crate::node::Node;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn n(id: &str) -> NodeId {
        NodeId::from(id)
    }

    fn ids(values: &[i64]) -> Vec<MessageId> {
        values.iter().copied().map(MessageId::new).collect()
    }

    fn make_scheduler(
        neighbors: &[&str],
        config: GossipConfig,
    ) -> (Arc<BroadcastService>, GossipScheduler, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let node = Node::new(n("n1"), vec![], Arc::new(tx));
        let service = Arc::new(BroadcastService::new(Arc::new(node), config));
        let mut topology = TopologyMap::new();
        topology.insert(n("n1"), neighbors.iter().map(|x| n(x)).collect());
        service.install_topology(&topology).unwrap();
        let scheduler = GossipScheduler::new(Arc::clone(&service));
        (service, scheduler, rx)
    }

    fn answer(request: &Envelope, payload: Payload) -> Envelope {
        Envelope {
            src: request.dest.clone(),
            dest: request.src.clone(),
            body: Body::new(payload).in_reply_to(request.body.msg_id.unwrap()),
        }
    }

    // ========== Tick Tests ==========

    #[tokio::test]
    async fn isolated_node_sends_nothing() {
        let (service, scheduler, mut rx) = make_scheduler(&[], GossipConfig::default());
        service.broadcast(MessageId::new(1));

        let round = scheduler.tick();
        assert!(round.is_idle());
        assert_eq!(round.skipped(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_delta_is_skipped() {
        let (_service, scheduler, mut rx) = make_scheduler(&["n2", "n3"], GossipConfig::default());

        let round = scheduler.tick();
        assert!(round.is_idle());
        assert_eq!(round.skipped(), 2);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn tick_sends_delta_to_each_neighbor() {
        let (service, scheduler, mut rx) = make_scheduler(&["n2", "n3"], GossipConfig::default());
        service.broadcast(MessageId::new(4));
        service.knowledge().mark_known(&n("n3"), &ids(&[4]));

        let round = scheduler.tick();
        assert_eq!(round.targets(), &[n("n2")]);
        assert_eq!(round.skipped(), 1);

        let request = rx.recv().await.unwrap();
        assert_eq!(request.dest, n("n2"));
        assert_eq!(request.body.payload, Payload::Gossip { ids: ids(&[4]) });
        assert!(request.body.msg_id.is_some());
    }

    #[tokio::test]
    async fn acknowledged_exchange_updates_knowledge_and_store() {
        let (service, scheduler, mut rx) = make_scheduler(&["n2"], GossipConfig::default());
        service.broadcast(MessageId::new(1));

        let round = scheduler.tick();
        let request = rx.recv().await.unwrap();
        service.dispatch(answer(&request, Payload::GossipOk { ids: ids(&[8]) })).unwrap();

        let outcomes = round.settle().await;
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            outcomes[0],
            ExchangeOutcome::Acknowledged { sent: 1, learned: 1, .. }
        ));
        assert_eq!(service.read(), ids(&[1, 8]));

        let known = service.knowledge().known(&n("n2")).unwrap();
        assert!(known.contains(&MessageId::new(1)));
        assert!(known.contains(&MessageId::new(8)));

        // Both sides now agree, so the next tick is quiet.
        assert!(scheduler.tick().is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_exchange_is_resent_next_tick() {
        let config = GossipConfig::default().with_rpc_timeout(Duration::from_millis(100));
        let (service, scheduler, mut rx) = make_scheduler(&["n2"], config);
        service.broadcast(MessageId::new(3));

        let outcomes = scheduler.tick().settle().await;
        assert!(matches!(outcomes[0], ExchangeOutcome::TimedOut { .. }));
        assert_eq!(service.knowledge().known(&n("n2")).unwrap().len(), 0);
        let _dropped = rx.recv().await.unwrap();

        let round = scheduler.tick();
        assert_eq!(round.targets(), &[n("n2")]);
        let resent = rx.recv().await.unwrap();
        assert_eq!(resent.body.payload, Payload::Gossip { ids: ids(&[3]) });
    }

    #[tokio::test]
    async fn error_reply_records_nothing() {
        let (service, scheduler, mut rx) = make_scheduler(&["n2"], GossipConfig::default());
        service.broadcast(MessageId::new(3));

        let round = scheduler.tick();
        let request = rx.recv().await.unwrap();
        service
            .dispatch(answer(
                &request,
                Payload::error(crate::error::ErrorCode::NotSupported, "gossip"),
            ))
            .unwrap();

        let outcomes = round.settle().await;
        assert!(matches!(outcomes[0], ExchangeOutcome::Failed { .. }));
        assert!(service.knowledge().known(&n("n2")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn unexpected_reply_records_nothing() {
        let (service, scheduler, mut rx) = make_scheduler(&["n2"], GossipConfig::default());
        service.broadcast(MessageId::new(3));

        let round = scheduler.tick();
        let request = rx.recv().await.unwrap();
        service
            .dispatch(answer(&request, Payload::ReadOk { messages: vec![] }))
            .unwrap();

        let outcomes = round.settle().await;
        let ExchangeOutcome::Failed { error, .. } = &outcomes[0] else {
            panic!("expected failure");
        };
        assert!(matches!(error, BroadcastError::UnexpectedReply { .. }));
        assert!(service.knowledge().known(&n("n2")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn max_ids_caps_each_request() {
        let config = GossipConfig::default().with_max_ids_per_gossip(2);
        let (service, scheduler, mut rx) = make_scheduler(&["n2"], config);
        for v in 1..=5 {
            service.broadcast(MessageId::new(v));
        }

        let round = scheduler.tick();
        let request = rx.recv().await.unwrap();
        assert_eq!(request.body.payload, Payload::Gossip { ids: ids(&[1, 2]) });
        service
            .dispatch(answer(&request, Payload::GossipOk { ids: vec![] }))
            .unwrap();
        round.settle().await;

        let _round = scheduler.tick();
        let request = rx.recv().await.unwrap();
        assert_eq!(request.body.payload, Payload::Gossip { ids: ids(&[3, 4]) });
    }

    #[tokio::test]
    async fn settle_skips_exchanges_that_did_not_complete() {
        let aborted = tokio::spawn(std::future::pending::<ExchangeOutcome>());
        aborted.abort();
        let finished = tokio::spawn(async {
            ExchangeOutcome::TimedOut {
                peer: NodeId::from("n2"),
            }
        });

        let round = GossipRound {
            inflight: vec![aborted, finished],
            ..GossipRound::default()
        };
        let outcomes = round.settle().await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].peer(), &NodeId::from("n2"));
    }

    // ========== Run Loop Tests ==========

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let config = GossipConfig::default().with_interval(Duration::from_millis(10));
        let (_service, scheduler, _rx) = make_scheduler(&["n2"], config);

        let handle = scheduler.spawn();
        tokio::time::sleep(Duration::from_millis(55)).await;
        let ticks = handle.stop().await;

        assert!(ticks >= 5, "expected at least 5 ticks, got {ticks}");
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_when_sender_dropped() {
        let (_service, scheduler, _rx) = make_scheduler(&[], GossipConfig::default());
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(scheduler.run(rx));
        drop(tx);

        let ticks = task.await.unwrap();
        assert!(ticks <= 1);
    }
}
