//! In-memory cluster simulator shared by the integration tests.
//!
//! Every node gets a [`Transport`] that hands envelopes to a shared router.
//! The router delivers into per-node inboxes, each drained by a task that
//! calls [`BroadcastService::dispatch`]. Directed links can be cut to model
//! packet loss. Gossip rounds are driven explicitly with [`SimCluster::tick`],
//! so tests control exactly how many rounds run.

#![allow(dead_code)]

use futures::future::join_all;
use murmur_core::{
    BroadcastService, Envelope, ExchangeOutcome, GossipConfig, GossipScheduler, MessageId, Node,
    NodeId, Payload, Result, TopologyMap, Transport,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const CLIENT: &str = "c1";

/// One gossip request seen by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GossipSend {
    pub src: NodeId,
    pub dest: NodeId,
    pub ids: Vec<MessageId>,
}

#[derive(Default)]
pub struct Router {
    inboxes: RwLock<HashMap<NodeId, mpsc::UnboundedSender<Envelope>>>,
    cut: Mutex<HashSet<(NodeId, NodeId)>>,
    gossip: Mutex<Vec<GossipSend>>,
    dropped: Mutex<u64>,
}

impl Router {
    fn route(&self, envelope: Envelope) {
        if let Payload::Gossip { ids } = &envelope.body.payload {
            self.gossip.lock().push(GossipSend {
                src: envelope.src.clone(),
                dest: envelope.dest.clone(),
                ids: ids.clone(),
            });
        }

        let link = (envelope.src.clone(), envelope.dest.clone());
        if self.cut.lock().contains(&link) {
            *self.dropped.lock() += 1;
            return;
        }

        let inbox = self.inboxes.read().get(&envelope.dest).cloned();
        match inbox {
            Some(inbox) if inbox.send(envelope).is_ok() => {}
            _ => *self.dropped.lock() += 1,
        }
    }

    fn register(&self, id: NodeId) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.write().insert(id, tx);
        rx
    }
}

struct SimTransport {
    router: Arc<Router>,
}

impl Transport for SimTransport {
    fn send(&self, envelope: Envelope) -> Result<()> {
        self.router.route(envelope);
        Ok(())
    }
}

pub struct SimCluster {
    router: Arc<Router>,
    services: BTreeMap<NodeId, Arc<BroadcastService>>,
    client: Arc<Node>,
    tasks: Vec<JoinHandle<()>>,
}

impl SimCluster {
    /// Starts one service per id, all sharing `config`. Must run inside a Tokio runtime.
    pub fn new(ids: &[&str], config: &GossipConfig) -> Self {
        let router = Arc::new(Router::default());
        let members: Vec<NodeId> = ids.iter().map(|id| NodeId::from(*id)).collect();
        let mut services = BTreeMap::new();
        let mut tasks = Vec::new();

        for id in &members {
            let transport = Arc::new(SimTransport {
                router: Arc::clone(&router),
            });
            let node = Arc::new(Node::new(id.clone(), members.clone(), transport));
            let service = Arc::new(BroadcastService::new(node, config.clone()));

            let mut inbox = router.register(id.clone());
            let inbound = Arc::clone(&service);
            tasks.push(tokio::spawn(async move {
                while let Some(envelope) = inbox.recv().await {
                    let _ = inbound.dispatch(envelope);
                }
            }));
            services.insert(id.clone(), service);
        }

        let client = Arc::new(Node::new(
            NodeId::from(CLIENT),
            Vec::new(),
            Arc::new(SimTransport {
                router: Arc::clone(&router),
            }),
        ));
        let mut inbox = router.register(NodeId::from(CLIENT));
        let replies = Arc::clone(&client);
        tasks.push(tokio::spawn(async move {
            while let Some(envelope) = inbox.recv().await {
                replies.complete(envelope);
            }
        }));

        Self {
            router,
            services,
            client,
            tasks,
        }
    }

    pub fn service(&self, id: &str) -> &Arc<BroadcastService> {
        &self.services[id]
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.services.keys().cloned().collect()
    }

    /// Sends `payload` from the client to `dest` and waits for the reply.
    pub async fn request(&self, dest: &str, payload: Payload) -> Result<Payload> {
        self.client
            .rpc(&NodeId::from(dest), payload, Duration::from_secs(5))
            .await
    }

    pub async fn broadcast(&self, dest: &str, id: i64) {
        let reply = self
            .request(dest, Payload::Broadcast {
                message: MessageId::new(id),
            })
            .await
            .unwrap();
        assert_eq!(reply, Payload::BroadcastOk);
    }

    pub async fn read(&self, dest: &str) -> Vec<i64> {
        match self.request(dest, Payload::Read).await.unwrap() {
            Payload::ReadOk { messages } => messages.iter().map(MessageId::value).collect(),
            other => panic!("expected read_ok, got {other:?}"),
        }
    }

    /// Installs `topology` on every node through the wire protocol.
    pub async fn install(&self, topology: &TopologyMap) {
        for id in self.services.keys() {
            let reply = self
                .request(id.as_str(), Payload::Topology {
                    topology: topology.clone(),
                })
                .await
                .unwrap();
            assert_eq!(reply, Payload::TopologyOk);
        }
    }

    /// Runs one gossip round on every node and waits for all exchanges.
    pub async fn tick(&self) -> Vec<ExchangeOutcome> {
        let rounds: Vec<_> = self
            .services
            .values()
            .map(|service| GossipScheduler::new(Arc::clone(service)).tick())
            .collect();
        join_all(rounds.into_iter().map(|round| round.settle()))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Runs one gossip round on a single node.
    pub async fn tick_node(&self, id: &str) -> Vec<ExchangeOutcome> {
        GossipScheduler::new(Arc::clone(self.service(id)))
            .tick()
            .settle()
            .await
    }

    /// Ticks until every node holds exactly `expected`. Returns the ticks used.
    pub async fn converge(&self, expected: &[i64], max_ticks: usize) -> Option<usize> {
        let mut expected: Vec<i64> = expected.to_vec();
        expected.sort_unstable();
        expected.dedup();

        for ticks in 0..=max_ticks {
            if self.all_hold(&expected) {
                return Some(ticks);
            }
            if ticks < max_ticks {
                self.tick().await;
            }
        }
        None
    }

    pub fn all_hold(&self, expected: &[i64]) -> bool {
        self.services.values().all(|service| {
            service
                .read()
                .iter()
                .map(MessageId::value)
                .eq(expected.iter().copied())
        })
    }

    /// Drops everything sent from `from` to `to` until healed.
    pub fn cut(&self, from: &str, to: &str) {
        self.router
            .cut
            .lock()
            .insert((NodeId::from(from), NodeId::from(to)));
    }

    pub fn heal(&self, from: &str, to: &str) {
        self.router
            .cut
            .lock()
            .remove(&(NodeId::from(from), NodeId::from(to)));
    }

    pub fn gossip_sent(&self) -> Vec<GossipSend> {
        self.router.gossip.lock().clone()
    }

    pub fn clear_gossip_log(&self) {
        self.router.gossip.lock().clear();
    }

    pub fn dropped(&self) -> u64 {
        *self.router.dropped.lock()
    }
}

impl Drop for SimCluster {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

pub fn topology(entries: &[(&str, &[&str])]) -> TopologyMap {
    entries
        .iter()
        .map(|(node, neighbors)| {
            (
                NodeId::from(*node),
                neighbors.iter().map(|n| NodeId::from(*n)).collect(),
            )
        })
        .collect()
}

/// Bidirectional line: ids[0] - ids[1] - ... - ids[n-1].
pub fn line(ids: &[&str]) -> TopologyMap {
    let mut map = TopologyMap::new();
    for (i, id) in ids.iter().enumerate() {
        let mut neighbors = Vec::new();
        if i > 0 {
            neighbors.push(NodeId::from(ids[i - 1]));
        }
        if i + 1 < ids.len() {
            neighbors.push(NodeId::from(ids[i + 1]));
        }
        map.insert(NodeId::from(*id), neighbors);
    }
    map
}

/// Bidirectional ring.
pub fn ring(ids: &[&str]) -> TopologyMap {
    let n = ids.len();
    ids.iter()
        .enumerate()
        .map(|(i, id)| {
            let prev = NodeId::from(ids[(i + n - 1) % n]);
            let next = NodeId::from(ids[(i + 1) % n]);
            let neighbors = if prev == next { vec![next] } else { vec![prev, next] };
            (NodeId::from(*id), neighbors)
        })
        .collect()
}
