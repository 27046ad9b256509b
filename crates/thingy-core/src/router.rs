//! Per-device message routing.
//!
//! The router runs a fixed number of worker tasks, each consuming its own
//! queue. A message goes to the worker chosen by hashing its device
//! address, so messages from one device are handled one at a time and in
//! arrival order, while different devices are handled concurrently.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::resolver::InboundMessage;

/// Worker pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterConfig {
    /// Number of worker tasks.
    pub workers: usize,
    /// Capacity of each worker's queue.
    pub queue_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
        }
    }
}

/// Routes inbound messages to per-device workers.
#[derive(Debug)]
pub struct MessageRouter {
    senders: Vec<mpsc::Sender<InboundMessage>>,
    workers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl MessageRouter {
    /// Start `config.workers` workers that feed `pipeline`.
    ///
    /// Workers stop when `cancel` is cancelled or the router is drained.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `workers` or `queue_capacity` is 0.
    pub fn spawn(
        pipeline: Arc<Pipeline>,
        config: RouterConfig,
        cancel: CancellationToken,
    ) -> Result<Self> {
        if config.workers == 0 {
            return Err(Error::invalid_config("router needs at least one worker"));
        }
        if config.queue_capacity == 0 {
            return Err(Error::invalid_config("router queue capacity must be > 0"));
        }

        let mut senders = Vec::with_capacity(config.workers);
        let mut workers = Vec::with_capacity(config.workers);
        for id in 0..config.workers {
            let (tx, rx) = mpsc::channel(config.queue_capacity);
            senders.push(tx);
            workers.push(tokio::spawn(run_worker(
                id,
                rx,
                pipeline.clone(),
                cancel.clone(),
            )));
        }

        Ok(Self {
            senders,
            workers,
            cancel,
        })
    }

    /// Number of workers.
    pub fn worker_count(&self) -> usize {
        self.senders.len()
    }

    /// Index of the worker that handles `address`.
    pub fn worker_for(&self, address: &str) -> usize {
        worker_index(address, self.senders.len())
    }

    /// Queue `message` for its device's worker.
    ///
    /// Waits while that worker's queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] if the worker has stopped.
    pub async fn route(&self, message: InboundMessage) -> Result<()> {
        let index = self.worker_for(message.address());
        self.senders[index]
            .send(message)
            .await
            .map_err(|_| Error::ChannelClosed(format!("worker {} stopped", index)))
    }

    /// Stop accepting messages, let workers finish their queues, and wait
    /// for them.
    pub async fn drain(self) {
        drop(self.senders);
        join_all(self.workers).await;
    }

    /// Cancel the workers and wait for them. Queued messages are dropped.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        join_all(self.workers).await;
    }
}

fn worker_index(address: &str, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    address.hash(&mut hasher);
    (hasher.finish() % workers as u64) as usize
}

async fn run_worker(
    id: usize,
    mut rx: mpsc::Receiver<InboundMessage>,
    pipeline: Arc<Pipeline>,
    cancel: CancellationToken,
) {
    debug!("Router worker {} started", id);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            message = rx.recv() => {
                let Some(message) = message else { break };
                let topic = message.topic.clone();
                if let Err(e) = pipeline.handle(message).await {
                    warn!("Dropping message on '{}': {}", topic, e);
                }
            }
        }
    }
    debug!("Router worker {} stopped", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ThresholdEngine;
    use crate::events::EventDispatcher;
    use crate::mock::{MockPreferenceStore, MockTransport};
    use crate::registry::DiscoveryPolicy;
    use crate::resolver::TopicResolver;

    fn pipeline() -> (Arc<Pipeline>, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let engine = Arc::new(ThresholdEngine::new(
            Arc::new(MockPreferenceStore::new()),
            transport.clone(),
        ));
        let resolver = TopicResolver::new(transport.clone(), DiscoveryPolicy::default());
        (
            Arc::new(Pipeline::new(resolver, engine, EventDispatcher::new(16))),
            transport,
        )
    }

    #[test]
    fn test_worker_index_is_stable() {
        for address in ["dev1", "aa:bb:cc:dd:ee:ff", ""] {
            let index = worker_index(address, 7);
            assert!(index < 7);
            assert_eq!(index, worker_index(address, 7));
        }
        assert_eq!(worker_index("dev1", 1), 0);
    }

    #[tokio::test]
    async fn test_rejects_zero_workers() {
        let (pipeline, _) = pipeline();
        let config = RouterConfig {
            workers: 0,
            queue_capacity: 1,
        };
        assert!(MessageRouter::spawn(pipeline, config, CancellationToken::new()).is_err());
    }

    #[tokio::test]
    async fn test_drain_processes_queued_messages() {
        let (pipeline, transport) = pipeline();
        let router =
            MessageRouter::spawn(pipeline, RouterConfig::default(), CancellationToken::new())
                .unwrap();

        for i in 0..10 {
            router
                .route(InboundMessage::new(format!("dev{}/connected", i), "1"))
                .await
                .unwrap();
        }
        router.drain().await;

        // One name request per device
        assert_eq!(transport.published().await.len(), 10);
    }

    #[tokio::test]
    async fn test_route_after_shutdown_fails() {
        let (pipeline, _) = pipeline();
        let cancel = CancellationToken::new();
        let router = MessageRouter::spawn(pipeline, RouterConfig::default(), cancel.clone())
            .unwrap();
        cancel.cancel();
        // Give the workers a chance to observe the cancellation
        for handle in &router.workers {
            while !handle.is_finished() {
                tokio::task::yield_now().await;
            }
        }
        assert!(matches!(
            router.route(InboundMessage::new("dev1/connected", "1")).await,
            Err(Error::ChannelClosed(_))
        ));
        router.shutdown().await;
    }
}
