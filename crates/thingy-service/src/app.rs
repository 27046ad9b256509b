//! Process wiring.
//!
//! [`Service::start`] builds the pipeline around an MQTT connection and starts
//! every background task; [`Service::shutdown`] stops them in dependency
//! order so that queued messages are still handled and their publishes
//! flushed before disconnecting.

use std::sync::Arc;

use rumqttc::{AsyncClient, EventLoop};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use thingy_core::{
    CacheRefresher, EventDispatcher, MessageRouter, Pipeline, ThresholdEngine, TopicResolver,
    Transport,
};

use crate::config::Config;
use crate::forward::MetricForwarder;
use crate::mqtt::{self, MqttTransport};
use crate::store::{JsonFilePreferenceStore, PreferenceWatcher};

/// A running service.
pub struct Service {
    client: AsyncClient,
    bus: JoinHandle<(MessageRouter, EventLoop)>,
    bus_cancel: CancellationToken,
    tasks_cancel: CancellationToken,
    refresher: CacheRefresher,
    watcher: PreferenceWatcher,
    forwarder: Option<MetricForwarder>,
}

impl Service {
    /// Connect to the broker and start processing.
    ///
    /// The threshold cache is loaded in the background; messages that
    /// arrive before the first load are evaluated against an empty cache.
    pub fn start(config: &Config) -> anyhow::Result<Self> {
        let qos = mqtt::qos_level(config.mqtt.qos);
        let (client, eventloop) = mqtt::connect(&config.mqtt).map_err(anyhow::Error::msg)?;
        let transport: Arc<dyn Transport> = Arc::new(MqttTransport::new(client.clone(), qos));

        let tasks_cancel = CancellationToken::new();
        let store = Arc::new(JsonFilePreferenceStore::new(&config.preferences.path));
        let engine = Arc::new(ThresholdEngine::new(store, transport.clone()));

        let refresher = CacheRefresher::spawn(
            engine.clone(),
            config.refresh.retry_config(),
            tasks_cancel.clone(),
        );
        refresher.request();
        let watcher = PreferenceWatcher::spawn(
            &config.preferences.path,
            config.preferences.poll_interval(),
            refresher.handle(),
            tasks_cancel.clone(),
        );

        let events = EventDispatcher::new(config.engine.metric_buffer);
        let forwarder = config.forward.enabled.then(|| {
            MetricForwarder::spawn(
                events.subscribe(),
                transport.clone(),
                config.forward.prefix.clone(),
            )
        });

        let resolver = TopicResolver::new(transport, config.discovery.policy());
        let pipeline = Arc::new(Pipeline::new(resolver, engine, events));
        // Workers stop by draining, never by cancellation
        let router = MessageRouter::spawn(
            pipeline,
            config.engine.router_config(),
            CancellationToken::new(),
        )?;

        let bus_cancel = CancellationToken::new();
        let bus = tokio::spawn(mqtt::run_event_loop(
            eventloop,
            client.clone(),
            config.mqtt.subscriptions.clone(),
            qos,
            router,
            bus_cancel.clone(),
        ));

        info!(
            "Service started: broker {}, {} workers",
            config.mqtt.broker, config.engine.workers
        );

        Ok(Self {
            client,
            bus,
            bus_cancel,
            tasks_cancel,
            refresher,
            watcher,
            forwarder,
        })
    }

    /// Stop reading from the bus, finish queued messages, flush their
    /// publishes and disconnect.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        info!("Shutting down");
        self.bus_cancel.cancel();
        let (router, mut eventloop) = self.bus.await?;

        // Dropping the last pipeline closes the metric event channel
        router.drain().await;
        if let Some(forwarder) = self.forwarder {
            let forwarded = forwarder.join().await;
            info!("Forwarded {} metric events", forwarded);
        }

        self.tasks_cancel.cancel();
        self.watcher.join().await;
        self.refresher.join().await;

        if let Err(e) = mqtt::disconnect(&self.client, &mut eventloop).await {
            warn!("Unclean MQTT disconnect: {}", e);
        }
        info!("Service stopped");
        Ok(())
    }
}

/// Run the service until `shutdown` completes.
pub async fn run<F>(config: Config, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()>,
{
    let service = Service::start(&config)?;
    shutdown.await;
    service.shutdown().await
}
