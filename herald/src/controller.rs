use std::{future::Future, sync::Arc, time::Duration};

use herald_common::{Signal, internal, logging};
use herald_delivery::{
    BrokerClient, DeadLetterConfig, DeadLetterProcessor, EventConfig, EventPublisher, JsonCodec,
    MessageSender, Monitor, MonitorConfig, ObservedSender, Producer, ProducerConfig,
    ReliablePublisher, RetryPolicy, RetryService, SerializationConfig, TraceConfig, TraceService,
};
use herald_metrics::MetricsConfig;
use serde::Deserialize;
use tokio::{sync::broadcast, task::JoinHandle};

/// How long the cleanup loops may take to acknowledge shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Top-level configuration and entry point.
#[derive(Debug, Default, Deserialize)]
pub struct Herald {
    #[serde(default)]
    pub producer: ProducerConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub dead_letter: DeadLetterConfig,
    #[serde(default)]
    pub serialization: SerializationConfig,
    #[serde(default)]
    pub event: EventConfig,
    #[serde(default)]
    pub trace: TraceConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// The delivery stack wired around one broker.
///
/// Every component publishes through `sender`, which feeds `traces` and
/// `monitor` when those are enabled.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub producer: Arc<Producer>,
    pub sender: Arc<dyn MessageSender>,
    pub retries: RetryService,
    pub dead_letters: DeadLetterProcessor,
    pub publisher: ReliablePublisher,
    pub events: EventPublisher,
    pub traces: Arc<TraceService>,
    pub monitor: Arc<Monitor>,
}

impl Herald {
    /// Build the delivery stack around `broker`, sharing one producer.
    pub fn build(&self, broker: Arc<dyn BrokerClient>) -> Delivery {
        let codec = JsonCodec::from_config(&self.serialization);
        let producer = Arc::new(Producer::with_codec(broker, &self.producer, codec));
        let traces = Arc::new(TraceService::new(self.trace.clone()));
        let monitor = Arc::new(Monitor::new());

        let mut observed = ObservedSender::new(producer.clone()).with_traces(traces.clone());
        if self.monitor.enabled {
            observed = observed.with_monitor(monitor.clone());
        }
        let sender: Arc<dyn MessageSender> = Arc::new(observed);

        let retries = RetryService::new(sender.clone(), self.retry.clone());
        let dead_letters = DeadLetterProcessor::new(sender.clone(), self.dead_letter.clone());
        let publisher =
            ReliablePublisher::new(sender.clone(), retries.clone(), dead_letters.clone());
        let events = EventPublisher::new(sender.clone(), self.event.clone())
            .with_codec(codec)
            .with_retries(retries.clone());

        Delivery {
            producer,
            sender,
            retries,
            dead_letters,
            publisher,
            events,
            traces,
            monitor,
        }
    }

    /// Initialise logging and metrics, build the stack and start the
    /// background cleanup of retry contexts and traces.
    ///
    /// The cleanup serves the same [`Delivery`] that [`Running::delivery`]
    /// hands out. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if metrics fail to initialise.
    pub fn start(self, broker: Arc<dyn BrokerClient>) -> anyhow::Result<Running> {
        logging::init();
        herald_metrics::init_metrics(&self.metrics)?;

        let delivery = self.build(broker);
        let (signal, _) = broadcast::channel(16);

        let retries = {
            let retries = delivery.retries.clone();
            let shutdown = signal.subscribe();
            tokio::spawn(async move { retries.serve(shutdown).await })
        };
        let traces = {
            let traces = delivery.traces.clone();
            let shutdown = signal.subscribe();
            tokio::spawn(async move { traces.serve(shutdown).await })
        };

        internal!(level = INFO, "Controller running");

        Ok(Running {
            delivery,
            signal,
            cleanup: vec![retries, traces],
        })
    }
}

/// A started [`Herald`].
#[derive(Debug)]
pub struct Running {
    delivery: Delivery,
    signal: broadcast::Sender<Signal>,
    cleanup: Vec<JoinHandle<()>>,
}

impl Running {
    /// The stack served by the background cleanup.
    #[must_use]
    pub const fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    /// Serve until CTRL+C or SIGTERM, then shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal handlers cannot be installed or the
    /// cleanup loops do not stop in time.
    pub async fn run_until_signalled(self) -> anyhow::Result<()> {
        self.run_until(wait_for_signal()).await
    }

    /// Serve until `shutdown` resolves, then shut down.
    ///
    /// # Errors
    ///
    /// Returns the error of `shutdown`, or an error if the cleanup loops do
    /// not stop in time.
    pub async fn run_until<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = anyhow::Result<()>> + Send,
    {
        let outcome = shutdown.await;
        self.shutdown().await?;
        outcome
    }

    /// Stop the cleanup loops.
    ///
    /// # Errors
    ///
    /// Returns an error if a loop panicked or did not stop within the grace
    /// period.
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn shutdown(self) -> anyhow::Result<()> {
        internal!(level = INFO, "Shutting down...");

        // A loop that already exited reports through its join handle below
        let _ = self.signal.send(Signal::Shutdown);
        for task in self.cleanup {
            tokio::time::timeout(SHUTDOWN_GRACE, task).await??;
        }

        Ok(())
    }
}

async fn wait_for_signal() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered, shutting down");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    Ok(())
}
