//! Decision orchestration: one independent worker per symbol, a feedback
//! router, and account-level safety limits.

pub mod safety;
pub mod training;
mod worker;

pub use safety::SafetyMonitor;
pub use training::train_candidate;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arbiter_broker::{DecisionStore, ExecutionClient, Notifier};
use arbiter_config::AppConfig;
use arbiter_core::{Candle, FillFeedback, Symbol};
use arbiter_registry::ModelRegistry;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use worker::SymbolWorker;

const CANDLE_QUEUE_DEPTH: usize = 256;
const FEEDBACK_QUEUE_DEPTH: usize = 1024;

/// Cooperative shutdown flag shared by every engine task.
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        while !self.is_triggered() {
            self.notify.notified().await;
        }
    }
}

/// Running engine: candle ingress plus lifecycle control.
pub struct EngineHandle {
    routes: HashMap<Symbol, mpsc::Sender<Candle>>,
    shutdown: ShutdownSignal,
    tasks: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    /// Queues a candle for its symbol's worker. Workers process candles
    /// strictly one at a time; bursts queue here.
    pub async fn dispatch_candle(&self, candle: Candle) -> Result<()> {
        let Some(route) = self.routes.get(&candle.symbol) else {
            bail!("no worker configured for symbol {}", candle.symbol);
        };
        route
            .send(candle)
            .await
            .context("worker candle queue closed")?;
        Ok(())
    }

    #[must_use]
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Stops every worker and waits for them to drain.
    pub async fn shutdown(mut self) {
        self.shutdown.trigger();
        self.routes.clear();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

/// Builds and spawns the full decision pipeline.
pub struct Engine;

impl Engine {
    /// Spawns one worker per configured symbol plus the feedback router.
    ///
    /// `make_client` receives the feedback sender so the execution client
    /// (real or simulated) can stream fills back into the engine; in
    /// dry-run mode the caller passes the paper client and nothing else
    /// changes.
    pub fn spawn<F>(
        config: &AppConfig,
        registry: Arc<ModelRegistry>,
        store: Arc<dyn DecisionStore>,
        notifier: Arc<dyn Notifier>,
        make_client: F,
    ) -> Result<EngineHandle>
    where
        F: FnOnce(mpsc::Sender<FillFeedback>) -> Arc<dyn ExecutionClient>,
    {
        if config.symbols.is_empty() {
            bail!("no symbols configured");
        }
        let (feedback_tx, mut feedback_rx) = mpsc::channel::<FillFeedback>(FEEDBACK_QUEUE_DEPTH);
        let client = make_client(feedback_tx);
        let safety = Arc::new(SafetyMonitor::new(&config.risk));
        let shutdown = ShutdownSignal::new();

        let mut routes = HashMap::new();
        let mut feedback_routes: HashMap<Symbol, mpsc::Sender<FillFeedback>> = HashMap::new();
        let mut tasks = Vec::new();

        for symbol in &config.symbols {
            let worker = SymbolWorker::new(
                config,
                symbol.clone(),
                Arc::clone(&registry),
                Arc::clone(&store),
                Arc::clone(&notifier),
                Arc::clone(&client),
                Arc::clone(&safety),
            )
            .with_context(|| format!("building worker for {symbol}"))?;
            let (candle_tx, candle_rx) = mpsc::channel(CANDLE_QUEUE_DEPTH);
            let (worker_fb_tx, worker_fb_rx) = mpsc::channel(FEEDBACK_QUEUE_DEPTH);
            routes.insert(symbol.clone(), candle_tx);
            feedback_routes.insert(symbol.clone(), worker_fb_tx);
            tasks.push(tokio::spawn(worker.run(
                candle_rx,
                worker_fb_rx,
                shutdown.clone(),
            )));
        }

        // Fan feedback out to the owning symbol's worker so per-symbol
        // ordering is preserved end to end.
        let router_shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = router_shutdown.wait() => break,
                    maybe = feedback_rx.recv() => match maybe {
                        Some(feedback) => {
                            match feedback_routes.get(&feedback.symbol) {
                                Some(route) => {
                                    if route.send(feedback).await.is_err() {
                                        break;
                                    }
                                }
                                None => warn!(
                                    target: "arbiter.engine",
                                    symbol = %feedback.symbol,
                                    "feedback for unconfigured symbol"
                                ),
                            }
                        }
                        None => break,
                    },
                }
            }
        }));

        info!(
            target: "arbiter.engine",
            symbols = config.symbols.len(),
            dry_run = config.dry_run,
            client = client.name(),
            "engine started"
        );
        Ok(EngineHandle {
            routes,
            shutdown,
            tasks,
        })
    }
}
