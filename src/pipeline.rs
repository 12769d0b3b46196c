//! Wires the fetcher and the four consumers onto one event bus and runs each
//! as an independent task.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::bus::EventBus;
use crate::config::{AppConfig, Role};
use crate::data::source::PriceSource;
use crate::data::store::Store;
use crate::error::ConfigError;
use crate::services::alert::AlertConsumer;
use crate::services::consumer::{ConsumerWorker, EventHandler};
use crate::services::daily_analytics::DailyAnalyticsConsumer;
use crate::services::fetcher::Fetcher;
use crate::services::persistence::PersistenceConsumer;
use crate::services::signal_analytics::{SignalAggregator, SignalAnalyticsConsumer};
use crate::services::window::{MemoryWindowStore, WindowStore};
use crate::shutdown::{self, ShutdownTrigger};

pub struct Pipeline {
    config: AppConfig,
    bus: EventBus,
    store: Arc<dyn Store>,
    source: Option<Arc<dyn PriceSource>>,
    windows: Arc<dyn WindowStore>,
}

impl Pipeline {
    pub fn new(config: AppConfig, bus: EventBus, store: Arc<dyn Store>) -> Self {
        Self {
            config,
            bus,
            store,
            source: None,
            windows: Arc::new(MemoryWindowStore::new()),
        }
    }

    pub fn with_price_source(mut self, source: Arc<dyn PriceSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Replaces the in-memory rolling window backend.
    pub fn with_window_store(mut self, windows: Arc<dyn WindowStore>) -> Self {
        self.windows = windows;
        self
    }

    fn handler_for(&self, role: Role) -> Option<(String, Arc<dyn EventHandler>)> {
        let groups = &self.config.groups;
        let store = self.store.clone();
        let handler: Arc<dyn EventHandler> = match role {
            Role::Fetcher => return None,
            Role::Alert => Arc::new(AlertConsumer::new(store)),
            Role::Persistence => Arc::new(PersistenceConsumer::new(store)),
            Role::Daily => Arc::new(DailyAnalyticsConsumer::new(store)),
            Role::Signal => {
                let aggregator =
                    SignalAggregator::new(self.windows.clone(), self.config.signal.clone());
                Arc::new(SignalAnalyticsConsumer::new(aggregator, store))
            }
        };
        let group = match role {
            Role::Fetcher => return None,
            Role::Alert => &groups.alert,
            Role::Persistence => &groups.persistence,
            Role::Daily => &groups.daily_analytics,
            Role::Signal => &groups.signal_analytics,
        };
        Some((group.clone(), handler))
    }

    /// Spawns one task per configured role.
    pub fn spawn(self) -> Result<PipelineHandle, ConfigError> {
        let (trigger, shutdown) = shutdown::channel();
        let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

        for role in &self.config.roles {
            if *role == Role::Fetcher {
                let source = self
                    .source
                    .clone()
                    .ok_or(ConfigError::Missing("price source"))?;
                let fetcher = Fetcher::new(
                    self.store.clone(),
                    source,
                    self.bus.clone(),
                    self.config.fetch_interval(),
                );
                let shutdown = shutdown.clone();
                tasks.push(("fetcher", tokio::spawn(fetcher.run(shutdown))));
                continue;
            }

            let Some((group, handler)) = self.handler_for(*role) else {
                continue;
            };
            let name = handler.name();
            let worker = ConsumerWorker::new(
                self.bus.clone(),
                group,
                handler,
                self.config.backoff.clone(),
            );
            let shutdown = shutdown.clone();
            tasks.push((
                name,
                tokio::spawn(async move {
                    if let Err(e) = worker.run(shutdown).await {
                        error!("❌ [{}] consumer exited: {}", name, e);
                    }
                }),
            ));
        }

        info!(
            "🚀 Pipeline running {} task(s) on topic {} ({})",
            tasks.len(),
            self.bus.topic(),
            self.bus.backend()
        );
        Ok(PipelineHandle {
            trigger,
            tasks,
            grace: self.config.shutdown_grace(),
        })
    }
}

pub struct PipelineHandle {
    trigger: ShutdownTrigger,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    grace: Duration,
}

impl PipelineHandle {
    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    /// Signals every task and waits up to the grace period; stragglers are aborted.
    pub async fn shutdown(self) {
        info!("🛑 Shutting down pipeline (grace: {:?})", self.grace);
        self.trigger.trigger();

        let (names, handles): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();

        match tokio::time::timeout(self.grace, join_all(handles)).await {
            Ok(results) => {
                for (name, result) in names.iter().zip(results) {
                    if let Err(e) = result {
                        warn!("⚠️ [{}] task ended abnormally: {}", name, e);
                    }
                }
                info!("✅ Pipeline stopped");
            }
            Err(_) => {
                warn!("⚠️ Grace period elapsed, aborting remaining tasks");
                for abort in aborts {
                    abort.abort();
                }
            }
        }
    }
}
