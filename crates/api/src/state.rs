//! Shared application state for the Axum API server.

use std::sync::Arc;

use herald_common::config::AppConfig;
use herald_engine::clock::Clock;
use herald_engine::collaborators::{QueueReceiptGate, StaticActorResolver};
use herald_engine::history::HistorySink;
use herald_engine::lock::QueueLock;
use herald_engine::processor::QueueProcessor;
use herald_engine::reminder::ReminderScheduler;
use herald_engine::resolution::ResolutionTracker;
use herald_engine::service::QueueService;
use herald_engine::store::QueueStore;
use herald_engine::tick::TickQueue;
use herald_engine::transport::Transport;

/// Application state shared across all route handlers and the tick worker.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn QueueStore>,
    pub service: Arc<QueueService>,
    pub processor: Arc<QueueProcessor>,
    pub reminders: Arc<ReminderScheduler>,
    pub ticks: Arc<TickQueue>,
    pub clock: Arc<dyn Clock>,
    pub config: AppConfig,
}

impl AppState {
    /// Wire the engine components around the given collaborators.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn QueueStore>,
        lock: Arc<dyn QueueLock>,
        transport: Arc<dyn Transport>,
        history: Arc<dyn HistorySink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ticks = Arc::new(TickQueue::new());

        let processor = QueueProcessor::new(
            store.clone(),
            lock,
            transport.clone(),
            history.clone(),
            ticks.clone(),
            clock.clone(),
        );
        let reminders = ReminderScheduler::new(
            store.clone(),
            Arc::new(QueueReceiptGate::new(store.clone())),
            history.clone(),
            ticks.clone(),
            clock.clone(),
        );
        let tracker = ResolutionTracker::new(
            store.clone(),
            Arc::new(StaticActorResolver),
            history,
            transport,
            clock.clone(),
        );
        let service = QueueService::new(store.clone(), tracker, ticks.clone(), clock.clone());

        Self {
            store,
            service: Arc::new(service),
            processor: Arc::new(processor),
            reminders: Arc::new(reminders),
            ticks,
            clock,
            config,
        }
    }
}
