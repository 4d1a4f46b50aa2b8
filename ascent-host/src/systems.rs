//! The per-step progression system.
//!
//! One [`ProgressionHost`] per player. Each game frame the host calls
//! [`ProgressionHost::step`] with the frame's elapsed seconds:
//!
//! | Phase     | Work                                         |
//! |-----------|----------------------------------------------|
//! | Drain     | up to `max_events_per_step` queued events    |
//! | Route     | each event through the coordinator           |
//! | Tick      | modifiers, practice clock, reputation decay  |
//! | Autosave  | when the configured interval has elapsed     |
//!
//! The whole step is timed against `performance.tick_budget_ms`.

use ascent_core::config::PersistenceConfig;
use ascent_core::coordinator::{ProgressionCoordinator, TickSummary};
use ascent_core::error::Result;
use ascent_core::metrics::{TickBudgetMonitor, spans};
use ascent_core::persistence::SaveStore;
use ascent_core::types::ProgressionNotice;
use tracing::{debug, info, info_span, warn};

use crate::config::{HostConfig, HostSettings};
use crate::queue::{EventQueue, EventSender, Inbound};

/// What one step did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    /// Events drained and routed.
    pub events: usize,
    /// Level-ups and achievements produced by those events.
    pub notices: Vec<ProgressionNotice>,
    /// Expirations from the tick.
    pub tick: TickSummary,
    /// Whether an autosave ran.
    pub saved: bool,
    /// Whether the previous step exceeded the budget.
    pub over_budget: bool,
}

/// Owns a coordinator, its inbound queue and, optionally, a save store.
#[derive(Debug)]
pub struct ProgressionHost {
    coordinator: ProgressionCoordinator,
    queue: EventQueue,
    store: Option<SaveStore>,
    settings: HostSettings,
    budget: TickBudgetMonitor,
    since_save: f64,
    autosave_interval: f64,
}

impl ProgressionHost {
    /// Host without persistence.
    ///
    /// # Errors
    /// Returns an error if the coordinator cannot be built from the config.
    pub fn new(player_id: impl Into<String>, config: &HostConfig) -> Result<Self> {
        let coordinator = ProgressionCoordinator::new(player_id, &config.ascent)?;
        Ok(Self {
            coordinator,
            queue: EventQueue::new(config.host.queue_capacity),
            store: None,
            settings: config.host.clone(),
            budget: TickBudgetMonitor::new(config.ascent.performance.tick_budget_ms),
            since_save: 0.0,
            autosave_interval: autosave_interval(&config.ascent.persistence),
        })
    }

    /// Attach a save store.
    #[must_use]
    pub fn with_store(mut self, store: SaveStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Host backed by `[host] save_path` when set, resuming the player's
    /// stored progress if there is any.
    ///
    /// # Errors
    /// Returns an error if the store cannot be opened or the stored document
    /// is invalid.
    pub fn open(player_id: impl Into<String>, config: &HostConfig) -> Result<Self> {
        let mut host = Self::new(player_id, config)?;
        if let Some(path) = &config.host.save_path {
            let store = SaveStore::open(path, &config.ascent.persistence)?;
            if store.load_into(&mut host.coordinator)? {
                info!(player = %host.coordinator.player_id(), "Resumed saved progress");
            } else {
                debug!(player = %host.coordinator.player_id(), "No saved progress; starting fresh");
            }
            host.store = Some(store);
        }
        Ok(host)
    }

    /// A producer handle for this player's queue.
    #[must_use]
    pub fn sender(&self) -> EventSender {
        self.queue.sender()
    }

    /// The inbound queue.
    #[must_use]
    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// The coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &ProgressionCoordinator {
        &self.coordinator
    }

    /// Mutable coordinator, for direct calls outside the queue.
    pub fn coordinator_mut(&mut self) -> &mut ProgressionCoordinator {
        &mut self.coordinator
    }

    /// Step timings.
    #[must_use]
    pub fn budget(&self) -> &TickBudgetMonitor {
        &self.budget
    }

    /// The attached save store, if any.
    #[must_use]
    pub fn store(&self) -> Option<&SaveStore> {
        self.store.as_ref()
    }

    /// Run one frame: route queued events, tick, autosave.
    pub fn step(&mut self, delta: f32) -> StepReport {
        let _span = info_span!(spans::STEP, player = %self.coordinator.player_id()).entered();
        let over_budget = self.budget.is_over_budget();
        let mut report = {
            let _timer = self.budget.begin_step();

            let mut report = StepReport {
                over_budget,
                ..StepReport::default()
            };
            for inbound in self.queue.drain(self.settings.max_events_per_step) {
                report.events += 1;
                let notices = match inbound {
                    Inbound::Event(event) => self.coordinator.process_event(event),
                    Inbound::Json(json) => self.coordinator.process_json(&json),
                };
                report.notices.extend(notices);
            }
            report.tick = self.coordinator.tick(delta);
            report
        };

        if delta.is_finite() && delta > 0.0 {
            self.since_save += f64::from(delta);
        }
        if self.autosave_due() {
            match self.save_now() {
                Ok(saved) => report.saved = saved,
                Err(e) => warn!(error = %e, "Autosave failed; retrying next interval"),
            }
            self.since_save = 0.0;
        }

        if self.budget.is_over_budget() {
            warn!(
                last_ms = self.budget.last_step_ms(),
                budget_ms = self.budget.budget_ms(),
                "Progression step over budget"
            );
        }
        report
    }

    /// Save immediately. Returns `false` when no store is attached.
    ///
    /// # Errors
    /// Returns an error if the store write fails.
    pub fn save_now(&mut self) -> Result<bool> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        store.save_coordinator(&self.coordinator)?;
        self.since_save = 0.0;
        Ok(true)
    }

    fn autosave_due(&self) -> bool {
        self.settings.autosave
            && self.store.is_some()
            && self.autosave_interval > 0.0
            && self.since_save >= self.autosave_interval
    }
}

fn autosave_interval(persistence: &PersistenceConfig) -> f64 {
    f64::from(persistence.auto_save_interval_seconds)
}
