//! Mission runtime
//!
//! The supervisor has a single owner: one task that receives every feed event
//! over an mpsc channel and ticks the supervisor at the configured rate.
//! Producers (telemetry bridges, detectors, action executors) only hold a
//! sender, so events and ticks are serialized without locks.
//!
//! # Architecture
//!
//! ```text
//! telemetry / detections / notifiers --FeedEvent--> mpsc --> MissionRuntime
//!                                                               |
//!                                                      MissionSupervisor::tick
//! ```

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::actions::{EquipmentNotifier, FinishedActionNotifier};
use crate::detection::{person_symbol, Severity};
use crate::equipment::EquipmentKind;
use crate::error::MissionError;
use crate::planner::{PlanExecutor, PlannerFacade};
use crate::supervisor::{
    ControllerState, DetectionOutcome, MissionSupervisor, StatusUpdate, TickOutcome,
};
use crate::telemetry::{NedPoint, TelemetryUpdate};

/// One message on the mission feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FeedEvent {
    Telemetry {
        update: TelemetryUpdate,
    },
    Detection {
        position: [f64; 3],
        severity: Severity,
        #[serde(default)]
        tag_count: Option<u32>,
        #[serde(default = "Utc::now")]
        stamp: DateTime<Utc>,
    },
    Emergency {
        active: bool,
    },
    Equipment {
        kind: EquipmentKind,
        count: u32,
    },
    SearchFinished {
        location: String,
    },
}

impl FeedEvent {
    /// Parse one JSON line of a recorded feed
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// Lets action executors report back into the feed.
#[derive(Debug, Clone)]
pub struct FeedNotifier {
    sender: mpsc::Sender<FeedEvent>,
}

impl FeedNotifier {
    pub fn new(sender: mpsc::Sender<FeedEvent>) -> Self {
        Self { sender }
    }

    fn send(&self, event: FeedEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to forward feed event: {}", e);
                false
            }
        }
    }
}

impl EquipmentNotifier for FeedNotifier {
    fn set_equipment(&mut self, kind: EquipmentKind, count: u32) -> bool {
        self.send(FeedEvent::Equipment { kind, count })
    }
}

impl FinishedActionNotifier for FeedNotifier {
    fn search_finished(&mut self, location: &str) -> bool {
        self.send(FeedEvent::SearchFinished {
            location: location.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MissionSummary {
    pub ticks: u64,
    pub replans: u32,
    pub planning_failures: u32,
    pub detections: usize,
    pub final_state: ControllerState,
}

pub struct MissionRuntime<P, E> {
    supervisor: MissionSupervisor<P, E>,
    events: mpsc::Receiver<FeedEvent>,
    ticks: u64,
    replans: u32,
    planning_failures: u32,
}

impl<P, E> MissionRuntime<P, E>
where
    P: PlannerFacade,
    E: PlanExecutor,
{
    pub fn new(supervisor: MissionSupervisor<P, E>, events: mpsc::Receiver<FeedEvent>) -> Self {
        Self {
            supervisor,
            events,
            ticks: 0,
            replans: 0,
            planning_failures: 0,
        }
    }

    /// Feed channel sized from the runtime configuration
    pub fn channel(buffer: usize) -> (mpsc::Sender<FeedEvent>, mpsc::Receiver<FeedEvent>) {
        mpsc::channel(buffer.max(1))
    }

    pub fn supervisor(&self) -> &MissionSupervisor<P, E> {
        &self.supervisor
    }

    pub fn supervisor_mut(&mut self) -> &mut MissionSupervisor<P, E> {
        &mut self.supervisor
    }

    pub fn into_supervisor(self) -> MissionSupervisor<P, E> {
        self.supervisor
    }

    /// Apply one feed event. Only consistency violations are returned.
    pub fn handle_event(&mut self, event: FeedEvent) -> Result<(), MissionError> {
        match event {
            FeedEvent::Telemetry { update } => {
                self.supervisor.on_telemetry(&update);
            }
            FeedEvent::Detection {
                position,
                severity,
                tag_count,
                stamp,
            } => {
                let position = NedPoint::new(position[0], position[1], position[2]);
                log::debug!(
                    "Detection at {} ({} severity, {} tags)",
                    stamp,
                    severity,
                    tag_count.unwrap_or(0)
                );
                match self.supervisor.on_person_detected(position, severity)? {
                    DetectionOutcome::Added { id, location } => {
                        log::info!("{} registered at {}", person_symbol(id), location)
                    }
                    DetectionOutcome::Duplicate(_) | DetectionOutcome::Unresolved => {}
                }
            }
            FeedEvent::Emergency { active: true } => self.supervisor.raise_emergency(),
            FeedEvent::Emergency { active: false } => self.supervisor.clear_emergency(),
            FeedEvent::Equipment { kind, count } => {
                self.supervisor.set_equipment(kind, count);
            }
            FeedEvent::SearchFinished { location } => {
                self.supervisor.on_search_finished(&location);
            }
        }
        Ok(())
    }

    /// Drain feed events until the startup preconditions hold, then
    /// initialize the supervisor.
    ///
    /// Unmet preconditions are logged on every poll. Without
    /// `startup.timeout_ms` this waits as long as the feed stays open.
    pub async fn wait_for_startup(&mut self) -> Result<(), MissionError> {
        let startup = self.supervisor.config().startup.clone();
        let started = Instant::now();
        let mut poll = interval(Duration::from_millis(startup.poll_period_ms.max(1)));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event)?,
                    None => {
                        if self.supervisor.startup_faults().is_empty() {
                            break;
                        }
                        return Err(MissionError::FeedClosed);
                    }
                },
                _ = poll.tick() => {
                    let faults = self.supervisor.startup_faults();
                    if faults.is_empty() {
                        break;
                    }
                    let faults = faults.iter().map(ToString::to_string).join("; ");
                    log::warn!("Waiting for startup preconditions: {}", faults);

                    let waited_ms = started.elapsed().as_millis() as u64;
                    if let Some(timeout_ms) = startup.timeout_ms {
                        if waited_ms >= timeout_ms {
                            return Err(MissionError::StartupTimeout { waited_ms, faults });
                        }
                    }
                }
            }
        }

        self.supervisor.initialize()
    }

    /// Supervise until the feed closes.
    ///
    /// Planning failures are retried on the next tick; any other error ends
    /// the mission.
    pub async fn run(&mut self) -> Result<MissionSummary, MissionError> {
        if !self.supervisor.is_initialized() {
            self.wait_for_startup().await?;
        }
        self.publish_status();

        let period = self.supervisor.config().runtime.tick_period_ms.max(1);
        let mut ticker = interval(Duration::from_millis(period));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event)?,
                    None => {
                        log::info!("Feed closed, stopping supervision");
                        break;
                    }
                },
                _ = ticker.tick() => self.tick()?,
            }
        }

        Ok(self.summary())
    }

    fn tick(&mut self) -> Result<(), MissionError> {
        self.ticks += 1;
        match self.supervisor.tick() {
            Ok(TickOutcome::Steady) => {}
            Ok(TickOutcome::Replanned { target }) => {
                self.replans += 1;
                log::info!("Controller state: {}", target);
            }
            Ok(TickOutcome::PlanningFailed { target }) => {
                self.planning_failures += 1;
                log::warn!("No plan towards {}, retrying", target);
            }
            Err(e) if !e.is_fatal() => log::error!("Tick failed: {}", e),
            Err(e) => return Err(e),
        }
        self.publish_status();
        Ok(())
    }

    fn publish_status(&mut self) {
        for update in self.supervisor.drain_status() {
            match update {
                StatusUpdate::Text(text) => log::info!("Status: {}", text.trim_end()),
                StatusUpdate::Plan(plan) => log::debug!("Plan with {} actions", plan.items.len()),
            }
        }
    }

    pub fn summary(&self) -> MissionSummary {
        MissionSummary {
            ticks: self.ticks,
            replans: self.replans,
            planning_failures: self.planning_failures,
            detections: self.supervisor.registry().len(),
            final_state: self.supervisor.state(),
        }
    }
}
