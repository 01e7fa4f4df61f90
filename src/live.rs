//! Capture loop controller (streaming camera mode).
//!
//! `Stopped -> Starting -> Running -> Stopped`
//!
//! `start()` acquires the camera on the caller's thread, then hands the
//! session to a scheduler thread that samples one frame per interval. Each
//! valid frame is submitted on its own worker thread (never persisted), so a
//! slow service does not delay the next tick. Resolutions go through the
//! shared `SharedDetectionStore`, which drops out-of-order results.
//!
//! `stop()` cancels the scheduler, waits for it to exit (no tick starts after
//! `stop()` returns), releases the camera and abandons in-flight requests.
//! The same path runs on camera faults and on drop.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::client::{InferenceClient, SubmitOptions};
use crate::detect::DetectionResult;
use crate::ingest::{CameraProvider, CaptureError, CapturedFrame};
use crate::session::CaptureSession;
use crate::store::{Resolution, SharedDetectionStore};

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_IN_FLIGHT: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Starting,
    Running,
}

#[derive(Clone, Debug)]
pub struct LiveConfig {
    /// Time between samples.
    pub sample_interval: Duration,
    /// Ticks are skipped while this many requests are unresolved.
    pub max_in_flight: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

/// Notifications for the display side.
#[derive(Clone, Debug)]
pub enum LiveEvent {
    Started { camera: String },
    Detection(Arc<DetectionResult>),
    /// `reason` is set when the loop ended because of a camera failure.
    Stopped { reason: Option<String> },
}

/// Loop counters.
#[derive(Debug, Default)]
pub struct LiveStats {
    ticks: AtomicU64,
    skipped_not_ready: AtomicU64,
    skipped_busy: AtomicU64,
    dispatched: AtomicU64,
    accepted: AtomicU64,
    stale: AtomicU64,
    failed: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LiveStatsSnapshot {
    pub ticks: u64,
    pub skipped_not_ready: u64,
    pub skipped_busy: u64,
    pub dispatched: u64,
    pub accepted: u64,
    pub stale: u64,
    pub failed: u64,
}

impl LiveStats {
    pub fn snapshot(&self) -> LiveStatsSnapshot {
        LiveStatsSnapshot {
            ticks: self.ticks.load(Ordering::SeqCst),
            skipped_not_ready: self.skipped_not_ready.load(Ordering::SeqCst),
            skipped_busy: self.skipped_busy.load(Ordering::SeqCst),
            dispatched: self.dispatched.load(Ordering::SeqCst),
            accepted: self.accepted.load(Ordering::SeqCst),
            stale: self.stale.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

/// Cancellable scheduler task.
struct LoopHandle {
    cancelled: Arc<AtomicBool>,
    cancel: Sender<()>,
    join: JoinHandle<()>,
}

impl LoopHandle {
    fn cancel_and_join(self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // The loop may already have exited on a fault and dropped its receiver.
        let _ = self.cancel.send(());
        if self.join.join().is_err() {
            log::error!("live capture loop panicked");
        }
    }
}

pub struct LiveController {
    provider: Arc<dyn CameraProvider>,
    client: Arc<dyn InferenceClient>,
    store: SharedDetectionStore,
    config: LiveConfig,
    state: Arc<Mutex<LoopState>>,
    events: Option<Sender<LiveEvent>>,
    stats: Arc<LiveStats>,
    in_flight: Arc<AtomicUsize>,
    task: Option<LoopHandle>,
}

impl LiveController {
    pub fn new(
        provider: Arc<dyn CameraProvider>,
        client: Arc<dyn InferenceClient>,
        store: SharedDetectionStore,
        config: LiveConfig,
    ) -> Self {
        Self {
            provider,
            client,
            store,
            config,
            state: Arc::new(Mutex::new(LoopState::Stopped)),
            events: None,
            stats: Arc::new(LiveStats::default()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            task: None,
        }
    }

    /// Deliver `LiveEvent`s to `events`.
    pub fn with_events(mut self, events: Sender<LiveEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> LoopState {
        *lock_state(&self.state)
    }

    pub fn stats(&self) -> LiveStatsSnapshot {
        self.stats.snapshot()
    }

    /// Requests dispatched but not yet resolved.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &SharedDetectionStore {
        &self.store
    }

    /// Acquire the camera and begin sampling. No-op while running.
    ///
    /// Acquisition failures return the reason and leave the loop `Stopped`
    /// with no device held.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.state() == LoopState::Running {
            return Ok(());
        }
        // A loop that ended on a camera fault still needs joining.
        if let Some(task) = self.task.take() {
            task.cancel_and_join();
        }

        set_state(&self.state, LoopState::Starting);
        let mut session = CaptureSession::new();
        if let Err(err) = session.open(self.provider.as_ref()) {
            drop(session);
            set_state(&self.state, LoopState::Stopped);
            log::error!(
                "could not access camera {}: {}",
                self.provider.describe(),
                err
            );
            emit(
                &self.events,
                LiveEvent::Stopped {
                    reason: Some(err.to_string()),
                },
            );
            return Err(err);
        }
        let camera = session
            .camera_name()
            .unwrap_or("camera")
            .to_string();

        let (cancel, cancel_rx) = mpsc::channel::<()>();
        let cancelled = Arc::new(AtomicBool::new(false));
        let ctx = LoopContext {
            client: self.client.clone(),
            store: self.store.clone(),
            config: self.config.clone(),
            state: self.state.clone(),
            events: self.events.clone(),
            stats: self.stats.clone(),
            in_flight: self.in_flight.clone(),
            cancelled: cancelled.clone(),
        };

        set_state(&self.state, LoopState::Running);
        let spawned = std::thread::Builder::new()
            .name("faceguard-live".to_string())
            .spawn(move || ctx.run(session, cancel_rx));
        let join = match spawned {
            Ok(join) => join,
            Err(err) => {
                // The closure, and the session inside it, is dropped here.
                set_state(&self.state, LoopState::Stopped);
                return Err(CaptureError::DeviceUnavailable(format!(
                    "could not start capture loop: {}",
                    err
                )));
            }
        };
        self.task = Some(LoopHandle {
            cancelled,
            cancel,
            join,
        });
        log::info!(
            "live capture started on {} (every {}ms, max {} in flight)",
            camera,
            self.config.sample_interval.as_millis(),
            self.config.max_in_flight
        );
        emit(&self.events, LiveEvent::Started { camera });
        Ok(())
    }

    /// Cancel sampling, release the camera, abandon in-flight requests.
    /// No-op when already stopped.
    pub fn stop(&mut self) {
        let task = self.task.take();
        let had_task = task.is_some();
        if let Some(task) = task {
            task.cancel_and_join();
        }
        self.store.abandon_pending();
        let previous = std::mem::replace(&mut *lock_state(&self.state), LoopState::Stopped);
        if previous != LoopState::Stopped {
            log::info!("live capture stopped");
            emit(&self.events, LiveEvent::Stopped { reason: None });
        } else if had_task {
            log::debug!("live capture already stopped by a camera fault");
        }
    }
}

impl Drop for LiveController {
    fn drop(&mut self) {
        self.stop();
    }
}

struct LoopContext {
    client: Arc<dyn InferenceClient>,
    store: SharedDetectionStore,
    config: LiveConfig,
    state: Arc<Mutex<LoopState>>,
    events: Option<Sender<LiveEvent>>,
    stats: Arc<LiveStats>,
    in_flight: Arc<AtomicUsize>,
    cancelled: Arc<AtomicBool>,
}

impl LoopContext {
    fn run(self, mut session: CaptureSession, cancel: mpsc::Receiver<()>) {
        loop {
            match cancel.recv_timeout(self.config.sample_interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
            if self.cancelled.load(Ordering::SeqCst) {
                break;
            }
            if let Err(err) = self.tick(&mut session) {
                log::error!("camera failed, stopping live capture: {}", err);
                session.stop();
                self.store.abandon_pending();
                set_state(&self.state, LoopState::Stopped);
                emit(
                    &self.events,
                    LiveEvent::Stopped {
                        reason: Some(err.to_string()),
                    },
                );
                return;
            }
        }
        session.stop();
    }

    fn tick(&self, session: &mut CaptureSession) -> Result<(), CaptureError> {
        self.stats.ticks.fetch_add(1, Ordering::SeqCst);
        let frame = match session.grab()? {
            Some(frame) if frame.dims().is_valid() => frame,
            _ => {
                self.stats.skipped_not_ready.fetch_add(1, Ordering::SeqCst);
                log::trace!("camera not ready, skipping tick");
                return Ok(());
            }
        };
        let Some(slot) = InFlightSlot::try_claim(&self.in_flight, self.config.max_in_flight)
        else {
            self.stats.skipped_busy.fetch_add(1, Ordering::SeqCst);
            log::debug!(
                "{} requests in flight, skipping tick",
                self.config.max_in_flight
            );
            return Ok(());
        };
        self.dispatch(frame, slot);
        Ok(())
    }

    fn dispatch(&self, frame: CapturedFrame, slot: InFlightSlot) {
        let ticket = self.store.dispatch();
        self.stats.dispatched.fetch_add(1, Ordering::SeqCst);
        let client = self.client.clone();
        let store = self.store.clone();
        let stats = self.stats.clone();
        let events = self.events.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("faceguard-infer-{}", ticket.seq()))
            .spawn(move || {
                let _slot = slot;
                match client.submit(&frame, SubmitOptions::ephemeral()) {
                    Ok(result) => match store.resolve(ticket, result) {
                        Resolution::Accepted(result) => {
                            stats.accepted.fetch_add(1, Ordering::SeqCst);
                            emit(&events, LiveEvent::Detection(result));
                        }
                        Resolution::Stale => {
                            stats.stale.fetch_add(1, Ordering::SeqCst);
                            log::debug!("discarding stale result for frame {}", ticket.seq());
                        }
                    },
                    Err(err) => {
                        stats.failed.fetch_add(1, Ordering::SeqCst);
                        log::warn!("frame {} inference failed (dropped): {}", ticket.seq(), err);
                    }
                }
            });
        if let Err(err) = spawned {
            self.stats.failed.fetch_add(1, Ordering::SeqCst);
            log::warn!("could not spawn inference worker: {}", err);
        }
    }
}

/// One unit of the in-flight budget, returned on drop.
struct InFlightSlot(Arc<AtomicUsize>);

impl InFlightSlot {
    fn try_claim(counter: &Arc<AtomicUsize>, limit: usize) -> Option<Self> {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < limit).then_some(n + 1)
            })
            .ok()
            .map(|_| InFlightSlot(counter.clone()))
    }
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn lock_state(state: &Mutex<LoopState>) -> std::sync::MutexGuard<'_, LoopState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn set_state(state: &Mutex<LoopState>, next: LoopState) {
    *lock_state(state) = next;
}

fn emit(events: &Option<Sender<LiveEvent>>, event: LiveEvent) {
    if let Some(tx) = events {
        // A closed receiver just means nobody is watching.
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_slots_are_bounded_and_returned() {
        let counter = Arc::new(AtomicUsize::new(0));
        let a = InFlightSlot::try_claim(&counter, 2).unwrap();
        let _b = InFlightSlot::try_claim(&counter, 2).unwrap();
        assert!(InFlightSlot::try_claim(&counter, 2).is_none());
        drop(a);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(InFlightSlot::try_claim(&counter, 2).is_some());
    }
}
