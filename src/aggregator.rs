use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AggregatorConfig;
use crate::kernel::batch::{BatchProcessor, FlushOutcome, InFlightBatch, SkipReason};
use crate::kernel::item::ItemId;
use crate::kernel::scheduler::{Scheduler, SideEffect, Trigger};
use crate::kernel::state::{AggregatorState, StateDelta};
use crate::kernel::telemetry::event::TelemetryEvent;
use crate::kernel::telemetry::metrics::TelemetrySnapshot;
use crate::kernel::telemetry::recorder::TelemetryRecorder;
use crate::services::views::BatchEndpoint;

/// Facade over the batching core.
///
/// Every call takes one short lock over the core, applies its delta and re-runs the
/// scheduling policy before returning. The lock is never held across the network
/// submission, which runs as a spawned task on the captured runtime.
pub struct Aggregator<E: BatchEndpoint> {
    inner: Arc<Inner<E>>,
}

struct Core {
    state: AggregatorState,
    telemetry: TelemetryRecorder,
}

struct Inner<E> {
    core: Mutex<Core>,
    scheduler: Scheduler,
    endpoint: Arc<E>,
    runtime: Handle,
}

/// Completion signal for a flush. Dropping it does not cancel the submission.
#[must_use = "dropping a FlushHandle detaches the flush; call `wait` to observe its outcome"]
#[derive(Debug)]
pub enum FlushHandle {
    Skipped(SkipReason),
    Submitted(JoinHandle<FlushOutcome>),
}

impl FlushHandle {
    pub fn is_submitted(&self) -> bool {
        matches!(self, FlushHandle::Submitted(_))
    }

    pub async fn wait(self) -> FlushOutcome {
        match self {
            FlushHandle::Skipped(reason) => FlushOutcome::Skipped(reason),
            FlushHandle::Submitted(task) => match task.await {
                Ok(outcome) => outcome,
                Err(error) => {
                    warn!(%error, "Flush task did not run to completion");
                    FlushOutcome::Abandoned
                }
            },
        }
    }
}

impl<E: BatchEndpoint> Aggregator<E> {
    /// # Panics
    /// Panics when called outside a tokio runtime; use [`Aggregator::with_runtime`] there.
    pub fn new(config: AggregatorConfig, endpoint: Arc<E>) -> Self {
        Self::with_runtime(config, endpoint, Handle::current())
    }

    pub fn with_runtime(config: AggregatorConfig, endpoint: Arc<E>, runtime: Handle) -> Self {
        info!(
            threshold = config.batch_threshold,
            delay_ms = config.batch_delay.as_millis() as u64,
            "View aggregator started"
        );
        Self {
            inner: Arc::new(Inner {
                core: Mutex::new(Core {
                    state: AggregatorState::new(),
                    telemetry: TelemetryRecorder::new(),
                }),
                scheduler: Scheduler::new(config.batch_threshold, config.batch_delay),
                endpoint,
                runtime,
            }),
        }
    }

    /// Queue a view. Empty ids are ignored. Never blocks on the network.
    pub fn record_view(&self, id: impl AsRef<str>) {
        let Some(id) = ItemId::parse(id.as_ref()) else {
            debug!("Ignoring view with empty item id");
            return;
        };

        let mut core = self.inner.lock();
        if core.state.closed {
            debug!(item = %id, "Ignoring view recorded after shutdown");
            return;
        }

        core.state.reduce(StateDelta::ViewRecorded(id));
        self.inner.apply_policy(&mut core);
    }

    /// Last confirmed count, or 0.
    pub fn view_count(&self, id: impl AsRef<str>) -> u64 {
        self.inner.lock().state.counts.get(id.as_ref())
    }

    /// One-time priming with a count known from elsewhere (e.g. the item payload).
    /// Negative counts, empty ids and repeat seeds are ignored.
    pub fn seed_initial_count(&self, id: impl AsRef<str>, count: i64) {
        let Some(id) = ItemId::parse(id.as_ref()) else {
            debug!("Ignoring seed with empty item id");
            return;
        };
        let Ok(count) = u64::try_from(count) else {
            debug!(item = %id, count, "Ignoring negative seed count");
            return;
        };

        self.inner
            .lock()
            .state
            .reduce(StateDelta::CountSeeded { id, count });
    }

    /// Same initiation as the threshold trigger. Skips if a flush is in flight or
    /// nothing is pending.
    pub fn flush_now(&self) -> FlushHandle {
        let mut core = self.inner.lock();
        self.inner.start_flush(&mut core, Trigger::Manual)
    }

    /// Stop accepting views and make one best-effort final flush.
    ///
    /// A flush already in flight is left to settle on its own; no second one is started.
    pub async fn shutdown(&self) -> FlushOutcome {
        let handle = {
            let mut core = self.inner.lock();
            if core.state.closed {
                return FlushOutcome::Skipped(SkipReason::Closed);
            }
            self.inner.close(&mut core)
        };
        handle.wait().await
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().state.pending.len()
    }

    pub fn pending_ids(&self) -> Vec<ItemId> {
        self.inner.lock().state.pending.snapshot()
    }

    pub fn is_processing(&self) -> bool {
        self.inner.lock().state.processing
    }

    pub fn timer_armed(&self) -> bool {
        self.inner.lock().state.timer.is_armed()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().state.closed
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.inner.lock().telemetry.snapshot()
    }
}

impl<E: BatchEndpoint> Drop for Aggregator<E> {
    fn drop(&mut self) {
        let mut core = self.inner.lock();
        if core.state.closed {
            return;
        }
        // Submission outlives us; its result is discarded once the core is gone.
        let _ = self.inner.close(&mut core);
    }
}

impl<E: BatchEndpoint> Inner<E> {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply_policy(self: &Arc<Self>, core: &mut Core) {
        match self.scheduler.evaluate(&core.state) {
            Some(SideEffect::Flush(trigger)) => {
                let _ = self.start_flush(core, trigger);
            }
            Some(SideEffect::ArmTimer(delay)) => self.arm_timer(core, delay),
            None => {}
        }
    }

    fn start_flush(self: &Arc<Self>, core: &mut Core, trigger: Trigger) -> FlushHandle {
        let Core { state, telemetry } = core;
        match BatchProcessor::begin(state, telemetry, trigger) {
            Err(reason) => FlushHandle::Skipped(reason),
            Ok(batch) => {
                let inner = Arc::downgrade(self);
                let endpoint = Arc::clone(&self.endpoint);
                FlushHandle::Submitted(self.runtime.spawn(settle_batch(inner, endpoint, batch)))
            }
        }
    }

    fn arm_timer(self: &Arc<Self>, core: &mut Core, delay: Duration) {
        let token = CancellationToken::new();
        core.state.reduce(StateDelta::TimerArmed(token.clone()));
        core.telemetry.record(TelemetryEvent::TimerArmed {
            delay_ms: delay.as_millis() as u64,
        });
        debug!(delay_ms = delay.as_millis() as u64, "Deferred flush armed");

        let inner = Arc::downgrade(self);
        self.runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Some(inner) = inner.upgrade() {
                        inner.fire_timer(&token);
                    }
                }
            }
        });
    }

    fn fire_timer(self: &Arc<Self>, token: &CancellationToken) {
        let mut core = self.lock();
        // Disarmed between waking and taking the lock.
        if token.is_cancelled() {
            return;
        }
        core.state.reduce(StateDelta::TimerCleared);
        let _ = self.start_flush(&mut core, Trigger::Delay);
    }

    fn close(self: &Arc<Self>, core: &mut Core) -> FlushHandle {
        let pending = core.state.pending.len();
        info!(pending, "Tearing down view aggregator");
        core.telemetry.record(TelemetryEvent::Teardown { pending });

        let handle = self.start_flush(core, Trigger::Teardown);
        core.state.reduce(StateDelta::Closed);
        handle
    }
}

/// Submit outside the lock, then reconcile and re-run the policy under it.
async fn settle_batch<E: BatchEndpoint>(
    inner: Weak<Inner<E>>,
    endpoint: Arc<E>,
    batch: InFlightBatch,
) -> FlushOutcome {
    let result = endpoint.submit(batch.items.clone()).await;

    let Some(inner) = inner.upgrade() else {
        debug!(batch_id = %batch.id, "Aggregator released before batch settled; discarding result");
        return FlushOutcome::Discarded { batch_id: batch.id };
    };

    let mut core = inner.lock();
    let Core { state, telemetry } = &mut *core;
    let outcome = BatchProcessor::reconcile(state, telemetry, &batch, result);
    inner.apply_policy(&mut core);
    outcome
}
