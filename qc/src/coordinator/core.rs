//! Main Coordinator task implementation

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::{CoordinatorConfig, ShutdownPolicy};
use super::handle::CoordinatorHandle;
use super::messages::{ControlSignal, CoordRequest, CoordinatorMetrics, CoordinatorState, FailureReason, QueryOutcome};
use super::queue::{CallbackQueue, InfoCallback};
use super::worker::{self, QueryCompleted, QuerySlot};
use crate::provider::{InfoProvider, Ready};

/// Coalesces requests for one kind of information into at most one
/// concurrent query.
///
/// Build it with a provider, hand out [`CoordinatorHandle`]s, and drive it
/// with [`Coordinator::run`] on its own task. That task is the only place the
/// callback queue and in-flight state are touched.
pub struct Coordinator<P: InfoProvider> {
    config: CoordinatorConfig,
    tx: mpsc::Sender<CoordRequest<P::Info>>,
    rx: mpsc::Receiver<CoordRequest<P::Info>>,
    slot: QuerySlot<P>,
}

impl<P: InfoProvider> Coordinator<P> {
    /// Create a new Coordinator with the given configuration
    pub fn new(config: CoordinatorConfig, provider: P) -> Self {
        debug!(provider = provider.name(), "Coordinator::new: called");
        let (tx, rx) = mpsc::channel(config.channel_buffer.max(1));
        Self {
            config,
            tx,
            rx,
            slot: QuerySlot::new(provider),
        }
    }

    /// Get a raw sender for submitting requests
    pub fn sender(&self) -> mpsc::Sender<CoordRequest<P::Info>> {
        self.tx.clone()
    }

    /// Get a handle for submitting requests
    pub fn handle(&self) -> CoordinatorHandle<P> {
        CoordinatorHandle::new(self.tx.clone(), self.slot.provider.name())
    }

    /// Spawn the control task, returning a handle and the task's JoinHandle
    pub fn spawn(self) -> (CoordinatorHandle<P>, JoinHandle<()>) {
        let handle = self.handle();
        let task = tokio::spawn(self.run());
        (handle, task)
    }

    /// Run the Coordinator task
    ///
    /// This consumes the Coordinator and runs until shutdown is requested or
    /// every handle has been dropped. Callbacks still queued when it stops
    /// are resolved with [`FailureReason::ShuttingDown`].
    pub async fn run(self) {
        let Coordinator { config, tx, mut rx, slot } = self;
        // Only handles keep the channel open
        drop(tx);

        let (signals_tx, mut signals_rx) = mpsc::unbounded_channel();
        let (completions_tx, mut completions_rx) = mpsc::unbounded_channel();
        let mut machine = Machine::new(slot, config.preparation_timeout(), signals_tx, completions_tx);
        let mut finishing = false;

        // One timer serves every cycle; it is re-armed when a new cycle starts
        let preparation_timer = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(preparation_timer);

        info!(provider = machine.name, "Coordinator started");

        loop {
            let deadline = machine.preparation_deadline();
            if let Some(deadline) = deadline {
                if preparation_timer.deadline() != deadline {
                    preparation_timer.as_mut().reset(deadline);
                }
            }

            tokio::select! {
                biased;

                Some(signal) = signals_rx.recv() => machine.on_signal(signal),

                Some(completed) = completions_rx.recv() => {
                    machine.on_query_completed(completed);
                    if finishing && machine.state == CoordinatorState::Idle {
                        break;
                    }
                }

                () = &mut preparation_timer, if deadline.is_some() => machine.on_preparation_deadline(),

                req = rx.recv(), if !finishing => match req {
                    Some(CoordRequest::RequestInfo { callback }) => machine.request_info(callback),
                    Some(CoordRequest::GetMetrics { reply_tx }) => {
                        let _ = reply_tx.send(machine.snapshot());
                    }
                    Some(CoordRequest::Shutdown) | None => {
                        info!(provider = machine.name, "Coordinator shutting down");
                        if config.shutdown == ShutdownPolicy::Drain && machine.state == CoordinatorState::AwaitingQuery {
                            debug!("Waiting for in-flight query before stopping");
                            finishing = true;
                        } else {
                            break;
                        }
                    }
                },
            }
        }

        // Resolve anything still buffered so no callback is silently dropped
        rx.close();
        while let Ok(req) = rx.try_recv() {
            match req {
                CoordRequest::RequestInfo { callback } => machine.enqueue(callback),
                CoordRequest::GetMetrics { reply_tx } => {
                    let _ = reply_tx.send(machine.snapshot());
                }
                CoordRequest::Shutdown => {}
            }
        }
        machine.fail_pending(FailureReason::ShuttingDown);

        info!(provider = machine.name, "Coordinator stopped");
    }
}

/// Control-task state: queue, cycle bookkeeping, and the provider slot
/// while it is not out on the worker pool.
struct Machine<P: InfoProvider> {
    name: &'static str,
    slot: Option<QuerySlot<P>>,
    queue: CallbackQueue<P::Info>,
    state: CoordinatorState,
    cycle: u64,
    metrics: CoordinatorMetrics,
    preparation_timeout: Option<Duration>,
    preparation_deadline: Option<Instant>,
    signals_tx: mpsc::UnboundedSender<ControlSignal>,
    completions_tx: mpsc::UnboundedSender<QueryCompleted<P>>,
}

impl<P: InfoProvider> Machine<P> {
    fn new(
        slot: QuerySlot<P>,
        preparation_timeout: Option<Duration>,
        signals_tx: mpsc::UnboundedSender<ControlSignal>,
        completions_tx: mpsc::UnboundedSender<QueryCompleted<P>>,
    ) -> Self {
        Self {
            name: slot.provider.name(),
            slot: Some(slot),
            queue: CallbackQueue::new(),
            state: CoordinatorState::Idle,
            cycle: 0,
            metrics: CoordinatorMetrics::default(),
            preparation_timeout,
            preparation_deadline: None,
            signals_tx,
            completions_tx,
        }
    }

    fn enqueue(&mut self, callback: InfoCallback<P::Info>) {
        self.metrics.requests += 1;
        self.queue.push(callback);
    }

    /// Queue `callback`; start a cycle unless one is already running
    fn request_info(&mut self, callback: InfoCallback<P::Info>) {
        self.enqueue(callback);

        if self.state != CoordinatorState::Idle {
            self.metrics.coalesced += 1;
            debug!(cycle = self.cycle, pending = self.queue.len(), "Coalescing request into running cycle");
            return;
        }

        self.start_cycle();
    }

    fn start_cycle(&mut self) {
        self.cycle += 1;
        self.state = CoordinatorState::AwaitingPreparation;
        debug!(cycle = self.cycle, "Starting cycle");

        let Some(slot) = self.slot.as_mut() else {
            warn!(provider = self.name, "Provider was lost on the worker pool, failing request");
            self.complete(QueryOutcome::Failed(FailureReason::NotScheduled));
            return;
        };

        self.preparation_deadline = self.preparation_timeout.map(|timeout| Instant::now() + timeout);
        slot.provider.prepare(Ready::new(self.cycle, self.signals_tx.clone()));
    }

    /// Deadline of the current preparation, if one is configured and pending
    fn preparation_deadline(&self) -> Option<Instant> {
        self.preparation_deadline
            .filter(|_| self.state == CoordinatorState::AwaitingPreparation)
    }

    fn on_preparation_deadline(&mut self) {
        self.on_signal(ControlSignal::PreparationTimedOut(self.cycle));
    }

    fn on_signal(&mut self, signal: ControlSignal) {
        let (cycle, current) = match signal {
            ControlSignal::Prepared(c) | ControlSignal::PreparationTimedOut(c) | ControlSignal::PreparationAbandoned(c) => {
                (c, c == self.cycle && self.state == CoordinatorState::AwaitingPreparation)
            }
        };
        if !current {
            debug!(?signal, cycle = self.cycle, state = ?self.state, "Ignoring stale control signal");
            return;
        }

        match signal {
            ControlSignal::Prepared(_) => self.dispatch(),
            ControlSignal::PreparationTimedOut(_) => {
                warn!(cycle, provider = self.name, "Preparation timed out");
                self.complete(QueryOutcome::Failed(FailureReason::PreparationTimedOut));
            }
            ControlSignal::PreparationAbandoned(_) => {
                warn!(cycle, provider = self.name, "Preparation abandoned");
                self.complete(QueryOutcome::Failed(FailureReason::PreparationAbandoned));
            }
        }
    }

    fn dispatch(&mut self) {
        let Some(slot) = self.slot.take() else {
            self.complete(QueryOutcome::Failed(FailureReason::NotScheduled));
            return;
        };

        self.state = CoordinatorState::AwaitingQuery;
        self.metrics.dispatches += 1;
        worker::run_query(self.cycle, slot, self.completions_tx.clone());
    }

    fn on_query_completed(&mut self, completed: QueryCompleted<P>) {
        debug!(cycle = completed.cycle, outcome = ?completed.outcome, "Query completed");
        match completed.slot {
            Some(slot) => self.slot = Some(slot),
            None => warn!(provider = self.name, "Query slot lost; later requests will fail"),
        }

        if completed.cycle != self.cycle || self.state != CoordinatorState::AwaitingQuery {
            warn!(cycle = completed.cycle, current = self.cycle, "Discarding result for finished cycle");
            return;
        }

        self.complete(completed.outcome);
    }

    /// Drain the queue with `outcome` and return to idle
    fn complete(&mut self, outcome: QueryOutcome) {
        self.state = CoordinatorState::Draining;
        if outcome.is_success() {
            self.metrics.successes += 1;
        } else {
            self.metrics.failures += 1;
        }

        let info = match (&outcome, self.slot.as_ref()) {
            (QueryOutcome::Succeeded, Some(slot)) => Some(&slot.info),
            _ => None,
        };
        let delivered = self.queue.drain(&outcome, info);

        debug!(cycle = self.cycle, delivered, "Drain finished");
        self.state = CoordinatorState::Idle;
    }

    fn fail_pending(&mut self, reason: FailureReason) {
        if !self.queue.is_empty() {
            self.complete(QueryOutcome::Failed(reason));
        }
    }

    fn snapshot(&self) -> CoordinatorMetrics {
        let mut metrics = self.metrics.clone();
        metrics.reentrant = self.queue.reentrant_count();
        metrics.requests += metrics.reentrant;
        metrics.pending_callbacks = self.queue.len();
        metrics.state = self.state;
        metrics
    }
}
