//! Shared arbiter handle.
//!
//! Wraps the Sans-IO [`Ledger`] and the run [`Trace`] behind one
//! `tokio::sync::Mutex` and executes the [`LedgerAction`]s it returns:
//! records go into the trace, wake-ups go to per-participant `Notify`
//! handles. Every grant, block, release and termination is decided and
//! recorded in the same critical section.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use gridlock_core::{
    Checkpoint, EngineError, Ledger, LedgerAction, LedgerSnapshot, MalformedReason,
    ParticipantState, Pid, RequestOutcome, ResourceVector, Termination, Trace, TraceEvent,
    VictimPolicy, env::Environment,
};
use tokio::sync::{Mutex, Notify, futures::Notified};

struct Shared {
    ledger: Ledger,
    trace: Trace,
}

struct Inner<E> {
    env: E,
    started: Instant,
    shared: Mutex<Shared>,
    /// One per participant, indexed by pid.
    wakers: Vec<Notify>,
    /// Wakes the monitor after a blocking transition.
    monitor: Notify,
}

/// Cloneable handle shared by the participants and the monitor.
pub struct Arbiter<E: Environment> {
    inner: Arc<Inner<E>>,
}

impl<E: Environment> Clone for Arbiter<E> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<E: Environment> Arbiter<E> {
    /// Take ownership of `ledger`. Trace offsets are measured from now.
    pub fn new(env: E, ledger: Ledger) -> Self {
        let participants = ledger.participants().len();
        let started = env.now();
        let inner = Inner {
            env,
            started,
            shared: Mutex::new(Shared { ledger, trace: Trace::new() }),
            wakers: (0..participants).map(|_| Notify::new()).collect(),
            monitor: Notify::new(),
        };
        Self { inner: Arc::new(inner) }
    }

    /// Environment of this run.
    pub fn env(&self) -> &E {
        &self.inner.env
    }

    fn elapsed(&self) -> Duration {
        self.inner.env.now().saturating_duration_since(self.inner.started)
    }

    fn execute(&self, shared: &mut Shared, actions: Vec<LedgerAction>) {
        let elapsed = self.elapsed();
        for action in actions {
            match action {
                LedgerAction::Record(event) => shared.trace.push_at(elapsed, event),
                LedgerAction::Wake(pid) => {
                    if let Some(waker) = self.inner.wakers.get(pid.index()) {
                        waker.notify_one();
                    }
                },
            }
        }
    }

    fn refuse(&self, shared: &mut Shared, pid: Pid, err: &EngineError) {
        if let Some(reason) = err.malformed_reason() {
            shared.trace.push_at(self.elapsed(), TraceEvent::Refused { pid, reason });
        }
    }

    /// Issue step `step` of `pid`'s script.
    ///
    /// A malformed request is recorded in the trace before it is returned.
    pub async fn request(
        &self,
        pid: Pid,
        step: usize,
        request: &ResourceVector,
    ) -> Result<RequestOutcome, EngineError> {
        let mut shared = self.inner.shared.lock().await;
        let event = TraceEvent::Requested { pid, step, request: request.clone() };
        shared.trace.push_at(self.elapsed(), event);

        match shared.ledger.request(pid, request) {
            Ok((outcome, actions)) => {
                self.execute(&mut shared, actions);
                if outcome == RequestOutcome::Blocked {
                    self.inner.monitor.notify_one();
                }
                Ok(outcome)
            },
            Err(err) => {
                self.refuse(&mut shared, pid, &err);
                Err(err)
            },
        }
    }

    /// Suspend a blocked participant until it is granted or terminated.
    ///
    /// Returns `None` once the pending request has been granted. Wakes on a
    /// direct notification, and re-checks every `recheck` regardless.
    pub async fn wait_until_unblocked(
        &self,
        pid: Pid,
        recheck: Duration,
    ) -> Result<Option<Termination>, EngineError> {
        let unknown = || EngineError::MalformedRequest {
            pid,
            reason: MalformedReason::UnknownParticipant,
        };
        let waker = self.inner.wakers.get(pid.index()).ok_or_else(unknown)?;

        loop {
            let (state, stopped) = {
                let shared = self.inner.shared.lock().await;
                (shared.ledger.state(pid), shared.ledger.is_stopped())
            };
            match state {
                Some(ParticipantState::Blocked) if stopped => {
                    return Err(EngineError::InvariantViolation {
                        detail: format!("{pid} still blocked after stop"),
                        dump: format!("{:#?}", self.inner.shared.lock().await.ledger),
                    });
                },
                Some(ParticipantState::Blocked) => {},
                Some(ParticipantState::Terminated(termination)) => return Ok(Some(termination)),
                Some(_) => return Ok(None),
                None => return Err(unknown()),
            }

            tokio::select! {
                biased;
                () = waker.notified() => {},
                () = self.inner.env.sleep(recheck) => {},
            }
        }
    }

    /// Hand units back.
    pub async fn release(&self, pid: Pid, units: &ResourceVector) -> Result<(), EngineError> {
        let mut shared = self.inner.shared.lock().await;
        match shared.ledger.release(pid, units) {
            Ok(actions) => {
                self.execute(&mut shared, actions);
                Ok(())
            },
            Err(err) => {
                self.refuse(&mut shared, pid, &err);
                Err(err)
            },
        }
    }

    /// Script finished; release everything.
    pub async fn finish(&self, pid: Pid) -> Result<(), EngineError> {
        let mut shared = self.inner.shared.lock().await;
        let actions = shared.ledger.finish(pid)?;
        self.execute(&mut shared, actions);
        Ok(())
    }

    /// Cooperative suspension point.
    pub async fn checkpoint(&self, pid: Pid) -> Result<Checkpoint, EngineError> {
        let mut shared = self.inner.shared.lock().await;
        let (checkpoint, actions) = shared.ledger.checkpoint(pid)?;
        self.execute(&mut shared, actions);
        Ok(checkpoint)
    }

    /// Raise the stop signal.
    pub async fn halt(&self) -> Result<(), EngineError> {
        let mut shared = self.inner.shared.lock().await;
        let actions = shared.ledger.halt()?;
        self.execute(&mut shared, actions);
        Ok(())
    }

    /// Terminate a deadlock victim chosen by `policy`.
    ///
    /// The victim is checked against the live ledger, not the snapshot it
    /// was chosen from. Returns `false` and records nothing when it is no
    /// longer blocked on a cycle.
    pub async fn terminate_victim(
        &self,
        pid: Pid,
        policy: VictimPolicy,
    ) -> Result<bool, EngineError> {
        let mut shared = self.inner.shared.lock().await;
        let Some(actions) = shared.ledger.terminate_deadlocked(pid)? else {
            return Ok(false);
        };
        shared.trace.push_at(self.elapsed(), TraceEvent::VictimSelected { pid, policy });
        self.execute(&mut shared, actions);
        Ok(true)
    }

    /// Append a monitor event to the trace.
    pub async fn record(&self, event: TraceEvent) {
        let mut shared = self.inner.shared.lock().await;
        shared.trace.push_at(self.elapsed(), event);
    }

    /// Consistent copy of the ledger for cycle detection.
    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.inner.shared.lock().await.ledger.snapshot()
    }

    /// Whether the stop signal has been raised.
    pub async fn is_stopped(&self) -> bool {
        self.inner.shared.lock().await.ledger.is_stopped()
    }

    /// Resolves after the next blocking transition or [`Self::wake_monitor`].
    pub fn blocking_event(&self) -> Notified<'_> {
        self.inner.monitor.notified()
    }

    /// Make the monitor observe immediately.
    pub fn wake_monitor(&self) {
        self.inner.monitor.notify_one();
    }

    /// Record every participant's final status and return the trace.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvariantViolation` if units are unaccounted
    /// for, or if every participant has terminated but some units are still
    /// allocated.
    pub async fn finish_run(&self) -> Result<Trace, EngineError> {
        let mut shared = self.inner.shared.lock().await;
        shared.ledger.check_invariants()?;

        let resources = shared.ledger.resources();
        if shared.ledger.all_terminated() && resources.available() != resources.total() {
            return Err(EngineError::InvariantViolation {
                detail: format!(
                    "run ended with {} of {} available",
                    resources.available(),
                    resources.total()
                ),
                dump: format!("{:#?}", shared.ledger),
            });
        }

        let statuses = shared
            .ledger
            .participants()
            .iter()
            .enumerate()
            .map(|(idx, state)| (Pid(idx), *state))
            .collect();
        shared.trace.push_at(self.elapsed(), TraceEvent::Finished { statuses });
        Ok(shared.trace.clone())
    }
}
