//! Active-endpoint switch orchestrator
//!
//! Runs one switch at a time through validate, prepare, commit and verify,
//! timing each phase and publishing progress. Failed switches leave the active
//! endpoint where it was; every finished attempt lands in the history.
//!
//! Each switch runs on its own task, so the in-flight slot is always released
//! even if the caller stops waiting. Dropping the `switch_to` future cancels a
//! switch that has not committed yet; after the commit it runs to the end.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::events::{EventSink, MuxEvent};
use crate::registry::EndpointId;
use crate::session::control::call_with_timeout;
use crate::session::{ControlPlane, ControlResponse};

use super::history::SwitchHistory;
use super::state::{SwitchPhase, SwitchRecord};

/// Result of a switch request that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum SwitchOutcome {
    /// Target was already active; nothing ran
    Unchanged,
    /// Switch ran to completion
    Completed(SwitchRecord),
}

/// The switch currently running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlightSwitch {
    pub id: u64,
    pub from_endpoint: Option<EndpointId>,
    pub to_endpoint: EndpointId,
    pub phase: SwitchPhase,
}

struct InFlight {
    info: InFlightSwitch,
    cancel: CancellationToken,
}

#[derive(Default)]
struct SwitchState {
    active: Option<EndpointId>,
    in_flight: Option<InFlight>,
    next_id: u64,
}

/// Moves "active" status between endpoints
pub struct SwitchOrchestrator<C: ControlPlane> {
    core: Arc<SwitchCore<C>>,
}

/// State shared with the task running a switch
struct SwitchCore<C: ControlPlane> {
    client: Arc<C>,
    events: EventSink,
    history: SwitchHistory,
    state: Mutex<SwitchState>,
    timeout: Duration,
    settle_delay: Duration,
}

impl<C: ControlPlane> SwitchOrchestrator<C> {
    pub fn new(
        client: Arc<C>,
        events: EventSink,
        timeout: Duration,
        settle_delay: Duration,
        history_capacity: usize,
    ) -> Self {
        Self {
            core: Arc::new(SwitchCore {
                client,
                events,
                history: SwitchHistory::new(history_capacity),
                state: Mutex::new(SwitchState::default()),
                timeout,
                settle_delay,
            }),
        }
    }

    /// Endpoint currently considered active
    pub async fn current_active(&self) -> Option<EndpointId> {
        self.core.state.lock().await.active
    }

    /// Seed the active endpoint without running a switch
    ///
    /// Refused while a switch is in flight.
    pub async fn set_active(&self, endpoint: Option<EndpointId>) -> Result<()> {
        let mut state = self.core.state.lock().await;

        if let Some(ref in_flight) = state.in_flight {
            return Err(Error::SwitchInProgress(in_flight.info.to_endpoint));
        }

        state.active = endpoint;
        tracing::info!(endpoint = ?endpoint, "Active endpoint set");
        Ok(())
    }

    /// Snapshot of the switch in flight, if any
    pub async fn in_flight(&self) -> Option<InFlightSwitch> {
        self.core.state.lock().await.in_flight.as_ref().map(|f| f.info)
    }

    /// Finished switches, most recent first
    pub async fn history(&self) -> Vec<SwitchRecord> {
        self.core.history.snapshot().await
    }

    /// Most recent finished switch
    pub async fn last_switch(&self) -> Option<SwitchRecord> {
        self.core.history.latest().await
    }

    /// Make `to` the active endpoint
    ///
    /// Returns `Unchanged` without contacting the control plane if `to` is
    /// already active. Fails with `SwitchInProgress` if another switch is
    /// running, in which case that switch is not affected.
    pub async fn switch_to(&self, to: EndpointId) -> Result<SwitchOutcome> {
        let (from, cancel, id) = {
            let mut state = self.core.state.lock().await;

            if state.active == Some(to) {
                tracing::debug!(endpoint = %to, "Switch target already active");
                return Ok(SwitchOutcome::Unchanged);
            }

            if let Some(ref in_flight) = state.in_flight {
                tracing::warn!(
                    requested = %to,
                    in_flight = %in_flight.info.to_endpoint,
                    "Switch rejected: another switch in progress"
                );
                return Err(Error::SwitchInProgress(in_flight.info.to_endpoint));
            }

            state.next_id += 1;
            let id = state.next_id;
            let cancel = CancellationToken::new();
            state.in_flight = Some(InFlight {
                info: InFlightSwitch {
                    id,
                    from_endpoint: state.active,
                    to_endpoint: to,
                    phase: SwitchPhase::Idle,
                },
                cancel: cancel.clone(),
            });

            (state.active, cancel, id)
        };

        tracing::info!(switch_id = id, from = ?from, to = %to, "Switch started");
        self.core.events.emit(MuxEvent::SwitchStarted {
            from_endpoint: from,
            to_endpoint: to,
        });

        // Fires if this future is dropped before the task reports back
        let abandon = cancel.clone().drop_guard();
        let core = Arc::clone(&self.core);
        let task = tokio::spawn(async move { core.run(id, from, to, cancel).await });

        let result = match task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(switch_id = id, error = %e, "Switch task failed");
                self.core.release(id).await;
                Err(Error::RemoteFailure(format!("switch task failed: {e}")))
            }
        };

        abandon.disarm();
        result
    }

    /// Cancel the switch in flight
    ///
    /// Only possible while validating or preparing; once the commit has been
    /// issued the switch runs to the end.
    pub async fn cancel(&self) -> Result<()> {
        let state = self.core.state.lock().await;
        let in_flight = state.in_flight.as_ref().ok_or(Error::NoSwitchInFlight)?;

        if !in_flight.info.phase.is_cancellable() {
            return Err(Error::NotCancellable(in_flight.info.phase));
        }

        in_flight.cancel.cancel();
        tracing::info!(
            switch_id = in_flight.info.id,
            phase = %in_flight.info.phase,
            "Switch cancellation requested"
        );
        Ok(())
    }
}

impl<C: ControlPlane> SwitchCore<C> {
    async fn run(
        &self,
        id: u64,
        from: Option<EndpointId>,
        to: EndpointId,
        cancel: CancellationToken,
    ) -> Result<SwitchOutcome> {
        let mut record = SwitchRecord::new(id, from, to);
        let started = Instant::now();
        let result = self.run_phases(&mut record, &cancel).await;
        record.durations.total = Some(started.elapsed());

        self.finish(record, result).await
    }

    async fn run_phases(
        &self,
        record: &mut SwitchRecord,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let to = record.to_endpoint;

        // Validating
        self.enter(record, SwitchPhase::Validating, cancel).await?;
        let phase_start = Instant::now();
        let health = self
            .cancellable(cancel, self.remote("check_health", to, self.client.check_health(to)))
            .await;
        record.durations.set(SwitchPhase::Validating, phase_start.elapsed());
        match health {
            Ok(()) => {}
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                tracing::warn!(endpoint = %to, error = %e, "Switch target failed health check");
                return Err(Error::TargetUnavailable(to));
            }
        }

        // Preparing
        self.enter(record, SwitchPhase::Preparing, cancel).await?;
        let phase_start = Instant::now();
        if let Some(from) = record.from_endpoint {
            let quiesce = self.remote("quiesce", from, self.client.quiesce_endpoint(from));
            match self.cancellable(cancel, quiesce).await {
                Ok(()) => tracing::debug!(endpoint = %from, "Source endpoint quiesced"),
                Err(Error::Cancelled) => {
                    record.durations.set(SwitchPhase::Preparing, phase_start.elapsed());
                    return Err(Error::Cancelled);
                }
                Err(e) => {
                    tracing::warn!(
                        endpoint = %from,
                        error = %e,
                        "Quiesce failed, continuing switch"
                    )
                }
            }
        }
        record.durations.set(SwitchPhase::Preparing, phase_start.elapsed());

        // Switching: past this point cancellation is refused
        self.enter(record, SwitchPhase::Switching, cancel).await?;
        let phase_start = Instant::now();
        let commit = self
            .remote("commit", to, self.client.commit_active_endpoint(to))
            .await;
        record.durations.set(SwitchPhase::Switching, phase_start.elapsed());
        commit?;

        // Verifying
        self.enter(record, SwitchPhase::Verifying, cancel).await?;
        let phase_start = Instant::now();
        tokio::time::sleep(self.settle_delay).await;
        match self.remote("check_health", to, self.client.check_health(to)).await {
            Ok(()) => tracing::debug!(endpoint = %to, "Switch verified"),
            Err(e) => tracing::warn!(endpoint = %to, error = %e, "Switch verification failed"),
        }
        record.durations.set(SwitchPhase::Verifying, phase_start.elapsed());

        Ok(())
    }

    /// Enter the next phase, publishing progress
    ///
    /// The cancellation check and the phase change happen under the state
    /// lock, so `cancel()` can never succeed after `Switching` is entered.
    /// A cancellation seen after the commit is ignored.
    async fn enter(
        &self,
        record: &mut SwitchRecord,
        phase: SwitchPhase,
        cancel: &CancellationToken,
    ) -> Result<()> {
        {
            let mut state = self.state.lock().await;

            let committed = record.phases.contains(&SwitchPhase::Switching);
            if !committed && cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let entered = record.advance();
            debug_assert_eq!(entered, Some(phase));

            if let Some(ref mut in_flight) = state.in_flight {
                in_flight.info.phase = phase;
            }
        }

        tracing::debug!(switch_id = record.id, phase = %phase, "Switch phase");
        if let Some(percent) = phase.percent() {
            self.events.emit(MuxEvent::SwitchProgress { phase, percent });
        }

        Ok(())
    }

    async fn finish(&self, mut record: SwitchRecord, result: Result<()>) -> Result<SwitchOutcome> {
        let to = record.to_endpoint;

        match result {
            Ok(()) => {
                {
                    let mut state = self.state.lock().await;
                    record.advance();
                    state.active = Some(to);
                    self.history.push(record.clone()).await;
                    state.in_flight = None;
                }

                tracing::info!(
                    switch_id = record.id,
                    from = ?record.from_endpoint,
                    to = %to,
                    total = ?record.durations.total,
                    "Switch complete"
                );
                self.events.emit(MuxEvent::SwitchProgress {
                    phase: SwitchPhase::Complete,
                    percent: 100,
                });
                self.events.emit(MuxEvent::SwitchComplete {
                    from_endpoint: record.from_endpoint,
                    to_endpoint: to,
                    durations: record.durations,
                });

                Ok(SwitchOutcome::Completed(record))
            }
            Err(e) => {
                {
                    let mut state = self.state.lock().await;
                    record.fail(e.to_string());
                    self.history.push(record.clone()).await;
                    state.in_flight = None;
                }

                tracing::warn!(
                    switch_id = record.id,
                    to = %to,
                    phase = ?record.phases.iter().rev().nth(1),
                    error = %e,
                    "Switch failed"
                );
                self.events.emit(MuxEvent::SwitchError {
                    to_endpoint: to,
                    error: e.to_string(),
                });

                Err(e)
            }
        }
    }

    /// Clear the in-flight slot for a switch whose task died
    async fn release(&self, id: u64) {
        let mut state = self.state.lock().await;
        if state.in_flight.as_ref().is_some_and(|f| f.info.id == id) {
            state.in_flight = None;
        }
    }

    async fn remote<F>(
        &self,
        operation: &'static str,
        endpoint: EndpointId,
        request: F,
    ) -> Result<()>
    where
        F: Future<Output = ControlResponse>,
    {
        call_with_timeout(operation, endpoint, self.timeout, request).await
    }

    async fn cancellable<F>(&self, cancel: &CancellationToken, request: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = request => result,
        }
    }
}
