//! Run state machine: collect → filter → dispatch → terminal state.
//!
//! One [`Orchestrator`] serves both observation cadences. In
//! [`RunMode::Interactive`] a snapshot is published after every transition and
//! every recipient; in [`RunMode::Background`] only the filtered plan and the
//! terminal state are published.
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::bridge;
use crate::config::RunConfig;
use crate::dispatch;
use crate::error::InviteError;
use crate::filter::{self, ActivityWindow, Exclusions, SourceContribution};
use crate::ledger::{DestinationGuard, DestinationLocks, InvitedLedger, LedgerStore};
use crate::model::{BridgeOutcome, RecipientProgress, RecipientStatus, RunSnapshot, RunState};
use crate::pacing::{PaceOutcome, Pacer};
use crate::platform::PlatformClient;

const PHONE_SOURCE: &str = "phone-list";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Interactive,
    Background,
}

/// Caller-owned control surface for one run.
#[derive(Debug)]
pub struct RunHandle {
    id: Uuid,
    cancel: CancellationToken,
    status: watch::Receiver<RunSnapshot>,
    task: JoinHandle<RunSnapshot>,
}

impl RunHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Request a cooperative stop. Takes effect while waiting for the
    /// destination, at the next loop iteration, or during a pacing wait; an
    /// in-flight remote call is allowed to finish.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Latest published snapshot.
    pub fn status(&self) -> RunSnapshot {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.status.clone()
    }

    /// Wait for the terminal snapshot.
    pub async fn wait(self) -> RunSnapshot {
        match self.task.await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!(?err, run_id = %self.id, "run task aborted");
                let mut snapshot = self.status.borrow().clone();
                snapshot.state = RunState::Errored(err.to_string());
                snapshot
            }
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    platform: Arc<dyn PlatformClient>,
    store: Arc<dyn LedgerStore>,
    locks: DestinationLocks,
    shutdown: CancellationToken,
    pacer_seed: Option<u64>,
}

impl Orchestrator {
    pub fn new(platform: Arc<dyn PlatformClient>, store: Arc<dyn LedgerStore>) -> Self {
        Self {
            platform,
            store,
            locks: DestinationLocks::new(),
            shutdown: CancellationToken::new(),
            pacer_seed: None,
        }
    }

    /// Cancelling this token cancels every run started by this orchestrator,
    /// including one still waiting inside `start_background`.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Fix the pacing RNG seed, for reproducible schedules.
    pub fn with_pacer_seed(mut self, seed: u64) -> Self {
        self.pacer_seed = Some(seed);
        self
    }

    /// Start an interactive run. Collection, filtering and dispatch all happen
    /// on a spawned task; progress is observable through the handle.
    pub fn start(&self, cfg: RunConfig) -> RunHandle {
        let (mut run, parts) = Run::new(cfg, RunMode::Interactive, &self.shutdown);
        let orch = self.clone();
        let span = info_span!("run", run_id = %run.id, destination = %run.cfg.destination);
        let task = tokio::spawn(
            async move {
                let prepared = orch.prepare(&mut run).await;
                orch.drive(&mut run, prepared).await;
                run.snapshot
            }
            .instrument(span),
        );
        parts.into_handle(task)
    }

    /// Start a background run. The eligible set is computed before this
    /// returns (see `status()` on the handle); only dispatch runs detached.
    pub async fn start_background(&self, cfg: RunConfig) -> RunHandle {
        let (mut run, parts) = Run::new(cfg, RunMode::Background, &self.shutdown);
        let span = info_span!("run", run_id = %run.id, destination = %run.cfg.destination);
        let prepared = self.prepare(&mut run).instrument(span.clone()).await;
        let orch = self.clone();
        let task = tokio::spawn(
            async move {
                orch.drive(&mut run, prepared).await;
                run.snapshot
            }
            .instrument(span),
        );
        parts.into_handle(task)
    }

    async fn drive(&self, run: &mut Run, prepared: Result<Option<Prepared>, InviteError>) {
        let result = match prepared {
            Ok(Some(prepared)) => self.dispatch_all(run, prepared).await,
            Ok(None) => {
                info!("cancelled while waiting for the destination");
                run.transition(RunState::Cancelled);
                Ok(())
            }
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            error!(%err, "run aborted");
            run.transition(RunState::Errored(err.to_string()));
        }
        let counts = run.snapshot.counts();
        info!(
            state = run.snapshot.state.as_str(),
            total = counts.total,
            invited = counts.invited,
            skipped = counts.skipped,
            failed = counts.failed,
            pending = counts.pending,
            "run finished"
        );
    }

    /// Collect and filter. `Ok(None)` means the run was cancelled while
    /// another run held the destination.
    async fn prepare(&self, run: &mut Run) -> Result<Option<Prepared>, InviteError> {
        run.cfg.validate()?;
        let destination = run.cfg.destination.clone();
        let dest_key = destination.key();
        let Some(guard) = self.locks.acquire(&dest_key, &run.cancel).await else {
            return Ok(None);
        };

        run.transition(RunState::Collecting);
        let members = self
            .platform
            .list_members(&destination)
            .await
            .map_err(|error| InviteError::DestinationUnreachable {
                destination: dest_key.clone(),
                error,
            })?;
        let member_ids: HashSet<i64> = members.iter().map(|m| m.id).collect();

        let mut contributions = Vec::with_capacity(run.cfg.sources.len() + 1);
        for source in &run.cfg.sources {
            let key = source.key();
            match self.platform.list_members(source).await {
                Ok(found) => {
                    info!(source = %key, count = found.len(), "read source members");
                    contributions.push(SourceContribution::new(key, found));
                }
                Err(error) => {
                    let err = InviteError::SourceRead {
                        source_ref: key.clone(),
                        error,
                    };
                    warn!(%err, "source skipped");
                    contributions.push(SourceContribution::new(key, Vec::new()));
                }
            }
        }
        if !run.cfg.phone_numbers.is_empty() {
            contributions.push(self.resolve_phones(&run.cfg.phone_numbers).await);
        }

        let ledger = InvitedLedger::from_entries(dest_key.clone(), self.store.load(&dest_key).await?);

        run.transition(RunState::Filtering);
        let outcome = filter::apply(
            &contributions,
            run.cfg.caps(),
            Exclusions {
                destination_members: &member_ids,
                ledger: ledger.recipient_ids(),
                activity: run
                    .cfg
                    .recent_window_days
                    .map(|days| ActivityWindow::days(Utc::now(), days)),
            },
        );
        info!(
            eligible = outcome.eligible.len(),
            skipped = outcome.skipped.len(),
            ledger_size = ledger.entries().len(),
            "filtered candidates"
        );

        let eligible = outcome.eligible.len();
        let rows = outcome
            .eligible
            .into_iter()
            .map(|recipient| RecipientProgress {
                recipient,
                status: RecipientStatus::Pending,
                bridge: None,
            })
            .chain(
                outcome
                    .skipped
                    .into_iter()
                    .map(|(recipient, reason)| RecipientProgress {
                        recipient,
                        status: RecipientStatus::Skipped(reason),
                        bridge: None,
                    }),
            );
        run.snapshot.recipients = rows.collect();
        run.publish(true);

        Ok(Some(Prepared {
            eligible,
            ledger,
            _guard: guard,
        }))
    }

    async fn resolve_phones(&self, phones: &[String]) -> SourceContribution {
        let mut found = Vec::new();
        for phone in phones.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
            match self.platform.resolve_phone(phone).await {
                Ok(Some(mut recipient)) => {
                    if recipient.phone.is_none() {
                        recipient.phone = Some(phone.to_string());
                    }
                    found.push(recipient);
                }
                Ok(None) => warn!(phone, "no user registered for phone number"),
                Err(err) => warn!(phone, %err, "failed to resolve phone number"),
            }
        }
        SourceContribution::new(PHONE_SOURCE, found)
    }

    async fn dispatch_all(&self, run: &mut Run, mut prepared: Prepared) -> Result<(), InviteError> {
        if prepared.eligible == 0 {
            run.transition(RunState::Completed);
            return Ok(());
        }
        run.transition(RunState::Dispatching);
        let mut pacer = match self.pacer_seed {
            Some(seed) => Pacer::seeded(run.cfg.delay, seed),
            None => Pacer::new(run.cfg.delay),
        };
        let dest_key = run.cfg.destination.key();

        for idx in 0..prepared.eligible {
            if run.cancel.is_cancelled() {
                info!(remaining = prepared.eligible - idx, "cancelled before dispatch");
                run.transition(RunState::Cancelled);
                return Ok(());
            }
            let recipient = run.snapshot.recipients[idx].recipient.clone();
            let bridged = bridge::ensure_contact(self.platform.as_ref(), &recipient).await;
            let outcome = dispatch::dispatch(
                self.platform.as_ref(),
                &run.cfg.destination,
                &recipient,
                &mut prepared.ledger,
            )
            .await;
            let saved = self.store.save(&dest_key, prepared.ledger.entries()).await;
            run.update(idx, outcome.status(), bridged);
            saved?;

            if idx + 1 < prepared.eligible && pacer.wait(&run.cancel).await == PaceOutcome::Cancelled {
                info!(remaining = prepared.eligible - idx - 1, "cancelled while pacing");
                run.transition(RunState::Cancelled);
                return Ok(());
            }
        }
        run.transition(RunState::Completed);
        Ok(())
    }
}

struct Prepared {
    eligible: usize,
    ledger: InvitedLedger,
    _guard: DestinationGuard,
}

struct HandleParts {
    id: Uuid,
    cancel: CancellationToken,
    status: watch::Receiver<RunSnapshot>,
}

impl HandleParts {
    fn into_handle(self, task: JoinHandle<RunSnapshot>) -> RunHandle {
        RunHandle {
            id: self.id,
            cancel: self.cancel,
            status: self.status,
            task,
        }
    }
}

struct Run {
    id: Uuid,
    cfg: RunConfig,
    mode: RunMode,
    cancel: CancellationToken,
    snapshot: RunSnapshot,
    tx: watch::Sender<RunSnapshot>,
}

impl Run {
    fn new(cfg: RunConfig, mode: RunMode, shutdown: &CancellationToken) -> (Self, HandleParts) {
        let id = Uuid::new_v4();
        let snapshot = RunSnapshot::new(id, cfg.destination.key());
        let (tx, rx) = watch::channel(snapshot.clone());
        let cancel = shutdown.child_token();
        let parts = HandleParts {
            id,
            cancel: cancel.clone(),
            status: rx,
        };
        let run = Run {
            id,
            cfg,
            mode,
            cancel,
            snapshot,
            tx,
        };
        (run, parts)
    }

    fn publish(&self, force: bool) {
        if force || self.mode == RunMode::Interactive || self.snapshot.state.is_terminal() {
            self.tx.send_replace(self.snapshot.clone());
        }
    }

    fn transition(&mut self, state: RunState) {
        info!(from = self.snapshot.state.as_str(), to = state.as_str(), "run state");
        self.snapshot.state = state;
        self.publish(false);
    }

    fn update(&mut self, idx: usize, status: RecipientStatus, bridged: BridgeOutcome) {
        if let Some(row) = self.snapshot.recipients.get_mut(idx) {
            row.status = status;
            row.bridge = Some(bridged);
        }
        self.publish(false);
    }
}
