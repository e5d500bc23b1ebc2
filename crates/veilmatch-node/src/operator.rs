//! Operator node: runs one epoch of the pipeline at a time.
//!
//! ```text
//! resolve leftovers → ingest feeds → freeze + seal per pool → persist
//!     → JoinSet { lane per task: assign → match → vote → quorum → prove → settle }
//!     → persist
//! ```
//!
//! Every operator seals, matches and (if selected) votes on every task. Only
//! the designated submitter (first committee member) proves, submits, and
//! publishes task-driven status changes to the ledger. Other operators learn
//! how a finalized task ended from the ledger at the start of a later epoch.
//!
//! A task that does not settle keeps its orders out of the pending set on
//! every operator alike. Whatever failed in the lane, the orders return to
//! Pending only at the first epoch start past the task deadline plus grace,
//! so honest operators always seal identical order sets.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use veilmatch_ingress::{CommitmentFeed, OrderIntake, PayloadCipher, TaskSealer};
use veilmatch_matchcore::match_task;
use veilmatch_proof::{ProofBoundary, ProofWorker, ProvingBackend};
use veilmatch_quorum::{
    OperatorRegistry, QuorumOutcome, TaskCoordinator, VoteRouter, VoteSigner, VoteTally, deadline_instant,
    select_committee, snapshot_operators,
};
use veilmatch_settlement::{Ledger, SettlementSubmitter};
use veilmatch_types::{
    CommitmentId, CommitmentStatus, EpochId, ErrorClass, MatchResult, MatchingTask, NodeConfig, OperatorId,
    OperatorSnapshot, OperatorVote, PoolId, PublicInputs, Result, RevealedOrder, SettlementReceipt, TaskId,
    TaskPhase, VeilmatchError,
};

use crate::store::{InFlightTask, NodeSnapshot, StateStore};
use crate::transport::VoteTransport;

/// External collaborators of an operator node.
#[derive(Clone)]
pub struct NodeDeps {
    pub feed: Arc<dyn CommitmentFeed>,
    pub ledger: Arc<dyn Ledger>,
    pub registry: Arc<dyn OperatorRegistry>,
    pub transport: Arc<dyn VoteTransport>,
    pub prover: Arc<dyn ProvingBackend>,
    pub cipher: Arc<dyn PayloadCipher>,
    pub store: Arc<dyn StateStore>,
}

/// How one task ended for this operator during an epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// This operator submitted the settlement and the ledger accepted it.
    Settled(SettlementReceipt),
    /// Finalized; another committee member is responsible for settlement.
    AwaitingSettlement(TaskId),
    /// Not on the committee; the ledger will tell how the task ended.
    Observed(TaskId),
    /// Failed; the orders go back to Pending once the deadline has passed.
    Failed { task_id: TaskId, class: ErrorClass },
}

/// What one epoch did on this operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpochReport {
    pub epoch: u64,
    pub staged: usize,
    pub rejected: usize,
    /// Leftover tasks from earlier epochs settled or recycled this epoch.
    pub resolved: usize,
    pub tasks: Vec<TaskOutcome>,
}

/// A single VeilMatch operator.
pub struct OperatorNode {
    config: NodeConfig,
    signer: VoteSigner,
    deps: NodeDeps,
    router: Arc<VoteRouter>,
    intake: Mutex<OrderIntake>,
    statuses: Mutex<BTreeMap<CommitmentId, CommitmentStatus>>,
    in_flight: Mutex<BTreeMap<TaskId, InFlightTask>>,
    sealer: TaskSealer,
    boundary: Arc<ProofBoundary>,
    submitter: SettlementSubmitter,
}

impl OperatorNode {
    #[must_use]
    pub fn new(config: NodeConfig, signer: VoteSigner, deps: NodeDeps) -> Arc<Self> {
        let intake = OrderIntake::new(deps.cipher.clone(), config.pools.clone(), EpochId(0));
        let sealer = TaskSealer::new(config.epoch.task_timeout());
        let boundary = Arc::new(ProofBoundary::new(deps.prover.clone(), &config.proof));
        let submitter = SettlementSubmitter::new(deps.ledger.clone(), &config.settlement);
        Arc::new(Self {
            config,
            signer,
            deps,
            router: Arc::new(VoteRouter::default()),
            intake: Mutex::new(intake),
            statuses: Mutex::new(BTreeMap::new()),
            in_flight: Mutex::new(BTreeMap::new()),
            sealer,
            boundary,
            submitter,
        })
    }

    #[must_use]
    pub fn operator_id(&self) -> OperatorId {
        self.signer.operator_id()
    }

    /// Inbound vote entry point for the transport.
    #[must_use]
    pub fn router(&self) -> Arc<VoteRouter> {
        Arc::clone(&self.router)
    }

    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub async fn current_epoch(&self) -> EpochId {
        self.intake.lock().await.current_epoch()
    }

    pub async fn status_of(&self, id: &CommitmentId) -> Option<CommitmentStatus> {
        self.statuses.lock().await.get(id).copied()
    }

    pub async fn pending(&self, pool: &PoolId) -> Vec<RevealedOrder> {
        self.intake.lock().await.pending_snapshot().remove(pool).unwrap_or_default()
    }

    pub async fn in_flight(&self) -> Vec<InFlightTask> {
        self.in_flight.lock().await.values().cloned().collect()
    }

    // =================================================================
    // Persistence
    // =================================================================

    /// Reload state saved by an earlier run. Returns `false` on first start.
    pub async fn recover(&self) -> Result<bool> {
        let Some(snapshot) = self.deps.store.load().await? else {
            return Ok(false);
        };
        {
            let mut intake = self.intake.lock().await;
            intake.set_epoch(snapshot.epoch);
            intake.restore(snapshot.pending, &snapshot.cursors)?;
        }
        *self.statuses.lock().await = snapshot.statuses;
        *self.in_flight.lock().await = snapshot
            .in_flight
            .into_iter()
            .map(|t| (t.task.task_id, t))
            .collect();
        self.submitter.restore_settled(snapshot.settled).await;

        tracing::info!(
            operator = %self.operator_id(),
            epoch = snapshot.epoch.0,
            saved_at = %snapshot.saved_at,
            "State recovered"
        );
        Ok(true)
    }

    /// Save a snapshot of the whole node.
    pub async fn persist(&self) -> Result<()> {
        let (epoch, pending, cursors) = {
            let intake = self.intake.lock().await;
            (intake.current_epoch(), intake.pending_snapshot(), intake.cursors())
        };
        let statuses = self.statuses.lock().await.clone();
        let in_flight = self.in_flight.lock().await.values().cloned().collect();
        let snapshot = NodeSnapshot {
            epoch,
            cursors,
            pending,
            in_flight,
            statuses,
            settled: self.submitter.settled_tasks().await,
            saved_at: Utc::now(),
        };
        self.deps.store.save(&snapshot).await
    }

    // =================================================================
    // Epoch
    // =================================================================

    /// Run epoch `epoch` to completion: every task sealed in it either
    /// settles, fails, or is handed to the ledger for a later verdict.
    pub async fn run_epoch(self: &Arc<Self>, epoch: EpochId) -> Result<EpochReport> {
        self.intake.lock().await.set_epoch(epoch);
        let mut report = EpochReport {
            epoch: epoch.0,
            ..EpochReport::default()
        };

        let resumable = self.resolve_leftovers(&mut report).await?;

        let pools: Vec<PoolId> = self.intake.lock().await.pool_ids().cloned().collect();
        for pool in &pools {
            self.ingest(pool, &mut report).await?;
        }

        let mut sealed = Vec::new();
        for pool in &pools {
            if let Some(task) = self.seal(pool, epoch).await? {
                sealed.push(task);
            }
        }
        self.persist().await?;

        let mut lanes = JoinSet::new();
        for entry in resumable {
            let node = Arc::clone(self);
            lanes.spawn(async move {
                let task_id = entry.task.task_id;
                (task_id, node.run_task(entry.task, entry.operators, entry.vote).await)
            });
        }
        for task in sealed {
            let node = Arc::clone(self);
            lanes.spawn(async move {
                let task_id = task.task_id;
                (task_id, node.run_task(task, None, None).await)
            });
        }

        while let Some(joined) = lanes.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => report.tasks.push(outcome),
                Ok((task_id, Err(e))) => {
                    tracing::error!(task = %task_id, error = %e, "Task lane failed");
                }
                Err(e) => tracing::error!(error = %e, "Task lane panicked"),
            }
        }

        self.persist().await?;
        tracing::info!(
            operator = %self.operator_id(),
            epoch = epoch.0,
            staged = report.staged,
            rejected = report.rejected,
            resolved = report.resolved,
            tasks = report.tasks.len(),
            "Epoch complete"
        );
        Ok(report)
    }

    /// Pull new commitments for `pool` and stage them.
    async fn ingest(&self, pool: &PoolId, report: &mut EpochReport) -> Result<()> {
        let cursor = self.intake.lock().await.cursor(pool);
        let commitments = self.deps.feed.fetch_since(pool, cursor).await?;

        for commitment in commitments {
            let staged = self.intake.lock().await.stage(&commitment);
            match staged {
                Ok(order) => {
                    self.statuses
                        .lock()
                        .await
                        .entry(order.id)
                        .or_insert(CommitmentStatus::Pending);
                    report.staged += 1;
                }
                Err(VeilmatchError::Rejected { id, reason }) => {
                    self.statuses.lock().await.insert(id, CommitmentStatus::Disputed);
                    if let Err(e) = self.deps.ledger.update_status(&id, CommitmentStatus::Disputed).await {
                        tracing::warn!(commitment = %id, error = %e, "Dispute not published");
                    }
                    tracing::warn!(commitment = %id, pool = %pool, %reason, "Commitment disputed");
                    report.rejected += 1;
                }
                Err(VeilmatchError::DuplicateCommitment(id)) => {
                    tracing::debug!(commitment = %id, "Commitment already handled");
                }
                Err(VeilmatchError::PendingSetFull(_)) => {
                    tracing::warn!(pool = %pool, sequence = commitment.sequence, "Pending set full, deferring intake");
                    break;
                }
                Err(e) => return Err(e),
            }
            self.intake.lock().await.advance_cursor(pool, commitment.sequence);
        }
        Ok(())
    }

    /// Freeze `pool`'s pending set into a task, if it holds enough orders.
    async fn seal(&self, pool: &PoolId, epoch: EpochId) -> Result<Option<MatchingTask>> {
        let orders = self.intake.lock().await.freeze(pool);
        match self.sealer.seal(pool.clone(), epoch, orders, Utc::now()) {
            Ok(task) => {
                self.in_flight.lock().await.insert(
                    task.task_id,
                    InFlightTask {
                        task: task.clone(),
                        operators: None,
                        result: None,
                        vote: None,
                    },
                );
                Ok(Some(task))
            }
            Err(orders) => {
                // too few to match: back to pending, aging out the stale ones
                let outcome = self.intake.lock().await.carry_forward(pool, orders)?;
                let mut statuses = self.statuses.lock().await;
                for id in outcome.expired {
                    self.expire(&mut statuses, id).await;
                }
                Ok(None)
            }
        }
    }

    async fn expire(&self, statuses: &mut BTreeMap<CommitmentId, CommitmentStatus>, id: CommitmentId) {
        statuses.insert(id, CommitmentStatus::Expired);
        if let Err(e) = self.deps.ledger.update_status(&id, CommitmentStatus::Expired).await {
            tracing::debug!(commitment = %id, error = %e, "Expiry not published");
        }
    }

    // =================================================================
    // Task lane
    // =================================================================

    /// Drive one task from its current phase to an outcome.
    ///
    /// `operators` and `recorded` are present when resuming after a restart:
    /// the committee was already selected and this operator's vote already
    /// cast, so the recorded vote is re-broadcast instead of signing anew.
    async fn run_task(
        self: Arc<Self>,
        mut task: MatchingTask,
        operators: Option<OperatorSnapshot>,
        recorded: Option<OperatorVote>,
    ) -> Result<TaskOutcome> {
        let me = self.operator_id();
        let pool_config = self
            .intake
            .lock()
            .await
            .pool_config(&task.pool_id)
            .cloned()
            .ok_or_else(|| VeilmatchError::Configuration(format!("unknown pool {}", task.pool_id)))?;

        let snapshot = match operators {
            Some(snapshot) => snapshot,
            None => match snapshot_operators(self.deps.registry.as_ref(), &task.pool_id).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::error!(task = %task.task_id, error = %e, "No committee for task");
                    return self.hold_failed(task, None, None, e.class()).await;
                }
            },
        };

        if task.phase == TaskPhase::Created {
            let committee = select_committee(&task.task_id, &snapshot, self.config.quorum.committee_size);
            task.assign(committee)?;
        }
        if task.phase == TaskPhase::Assigned {
            task.begin_collecting()?;
        }
        let publisher = task.designated_submitter() == Some(&me);
        for order in task.orders() {
            self.set_status(order, CommitmentStatus::Assigned, publisher).await?;
        }

        let result = match_task(&task, &pool_config);
        tracing::debug!(
            task = %task.task_id,
            pairs = result.pair_count(),
            unmatched = result.unmatched_orders.len(),
            result_hash = %result.result_hash_hex(),
            "Task matched locally"
        );

        if !task.is_assigned_to(&me) {
            self.record(&task, Some(&snapshot), Some(&result), None).await;
            self.persist().await?;
            tracing::debug!(task = %task.task_id, "Not on committee, observing");
            return Ok(TaskOutcome::Observed(task.task_id));
        }

        // Coordinator first, so peers' votes land in the tally rather than the buffer.
        let tally = VoteTally::new(&task, &snapshot, &self.config.quorum);
        let deadline = deadline_instant(task.deadline, self.config.epoch.grace());
        let handle = TaskCoordinator::spawn(tally, deadline, Arc::clone(&self.deps.registry));
        self.router.register(task.task_id, handle.inbox()).await?;

        let vote = match recorded {
            Some(vote) => {
                if vote.result_hash != result.result_hash {
                    tracing::error!(
                        task = %task.task_id,
                        recorded = hex::encode(vote.result_hash),
                        recomputed = %result.result_hash_hex(),
                        "Recomputed result differs from recorded vote"
                    );
                }
                tracing::info!(task = %task.task_id, "Re-broadcasting recorded vote");
                vote
            }
            None => self.signer.sign_vote(&task.task_id, result.result_hash),
        };
        // durable before anyone else sees it
        self.record(&task, Some(&snapshot), Some(&result), Some(&vote)).await;
        self.persist().await?;

        if let Err(e) = handle.submit(vote.clone()).await {
            tracing::warn!(task = %task.task_id, error = %e, "Own vote not tallied");
        }
        if let Err(e) = self.deps.transport.broadcast(&task.assigned_operators, &vote).await {
            tracing::warn!(task = %task.task_id, error = %e, "Vote broadcast failed");
        }

        let outcome = handle.outcome().await;
        self.router.unregister(&task.task_id).await;

        match outcome? {
            QuorumOutcome::Failed { class, .. } => {
                self.hold_failed(task, Some(&snapshot), Some(&result), class).await
            }
            QuorumOutcome::Finalized {
                result_hash, signatures, ..
            } => {
                task.finalize(result_hash)?;
                // the local result stays recorded so the ledger verdict can be compared
                self.record(&task, Some(&snapshot), Some(&result), Some(&vote)).await;
                if result_hash != result.result_hash {
                    let err = VeilmatchError::DeterminismViolation {
                        expected: hex::encode(result_hash),
                        actual: result.result_hash_hex(),
                    };
                    tracing::error!(task = %task.task_id, error = %err, "Quorum finalized a result this operator did not compute");
                    return Ok(TaskOutcome::AwaitingSettlement(task.task_id));
                }
                if publisher {
                    self.prove_and_settle(task, result, signatures).await
                } else {
                    Ok(TaskOutcome::AwaitingSettlement(task.task_id))
                }
            }
        }
    }

    /// Designated submitter path: prove under the task deadline, then settle.
    async fn prove_and_settle(
        &self,
        task: MatchingTask,
        result: MatchResult,
        signatures: Vec<OperatorVote>,
    ) -> Result<TaskOutcome> {
        let inputs = PublicInputs {
            task_id: task.task_id,
            pool_id: task.pool_id.clone(),
            epoch: task.epoch,
            result_hash: result.result_hash,
        };
        let deadline = deadline_instant(task.deadline, self.config.epoch.grace());
        let worker = ProofWorker::spawn(Arc::clone(&self.boundary), inputs, task.orders().to_vec(), result.clone());

        let proof = match worker.join_until(deadline).await {
            Ok(proof) => proof,
            Err(e) => {
                tracing::error!(task = %task.task_id, error = %e, "Proving failed, holding orders until the deadline");
                return self.hold_failed(task, None, Some(&result), e.class()).await;
            }
        };

        let record = match SettlementSubmitter::build_record(&task, proof, signatures) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(task = %task.task_id, error = %e, "Settlement record refused");
                return self.hold_failed(task, None, Some(&result), e.class()).await;
            }
        };
        for order in task.orders().iter().filter(|o| result.touches(&o.id)) {
            self.set_status(order, CommitmentStatus::Matched, true).await?;
        }

        match self.submitter.submit(&task, record).await {
            Ok(receipt) => {
                self.apply_settled(&task, &result, true).await?;
                Ok(TaskOutcome::Settled(receipt))
            }
            Err(VeilmatchError::AlreadySettled(task_id)) => {
                tracing::info!(task = %task_id, "Settlement already recorded");
                self.apply_settled(&task, &result, true).await?;
                Ok(TaskOutcome::AwaitingSettlement(task_id))
            }
            Err(e) => {
                // matched orders are disputed when the task is recycled
                tracing::error!(task = %task.task_id, error = %e, "Settlement failed, holding orders until the deadline");
                self.hold_failed(task, None, Some(&result), e.class()).await
            }
        }
    }

    // =================================================================
    // Outcomes
    // =================================================================

    /// Matched orders become Settled; leftovers and remainders go back to
    /// Pending for the next epoch.
    async fn apply_settled(&self, task: &MatchingTask, result: &MatchResult, publish: bool) -> Result<()> {
        for order in task.orders().iter().filter(|o| result.touches(&o.id)) {
            self.set_status(order, CommitmentStatus::Matched, publish).await?;
            self.set_status(order, CommitmentStatus::Settled, publish).await?;
        }
        for order in &result.unmatched_orders {
            self.set_status(order, CommitmentStatus::Pending, publish).await?;
        }
        self.carry(task, result.unmatched_orders.clone(), publish).await?;
        self.in_flight.lock().await.remove(&task.task_id);

        tracing::info!(
            task = %task.task_id,
            pool = %task.pool_id,
            pairs = result.pair_count(),
            volume = %display_or_overflow(result.total_matched()),
            notional = %display_or_overflow(result.total_notional()),
            carried = result.unmatched_orders.len(),
            "Task settled"
        );
        Ok(())
    }

    /// Mark `task` Failed and keep it in flight. Its orders stay out of the
    /// pending set until [`Self::recycle`] runs past the deadline.
    ///
    /// The designated submitter publishes the ledger side of the recycle
    /// now, while no later task can touch these commitments yet: matched
    /// orders go Disputed, then every order goes back to Pending.
    async fn hold_failed(
        &self,
        mut task: MatchingTask,
        operators: Option<&OperatorSnapshot>,
        result: Option<&MatchResult>,
        class: ErrorClass,
    ) -> Result<TaskOutcome> {
        task.fail(class)?;
        if task.designated_submitter() == Some(&self.operator_id()) {
            for order in task.orders() {
                if self.status_of(&order.id).await == Some(CommitmentStatus::Matched) {
                    self.publish_status(order, CommitmentStatus::Disputed).await;
                }
                self.publish_status(order, CommitmentStatus::Pending).await;
            }
        }
        let recorded = self.in_flight.lock().await.get(&task.task_id).cloned();
        let operators = operators.cloned().or_else(|| recorded.as_ref().and_then(|r| r.operators.clone()));
        let vote = recorded.and_then(|r| r.vote);
        self.record(&task, operators.as_ref(), result, vote.as_ref()).await;

        tracing::warn!(task = %task.task_id, pool = %task.pool_id, %class, orders = task.len(), "Task failed, orders held");
        Ok(TaskOutcome::Failed {
            task_id: task.task_id,
            class,
        })
    }

    /// Return a task's whole order set to Pending. Orders this operator
    /// already marked Matched are disputed on the way. Only the designated
    /// submitter publishes, and only if [`Self::hold_failed`] did not.
    async fn recycle(&self, mut task: MatchingTask, class: ErrorClass) -> Result<()> {
        let publish = task.phase != TaskPhase::Failed && task.designated_submitter() == Some(&self.operator_id());
        if task.phase != TaskPhase::Failed {
            task.fail(class)?;
        }
        let class = task.failure.unwrap_or(class);
        for order in task.orders() {
            if self.status_of(&order.id).await == Some(CommitmentStatus::Matched) {
                self.set_status(order, CommitmentStatus::Disputed, publish).await?;
            }
            self.set_status(order, CommitmentStatus::Pending, publish).await?;
        }
        self.carry(&task, task.orders().to_vec(), publish).await?;
        self.in_flight.lock().await.remove(&task.task_id);

        tracing::warn!(task = %task.task_id, pool = %task.pool_id, %class, orders = task.len(), "Task failed, orders recycled");
        Ok(())
    }

    /// The ledger settled a result this operator cannot reproduce. The
    /// orders leave the pipeline as Disputed instead of staying Assigned.
    async fn dispute_unreproducible(&self, task: &MatchingTask, settled: [u8; 32]) -> Result<()> {
        tracing::error!(
            task = %task.task_id,
            settled = hex::encode(settled),
            orders = task.len(),
            "Ledger settled a result this operator cannot reproduce, disputing its orders"
        );
        for order in task.orders() {
            self.set_status(order, CommitmentStatus::Disputed, false).await?;
        }
        self.in_flight.lock().await.remove(&task.task_id);
        Ok(())
    }

    async fn carry(&self, task: &MatchingTask, orders: Vec<RevealedOrder>, publish: bool) -> Result<()> {
        let outcome = self.intake.lock().await.carry_forward(&task.pool_id, orders)?;
        let mut statuses = self.statuses.lock().await;
        for id in outcome.expired {
            if publish {
                self.expire(&mut statuses, id).await;
            } else {
                statuses.insert(id, CommitmentStatus::Expired);
            }
        }
        Ok(())
    }

    /// Move `order` to `next`, publishing to the ledger when `publish`.
    ///
    /// Repeating the current status is a no-op. Remainders exist only
    /// inside operators and are never published.
    async fn set_status(&self, order: &RevealedOrder, next: CommitmentStatus, publish: bool) -> Result<()> {
        {
            let mut statuses = self.statuses.lock().await;
            match statuses.get(&order.id).copied() {
                Some(current) if current == next => return Ok(()),
                Some(current) if !current.can_transition_to(next) => {
                    return Err(VeilmatchError::InvalidTransition {
                        id: order.id,
                        from: current,
                        to: next,
                    });
                }
                _ => {
                    statuses.insert(order.id, next);
                }
            }
        }
        if publish {
            self.publish_status(order, next).await;
        }
        Ok(())
    }

    /// Publish `status` for `order` without touching the local view.
    async fn publish_status(&self, order: &RevealedOrder, status: CommitmentStatus) {
        if order.is_remainder() {
            return;
        }
        if let Err(e) = self.deps.ledger.update_status(&order.id, status).await {
            tracing::warn!(commitment = %order.id, %status, error = %e, "Status not published");
        }
    }

    async fn record(
        &self,
        task: &MatchingTask,
        operators: Option<&OperatorSnapshot>,
        result: Option<&MatchResult>,
        vote: Option<&OperatorVote>,
    ) {
        self.in_flight.lock().await.insert(
            task.task_id,
            InFlightTask {
                task: task.clone(),
                operators: operators.cloned(),
                result: result.cloned(),
                vote: vote.cloned(),
            },
        );
    }

    // =================================================================
    // Leftovers from earlier epochs
    // =================================================================

    /// Settle or recycle tasks left over from earlier epochs and return the
    /// ones this operator must resume voting on.
    ///
    /// A leftover is resumed when this operator is on its committee, the
    /// task never reached an outcome (crash before the tally closed) and
    /// its deadline has not passed. Everything else waits for the ledger: a
    /// settlement applies the local result; no settlement by the deadline
    /// plus grace recycles the orders. Failed tasks take the same path, so
    /// every operator recycles them at the same epoch start.
    async fn resolve_leftovers(&self, report: &mut EpochReport) -> Result<Vec<InFlightTask>> {
        let me = self.operator_id();
        let leftovers: Vec<InFlightTask> = self.in_flight.lock().await.values().cloned().collect();
        let grace = chrono::Duration::from_std(self.config.epoch.grace()).unwrap_or_else(|_| chrono::Duration::zero());
        let now = Utc::now();
        let mut resumable = Vec::new();

        for entry in leftovers {
            let task = &entry.task;
            let overdue = task.deadline.checked_add_signed(grace).is_some_and(|due| now > due);
            let unvoted = matches!(task.phase, TaskPhase::Created | TaskPhase::Assigned)
                || (task.phase == TaskPhase::Collecting && task.is_assigned_to(&me));
            if unvoted && !overdue {
                resumable.push(entry);
                continue;
            }

            match self.deps.ledger.settled_hash(&task.task_id).await? {
                Some(hash) => {
                    let mut task = entry.task.clone();
                    match entry.result.as_ref().filter(|r| r.result_hash == hash) {
                        Some(result) => {
                            if task.phase == TaskPhase::Collecting {
                                task.finalize(hash)?;
                            }
                            self.submitter.restore_settled([task.task_id]).await;
                            self.apply_settled(&task, result, false).await?;
                        }
                        None => self.dispute_unreproducible(&task, hash).await?,
                    }
                    report.resolved += 1;
                }
                None if overdue => {
                    tracing::warn!(task = %task.task_id, phase = %task.phase, "No settlement by deadline");
                    self.recycle(entry.task, ErrorClass::Timing).await?;
                    report.resolved += 1;
                }
                None => {}
            }
        }
        Ok(resumable)
    }
}

fn display_or_overflow(total: Option<Decimal>) -> String {
    total.map_or_else(|| "overflow".to_string(), |t| t.to_string())
}

impl std::fmt::Debug for OperatorNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorNode")
            .field("operator", &self.operator_id())
            .field("pools", &self.config.pools.len())
            .field("boundary", &self.boundary)
            .field("submitter", &self.submitter)
            .finish_non_exhaustive()
    }
}
