//! In-memory collaborators: ledger, operator registry and vote transport.
//!
//! Used by the `simulate` command and by tests. The ledger is strict in the
//! ways a real settlement contract would be (it verifies proofs and quorum
//! signatures, refuses reused nonces and double settlement) and can be
//! scripted to reject upcoming submissions.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use veilmatch_ingress::CommitmentFeed;
use veilmatch_proof::AttestationVerifier;
use veilmatch_quorum::{OperatorRegistry, VoteRouter, verify_vote};
use veilmatch_settlement::{Ledger, LedgerResponse};
use veilmatch_types::{
    CommitmentId, CommitmentStatus, LedgerRejection, MisbehaviorEvidence, Operator, OperatorId, OperatorVote,
    OrderCommitment, PoolId, Result, SettlementRecord, TaskId, VeilmatchError,
};

// ---------------------------------------------------------------------------
// MemoryLedger
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct LedgerState {
    commitments: BTreeMap<PoolId, Vec<OrderCommitment>>,
    index: HashMap<CommitmentId, (PoolId, usize)>,
    /// Last nonce handed out per pool.
    nonces: HashMap<PoolId, u64>,
    used_nonces: HashMap<PoolId, HashSet<u64>>,
    settled: BTreeMap<TaskId, SettlementRecord>,
    script: VecDeque<LedgerRejection>,
    submissions: Vec<SettlementRecord>,
}

/// Commitment store and settlement layer in one process.
#[derive(Debug)]
pub struct MemoryLedger {
    verifier: AttestationVerifier,
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    /// A ledger accepting proofs that `verifier` accepts.
    #[must_use]
    pub fn new(verifier: AttestationVerifier) -> Self {
        Self {
            verifier,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Post a commitment, returning the sequence number it was given.
    pub async fn post(&self, mut commitment: OrderCommitment) -> u64 {
        let mut state = self.state.lock().await;
        let pool = commitment.pool_id.clone();
        let stream = state.commitments.entry(pool.clone()).or_default();
        let sequence = stream.len() as u64 + 1;
        commitment.sequence = sequence;
        commitment.status = CommitmentStatus::Pending;
        commitment.posted_at = Utc::now();
        let id = commitment.id;
        let slot = stream.len();
        stream.push(commitment);
        state.index.insert(id, (pool, slot));
        sequence
    }

    /// Answer the next submissions with `rejections`, in order, before any
    /// other check.
    pub async fn reject_next(&self, rejections: impl IntoIterator<Item = LedgerRejection>) {
        self.state.lock().await.script.extend(rejections);
    }

    pub async fn status_of(&self, id: &CommitmentId) -> Option<CommitmentStatus> {
        let state = self.state.lock().await;
        let (pool, slot) = state.index.get(id)?;
        state.commitments.get(pool).and_then(|s| s.get(*slot)).map(|c| c.status)
    }

    pub async fn settlement(&self, task: &TaskId) -> Option<SettlementRecord> {
        self.state.lock().await.settled.get(task).cloned()
    }

    pub async fn settled_count(&self) -> usize {
        self.state.lock().await.settled.len()
    }

    /// Every record submitted, accepted or not.
    pub async fn submissions(&self) -> Vec<SettlementRecord> {
        self.state.lock().await.submissions.clone()
    }

    fn check(&self, state: &LedgerState, record: &SettlementRecord) -> Option<LedgerRejection> {
        if state.settled.contains_key(&record.task_id) {
            return Some(LedgerRejection::DoubleSettlement);
        }
        let issued = state.nonces.get(&record.pool_id).copied().unwrap_or(0);
        if record.nonce == 0
            || record.nonce > issued
            || state
                .used_nonces
                .get(&record.pool_id)
                .is_some_and(|used| used.contains(&record.nonce))
        {
            return Some(LedgerRejection::NonceReused);
        }
        if !self.verifier.verify(&record.proof, &record.public_inputs()) {
            return Some(LedgerRejection::InvalidProof);
        }
        let forged = record.quorum_signatures.is_empty()
            || record.quorum_signatures.iter().any(|v| {
                v.task_id != record.task_id
                    || v.result_hash != record.result_hash
                    || !verify_vote(v, v.operator_id.as_bytes())
            });
        if forged {
            return Some(LedgerRejection::Other("quorum signatures do not verify".into()));
        }
        None
    }
}

#[async_trait]
impl CommitmentFeed for MemoryLedger {
    async fn fetch_since(&self, pool: &PoolId, after: u64) -> Result<Vec<OrderCommitment>> {
        let state = self.state.lock().await;
        Ok(state
            .commitments
            .get(pool)
            .map(|stream| stream.iter().filter(|c| c.sequence > after).cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn next_nonce(&self, pool: &PoolId) -> Result<u64> {
        let mut state = self.state.lock().await;
        let nonce = state.nonces.entry(pool.clone()).or_insert(0);
        *nonce += 1;
        Ok(*nonce)
    }

    async fn submit(&self, record: &SettlementRecord) -> Result<LedgerResponse> {
        let mut state = self.state.lock().await;
        state.submissions.push(record.clone());

        let rejection = match state.script.pop_front() {
            Some(scripted) => Some(scripted),
            None => self.check(&state, record),
        };
        state
            .used_nonces
            .entry(record.pool_id.clone())
            .or_default()
            .insert(record.nonce);

        if let Some(reason) = rejection {
            tracing::info!(task = %record.task_id, nonce = record.nonce, %reason, "Ledger rejected settlement");
            return Ok(LedgerResponse::Rejected(reason));
        }
        state.settled.insert(record.task_id, record.clone());
        tracing::info!(task = %record.task_id, pool = %record.pool_id, nonce = record.nonce, "Ledger accepted settlement");
        Ok(LedgerResponse::Accepted)
    }

    async fn update_status(&self, commitment: &CommitmentId, status: CommitmentStatus) -> Result<()> {
        let mut state = self.state.lock().await;
        let (pool, slot) = state
            .index
            .get(commitment)
            .cloned()
            .ok_or(VeilmatchError::CommitmentNotFound(*commitment))?;
        let entry = state
            .commitments
            .get_mut(&pool)
            .and_then(|s| s.get_mut(slot))
            .ok_or(VeilmatchError::CommitmentNotFound(*commitment))?;
        // several operators may publish the same change
        if entry.status == status {
            return Ok(());
        }
        entry.transition(status)
    }

    async fn settled_hash(&self, task: &TaskId) -> Result<Option<[u8; 32]>> {
        Ok(self.state.lock().await.settled.get(task).map(|r| r.result_hash))
    }
}

// ---------------------------------------------------------------------------
// StaticRegistry
// ---------------------------------------------------------------------------

/// A misbehavior report as received by [`StaticRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub operator: OperatorId,
    pub task: TaskId,
    pub evidence: MisbehaviorEvidence,
}

/// Fixed operator set serving every pool. Records reports without acting on
/// them.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    operators: Vec<Operator>,
    reports: Mutex<Vec<Report>>,
}

impl StaticRegistry {
    #[must_use]
    pub fn new(operators: Vec<Operator>) -> Self {
        Self {
            operators,
            reports: Mutex::new(Vec::new()),
        }
    }

    pub async fn reports(&self) -> Vec<Report> {
        self.reports.lock().await.clone()
    }
}

#[async_trait]
impl OperatorRegistry for StaticRegistry {
    async fn get_operators(&self, _pool: &PoolId) -> Result<Vec<Operator>> {
        Ok(self.operators.clone())
    }

    async fn report_misbehavior(&self, operator: &OperatorId, task: &TaskId, evidence: MisbehaviorEvidence) -> Result<()> {
        tracing::warn!(operator = %operator, task = %task, kind = ?evidence.kind, "Misbehavior reported");
        self.reports.lock().await.push(Report {
            operator: *operator,
            task: *task,
            evidence,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingTransport
// ---------------------------------------------------------------------------

/// Delivers votes straight into connected operators' routers and keeps a
/// log of every broadcast.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    routers: Mutex<BTreeMap<OperatorId, Arc<VoteRouter>>>,
    sent: Mutex<Vec<OperatorVote>>,
}

impl RecordingTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route votes for `operator` into `router`, replacing any earlier one.
    pub async fn connect(&self, operator: OperatorId, router: Arc<VoteRouter>) {
        self.routers.lock().await.insert(operator, router);
    }

    pub async fn disconnect(&self, operator: &OperatorId) {
        self.routers.lock().await.remove(operator);
    }

    /// Every vote broadcast so far, in order.
    pub async fn sent(&self) -> Vec<OperatorVote> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl crate::transport::VoteTransport for RecordingTransport {
    async fn broadcast(&self, committee: &[OperatorId], vote: &OperatorVote) -> Result<()> {
        self.sent.lock().await.push(vote.clone());

        let targets: Vec<(OperatorId, Arc<VoteRouter>)> = {
            let routers = self.routers.lock().await;
            committee
                .iter()
                .filter(|member| **member != vote.operator_id)
                .filter_map(|member| routers.get(member).map(|r| (*member, Arc::clone(r))))
                .collect()
        };
        for (member, router) in targets {
            if let Err(e) = router.route(vote.clone()).await {
                tracing::debug!(to = %member, task = %vote.task_id, error = %e, "Vote arrived after tally closed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use veilmatch_proof::{AttestationBackend, ProvingBackend};
    use veilmatch_quorum::VoteSigner;
    use veilmatch_types::*;

    use super::*;
    use crate::transport::VoteTransport;

    fn commitment(pool: &str) -> OrderCommitment {
        let payload = RevealedPayload::dummy(OrderSide::Buy, Decimal::ONE, Decimal::ONE);
        OrderCommitment::new(PoolId::new(pool), SubmitterId::new("alice"), EpochId(1), &payload, vec![])
    }

    #[tokio::test]
    async fn feed_returns_commitments_after_cursor() {
        let ledger = MemoryLedger::new(AttestationVerifier::default());
        assert_eq!(ledger.post(commitment("A")).await, 1);
        assert_eq!(ledger.post(commitment("A")).await, 2);
        assert_eq!(ledger.post(commitment("B")).await, 1);

        let pool = PoolId::new("A");
        assert_eq!(ledger.fetch_since(&pool, 0).await.unwrap().len(), 2);
        let rest = ledger.fetch_since(&pool, 1).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].sequence, 2);
        assert!(ledger.fetch_since(&PoolId::new("C"), 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn status_updates_follow_lifecycle() {
        let ledger = MemoryLedger::new(AttestationVerifier::default());
        let c = commitment("A");
        let id = c.id;
        ledger.post(c).await;

        ledger.update_status(&id, CommitmentStatus::Disputed).await.unwrap();
        ledger.update_status(&id, CommitmentStatus::Disputed).await.unwrap();
        assert_eq!(ledger.status_of(&id).await, Some(CommitmentStatus::Disputed));

        let err = ledger.update_status(&id, CommitmentStatus::Settled).await.unwrap_err();
        assert!(matches!(err, VeilmatchError::InvalidTransition { .. }));

        let unknown = CommitmentId::new();
        assert!(ledger.update_status(&unknown, CommitmentStatus::Assigned).await.is_err());
    }

    async fn signed_record(backend: &AttestationBackend, ledger: &MemoryLedger) -> SettlementRecord {
        let task_id = TaskId([3; 32]);
        let pool_id = PoolId::new("A");
        let result = MatchResult {
            task_id,
            matched_pairs: vec![],
            unmatched_orders: vec![],
            result_hash: veilmatch_matchcore::compute_result_hash(&task_id, &[], &[]),
        };
        let inputs = PublicInputs {
            task_id,
            pool_id: pool_id.clone(),
            epoch: EpochId(1),
            result_hash: result.result_hash,
        };
        let proof = backend.prove(&inputs, &[], &result).await.unwrap();
        SettlementRecord {
            task_id,
            pool_id: pool_id.clone(),
            epoch: EpochId(1),
            result_hash: result.result_hash,
            proof,
            quorum_signatures: vec![VoteSigner::generate().sign_vote(&task_id, result.result_hash)],
            nonce: ledger.next_nonce(&pool_id).await.unwrap(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn ledger_verifies_and_refuses_double_settlement() {
        let backend = AttestationBackend::generate();
        let ledger = MemoryLedger::new(backend.verifier().clone());

        let mut record = signed_record(&backend, &ledger).await;
        assert_eq!(ledger.submit(&record).await.unwrap(), LedgerResponse::Accepted);
        assert_eq!(ledger.settled_hash(&record.task_id).await.unwrap(), Some(record.result_hash));

        record.nonce = ledger.next_nonce(&record.pool_id).await.unwrap();
        assert_eq!(
            ledger.submit(&record).await.unwrap(),
            LedgerResponse::Rejected(LedgerRejection::DoubleSettlement)
        );
    }

    #[tokio::test]
    async fn ledger_refuses_foreign_proof_reused_nonce_and_forged_votes() {
        let backend = AttestationBackend::generate();
        let ledger = MemoryLedger::new(AttestationVerifier::default());
        let record = signed_record(&backend, &ledger).await;
        assert_eq!(
            ledger.submit(&record).await.unwrap(),
            LedgerResponse::Rejected(LedgerRejection::InvalidProof)
        );
        assert_eq!(
            ledger.submit(&record).await.unwrap(),
            LedgerResponse::Rejected(LedgerRejection::NonceReused)
        );

        let ledger = MemoryLedger::new(backend.verifier().clone());
        let mut record = signed_record(&backend, &ledger).await;
        record.quorum_signatures[0].signature[0] ^= 1;
        assert!(matches!(
            ledger.submit(&record).await.unwrap(),
            LedgerResponse::Rejected(LedgerRejection::Other(_))
        ));
    }

    #[tokio::test]
    async fn scripted_rejections_come_first() {
        let backend = AttestationBackend::generate();
        let ledger = MemoryLedger::new(backend.verifier().clone());
        ledger.reject_next([LedgerRejection::StaleEpoch]).await;

        let mut record = signed_record(&backend, &ledger).await;
        assert_eq!(
            ledger.submit(&record).await.unwrap(),
            LedgerResponse::Rejected(LedgerRejection::StaleEpoch)
        );
        record.nonce = ledger.next_nonce(&record.pool_id).await.unwrap();
        assert_eq!(ledger.submit(&record).await.unwrap(), LedgerResponse::Accepted);
        assert_eq!(ledger.submissions().await.len(), 2);
    }

    #[tokio::test]
    async fn registry_records_reports() {
        let signer = VoteSigner::generate();
        let registry = StaticRegistry::new(vec![Operator::new(signer.public_key(), 10)]);
        assert_eq!(registry.get_operators(&PoolId::new("any")).await.unwrap().len(), 1);

        let task = TaskId([1; 32]);
        let vote = signer.sign_vote(&task, [2; 32]);
        let evidence = MisbehaviorEvidence {
            task_id: task,
            operator_id: signer.operator_id(),
            vote,
            kind: EvidenceKind::DivergentFromQuorum { finalized_hash: [3; 32] },
        };
        registry
            .report_misbehavior(&signer.operator_id(), &task, evidence.clone())
            .await
            .unwrap();
        let reports = registry.reports().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].evidence, evidence);
    }

    #[tokio::test]
    async fn transport_skips_author_and_unconnected_members() {
        let transport = RecordingTransport::new();
        let author = VoteSigner::generate();
        let peer = OperatorId([7; 32]);
        let author_router = Arc::new(VoteRouter::default());
        let peer_router = Arc::new(VoteRouter::default());
        transport.connect(author.operator_id(), author_router.clone()).await;
        transport.connect(peer, peer_router.clone()).await;

        let task = TaskId([5; 32]);
        let vote = author.sign_vote(&task, [0; 32]);
        transport
            .broadcast(&[author.operator_id(), peer, OperatorId([8; 32])], &vote)
            .await
            .unwrap();

        assert_eq!(peer_router.buffered(&task).await, 1);
        assert_eq!(author_router.buffered(&task).await, 0);
        assert_eq!(transport.sent().await, vec![vote.clone()]);

        transport.disconnect(&peer).await;
        transport.broadcast(&[author.operator_id(), peer], &vote).await.unwrap();
        assert_eq!(peer_router.buffered(&task).await, 1);
        assert_eq!(transport.sent().await.len(), 2);
    }
}
