//! End-to-end tests: match → quorum signatures → settlement.
//!
//! A scripted ledger answers submissions from a queue of responses so the
//! retry, terminal and idempotency paths can be driven deterministically.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use veilmatch_matchcore::match_task;
use veilmatch_quorum::VoteSigner;
use veilmatch_settlement::{ConservationCheck, Ledger, LedgerResponse, SettlementSubmitter};
use veilmatch_types::*;

#[derive(Default)]
struct ScriptedLedger {
    script: Mutex<VecDeque<LedgerResponse>>,
    submitted: Mutex<Vec<SettlementRecord>>,
    nonce: Mutex<u64>,
}

impl ScriptedLedger {
    fn with(responses: Vec<LedgerResponse>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(responses.into()),
            ..Self::default()
        })
    }

    fn submissions(&self) -> Vec<SettlementRecord> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Ledger for ScriptedLedger {
    async fn next_nonce(&self, _pool: &PoolId) -> Result<u64> {
        let mut n = self.nonce.lock().unwrap();
        *n += 1;
        Ok(*n)
    }

    async fn submit(&self, record: &SettlementRecord) -> Result<LedgerResponse> {
        self.submitted.lock().unwrap().push(record.clone());
        Ok(self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(LedgerResponse::Accepted))
    }

    async fn update_status(&self, _commitment: &CommitmentId, _status: CommitmentStatus) -> Result<()> {
        Ok(())
    }

    async fn settled_hash(&self, task: &TaskId) -> Result<Option<[u8; 32]>> {
        Ok(self
            .submitted
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.task_id == *task)
            .map(|r| r.result_hash))
    }
}

fn d(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

fn finalized_task() -> (MatchingTask, MatchResult, Vec<OperatorVote>) {
    finalized_task_due(Utc::now() + chrono::Duration::hours(1))
}

/// A partial fill with a remainder, Finalized with three matching votes.
fn finalized_task_due(deadline: DateTime<Utc>) -> (MatchingTask, MatchResult, Vec<OperatorVote>) {
    let orders = vec![
        RevealedOrder::dummy_for(SubmitterId::new("alice"), OrderSide::Buy, d(15), d(100)),
        RevealedOrder::dummy_for(SubmitterId::new("bob"), OrderSide::Sell, d(10), d(100)),
    ];
    let mut task = MatchingTask::new(PoolId::new("TEST/USD"), EpochId(3), orders, deadline);
    let signers: Vec<VoteSigner> = (0..3).map(|_| VoteSigner::generate()).collect();
    task.assign(signers.iter().map(VoteSigner::operator_id).collect()).unwrap();
    task.begin_collecting().unwrap();

    let result = match_task(&task, &PoolConfig::new("TEST/USD"));
    let votes = signers
        .iter()
        .map(|s| s.sign_vote(&task.task_id, result.result_hash))
        .collect();
    task.finalize(result.result_hash).unwrap();
    (task, result, votes)
}

fn proof() -> Proof {
    Proof {
        scheme: "test".into(),
        bytes: vec![1, 2, 3],
    }
}

#[test]
fn matcher_output_conserves_size() {
    let (task, result, _) = finalized_task();
    assert_eq!(result.pair_count(), 1);
    assert_eq!(result.remainders().count(), 1);
    ConservationCheck::new(task.orders()).verify(&result).unwrap();
}

#[tokio::test]
async fn accepted_settlement_and_second_submission_blocked() {
    let ledger = ScriptedLedger::with(vec![]);
    let submitter = SettlementSubmitter::new(ledger.clone(), &SettlementConfig::default());
    let (task, result, votes) = finalized_task();

    let record = SettlementSubmitter::build_record(&task, proof(), votes).unwrap();
    let receipt = submitter.submit(&task, record.clone()).await.unwrap();
    assert_eq!(receipt.task_id, task.task_id);
    assert_eq!(receipt.result_hash, result.result_hash);
    assert_eq!(receipt.attempts, 1);
    assert!(submitter.is_settled(&task.task_id).await);

    let err = submitter.submit(&task, record).await.unwrap_err();
    assert!(matches!(err, VeilmatchError::AlreadySettled(_)));
    assert_eq!(ledger.submissions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn retryable_rejection_resubmits_with_fresh_nonce() {
    let ledger = ScriptedLedger::with(vec![
        LedgerResponse::Rejected(LedgerRejection::StaleEpoch),
        LedgerResponse::Rejected(LedgerRejection::NonceReused),
    ]);
    let submitter = SettlementSubmitter::new(ledger.clone(), &SettlementConfig::default());
    let (task, _, votes) = finalized_task();

    let record = SettlementSubmitter::build_record(&task, proof(), votes).unwrap();
    let receipt = submitter.submit(&task, record).await.unwrap();
    assert_eq!(receipt.attempts, 3);

    let nonces: Vec<u64> = ledger.submissions().iter().map(|r| r.nonce).collect();
    assert_eq!(nonces, vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn retry_budget_exhaustion_is_terminal() {
    let config = SettlementConfig {
        max_attempts: 2,
        ..SettlementConfig::default()
    };
    let ledger = ScriptedLedger::with(vec![
        LedgerResponse::Rejected(LedgerRejection::StaleEpoch),
        LedgerResponse::Rejected(LedgerRejection::StaleEpoch),
        LedgerResponse::Accepted,
    ]);
    let submitter = SettlementSubmitter::new(ledger.clone(), &config);
    let (task, _, votes) = finalized_task();

    let record = SettlementSubmitter::build_record(&task, proof(), votes).unwrap();
    let err = submitter.submit(&task, record).await.unwrap_err();
    assert!(matches!(err, VeilmatchError::SubmissionAttemptsExhausted { attempts: 2, .. }));
    assert_eq!(err.class(), ErrorClass::Ledger);
    assert!(!submitter.is_settled(&task.task_id).await);
}

#[tokio::test]
async fn no_resubmission_starts_past_the_deadline() {
    let ledger = ScriptedLedger::with(vec![
        LedgerResponse::Rejected(LedgerRejection::StaleEpoch),
        LedgerResponse::Accepted,
    ]);
    let submitter = SettlementSubmitter::new(ledger.clone(), &SettlementConfig::default());
    // the first backoff (200ms) would land past this deadline
    let (task, _, votes) = finalized_task_due(Utc::now() + chrono::Duration::milliseconds(50));

    let record = SettlementSubmitter::build_record(&task, proof(), votes).unwrap();
    let err = submitter.submit(&task, record).await.unwrap_err();
    assert!(matches!(err, VeilmatchError::SubmissionAttemptsExhausted { attempts: 1, .. }));
    assert_eq!(err.class(), ErrorClass::Ledger);
    assert_eq!(ledger.submissions().len(), 1);
}

#[tokio::test]
async fn terminal_rejection_is_not_retried() {
    let ledger = ScriptedLedger::with(vec![LedgerResponse::Rejected(LedgerRejection::InvalidProof)]);
    let submitter = SettlementSubmitter::new(ledger.clone(), &SettlementConfig::default());
    let (task, _, votes) = finalized_task();

    let record = SettlementSubmitter::build_record(&task, proof(), votes).unwrap();
    let err = submitter.submit(&task, record).await.unwrap_err();
    assert!(matches!(err, VeilmatchError::LedgerRejected(LedgerRejection::InvalidProof)));
    assert_eq!(ledger.submissions().len(), 1);
}

#[tokio::test]
async fn never_submits_for_unfinalized_task() {
    let ledger = ScriptedLedger::with(vec![]);
    let submitter = SettlementSubmitter::new(ledger.clone(), &SettlementConfig::default());
    let (finalized, _, votes) = finalized_task();
    let record = SettlementSubmitter::build_record(&finalized, proof(), votes).unwrap();

    let mut failed = finalized.clone();
    failed.fail(ErrorClass::Proof).unwrap();
    let err = submitter.submit(&failed, record).await.unwrap_err();
    assert!(matches!(
        err,
        VeilmatchError::TaskNotFinalized {
            phase: TaskPhase::Failed,
            ..
        }
    ));

    let mut collecting = MatchingTask::new(
        PoolId::new("TEST/USD"),
        EpochId(3),
        finalized.orders().to_vec(),
        Utc::now(),
    );
    collecting.assign(finalized.assigned_operators.clone()).unwrap();
    assert!(SettlementSubmitter::build_record(&collecting, proof(), vec![]).is_err());
    assert!(ledger.submissions().is_empty());
}

#[tokio::test]
async fn record_must_match_finalized_values() {
    let ledger = ScriptedLedger::with(vec![]);
    let submitter = SettlementSubmitter::new(ledger.clone(), &SettlementConfig::default());
    let (task, _, votes) = finalized_task();

    let mut record = SettlementSubmitter::build_record(&task, proof(), votes.clone()).unwrap();
    record.result_hash[0] ^= 0xff;
    let err = submitter.submit(&task, record).await.unwrap_err();
    assert!(matches!(err, VeilmatchError::RecordMismatch { .. }));

    let err = SettlementSubmitter::build_record(&task, proof(), vec![]).unwrap_err();
    assert!(matches!(err, VeilmatchError::RecordMismatch { .. }));

    let outsider = VoteSigner::generate().sign_vote(&task.task_id, task.finalized_hash.unwrap());
    let err = SettlementSubmitter::build_record(&task, proof(), vec![outsider]).unwrap_err();
    assert!(matches!(err, VeilmatchError::RecordMismatch { .. }));
    assert!(ledger.submissions().is_empty());
}
