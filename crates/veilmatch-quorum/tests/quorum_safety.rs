//! Committee selection through coordinator outcome, several operators voting.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::time::Instant;
use veilmatch_quorum::*;
use veilmatch_types::*;

struct Registry {
    operators: Vec<Operator>,
    reports: Mutex<Vec<(OperatorId, TaskId)>>,
}

#[async_trait]
impl OperatorRegistry for Registry {
    async fn get_operators(&self, _pool: &PoolId) -> Result<Vec<Operator>> {
        Ok(self.operators.clone())
    }

    async fn report_misbehavior(&self, operator: &OperatorId, task: &TaskId, _evidence: MisbehaviorEvidence) -> Result<()> {
        self.reports.lock().unwrap().push((*operator, *task));
        Ok(())
    }
}

fn network(stakes: &[u64]) -> (Arc<Registry>, Vec<VoteSigner>) {
    let signers: Vec<VoteSigner> = stakes.iter().map(|_| VoteSigner::generate()).collect();
    let operators = signers
        .iter()
        .zip(stakes)
        .map(|(s, w)| Operator::new(s.public_key(), *w))
        .collect();
    (
        Arc::new(Registry {
            operators,
            reports: Mutex::new(Vec::new()),
        }),
        signers,
    )
}

fn task() -> MatchingTask {
    let orders = vec![
        RevealedOrder::dummy(OrderSide::Buy, Decimal::TEN, Decimal::new(100, 0)),
        RevealedOrder::dummy(OrderSide::Sell, Decimal::TEN, Decimal::new(95, 0)),
    ];
    MatchingTask::new(PoolId::new("TEST/USD"), EpochId(7), orders, Utc::now())
}

fn signer_for<'a>(signers: &'a [VoteSigner], id: &OperatorId) -> &'a VoteSigner {
    signers.iter().find(|s| &s.operator_id() == id).unwrap()
}

#[tokio::test(start_paused = true)]
async fn honest_committee_finalizes_with_threshold_signatures() {
    let (registry, signers) = network(&[10, 10, 10, 10, 10, 10, 10]);
    let snapshot = snapshot_operators(registry.as_ref(), &PoolId::new("TEST/USD")).await.unwrap();
    let mut task = task();
    task.assign(select_committee(&task.task_id, &snapshot, 5)).unwrap();
    task.begin_collecting().unwrap();
    assert_eq!(task.assigned_operators.len(), 5);

    let router = VoteRouter::default();
    // two votes arrive before the local coordinator exists
    for id in &task.assigned_operators[..2] {
        router.route(signer_for(&signers, id).sign_vote(&task.task_id, [3; 32])).await.unwrap();
    }

    let tally = VoteTally::new(&task, &snapshot, &QuorumConfig::default());
    let handle = TaskCoordinator::spawn(tally, Instant::now() + Duration::from_secs(8), registry.clone());
    router.register(task.task_id, handle.inbox()).await.unwrap();
    for id in &task.assigned_operators[2..4] {
        router.route(signer_for(&signers, id).sign_vote(&task.task_id, [3; 32])).await.unwrap();
    }

    let outcome = handle.outcome().await.unwrap();
    let QuorumOutcome::Finalized { result_hash, weight, signatures } = outcome else {
        panic!("expected finalized");
    };
    assert_eq!(result_hash, [3; 32]);
    // 4 of 5 with 2/3 needed: the tally closes at the 4th vote (40 * 3 >= 50 * 2)
    assert_eq!(weight, 40);
    assert_eq!(signatures.len(), 4);
    assert!(signatures.iter().all(|v| task.is_assigned_to(&v.operator_id)));
}

#[tokio::test(start_paused = true)]
async fn sixty_forty_split_never_finalizes() {
    let (registry, signers) = network(&[30, 30, 20, 20]);
    let snapshot = snapshot_operators(registry.as_ref(), &PoolId::new("TEST/USD")).await.unwrap();
    let mut task = task();
    task.assign(select_committee(&task.task_id, &snapshot, 5)).unwrap();
    assert_eq!(task.assigned_operators.len(), 4);

    let tally = VoteTally::new(&task, &snapshot, &QuorumConfig::default());
    let handle = TaskCoordinator::spawn(tally, Instant::now() + Duration::from_secs(8), registry.clone());
    for s in &signers {
        let hash = if snapshot.stake_of(&s.operator_id()) == 30 { [1; 32] } else { [2; 32] };
        handle.submit(s.sign_vote(&task.task_id, hash)).await.unwrap();
    }

    let outcome = handle.outcome().await.unwrap();
    assert_eq!(outcome.finalized_hash(), None);
    assert_eq!(outcome.to_error(task.task_id).unwrap().class(), ErrorClass::Agreement);

    tokio::time::sleep(Duration::from_millis(10)).await;
    let reports = registry.reports.lock().unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|(op, t)| t == &task.task_id && snapshot.stake_of(op) == 20));
}

#[tokio::test]
async fn registry_without_stake_is_refused() {
    let (registry, _) = network(&[0, 0]);
    let err = snapshot_operators(registry.as_ref(), &PoolId::new("TEST/USD")).await.unwrap_err();
    assert!(matches!(err, VeilmatchError::NoEligibleOperators(_)));
}
