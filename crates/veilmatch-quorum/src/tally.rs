//! Stake-weighted vote tally for one task.
//!
//! A result hash reaches quorum when
//! `weight(hash) * threshold_den >= assigned_weight * threshold_num`.
//! Weights are summed as `u128`, so no stake total can saturate, and all
//! arithmetic is integer, no floating point.
//!
//! The tally closes on the first of:
//! - some hash reaches the threshold (`Reached`)
//! - no hash can reach it even with every outstanding vote (`Impossible`)
//! - the deadline passes ([`VoteTally::expire`])

use std::collections::{BTreeMap, HashMap};

use veilmatch_types::{
    EvidenceKind, MatchingTask, MisbehaviorEvidence, OperatorId, OperatorSnapshot, OperatorVote,
    QuorumConfig, Result, TaskId, VeilmatchError,
};

use crate::signing::verify_vote;

/// Where a tally stands after a vote or at the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TallyOutcome {
    /// Still collecting.
    Pending,
    /// `result_hash` holds `weight` of the assigned stake, at or above threshold.
    Reached { result_hash: [u8; 32], weight: u128 },
    /// No hash reached the threshold, or none can any more.
    Impossible { best_weight: u128 },
}

impl TallyOutcome {
    #[must_use]
    pub fn is_closed(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, Copy)]
struct Member {
    stake: u64,
    public_key: [u8; 32],
}

/// Collects signed votes from the task's committee.
#[derive(Debug)]
pub struct VoteTally {
    task_id: TaskId,
    committee: BTreeMap<OperatorId, Member>,
    assigned_weight: u128,
    threshold_num: u64,
    threshold_den: u64,
    votes: BTreeMap<OperatorId, OperatorVote>,
    weights: HashMap<[u8; 32], u128>,
    cast_weight: u128,
    outcome: TallyOutcome,
}

impl VoteTally {
    /// Tally for `task`'s assigned committee, weighted by `snapshot` stake.
    ///
    /// Committee members missing from the snapshot carry no weight and
    /// cannot vote.
    #[must_use]
    pub fn new(task: &MatchingTask, snapshot: &OperatorSnapshot, quorum: &QuorumConfig) -> Self {
        let committee: BTreeMap<OperatorId, Member> = task
            .assigned_operators
            .iter()
            .filter_map(|id| {
                snapshot.get(id).filter(|o| o.is_eligible()).map(|o| {
                    (
                        *id,
                        Member {
                            stake: o.stake_weight,
                            public_key: o.public_key,
                        },
                    )
                })
            })
            .collect();
        let assigned_weight: u128 = committee.values().map(|m| u128::from(m.stake)).sum();

        let mut tally = Self {
            task_id: task.task_id,
            committee,
            assigned_weight,
            threshold_num: quorum.threshold_num,
            threshold_den: quorum.threshold_den,
            votes: BTreeMap::new(),
            weights: HashMap::new(),
            cast_weight: 0,
            outcome: TallyOutcome::Pending,
        };
        tally.outcome = tally.evaluate();
        tally
    }

    #[must_use]
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    #[must_use]
    pub fn assigned_weight(&self) -> u128 {
        self.assigned_weight
    }

    #[must_use]
    pub fn cast_weight(&self) -> u128 {
        self.cast_weight
    }

    #[must_use]
    pub fn outcome(&self) -> TallyOutcome {
        self.outcome
    }

    #[must_use]
    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }

    /// Heaviest hash weight so far.
    #[must_use]
    pub fn best_weight(&self) -> u128 {
        self.weights.values().copied().max().unwrap_or(0)
    }

    /// Record a vote and return the (possibly changed) outcome.
    ///
    /// Rejected votes leave the tally untouched.
    pub fn record(&mut self, vote: OperatorVote) -> Result<TallyOutcome> {
        if self.outcome.is_closed() {
            return Err(VeilmatchError::TallyClosed(self.task_id));
        }
        if vote.task_id != self.task_id {
            return Err(VeilmatchError::WrongTask {
                expected: self.task_id,
                actual: vote.task_id,
            });
        }
        let Some(member) = self.committee.get(&vote.operator_id).copied() else {
            return Err(VeilmatchError::NotAssigned {
                operator: vote.operator_id,
                task: self.task_id,
            });
        };
        if self.votes.contains_key(&vote.operator_id) {
            return Err(VeilmatchError::DuplicateVote {
                operator: vote.operator_id,
                task: self.task_id,
            });
        }
        if !verify_vote(&vote, &member.public_key) {
            return Err(VeilmatchError::InvalidVoteSignature(vote.operator_id));
        }

        *self.weights.entry(vote.result_hash).or_default() += u128::from(member.stake);
        self.cast_weight += u128::from(member.stake);
        self.votes.insert(vote.operator_id, vote);

        self.outcome = self.evaluate();
        Ok(self.outcome)
    }

    /// Close the tally at the deadline. A pending tally becomes `Impossible`.
    pub fn expire(&mut self) -> TallyOutcome {
        if !self.outcome.is_closed() {
            self.outcome = TallyOutcome::Impossible {
                best_weight: self.best_weight(),
            };
        }
        self.outcome
    }

    /// `weight * den >= assigned * num`, computed as
    /// `weight >= ceil(assigned * num / den)` so no product can overflow.
    fn meets_threshold(&self, weight: u128) -> bool {
        let num = u128::from(self.threshold_num);
        let den = u128::from(self.threshold_den);
        if den == 0 {
            return false;
        }
        let whole = (self.assigned_weight / den).saturating_mul(num);
        let part = ((self.assigned_weight % den) * num).div_ceil(den);
        weight >= whole.saturating_add(part)
    }

    fn evaluate(&self) -> TallyOutcome {
        if self.assigned_weight == 0 {
            return TallyOutcome::Impossible { best_weight: 0 };
        }

        // heaviest hash, ties broken by the smaller hash
        let best = self
            .weights
            .iter()
            .max_by(|(ha, wa), (hb, wb)| wa.cmp(wb).then_with(|| hb.cmp(ha)))
            .map(|(h, w)| (*h, *w));

        let best_weight = best.map_or(0, |(_, w)| w);
        if let Some((result_hash, weight)) = best.filter(|(_, w)| self.meets_threshold(*w)) {
            return TallyOutcome::Reached { result_hash, weight };
        }

        let outstanding = self.assigned_weight.saturating_sub(self.cast_weight);
        if !self.meets_threshold(best_weight.saturating_add(outstanding)) {
            return TallyOutcome::Impossible { best_weight };
        }
        TallyOutcome::Pending
    }

    /// Votes for `result_hash`, in operator id order.
    #[must_use]
    pub fn signatures_for(&self, result_hash: &[u8; 32]) -> Vec<OperatorVote> {
        self.votes
            .values()
            .filter(|v| &v.result_hash == result_hash)
            .cloned()
            .collect()
    }

    /// Evidence against voters who diverged from the outcome.
    ///
    /// After `Reached`, every vote for a different hash. Otherwise, every
    /// vote against a strict majority (> 1/2) of the cast stake, if one
    /// exists. Empty while pending.
    #[must_use]
    pub fn dissenters(&self) -> Vec<MisbehaviorEvidence> {
        let (reference, kind) = match self.outcome {
            TallyOutcome::Pending => return Vec::new(),
            TallyOutcome::Reached { result_hash, .. } => (
                result_hash,
                EvidenceKind::DivergentFromQuorum {
                    finalized_hash: result_hash,
                },
            ),
            TallyOutcome::Impossible { .. } => {
                let majority = self
                    .weights
                    .iter()
                    .find(|(_, w)| **w > self.cast_weight / 2)
                    .map(|(h, _)| *h);
                match majority {
                    Some(h) => (h, EvidenceKind::DivergentFromMajority { majority_hash: h }),
                    None => return Vec::new(),
                }
            }
        };

        self.votes
            .values()
            .filter(|v| v.result_hash != reference)
            .map(|v| MisbehaviorEvidence {
                task_id: self.task_id,
                operator_id: v.operator_id,
                vote: v.clone(),
                kind: kind.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use veilmatch_types::*;

    use super::*;
    use crate::VoteSigner;

    struct Fixture {
        task: MatchingTask,
        snapshot: OperatorSnapshot,
        signers: Vec<VoteSigner>,
    }

    fn fixture(stakes: &[u64]) -> Fixture {
        let signers: Vec<VoteSigner> = stakes.iter().map(|_| VoteSigner::generate()).collect();
        let ops = signers
            .iter()
            .zip(stakes)
            .map(|(s, w)| Operator::new(s.public_key(), *w))
            .collect();
        let snapshot = OperatorSnapshot::new(PoolId::new("P"), ops);
        let orders = vec![
            RevealedOrder::dummy(OrderSide::Buy, Decimal::ONE, Decimal::ONE),
            RevealedOrder::dummy(OrderSide::Sell, Decimal::ONE, Decimal::ONE),
        ];
        let mut task = MatchingTask::new(PoolId::new("P"), EpochId(1), orders, Utc::now());
        task.assign(signers.iter().map(VoteSigner::operator_id).collect()).unwrap();
        Fixture { task, snapshot, signers }
    }

    fn two_thirds() -> QuorumConfig {
        QuorumConfig {
            committee_size: 5,
            threshold_num: 2,
            threshold_den: 3,
        }
    }

    #[test]
    fn reaches_exactly_at_threshold() {
        let f = fixture(&[1, 1, 1]);
        let mut t = VoteTally::new(&f.task, &f.snapshot, &two_thirds());
        let id = f.task.task_id;
        assert_eq!(t.record(f.signers[0].sign_vote(&id, [7; 32])).unwrap(), TallyOutcome::Pending);
        let out = t.record(f.signers[1].sign_vote(&id, [7; 32])).unwrap();
        assert_eq!(
            out,
            TallyOutcome::Reached {
                result_hash: [7; 32],
                weight: 2
            }
        );
        assert_eq!(t.signatures_for(&[7; 32]).len(), 2);
    }

    #[test]
    fn sixty_forty_split_is_impossible() {
        let f = fixture(&[30, 30, 20, 20]);
        let mut t = VoteTally::new(&f.task, &f.snapshot, &two_thirds());
        let id = f.task.task_id;
        t.record(f.signers[0].sign_vote(&id, [1; 32])).unwrap();
        t.record(f.signers[1].sign_vote(&id, [1; 32])).unwrap();
        t.record(f.signers[2].sign_vote(&id, [2; 32])).unwrap();
        // 60 vs 20 with 20 outstanding: 80 * 3 >= 100 * 2, still possible
        assert_eq!(t.outcome(), TallyOutcome::Pending);
        let out = t.record(f.signers[3].sign_vote(&id, [2; 32])).unwrap();
        assert_eq!(out, TallyOutcome::Impossible { best_weight: 60 });

        let evidence = t.dissenters();
        assert_eq!(evidence.len(), 2);
        assert!(evidence.iter().all(|e| e.kind
            == EvidenceKind::DivergentFromMajority {
                majority_hash: [1; 32]
            }));
    }

    #[test]
    fn early_impossibility_before_everyone_votes() {
        let f = fixture(&[40, 40, 20]);
        let mut t = VoteTally::new(&f.task, &f.snapshot, &two_thirds());
        let id = f.task.task_id;
        t.record(f.signers[0].sign_vote(&id, [1; 32])).unwrap();
        let out = t.record(f.signers[1].sign_vote(&id, [2; 32])).unwrap();
        // best 40 + outstanding 20 = 60 < 66.7
        assert_eq!(out, TallyOutcome::Impossible { best_weight: 40 });
        assert!(t.dissenters().is_empty(), "no strict majority of cast stake");
    }

    #[test]
    fn rejects_bad_votes_without_counting() {
        let f = fixture(&[1, 1, 1]);
        let mut t = VoteTally::new(&f.task, &f.snapshot, &two_thirds());
        let id = f.task.task_id;

        let outsider = VoteSigner::generate().sign_vote(&id, [7; 32]);
        assert!(matches!(t.record(outsider), Err(VeilmatchError::NotAssigned { .. })));

        let wrong = f.signers[0].sign_vote(&TaskId([0; 32]), [7; 32]);
        assert!(matches!(t.record(wrong), Err(VeilmatchError::WrongTask { .. })));

        let mut forged = f.signers[0].sign_vote(&id, [7; 32]);
        forged.result_hash = [8; 32];
        assert!(matches!(t.record(forged), Err(VeilmatchError::InvalidVoteSignature(_))));

        t.record(f.signers[0].sign_vote(&id, [7; 32])).unwrap();
        let again = f.signers[0].sign_vote(&id, [9; 32]);
        let err = t.record(again).unwrap_err();
        assert!(matches!(err, VeilmatchError::DuplicateVote { .. }));
        assert_eq!(err.class(), ErrorClass::Validation);

        assert_eq!(t.vote_count(), 1);
        assert_eq!(t.cast_weight(), 1);
    }

    #[test]
    fn closed_tally_refuses_votes() {
        let f = fixture(&[1, 1, 1]);
        let mut t = VoteTally::new(&f.task, &f.snapshot, &two_thirds());
        let id = f.task.task_id;
        t.record(f.signers[0].sign_vote(&id, [7; 32])).unwrap();
        t.record(f.signers[1].sign_vote(&id, [7; 32])).unwrap();
        let err = t.record(f.signers[2].sign_vote(&id, [7; 32])).unwrap_err();
        assert!(matches!(err, VeilmatchError::TallyClosed(_)));
    }

    #[test]
    fn expire_turns_pending_into_impossible() {
        let f = fixture(&[1, 1, 1]);
        let mut t = VoteTally::new(&f.task, &f.snapshot, &two_thirds());
        t.record(f.signers[0].sign_vote(&f.task.task_id, [7; 32])).unwrap();
        assert_eq!(t.expire(), TallyOutcome::Impossible { best_weight: 1 });
        assert!(t.dissenters().is_empty());
    }

    #[test]
    fn reached_reports_divergent_voters() {
        let f = fixture(&[50, 30, 20]);
        let mut t = VoteTally::new(&f.task, &f.snapshot, &two_thirds());
        let id = f.task.task_id;
        t.record(f.signers[2].sign_vote(&id, [9; 32])).unwrap();
        t.record(f.signers[0].sign_vote(&id, [7; 32])).unwrap();
        t.record(f.signers[1].sign_vote(&id, [7; 32])).unwrap();
        assert!(matches!(t.outcome(), TallyOutcome::Reached { weight: 80, .. }));
        let evidence = t.dissenters();
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].operator_id, f.signers[2].operator_id());
    }

    #[test]
    fn empty_committee_is_impossible_up_front() {
        let f = fixture(&[1, 1]);
        let mut task = f.task.clone();
        task.assigned_operators.clear();
        let t = VoteTally::new(&task, &f.snapshot, &two_thirds());
        assert_eq!(t.outcome(), TallyOutcome::Impossible { best_weight: 0 });
    }

    #[test]
    fn huge_stakes_do_not_overflow() {
        let f = fixture(&[u64::MAX / 2, u64::MAX / 2]);
        let mut t = VoteTally::new(&f.task, &f.snapshot, &two_thirds());
        let id = f.task.task_id;
        t.record(f.signers[0].sign_vote(&id, [1; 32])).unwrap();
        let out = t.record(f.signers[1].sign_vote(&id, [1; 32])).unwrap();
        assert!(matches!(out, TallyOutcome::Reached { .. }));
    }

    #[test]
    fn stake_totals_past_u64_keep_exact_threshold() {
        // 3 * u64::MAX assigned: two votes are exactly 2/3, one is not
        let f = fixture(&[u64::MAX, u64::MAX, u64::MAX]);
        let mut t = VoteTally::new(&f.task, &f.snapshot, &two_thirds());
        assert_eq!(t.assigned_weight(), 3 * u128::from(u64::MAX));
        let id = f.task.task_id;

        let out = t.record(f.signers[0].sign_vote(&id, [1; 32])).unwrap();
        assert_eq!(out, TallyOutcome::Pending);
        // 1/3 each with 1/3 outstanding: the last vote can still make 2/3
        let out = t.record(f.signers[1].sign_vote(&id, [2; 32])).unwrap();
        assert_eq!(out, TallyOutcome::Pending);
        assert_eq!(t.cast_weight(), 2 * u128::from(u64::MAX));
        let out = t.record(f.signers[2].sign_vote(&id, [3; 32])).unwrap();
        assert_eq!(
            out,
            TallyOutcome::Impossible {
                best_weight: u128::from(u64::MAX)
            }
        );

        let mut t = VoteTally::new(&f.task, &f.snapshot, &two_thirds());
        t.record(f.signers[0].sign_vote(&id, [1; 32])).unwrap();
        let out = t.record(f.signers[2].sign_vote(&id, [1; 32])).unwrap();
        assert_eq!(
            out,
            TallyOutcome::Reached {
                result_hash: [1; 32],
                weight: 2 * u128::from(u64::MAX)
            }
        );
    }
}
