//! Ballot policies and the approval tally.
//!
//! Which positions block, which approve, who may vote, and how many approvals
//! are needed are per-purpose configuration. The tally itself is a pure
//! function of a policy and the current positions.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use serde::Serialize;

use crate::model::{Axis, Person, Position, PositionValue};

/// Minimum approvals for a ballot to pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Threshold {
    AtLeast(usize),

    /// Two thirds of the voting pool, less recusals, rounded up.
    TwoThirds,
}

impl Threshold {
    pub fn required(self, eligible: usize) -> usize {
        match self {
            Threshold::AtLeast(n) => n,
            Threshold::TwoThirds => (2 * eligible).div_ceil(3),
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Threshold::AtLeast(n) => write!(f, "{n}"),
            Threshold::TwoThirds => f.write_str("two-thirds"),
        }
    }
}

/// Parses `two-thirds` or a count.
impl FromStr for Threshold {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "two-thirds" {
            return Ok(Threshold::TwoThirds);
        }
        s.parse::<usize>()
            .map(Threshold::AtLeast)
            .map_err(|_| format!("invalid threshold {s:?}: expected `two-thirds` or a count"))
    }
}

/// How one ballot purpose is decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotPolicy {
    pub purpose: String,
    pub name: String,

    /// Positions a voter may take, in display order.
    pub positions: Vec<PositionValue>,
    pub blocking: BTreeSet<PositionValue>,
    pub approving: BTreeSet<PositionValue>,

    /// The authorized pool. Empty means everyone who takes a position.
    pub voters: Vec<Person>,
    pub threshold: Threshold,

    /// State entered when the ballot closes approved.
    pub on_approval: Option<(Axis, String)>,

    /// Keep the ballot open when closing it would not approve.
    pub require_approval_to_close: bool,
}

impl BallotPolicy {
    pub fn allows(&self, value: PositionValue) -> bool {
        self.positions.contains(&value)
    }

    fn in_pool(&self, voter: &Person) -> bool {
        self.voters.is_empty() || self.voters.iter().any(|v| v.same_as(voter))
    }

    /// The IESG approval ballot.
    pub fn iesg_approve() -> Self {
        use PositionValue::{Abstain, Block, Discuss, NoObjection, NoRecord, Recuse, Yes};
        Self {
            purpose: "iesg-approve".to_string(),
            name: "IESG approval".to_string(),
            positions: vec![Yes, NoObjection, Discuss, Block, Abstain, Recuse, NoRecord],
            blocking: BTreeSet::from([Discuss, Block]),
            approving: BTreeSet::from([Yes, NoObjection]),
            voters: Vec::new(),
            threshold: Threshold::TwoThirds,
            on_approval: Some((Axis::Iesg, "approved".to_string())),
            require_approval_to_close: true,
        }
    }

    /// The IRSG poll for research-group documents.
    pub fn irsg_approve() -> Self {
        use PositionValue::{Abstain, NeedMoreTime, NoRecord, NotReady, Recuse, Yes};
        Self {
            purpose: "irsg-approve".to_string(),
            name: "IRSG approval".to_string(),
            positions: vec![Yes, NeedMoreTime, NotReady, Abstain, Recuse, NoRecord],
            blocking: BTreeSet::from([NotReady]),
            approving: BTreeSet::from([Yes]),
            voters: Vec::new(),
            threshold: Threshold::AtLeast(2),
            on_approval: Some((Axis::StreamIrtf, "rfc-edit".to_string())),
            require_approval_to_close: true,
        }
    }
}

/// Policies by purpose slug. Built once at startup.
#[derive(Debug, Clone)]
pub struct BallotPolicies(BTreeMap<String, BallotPolicy>);

impl BallotPolicies {
    pub fn builtin() -> Self {
        Self(
            [BallotPolicy::iesg_approve(), BallotPolicy::irsg_approve()]
                .into_iter()
                .map(|p| (p.purpose.clone(), p))
                .collect(),
        )
    }

    pub fn get(&self, purpose: &str) -> Option<&BallotPolicy> {
        self.0.get(purpose)
    }

    pub fn get_mut(&mut self, purpose: &str) -> Option<&mut BallotPolicy> {
        self.0.get_mut(purpose)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BallotPolicy> {
        self.0.values()
    }

    /// Policies with no configured voter pool, where anyone who takes a
    /// position is counted.
    pub fn open_pools(&self) -> impl Iterator<Item = &BallotPolicy> {
        self.iter().filter(|p| p.voters.is_empty())
    }
}

impl Default for BallotPolicies {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Evaluation of a ballot's current positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub approving: Vec<Person>,
    pub blocking: Vec<Person>,
    pub abstaining: Vec<Person>,
    pub recused: Vec<Person>,

    /// Pool members with no position on record.
    pub no_record: Vec<Person>,

    /// Approvals needed.
    pub required: usize,
    pub approved: bool,
}

/// Tallies current positions under `policy`.
///
/// Approved means no blocking position and at least the required number of
/// approving positions. Positions from outside the authorized pool are
/// ignored.
pub fn tally(policy: &BallotPolicy, positions: &[Position]) -> Tally {
    let counted: Vec<&Position> = positions.iter().filter(|p| policy.in_pool(&p.voter)).collect();

    let mut approving = Vec::new();
    let mut blocking = Vec::new();
    let mut abstaining = Vec::new();
    let mut recused = Vec::new();
    for position in &counted {
        let voter = position.voter.clone();
        if policy.blocking.contains(&position.value) {
            blocking.push(voter);
        } else if policy.approving.contains(&position.value) {
            approving.push(voter);
        } else if position.value == PositionValue::Recuse {
            recused.push(voter);
        } else if position.value != PositionValue::NoRecord {
            abstaining.push(voter);
        }
    }

    let pool: Vec<Person> = if policy.voters.is_empty() {
        counted.iter().map(|p| p.voter.clone()).collect()
    } else {
        policy.voters.clone()
    };
    let no_record = pool
        .iter()
        .filter(|v| {
            !counted
                .iter()
                .any(|p| p.voter.same_as(v) && p.value != PositionValue::NoRecord)
        })
        .cloned()
        .collect();

    let eligible = pool.len().saturating_sub(recused.len());
    let required = policy.threshold.required(eligible).max(1);
    let approved = blocking.is_empty() && approving.len() >= required;

    Tally {
        approving,
        blocking,
        abstaining,
        recused,
        no_record,
        required,
        approved,
    }
}

/// Collapses a position history to the latest position per voter.
///
/// `history` must be in append order.
pub fn current_positions(history: impl IntoIterator<Item = Position>) -> Vec<Position> {
    let mut latest: Vec<Position> = Vec::new();
    for position in history {
        match latest.iter_mut().find(|p| p.voter.same_as(&position.voter)) {
            Some(slot) => *slot = position,
            None => latest.push(position),
        }
    }
    latest
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::BallotId;
    use crate::testing;

    fn voter(n: usize) -> Person {
        Person::new(format!("Voter {n}"), format!("v{n}@ietf.org"))
    }

    fn position(ballot: BallotId, n: usize, value: PositionValue, seq: u64) -> Position {
        Position {
            ballot,
            voter: voter(n),
            value,
            comment: None,
            time: testing::t0(),
            seq,
        }
    }

    #[test]
    fn threshold_parsing() {
        assert_eq!("two-thirds".parse::<Threshold>().unwrap(), Threshold::TwoThirds);
        assert_eq!("3".parse::<Threshold>().unwrap(), Threshold::AtLeast(3));
        assert!("most".parse::<Threshold>().is_err());
    }

    #[test]
    fn two_thirds_rounds_up() {
        assert_eq!(Threshold::TwoThirds.required(15), 10);
        assert_eq!(Threshold::TwoThirds.required(14), 10);
        assert_eq!(Threshold::TwoThirds.required(1), 1);
    }

    #[test]
    fn discuss_blocks_approval() {
        let ballot = BallotId::new();
        let policy = BallotPolicy::iesg_approve();
        let result = tally(
            &policy,
            &[
                position(ballot, 1, PositionValue::Yes, 1),
                position(ballot, 2, PositionValue::Discuss, 2),
            ],
        );
        assert!(!result.approved);
        assert_eq!(result.blocking, [voter(2)]);
    }

    #[test]
    fn recusals_shrink_the_pool() {
        let ballot = BallotId::new();
        let mut policy = BallotPolicy::iesg_approve();
        policy.voters = (1..=6).map(voter).collect();

        // 6 voters, 2 recused: 4 eligible, 3 approvals required.
        let mut positions = vec![
            position(ballot, 1, PositionValue::Recuse, 1),
            position(ballot, 2, PositionValue::Recuse, 2),
            position(ballot, 3, PositionValue::Yes, 3),
            position(ballot, 4, PositionValue::NoObjection, 4),
        ];
        let result = tally(&policy, &positions);
        assert_eq!(result.required, 3);
        assert!(!result.approved);
        assert_eq!(result.no_record, [voter(5), voter(6)]);

        positions.push(position(ballot, 5, PositionValue::NoObjection, 5));
        assert!(tally(&policy, &positions).approved);
    }

    #[test]
    fn outsiders_are_not_counted() {
        let ballot = BallotId::new();
        let mut policy = BallotPolicy::irsg_approve();
        policy.voters = vec![voter(1), voter(2)];
        let result = tally(
            &policy,
            &[
                position(ballot, 1, PositionValue::Yes, 1),
                position(ballot, 9, PositionValue::Yes, 2),
                position(ballot, 8, PositionValue::NotReady, 3),
            ],
        );
        assert!(result.blocking.is_empty());
        assert_eq!(result.approving, [voter(1)]);
        assert!(!result.approved);
    }

    #[test]
    fn latest_position_wins() {
        let ballot = BallotId::new();
        let current = current_positions([
            position(ballot, 1, PositionValue::Discuss, 1),
            position(ballot, 2, PositionValue::Yes, 2),
            position(ballot, 1, PositionValue::Yes, 3),
        ]);
        assert_eq!(current.len(), 2);
        let first = current.iter().find(|p| p.voter == voter(1)).unwrap();
        assert_eq!(first.value, PositionValue::Yes);
        assert_eq!(first.seq, 3);
    }

    #[test]
    fn empty_ballot_is_not_approved() {
        let result = tally(&BallotPolicy::iesg_approve(), &[]);
        assert!(!result.approved);
        assert_eq!(result.required, 1);
    }

    #[test]
    fn unconfigured_pool_counts_whoever_votes() {
        let ballot = BallotId::new();
        let mut policies = BallotPolicies::builtin();
        assert_eq!(policies.open_pools().count(), 2);

        let open = policies.get("iesg-approve").unwrap().clone();
        let result = tally(&open, &[position(ballot, 7, PositionValue::Yes, 1)]);
        assert_eq!(result.required, 1);
        assert!(result.approved);

        let configured = policies.get_mut("iesg-approve").unwrap();
        configured.voters = (1..=3).map(voter).collect();
        let result = tally(configured, &[position(ballot, 7, PositionValue::Yes, 1)]);
        assert!(!result.approved);
        assert_eq!(
            policies.open_pools().map(|p| p.purpose.as_str()).collect::<Vec<_>>(),
            ["irsg-approve"]
        );
    }
}
