use super::*;
use std::collections::{BTreeMap, BTreeSet};

fn ch(id: i64) -> ChannelId {
    ChannelId::new(id).unwrap()
}

fn acc(id: &str) -> AccountId {
    AccountId::new(id).unwrap()
}

fn universe(ids: &[i64]) -> ChannelUniverse {
    ChannelUniverse::from_ids(ids.iter().map(|id| ch(*id)))
}

fn membership(entries: &[(&str, &[i64])]) -> MembershipSnapshot {
    MembershipSnapshot::new(
        entries
            .iter()
            .map(|(account, channels)| {
                (
                    acc(account),
                    channels.iter().map(|c| ch(*c)).collect::<BTreeSet<_>>(),
                )
            })
            .collect(),
    )
}

fn owner(outcome: &BalanceOutcome, channel: i64) -> Option<&str> {
    outcome.mapping.get(&ch(channel)).map(|a| a.as_str())
}

/// **Test:** Scenario A, overlapping membership with equal weights
/// **Reason:** Channel 2 is shared; with equal seeds acc1 is already behind after channel 1
/// **Expectation:** {1: acc1, 2: acc2, 3: acc2}, full coverage
#[test]
fn scenario_overlapping_membership() {
    let outcome = balance(
        &universe(&[1, 2, 3]),
        &membership(&[("acc1", &[1, 2]), ("acc2", &[2, 3])]),
        &WeightSnapshot::default(),
    );

    assert_eq!(owner(&outcome, 1), Some("acc1"));
    assert_eq!(owner(&outcome, 2), Some("acc2"));
    assert_eq!(owner(&outcome, 3), Some("acc2"));
    assert_eq!(outcome.coverage, 1.0);
    assert!(outcome.unassigned.is_empty());
    assert_eq!(outcome.imbalance, 1.0);
}

/// **Test:** Scenario B, the only account is a member of nothing
/// **Expectation:** Empty mapping, coverage 0.0, both channels reported unassigned
#[test]
fn scenario_account_without_membership() {
    let outcome = balance(
        &universe(&[1, 2]),
        &membership(&[("acc1", &[])]),
        &WeightSnapshot::default(),
    );

    assert!(outcome.mapping.is_empty());
    assert_eq!(outcome.coverage, 0.0);
    assert_eq!(outcome.unassigned, vec![ch(1), ch(2)]);
    // acc1 is eligible for nothing, so it does not count towards imbalance
    assert!(outcome.loads.is_empty());
    assert_eq!(outcome.imbalance, 0.0);
}

/// **Test:** Scenario C, a recently overloaded account
/// **Reason:** A high smoothed weight seeds the running load, so the busy account starts behind
/// **Expectation:** acc2 (at the floor) receives a majority of the four channels
#[test]
fn scenario_busy_account_receives_fewer_channels() {
    let weights = WeightSnapshot::uniform(0.05).with(acc("acc1"), 5.0);
    let outcome = balance(
        &universe(&[1, 2, 3, 4]),
        &membership(&[("acc1", &[1, 2, 3, 4]), ("acc2", &[1, 2, 3, 4])]),
        &weights,
    );

    let acc2 = outcome
        .mapping
        .values()
        .filter(|a| a.as_str() == "acc2")
        .count();
    assert!(acc2 > 2, "acc2 got {} of 4", acc2);
    assert_eq!(outcome.coverage, 1.0);
}

/// **Test:** Ties go to the lexicographically smallest account id
#[test]
fn tie_break_is_lexicographic() {
    let outcome = balance(
        &universe(&[10]),
        &membership(&[("b-account", &[10]), ("a-account", &[10]), ("c-account", &[10])]),
        &WeightSnapshot::default(),
    );
    assert_eq!(owner(&outcome, 10), Some("a-account"));
}

/// **Test:** Legality and uniqueness on a larger, irregular roster
/// **Expectation:** Every assigned channel is a member channel of its owner, every channel
/// with at least one member is assigned, and a repeated run is identical
#[test]
fn mapping_is_legal_complete_and_deterministic() {
    let ids: Vec<i64> = (1..=40).chain([-1001, -1002]).collect();
    let members = membership(&[
        ("acc1", &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, -1001]),
        ("acc2", &[5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20]),
        ("acc3", &[18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30]),
        ("acc4", &[1, 3, 5, 7, 9, 11, 13, 15, 17, 19, 21, 23, 25, 27, 29, 31]),
    ]);
    let weights = WeightSnapshot::uniform(0.05)
        .with(acc("acc2"), 1.5)
        .with(acc("acc3"), 0.4);
    let universe = universe(&ids);

    let first = balance(&universe, &members, &weights);

    for (channel, account) in &first.mapping {
        assert!(members.is_member(account, *channel), "{} -> {}", channel, account);
    }

    let assigned: BTreeSet<ChannelId> = first.mapping.keys().copied().collect();
    let expected: BTreeSet<ChannelId> = universe
        .ids()
        .filter(|c| members.accounts().any(|a| members.is_member(a, *c)))
        .collect();
    assert_eq!(assigned, expected);
    assert_eq!(
        first.unassigned,
        vec![ch(32), ch(33), ch(34), ch(35), ch(36), ch(37), ch(38), ch(39), ch(40), ch(-1002)]
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>()
    );
    assert!(first.coverage <= 1.0);

    for _ in 0..5 {
        assert_eq!(balance(&universe, &members, &weights), first);
    }
}

/// **Test:** Full membership gives full coverage and an even split
#[test]
fn full_membership_full_coverage() {
    let ids: Vec<i64> = (1..=9).collect();
    let all: Vec<i64> = ids.clone();
    let outcome = balance(
        &universe(&ids),
        &membership(&[("acc1", &all[..]), ("acc2", &all[..]), ("acc3", &all[..])]),
        &WeightSnapshot::default(),
    );

    assert_eq!(outcome.coverage, 1.0);
    assert_eq!(outcome.imbalance, 0.0);
    let counts = outcome.channel_counts();
    assert_eq!(counts.values().copied().collect::<Vec<_>>(), vec![3, 3, 3]);
}

/// **Test:** Per-channel weights and account capacity
/// **Reason:** A heavy channel counts for more than one unit, and an account never
/// exceeds its capacity even when it is the only member
/// **Expectation:** The heavy channel (weight 3) pushes its owner behind; channels that
/// would overflow acc1's capacity stay unassigned
#[test]
fn channel_weight_and_capacity() {
    let universe = universe(&[1, 2, 3, 4]).with_weight(ch(1), 3.0);
    let members = membership(&[("acc1", &[1, 2, 3, 4]), ("acc2", &[2, 3])])
        .with_capacity(acc("acc1"), 4.0);

    let outcome = balance(&universe, &members, &WeightSnapshot::default());

    // 1 -> acc1 (only member), 2 and 3 -> acc2 (acc1 is 3 units behind), 4 -> acc1
    assert_eq!(owner(&outcome, 1), Some("acc1"));
    assert_eq!(owner(&outcome, 2), Some("acc2"));
    assert_eq!(owner(&outcome, 3), Some("acc2"));
    assert_eq!(owner(&outcome, 4), Some("acc1"));
    assert_eq!(outcome.loads[&acc("acc1")], 4.0);
    assert_eq!(outcome.loads[&acc("acc2")], 2.0);
    assert_eq!(outcome.imbalance, 2.0);

    let capped = membership(&[("acc1", &[1, 2, 3, 4])]).with_capacity(acc("acc1"), 4.0);
    let outcome = balance(&universe, &capped, &WeightSnapshot::default());
    assert_eq!(owner(&outcome, 1), Some("acc1"));
    assert_eq!(owner(&outcome, 2), Some("acc1"));
    assert_eq!(outcome.unassigned, vec![ch(3), ch(4)]);
    assert_eq!(outcome.coverage, 0.5);
}

/// **Test:** Empty inputs
/// **Expectation:** An empty universe is vacuously covered and flagged; an empty roster
/// covers nothing
#[test]
fn empty_universe_and_empty_roster() {
    let outcome = balance(
        &ChannelUniverse::default(),
        &membership(&[("acc1", &[1])]),
        &WeightSnapshot::default(),
    );
    assert!(outcome.mapping.is_empty());
    assert_eq!(outcome.coverage, 1.0);
    assert!(outcome.no_channels());

    let outcome = balance(
        &universe(&[1, 2, 3]),
        &MembershipSnapshot::new(BTreeMap::new()),
        &WeightSnapshot::default(),
    );
    assert!(outcome.mapping.is_empty());
    assert_eq!(outcome.coverage, 0.0);
    assert!(!outcome.no_channels());
}

/// **Test:** Unchanged inputs produce no churn
/// **Expectation:** Rebalancing with the same membership and weights yields the exact
/// same mapping, so no account would be notified
#[test]
fn unchanged_inputs_produce_identical_mapping() {
    let universe = universe(&[3, 1, 2, 7]);
    let members = membership(&[("acc1", &[1, 2, 7]), ("acc2", &[2, 3, 7])]);
    let weights = WeightSnapshot::uniform(0.05).with(acc("acc1"), 0.8);

    let previous = balance(&universe, &members, &weights).mapping;
    let next = balance(&universe, &members, &weights).mapping;
    assert!(warden_core::AssignmentDiff::between(&previous, &next).is_empty());
}
