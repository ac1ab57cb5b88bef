//! Tests for the qualification engine (level checkers and promotion rules)

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use rstest::rstest;

use partner_tree::application::services::{
    b1_checker, bq_checker, PerformanceAggregator, QualificationService, RuleSet, SnapshotService,
};
use partner_tree::application::{
    ApplicationError, FnRule, PromotionRule, RuleDependency, ThresholdConfig, ThresholdRule,
};
use partner_tree::domain::{offset_hours, DayWindow, Level, PartnerRecord, PartnerTree, TreeBuilder};
use partner_tree::infrastructure::traits::{Clock, MemoryLedger, SaleEntry};
use partner_tree::util::testing::{init_test_setup, records};

struct FixedClock(i64);

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.0
    }
}

fn clock(at: i64) -> Arc<dyn Clock> {
    Arc::new(FixedClock(at))
}

fn bq_rule() -> ThresholdRule {
    ThresholdRule::new(ThresholdConfig::default_for(Level::BQ))
}

/// Promote once a partner has three direct recruits, or one recruit that
/// already holds the target level.
fn cascading_rule() -> impl PromotionRule {
    FnRule::new(RuleDependency::Descendants, |tree: &PartnerTree, p| {
        Ok(tree.family_member_ids(p.user_id, true, false).len() >= 3
            || tree.direct_recruits_at_least(p.user_id, Level::BQ) >= 1)
    })
}

/// ```text
/// 1
/// ├── 2
/// │   ├── 5
/// │   ├── 6
/// │   └── 7
/// ├── 3
/// └── 4
/// ```
fn build_tree() -> PartnerTree {
    init_test_setup();
    TreeBuilder::new()
        .build(&records(&[
            (1, None, Level::None),
            (2, Some(1), Level::None),
            (3, Some(1), Level::None),
            (4, Some(1), Level::None),
            (5, Some(2), Level::None),
            (6, Some(2), Level::None),
            (7, Some(2), Level::None),
        ]))
        .unwrap()
}

#[test]
fn given_three_direct_recruits_when_bq_checker_runs_then_partner_promoted_with_timestamp() {
    // Arrange
    let tree = build_tree();
    let rule = bq_rule();

    // Act
    let report = bq_checker(&tree, &rule).with_clock(clock(1_700_000_000)).process();

    // Assert
    assert_eq!(report.promoted, vec![2, 1]);
    assert_eq!(report.evaluated, 7);
    assert!(report.errors.is_empty());
    let partner = tree.partner(2).unwrap();
    assert_eq!(partner.level(), Level::BQ);
    assert_eq!(partner.upgrade_time().to_bq, Some(1_700_000_000));
    assert_eq!(tree.partner(5).unwrap().level(), Level::None);
}

#[test]
fn given_cascading_rule_when_pass_runs_twice_then_second_pass_promotes_nothing() {
    // Arrange
    let tree = build_tree();
    let rule = cascading_rule();

    // Act
    let first = bq_checker(&tree, &rule).with_clock(clock(100)).process();
    let second = bq_checker(&tree, &rule).with_clock(clock(200)).process();

    // Assert: 2 has three recruits, 1 sees 2 promoted within the same pass
    assert_eq!(first.promoted, vec![2, 1]);
    assert!(second.promoted.is_empty());
}

#[test]
fn given_unqualified_partner_when_checkers_run_then_never_promoted() {
    // Arrange
    let mut feed = records(&[
        (1, None, Level::None),
        (2, Some(1), Level::None),
        (3, Some(1), Level::None),
        (4, Some(1), Level::None),
    ]);
    feed[0] = PartnerRecord::new(1, None).with_qualified(false);
    let tree = TreeBuilder::new().build(&feed).unwrap();
    let always = FnRule::new(RuleDependency::Independent, |_: &PartnerTree, _| Ok(true));

    // Act
    let bq = bq_checker(&tree, &always).process();
    let b1 = b1_checker(&tree, &always).process();

    // Assert
    assert!(!bq.promoted.contains(&1));
    assert!(!b1.promoted.contains(&1));
    assert_eq!(bq.exempt, 1);
    assert_eq!(b1.exempt, 1);
    assert_eq!(tree.partner(1).unwrap().level(), Level::None);
    assert_eq!(tree.partner(2).unwrap().level(), Level::B1);
}

#[test]
fn given_repeated_passes_when_promoting_then_levels_and_timestamps_are_monotonic() {
    // Arrange
    let tree = build_tree();
    let always = FnRule::new(RuleDependency::Independent, |_: &PartnerTree, _| Ok(true));
    let cascading = cascading_rule();
    let mut seen: HashMap<i64, (Level, Option<i64>, Option<i64>)> = HashMap::new();

    // Act + Assert
    for (round, at) in [(0, 10), (1, 20), (2, 30), (3, 40)] {
        if round % 2 == 0 {
            bq_checker(&tree, &cascading).with_clock(clock(at)).process();
        } else {
            b1_checker(&tree, &always).with_clock(clock(at)).process();
        }
        for partner in tree.partners() {
            let now = (
                partner.level(),
                partner.upgrade_time().to_bq,
                partner.upgrade_time().to_b1,
            );
            if let Some(before) = seen.get(&partner.user_id) {
                assert!(now.0 >= before.0, "level regressed for {}", partner.user_id);
                if before.1.is_some() {
                    assert_eq!(now.1, before.1, "bq time changed for {}", partner.user_id);
                }
                if before.2.is_some() {
                    assert_eq!(now.2, before.2, "b1 time changed for {}", partner.user_id);
                }
            }
            seen.insert(partner.user_id, now);
        }
    }
}

#[test]
fn given_none_partner_when_promoted_straight_to_b1_then_bq_slot_backfilled() {
    // Arrange
    let tree = build_tree();
    let always = FnRule::new(RuleDependency::Independent, |_: &PartnerTree, _| Ok(true));

    // Act
    b1_checker(&tree, &always).with_clock(clock(500)).process();

    // Assert
    let upgrade = tree.partner(3).unwrap().upgrade_time();
    assert_eq!(upgrade.to_bq, Some(500));
    assert_eq!(upgrade.to_b1, Some(500));
    assert_eq!(upgrade.to_b2, None);
}

#[test]
fn given_failing_evaluation_when_pass_runs_then_error_isolated_and_siblings_promoted() {
    // Arrange
    let tree = build_tree();
    let flaky = FnRule::new(RuleDependency::Independent, |_: &PartnerTree, p| {
        if p.user_id == 3 {
            Err(ApplicationError::Rule {
                user_id: 3,
                message: "ledger row malformed".to_string(),
            })
        } else {
            Ok(p.user_id != 1)
        }
    });

    // Act
    let report = bq_checker(&tree, &flaky).process();

    // Assert
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].0, 3);
    assert_eq!(report.promoted.len(), 5);
    assert_eq!(tree.partner(3).unwrap().level(), Level::None);
    assert_eq!(report.summary().errors, 1);
}

#[test]
fn given_partner_already_at_target_when_checker_runs_then_skipped() {
    // Arrange
    let tree = TreeBuilder::new()
        .build(&records(&[(1, None, Level::B1), (2, Some(1), Level::BQ)]))
        .unwrap();
    let always = FnRule::new(RuleDependency::Ancestors, |_: &PartnerTree, _| Ok(true));

    // Act
    let report = bq_checker(&tree, &always).process();

    // Assert
    assert_eq!(report.evaluated, 0);
    assert!(report.promoted.is_empty());
    assert_eq!(tree.partner(1).unwrap().upgrade_time().to_b1, Some(1_000));
}

#[test]
fn given_gmv_threshold_without_ledger_when_evaluating_then_rule_error() {
    // Arrange
    let tree = build_tree();
    let rule = ThresholdRule::new(ThresholdConfig {
        min_direct_recruits: 3,
        min_team_gmv: 1,
        ..ThresholdConfig::default()
    });

    // Act
    let report = bq_checker(&tree, &rule).process();

    // Assert: only partners meeting the recruit count reach the GMV check
    let failed: Vec<i64> = report.errors.iter().map(|(id, _)| *id).collect();
    assert_eq!(failed, vec![2, 1]);
    assert!(report.promoted.is_empty());
}

#[rstest]
#[case::below_threshold(99_999, false)]
#[case::at_threshold(100_000, true)]
fn given_team_gmv_when_b1_rule_evaluated_then_threshold_applies(
    #[case] team_sales: i64,
    #[case] promoted: bool,
) {
    // Arrange: 2 has three BQ recruits, team sales booked on one of them
    let tree = TreeBuilder::new()
        .build(&records(&[
            (2, None, Level::BQ),
            (5, Some(2), Level::BQ),
            (6, Some(2), Level::BQ),
            (7, Some(2), Level::BQ),
        ]))
        .unwrap();
    let cst = offset_hours(8).unwrap();
    let window = DayWindow::parse("2020-05-01", "2020-05-31", cst).unwrap();
    let ledger = MemoryLedger::new(
        vec![SaleEntry {
            user_id: 6,
            amount: team_sales,
            paid_at: 1_589_000_000,
        }],
        vec![],
    );
    let aggregator = Arc::new(PerformanceAggregator::new(Arc::new(ledger)));
    let rule = ThresholdRule::new(ThresholdConfig::default_for(Level::B1))
        .with_performance(aggregator, window);

    // Act
    let report = b1_checker(&tree, &rule).process();

    // Assert
    assert_eq!(report.promoted.contains(&2), promoted);
    assert!(report.errors.is_empty());
}

#[test]
fn given_rule_set_when_service_runs_all_then_partner_climbs_in_one_run() {
    // Arrange
    let snapshots = Arc::new(SnapshotService::new(build_tree()));
    let always: Arc<dyn PromotionRule> = Arc::new(FnRule::new(
        RuleDependency::Independent,
        |_: &PartnerTree, p| Ok(p.user_id == 1),
    ));
    let rules = RuleSet {
        bq: Arc::clone(&always),
        b1: Arc::clone(&always),
        b2: Arc::new(FnRule::new(RuleDependency::Independent, |_: &PartnerTree, _| Ok(false))),
    };
    let service = QualificationService::new(Arc::clone(&snapshots), rules).with_clock(clock(77));

    // Act
    let reports = service.run_all();

    // Assert
    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0].promoted, vec![1]);
    assert_eq!(reports[1].promoted, vec![1]);
    assert!(reports[2].promoted.is_empty());
    let current = snapshots.current();
    assert_eq!(current.partner(1).unwrap().level(), Level::B1);
    assert!(service.run(Level::None).is_none());
}

#[test]
fn given_concurrent_readers_when_checker_promotes_then_no_level_regression_observed() {
    // Arrange
    let rows: Vec<(i64, Option<i64>, Level)> = (1..=500)
        .map(|id| (id, if id == 1 { None } else { Some(id / 2) }, Level::None))
        .collect();
    let tree = Arc::new(TreeBuilder::new().build(&records(&rows)).unwrap());
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let tree = Arc::clone(&tree);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut last: HashMap<i64, Level> = HashMap::new();
                while !done.load(Ordering::Acquire) {
                    for partner in tree.partners() {
                        let level = partner.level();
                        if level > Level::None {
                            assert!(partner.upgrade_time().get(level).is_some());
                        }
                        let prev = last.insert(partner.user_id, level).unwrap_or(Level::None);
                        assert!(level >= prev);
                    }
                }
            })
        })
        .collect();

    // Act
    let always = FnRule::new(RuleDependency::Independent, |_: &PartnerTree, _| Ok(true));
    let bq = bq_checker(&tree, &always).with_clock(clock(1)).process();
    let b1 = b1_checker(&tree, &always).with_clock(clock(2)).process();
    done.store(true, Ordering::Release);

    // Assert
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(bq.promoted.len(), 500);
    assert_eq!(b1.promoted.len(), 500);
}
