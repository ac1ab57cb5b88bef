//! Tests for TreeBuilder

use rstest::rstest;

use partner_tree::domain::{DomainError, Level, PartnerRecord, TreeBuilder};
use partner_tree::util::testing::{init_test_setup, records};

#[test]
fn given_flat_feed_when_building_then_links_every_partner() {
    // Arrange
    init_test_setup();
    let feed = records(&[
        (1, None, Level::B1),
        (2, Some(1), Level::BQ),
        (3, Some(1), Level::None),
        (4, Some(2), Level::None),
        (10, None, Level::None),
    ]);

    // Act
    let tree = TreeBuilder::new().build(&feed).unwrap();

    // Assert
    assert_eq!(tree.len(), 5);
    assert_eq!(tree.root_ids(), vec![1, 10]);
    assert_eq!(tree.arena().depth(), 3);
    assert_eq!(tree.bred_by_ids(4), vec![2, 1]);
}

#[test]
fn given_records_out_of_order_when_building_then_links_regardless_of_order() {
    // Arrange
    let feed = records(&[
        (4, Some(2), Level::None),
        (2, Some(1), Level::None),
        (1, None, Level::None),
    ]);

    // Act
    let tree = TreeBuilder::new().build(&feed).unwrap();

    // Assert
    assert_eq!(tree.root_ids(), vec![1]);
    assert_eq!(tree.bred_by_ids(4), vec![2, 1]);
}

#[test]
fn given_forged_cycle_when_building_then_cycle_detected() {
    // Arrange: 1 -> 2 -> 3 -> 1
    let feed = records(&[
        (1, Some(3), Level::None),
        (2, Some(1), Level::None),
        (3, Some(2), Level::None),
    ]);

    // Act
    let result = TreeBuilder::new().build(&feed);

    // Assert
    assert!(matches!(result, Err(DomainError::CycleDetected(_))));
}

#[test]
fn given_self_recruit_when_building_then_cycle_detected() {
    // Arrange
    let feed = records(&[(5, Some(5), Level::None)]);

    // Act
    let result = TreeBuilder::new().build(&feed);

    // Assert
    assert_eq!(result.unwrap_err(), DomainError::CycleDetected(5));
}

#[test]
fn given_unknown_recruiter_when_building_then_orphan_error() {
    // Arrange
    let feed = records(&[(1, None, Level::None), (2, Some(99), Level::None)]);

    // Act
    let result = TreeBuilder::new().build(&feed);

    // Assert
    assert_eq!(
        result.unwrap_err(),
        DomainError::OrphanRecruiter {
            user_id: 2,
            recruiter_id: 99
        }
    );
}

#[test]
fn given_duplicate_id_when_building_then_duplicate_error() {
    // Arrange
    let feed = records(&[(1, None, Level::None), (1, None, Level::BQ)]);

    // Act
    let result = TreeBuilder::new().build(&feed);

    // Assert
    assert_eq!(result.unwrap_err(), DomainError::DuplicateId(1));
}

#[rstest]
#[case::missing_bq_time(PartnerRecord::new(1, None).with_level(Level::B1, 100), Some(Level::BQ))]
#[case::time_above_level(PartnerRecord::new(1, None).with_level(Level::B2, 100), None)]
fn given_inconsistent_upgrade_times_when_building_then_rejected(
    #[case] mut record: PartnerRecord,
    #[case] clear: Option<Level>,
) {
    // Arrange
    match clear {
        Some(Level::BQ) => record.upgrade_time.to_bq = None,
        _ => record.level = Level::BQ,
    }

    // Act
    let strict = TreeBuilder::new().build(&[record.clone()]);
    let lenient = TreeBuilder::new().lenient_upgrade_times().build(&[record]);

    // Assert
    assert!(matches!(
        strict,
        Err(DomainError::InvalidUpgradeTime { user_id: 1, .. })
    ));
    assert!(lenient.is_ok());
}

#[test]
fn given_zero_upgrade_time_when_building_then_treated_as_missing() {
    // Arrange
    let mut record = PartnerRecord::new(1, None).with_level(Level::BQ, 100);
    record.upgrade_time.to_bq = Some(0);

    // Act
    let result = TreeBuilder::new().build(&[record]);

    // Assert
    assert!(matches!(
        result,
        Err(DomainError::InvalidUpgradeTime { user_id: 1, .. })
    ));
}

#[test]
fn given_zero_time_on_unreached_level_when_building_then_accepted() {
    // Arrange
    let mut record = PartnerRecord::new(1, None).with_level(Level::BQ, 100);
    record.upgrade_time.to_b1 = Some(0);

    // Act
    let tree = TreeBuilder::new().build(&[record]).unwrap();

    // Assert
    let upgrade = tree.partner(1).unwrap().upgrade_time();
    assert_eq!(upgrade.to_bq, Some(100));
    assert_eq!(upgrade.to_b1, None);
}

#[test]
fn given_empty_feed_when_building_then_empty_tree() {
    // Act
    let tree = TreeBuilder::new().build(&[]).unwrap();

    // Assert
    assert!(tree.is_empty());
    assert!(tree.root_ids().is_empty());
}
