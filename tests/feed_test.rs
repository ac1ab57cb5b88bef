//! Tests for the TOML-backed feed and ledger and the service container wiring

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use partner_tree::config::Settings;
use partner_tree::domain::{BonusType, Level};
use partner_tree::infrastructure::di::ServiceContainer;
use partner_tree::infrastructure::traits::{
    Clock, Ledger, MemoryLedger, PartnerFeed, TomlFeed,
};
use partner_tree::infrastructure::{CancelToken, InfraError};
use partner_tree::util::testing::init_test_setup;

// 2020-05-15 12:00:00 UTC
const MID_MAY: i64 = 1_589_544_000;

struct FixedClock(i64);

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.0
    }
}

const FEED: &str = r#"
[[partner]]
user_id = 1
master_site_id = 10
level = "bq"
upgrade_time = { to_bq = 1500000000 }

[[partner]]
user_id = 2
bred_by = 1

[[partner]]
user_id = 3
bred_by = 1

[[partner]]
user_id = 4
bred_by = 1
is_qualified = false
"#;

const LEDGER: &str = r#"
[[sale]]
user_id = 2
amount = 60000
paid_at = 1589000000

[[sale]]
user_id = 3
amount = 40000
paid_at = 1589000000

[[bonus]]
recipient = 1
source_user_id = 2
bonus_type = "bred"
amount = 300
paid_at = 1589000000
"#;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("write fixture");
    path
}

#[test]
fn given_toml_feed_when_loading_then_defaults_fill_missing_fields() {
    // Arrange
    init_test_setup();
    let dir = TempDir::new().unwrap();
    let feed = TomlFeed::new(write(&dir, "feed.toml", FEED));

    // Act
    let records = feed.load().unwrap();

    // Assert
    assert_eq!(records.len(), 4);
    assert_eq!(records[0].level, Level::BQ);
    assert_eq!(records[0].upgrade_time.to_bq, Some(1_500_000_000));
    assert_eq!(records[1].bred_by, Some(1));
    assert!(records[1].is_qualified);
    assert!(!records[3].is_qualified);
}

#[test]
fn given_malformed_feed_when_loading_then_invalid_data() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let feed = TomlFeed::new(write(&dir, "feed.toml", "[[partner]]\nuser_id = \"x\"\n"));

    // Act
    let err = feed.load().unwrap_err();

    // Assert
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

#[test]
fn given_ledger_file_when_querying_then_window_applied() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let ledger = MemoryLedger::from_toml_file(&write(&dir, "ledger.toml", LEDGER)).unwrap();
    let settings = Settings::default();
    let offset = settings.utc_offset().unwrap();
    let may = partner_tree::domain::DayWindow::month(2020, 5, offset).unwrap();
    let june = may.shift_months(1).unwrap();

    // Act
    let in_may = ledger.gmv_by_user(&[2, 3], &may, &CancelToken::new()).unwrap();
    let in_june = ledger.gmv_by_user(&[2, 3], &june, &CancelToken::new()).unwrap();
    let bonuses = ledger.bonus_entries(&[1], &may, &CancelToken::new()).unwrap();

    // Assert
    assert_eq!(in_may.get(&2), Some(&60_000));
    assert!(in_june.is_empty());
    assert_eq!(bonuses.len(), 1);
    assert_eq!(bonuses[0].bonus_type, BonusType::Bred);
}

fn container(dir: &TempDir) -> ServiceContainer {
    let mut settings = Settings::default();
    settings.feed_path = Some(write(dir, "feed.toml", FEED));
    settings.rules.bq.min_direct_recruits = 3;
    settings.rules.b1.min_qualified_recruits = 0;
    settings.rules.b1.min_team_gmv = 100_000;
    let ledger = MemoryLedger::from_toml_file(&write(dir, "ledger.toml", LEDGER)).unwrap();
    let feed = TomlFeed::new(settings.feed_path.clone().unwrap());
    ServiceContainer::with_deps(
        settings,
        Arc::new(feed),
        Arc::new(ledger),
        Arc::new(FixedClock(MID_MAY)),
    )
    .unwrap()
}

#[test]
fn given_wired_container_when_upgrading_then_trailing_window_gmv_counts() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let c = container(&dir);

    // Act
    let reports = c.qualification().unwrap().run_all();

    // Assert: 1 is BQ with 100_000 team GMV in the trailing 30 days
    assert_eq!(reports[0].promoted, Vec::<i64>::new());
    assert_eq!(reports[1].promoted, vec![1]);
    let tree = c.snapshots.current();
    let upgrade = tree.partner(1).unwrap().upgrade_time();
    assert_eq!(upgrade.to_bq, Some(1_500_000_000));
    assert_eq!(upgrade.to_b1, Some(MID_MAY));
    assert_eq!(reports[1].exempt, 1);
}

#[test]
fn given_changed_feed_when_reloading_then_container_serves_new_snapshot() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let c = container(&dir);
    write(
        &dir,
        "feed.toml",
        &format!("{}\n[[partner]]\nuser_id = 5\nbred_by = 4\n", FEED),
    );

    // Act
    c.reload().unwrap();

    // Assert
    assert_eq!(c.snapshots.current().len(), 5);
    assert_eq!(c.snapshots.current().bred_by_ids(5), vec![4, 1]);
}

#[test]
fn given_settings_without_feed_when_building_container_then_config_error() {
    // Act
    let result = ServiceContainer::new(Settings::default());

    // Assert
    assert!(matches!(result, Err(InfraError::Application(_))));
}

#[test]
fn given_malformed_ledger_path_when_building_container_then_parse_error() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.feed_path = Some(write(&dir, "feed.toml", FEED));
    settings.ledger_path = Some(write(&dir, "ledger.toml", "[[sale]]\nuser_id = 1\n"));

    // Act
    let result = ServiceContainer::new(settings);

    // Assert
    assert!(matches!(result, Err(InfraError::Parse { .. })));
}

#[test]
fn given_container_when_parsing_window_then_uses_configured_offset() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let c = container(&dir);

    // Act
    let window = c.window("2020-05-01", "2020-05-31").unwrap();

    // Assert
    assert_eq!(window.start_ts(), 1_588_262_400);
    assert_eq!(window.end_ts(), 1_590_940_799);
    assert!(c.window("2020-06-01", "2020-05-01").is_err());
}
