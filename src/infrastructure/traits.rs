//! I/O boundary traits for testability
//!
//! These traits abstract the external data sources of the core (relationship
//! feed, transactional ledger, wall clock), allowing services to be tested
//! with in-memory implementations.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{BonusType, DayWindow, PartnerRecord, UserId};
use crate::infrastructure::cancel::CancelToken;
use crate::infrastructure::error::LedgerError;

/// Source of the flat relationship + attribute feed.
pub trait PartnerFeed: Send + Sync {
    /// Load every partner record.
    fn load(&self) -> io::Result<Vec<PartnerRecord>>;
}

/// Transactional ledger of sales and bonus payouts.
///
/// Implementations should honour `cancel` for long-running queries.
pub trait Ledger: Send + Sync {
    /// Gross merchandise value per user for sales inside the window.
    /// Users without sales may be absent from the result.
    fn gmv_by_user(
        &self,
        user_ids: &[UserId],
        window: &DayWindow,
        cancel: &CancelToken,
    ) -> Result<HashMap<UserId, i64>, LedgerError>;

    /// Bonus payouts received by `recipients` inside the window.
    fn bonus_entries(
        &self,
        recipients: &[UserId],
        window: &DayWindow,
        cancel: &CancelToken,
    ) -> Result<Vec<BonusEntry>, LedgerError>;
}

/// Wall clock abstraction (unix seconds).
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// One sale booked against a partner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleEntry {
    pub user_id: UserId,
    pub amount: i64,
    pub paid_at: i64,
}

/// One bonus payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusEntry {
    pub recipient: UserId,
    /// Partner whose activity generated the bonus, if recorded
    #[serde(default)]
    pub source_user_id: Option<UserId>,
    pub bonus_type: BonusType,
    pub amount: i64,
    pub paid_at: i64,
}

// ============================================================
// REAL IMPLEMENTATIONS
// ============================================================

/// System clock backed by chrono.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

#[derive(Debug, Default, Deserialize)]
struct FeedFile {
    #[serde(default)]
    partner: Vec<PartnerRecord>,
}

/// Feed read from a TOML file of `[[partner]]` tables.
#[derive(Debug, Clone)]
pub struct TomlFeed {
    path: PathBuf,
}

impl TomlFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PartnerFeed for TomlFeed {
    fn load(&self) -> io::Result<Vec<PartnerRecord>> {
        let content = std::fs::read_to_string(&self.path)?;
        let file: FeedFile = toml::from_str(&content)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        debug!("loaded {} partner records from {}", file.partner.len(), self.path.display());
        Ok(file.partner)
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct LedgerFile {
    #[serde(default)]
    sale: Vec<SaleEntry>,
    #[serde(default)]
    bonus: Vec<BonusEntry>,
}

/// Ledger held in memory, optionally loaded from a TOML file of `[[sale]]`
/// and `[[bonus]]` tables.
#[derive(Debug, Default, Clone)]
pub struct MemoryLedger {
    sales: Vec<SaleEntry>,
    bonuses: Vec<BonusEntry>,
}

impl MemoryLedger {
    pub fn new(sales: Vec<SaleEntry>, bonuses: Vec<BonusEntry>) -> Self {
        Self { sales, bonuses }
    }

    pub fn from_toml_file(path: &Path) -> io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: LedgerFile = toml::from_str(&content)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        Ok(Self::new(file.sale, file.bonus))
    }
}

impl Ledger for MemoryLedger {
    fn gmv_by_user(
        &self,
        user_ids: &[UserId],
        window: &DayWindow,
        cancel: &CancelToken,
    ) -> Result<HashMap<UserId, i64>, LedgerError> {
        cancel.check()?;
        let wanted: HashSet<UserId> = user_ids.iter().copied().collect();
        let mut gmv = HashMap::new();
        for sale in self
            .sales
            .iter()
            .filter(|s| wanted.contains(&s.user_id) && window.contains(s.paid_at))
        {
            *gmv.entry(sale.user_id).or_insert(0) += sale.amount;
        }
        Ok(gmv)
    }

    fn bonus_entries(
        &self,
        recipients: &[UserId],
        window: &DayWindow,
        cancel: &CancelToken,
    ) -> Result<Vec<BonusEntry>, LedgerError> {
        cancel.check()?;
        let wanted: HashSet<UserId> = recipients.iter().copied().collect();
        Ok(self
            .bonuses
            .iter()
            .filter(|b| wanted.contains(&b.recipient) && window.contains(b.paid_at))
            .cloned()
            .collect())
    }
}
