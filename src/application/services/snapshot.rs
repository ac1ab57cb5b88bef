//! Snapshot service: owns the published partner tree.
//!
//! New data is incorporated by rebuild-and-swap: a complete tree is built
//! off to the side and the published pointer is replaced only when the build
//! succeeded. Readers holding the previous `Arc` keep a consistent tree.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{info, instrument, warn};

use crate::application::{ApplicationResult, IoResultExt};
use crate::domain::{PartnerRecord, PartnerTree, TreeBuilder};
use crate::infrastructure::traits::PartnerFeed;

pub struct SnapshotService {
    current: RwLock<Arc<PartnerTree>>,
    generation: AtomicU64,
    builder: TreeBuilder,
}

impl SnapshotService {
    pub fn new(tree: PartnerTree) -> Self {
        Self::with_builder(tree, TreeBuilder::new())
    }

    pub fn with_builder(tree: PartnerTree, builder: TreeBuilder) -> Self {
        Self {
            current: RwLock::new(Arc::new(tree)),
            generation: AtomicU64::new(1),
            builder,
        }
    }

    /// Build the first snapshot from a feed.
    pub fn load(feed: &dyn PartnerFeed, builder: TreeBuilder) -> ApplicationResult<Self> {
        let records = load_records(feed)?;
        let tree = builder.build(&records)?;
        Ok(Self::with_builder(tree, builder))
    }

    /// The published snapshot.
    pub fn current(&self) -> Arc<PartnerTree> {
        let guard = self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Number of snapshots published so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Rebuild from the feed and publish; on failure the old snapshot stays.
    pub fn rebuild(&self, feed: &dyn PartnerFeed) -> ApplicationResult<Arc<PartnerTree>> {
        let records = load_records(feed)?;
        self.rebuild_from(&records)
    }

    #[instrument(level = "debug", skip(self, records), fields(records = records.len()))]
    pub fn rebuild_from(&self, records: &[PartnerRecord]) -> ApplicationResult<Arc<PartnerTree>> {
        let tree = match self.builder.build(records) {
            Ok(tree) => Arc::new(tree),
            Err(e) => {
                warn!("rebuild rejected, keeping snapshot {}: {}", self.generation(), e);
                return Err(e.into());
            }
        };
        {
            let mut guard = self
                .current
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *guard = Arc::clone(&tree);
        }
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        info!(generation, partners = tree.len(), "published partner tree snapshot");
        Ok(tree)
    }
}

fn load_records(feed: &dyn PartnerFeed) -> ApplicationResult<Vec<PartnerRecord>> {
    feed.load().with_context("load partner feed")
}
