//! Domain layer: partner entities, node store and hierarchy queries
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod builder;
pub mod entities;
pub mod error;
pub mod render;
pub mod tree;
pub mod window;

pub use arena::{PartnerArena, PartnerNode};
pub use builder::TreeBuilder;
pub use entities::*;
pub use error::{DomainError, TreeResult};
pub use render::TreeRender;
pub use tree::{Direction, PartnerTree, SiteFilter, Walk};
pub use window::{offset_hours, DayWindow};
