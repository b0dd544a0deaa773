//! Keeps a set of tagged remote items per target in line with content
//! computed on every pass.
//!
//! Each managed item starts with a header, `[BaseTag] [subTag] `. The base
//! tag marks items owned by one reconciler; the sub tag names the logical
//! thing an item shows (a player, a transaction) so passes edit in place
//! instead of deleting and re-creating.

pub mod module;
pub mod reconciler;
pub mod strategy;
pub mod tag;

pub use {
    module::DisplayModule,
    reconciler::{DisplayReconciler, PassReport, ReconciliationState},
    strategy::{ContentStrategy, DesiredContentBlock},
};
