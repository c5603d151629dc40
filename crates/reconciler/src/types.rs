//! Core types for the reconciler.

use std::collections::BTreeMap;

use targetsync_core::{Target, TargetKey};

/// Difference between a source snapshot and the destination's target set.
///
/// Targets are matched by [`Target::key`] only. A target present on both
/// sides with a different port is not a difference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetDiff {
    /// Targets in the source but not the destination.
    pub to_add: Vec<Target>,
    /// Targets in the destination but not the source.
    pub to_remove: Vec<Target>,
    /// Keys of every target in the source.
    pub present: Vec<TargetKey>,
}

impl TargetDiff {
    /// Compute the diff of two full snapshots.
    ///
    /// When a snapshot carries the same key twice, the last entry wins.
    #[must_use]
    pub fn compute(source: &[Target], destination: &[Target]) -> Self {
        let src_map = by_key(source);
        let dst_map = by_key(destination);

        let to_add = src_map
            .iter()
            .filter(|(key, _)| !dst_map.contains_key(*key))
            .map(|(_, target)| (*target).clone())
            .collect();

        let to_remove = dst_map
            .iter()
            .filter(|(key, _)| !src_map.contains_key(*key))
            .map(|(_, target)| (*target).clone())
            .collect();

        Self {
            to_add,
            to_remove,
            present: src_map.into_keys().collect(),
        }
    }

    /// Whether the destination already mirrors the source.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

fn by_key(targets: &[Target]) -> BTreeMap<TargetKey, &Target> {
    targets.iter().map(|t| (t.key(), t)).collect()
}

/// What one pass over a snapshot did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Targets added to the destination.
    pub added: usize,
    /// Targets handed to the removal queue.
    pub scheduled_for_removal: usize,
}
