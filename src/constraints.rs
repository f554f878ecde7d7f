//! Stacking-rule evaluation.
//!
//! After every successful geometric trial placement the driver runs two
//! dual checks: the candidate's own rules against the container's current
//! population, and every already-placed item's rules against the candidate.
//! Either check failing rolls the trial back.
//!
//! Two different overlap thresholds are in play. The counting rules
//! (layers, weight, stacking height) only consider items covering at least
//! half of the lower item's footprint; the hard no-stacking rules trigger
//! at a tenth of the footprint when an item examines its own stack, and on
//! any positive overlap when it guards against newcomers. Both thresholds
//! are tunable through [`StackingPolicy`].
//!
//! "Exactly" constraints (see [`HeightKind::Exact`]) demand that a stack be
//! present, which can never hold while the stack is still being built. By
//! default they are therefore evaluated as plain maxima during placement
//! and verified once packing has finished; `exact_at_placement` opts into
//! enforcing them on every trial instead.

use std::collections::BTreeSet;

use crate::geometry;
use crate::model::{Container, HeightKind, Item};
use crate::types::{BLOCKING_OVERLAP_RATIO, COUNTING_OVERLAP_RATIO};

/// Thresholds and evaluation mode for the stacking rules.
#[derive(Clone, Copy, Debug)]
pub struct StackingPolicy {
    /// Footprint share required before an item counts toward the layer,
    /// weight and stacking-height rules.
    pub counting_overlap_ratio: f64,
    /// Footprint share at which a no-stacking rule blocks an item examining
    /// its own stack.
    pub blocking_overlap_ratio: f64,
    /// Enforce "exactly" constraints during trial placement instead of at
    /// final acceptance.
    pub exact_at_placement: bool,
}

impl Default for StackingPolicy {
    fn default() -> Self {
        Self {
            counting_overlap_ratio: COUNTING_OVERLAP_RATIO,
            blocking_overlap_ratio: BLOCKING_OVERLAP_RATIO,
            exact_at_placement: false,
        }
    }
}

impl StackingPolicy {
    /// Runs both checks for a candidate that was just placed into the
    /// container.
    ///
    /// # Parameters
    /// * `container` - Container already holding the candidate's entry
    /// * `store` - The driver's item store
    /// * `idx` - Store index of the candidate
    pub fn allows_placement(&self, container: &Container, store: &[Item], idx: usize) -> bool {
        self.satisfies_own_rules(container, store, idx)
            && self.preserves_existing_rules(container, store, idx)
    }

    /// Checks the candidate's own stacking rules against the container's
    /// current population.
    pub fn satisfies_own_rules(&self, container: &Container, store: &[Item], idx: usize) -> bool {
        let item = &store[idx];

        if item.rules.bottom_load_only && item.position.y > 0 {
            return false;
        }
        if item.rules.is_empty() {
            return true;
        }

        let others = || {
            container
                .items
                .iter()
                .copied()
                .filter(move |&other| other != idx)
        };

        if item.rules.forbids_stacking_above() {
            let blocked = others().any(|other| {
                geometry::is_above_with_overlap(&store[other], item, self.blocking_overlap_ratio)
            });
            if blocked {
                return false;
            }
        }

        if item.rules.stacking_height > 0 {
            let limit = item.top() + item.rules.stacking_height;
            let mut has_items_above = false;
            for other in others() {
                if !geometry::is_above_with_overlap(&store[other], item, self.counting_overlap_ratio)
                {
                    continue;
                }
                has_items_above = true;
                if store[other].top() > limit {
                    return false;
                }
            }
            // An exact stack must already be occupied.
            if self.exact_at_placement && item.rules.height_kind == HeightKind::Exact && !has_items_above
            {
                return false;
            }
        }

        if item.rules.max_layers_above > 0 {
            let layers: BTreeSet<i64> = others()
                .filter(|&other| {
                    geometry::is_above_with_overlap(
                        &store[other],
                        item,
                        self.counting_overlap_ratio,
                    )
                })
                .map(|other| store[other].position.y)
                .collect();
            let count = layers.len() as u32;
            let exact = self.exact_at_placement && item.rules.height_kind == HeightKind::Exact;
            if exact && count != item.rules.max_layers_above {
                return false;
            }
            if !exact && count > item.rules.max_layers_above {
                return false;
            }
        }

        if item.rules.max_weight_above > 0.0 {
            let total: f64 = others()
                .filter(|&other| {
                    geometry::is_above_with_overlap(
                        &store[other],
                        item,
                        self.counting_overlap_ratio,
                    )
                })
                .map(|other| store[other].weight)
                .sum();
            if total > item.rules.max_weight_above {
                return false;
            }
        }

        true
    }

    /// Checks whether the candidate would break the stacking rules of any
    /// already-placed item, counting the candidate into each such item's
    /// stack.
    pub fn preserves_existing_rules(
        &self,
        container: &Container,
        store: &[Item],
        new_idx: usize,
    ) -> bool {
        let new_item = &store[new_idx];

        for &eidx in &container.items {
            if eidx == new_idx {
                continue;
            }
            let existing = &store[eidx];

            // Hard rules first: a no-stacking item rejects newcomers on any
            // positive footprint overlap.
            if existing.rules.forbids_stacking_above()
                && geometry::is_above_touching(new_item, existing)
            {
                return false;
            }

            if !existing.rules.has_counting_rule() {
                continue;
            }
            if !geometry::is_above_with_overlap(new_item, existing, self.counting_overlap_ratio) {
                continue;
            }

            if existing.rules.stacking_height > 0
                && new_item.top() > existing.top() + existing.rules.stacking_height
            {
                return false;
            }

            if existing.rules.max_layers_above > 0 {
                let mut layers: BTreeSet<i64> = container
                    .items
                    .iter()
                    .copied()
                    .filter(|&other| other != eidx && other != new_idx)
                    .filter(|&other| {
                        geometry::is_above_with_overlap(
                            &store[other],
                            existing,
                            self.counting_overlap_ratio,
                        )
                    })
                    .map(|other| store[other].position.y)
                    .collect();
                layers.insert(new_item.position.y);
                let count = layers.len() as u32;
                let exact = self.exact_at_placement && existing.rules.height_kind == HeightKind::Exact;
                if exact && count != existing.rules.max_layers_above {
                    return false;
                }
                if !exact && count > existing.rules.max_layers_above {
                    return false;
                }
            }

            if existing.rules.max_weight_above > 0.0 {
                let mut total: f64 = container
                    .items
                    .iter()
                    .copied()
                    .filter(|&other| other != eidx && other != new_idx)
                    .filter(|&other| {
                        geometry::is_above_with_overlap(
                            &store[other],
                            existing,
                            self.counting_overlap_ratio,
                        )
                    })
                    .map(|other| store[other].weight)
                    .sum();
                total += new_item.weight;
                if total > existing.rules.max_weight_above {
                    return false;
                }
            }
        }

        true
    }

    /// Verifies the "exactly" constraints of one placed item.
    ///
    /// Called at final acceptance (after the driver has finished placing)
    /// unless `exact_at_placement` already enforced exactness on every
    /// trial. An item without an exact constraint is always satisfied.
    pub fn exact_rules_satisfied(&self, container: &Container, store: &[Item], idx: usize) -> bool {
        let item = &store[idx];
        if item.rules.height_kind != HeightKind::Exact {
            return true;
        }

        let above: Vec<usize> = container
            .items
            .iter()
            .copied()
            .filter(|&other| other != idx)
            .filter(|&other| {
                geometry::is_above_with_overlap(&store[other], item, self.counting_overlap_ratio)
            })
            .collect();

        if item.rules.stacking_height > 0 && above.is_empty() {
            return false;
        }

        if item.rules.max_layers_above > 0 {
            let layers: BTreeSet<i64> =
                above.iter().map(|&other| store[other].position.y).collect();
            if layers.len() as u32 != item.rules.max_layers_above {
                return false;
            }
        }

        true
    }
}
