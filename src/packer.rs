//! Packing driver.
//!
//! The driver owns every registered item in a single store and every
//! container, orders both, and drives the placement loop:
//!
//! 1. Probe the containers (smallest first) for one that accepts the
//!    queue's head item at the origin.
//! 2. Pack as much of the queue as possible into that container, extending
//!    candidate positions from the faces of already-placed items and
//!    escalating to strictly larger containers when an item does not fit.
//! 3. Whatever remains becomes the new queue; items no container accepts
//!    are moved to the unfit list.
//!
//! The loop is synchronous, single-threaded and deterministic for a given
//! input order. A wall-clock budget bounds the total work; on expiry the
//! remaining items are reported unfit rather than looping further.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::constraints::StackingPolicy;
use crate::model::{Container, Item};
use crate::types::{Rotation, Vec3};

const START_POSITION: Vec3 = Vec3::zero();

/// Why an item ended up on the unfit list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnfitReason {
    /// No container accepted the item at any candidate position.
    NoFittingContainer,
    /// The packing time budget ran out before the item was tried.
    TimeBudgetExhausted,
    /// The item demands an exact stack above itself that packing did not
    /// produce.
    ExactStackUnsatisfied,
}

impl UnfitReason {
    pub fn code(&self) -> &'static str {
        match self {
            UnfitReason::NoFittingContainer => "no_fitting_container",
            UnfitReason::TimeBudgetExhausted => "time_budget_exhausted",
            UnfitReason::ExactStackUnsatisfied => "exact_stack_unsatisfied",
        }
    }
}

impl std::fmt::Display for UnfitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnfitReason::NoFittingContainer => {
                write!(f, "No container can hold the item at any position")
            }
            UnfitReason::TimeBudgetExhausted => {
                write!(f, "The packing time budget was exhausted")
            }
            UnfitReason::ExactStackUnsatisfied => {
                write!(f, "The required exact stack above the item was not produced")
            }
        }
    }
}

/// Events emitted while packing, suitable for live visualization.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum PackEvent {
    /// An item was placed (positions and extents in integer engine units).
    ItemPlaced {
        container_id: usize,
        item_id: usize,
        position: (i64, i64, i64),
        rotation: Rotation,
        dims: (i64, i64, i64),
    },
    /// Packing moved on to a strictly larger container.
    ContainerEscalated {
        from_container_id: usize,
        to_container_id: usize,
    },
    /// An item could not be placed.
    ItemUnfit {
        item_id: usize,
        reason_code: String,
        reason_text: String,
    },
    /// Packing finished.
    Finished { placed: usize, unfit: usize },
}

impl PackEvent {
    fn placed(container: &Container, item: &Item) -> Self {
        PackEvent::ItemPlaced {
            container_id: container.id,
            item_id: item.id,
            position: item.position.as_tuple(),
            rotation: item.rotation,
            dims: item.projected_dims().as_tuple(),
        }
    }

    fn unfit(item: &Item, reason: UnfitReason) -> Self {
        PackEvent::ItemUnfit {
            item_id: item.id,
            reason_code: reason.code().to_string(),
            reason_text: reason.to_string(),
        }
    }
}

/// Configuration for the packing driver.
#[derive(Clone, Copy, Debug)]
pub struct PackerConfig {
    /// Total wall-clock budget for one `pack()` run.
    pub time_budget: Duration,
    /// Thresholds and evaluation mode for the stacking rules.
    pub stacking: StackingPolicy,
}

impl PackerConfig {
    pub const DEFAULT_TIME_BUDGET_MS: u64 = 30_000;

    /// Creates a builder for customized configuration.
    pub fn builder() -> PackerConfigBuilder {
        PackerConfigBuilder::default()
    }

    /// Budget for a single container-packing pass: half the total.
    pub fn single_pass_budget(&self) -> Duration {
        self.time_budget / 2
    }
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            time_budget: Duration::from_millis(Self::DEFAULT_TIME_BUDGET_MS),
            stacking: StackingPolicy::default(),
        }
    }
}

/// Builder for [`PackerConfig`].
#[derive(Clone, Debug, Default)]
pub struct PackerConfigBuilder {
    config: PackerConfig,
}

impl PackerConfigBuilder {
    /// Sets the total time budget in milliseconds.
    pub fn time_budget_ms(mut self, millis: u64) -> Self {
        self.config.time_budget = Duration::from_millis(millis);
        self
    }

    /// Sets the footprint share required for the counting rules.
    pub fn counting_overlap_ratio(mut self, ratio: f64) -> Self {
        self.config.stacking.counting_overlap_ratio = ratio;
        self
    }

    /// Sets the footprint share at which no-stacking rules block.
    pub fn blocking_overlap_ratio(mut self, ratio: f64) -> Self {
        self.config.stacking.blocking_overlap_ratio = ratio;
        self
    }

    /// Enforces "exactly" constraints during trial placement instead of at
    /// final acceptance.
    pub fn exact_at_placement(mut self, value: bool) -> Self {
        self.config.stacking.exact_at_placement = value;
        self
    }

    /// Creates the final configuration.
    pub fn build(self) -> PackerConfig {
        self.config
    }
}

/// One entry of the unfit list: a store index plus the reason.
#[derive(Clone, Copy, Debug)]
pub struct UnfitEntry {
    /// Index into the driver's item store.
    pub item: usize,
    pub reason: UnfitReason,
}

/// The packing driver.
///
/// Containers and items are registered up front; `pack()` consumes the
/// item list and leaves every item either placed in exactly one container
/// (with final position and rotation) or on the unfit list.
#[derive(Clone, Debug, Default)]
pub struct Packer {
    config: PackerConfig,
    items: Vec<Item>,
    containers: Vec<Container>,
    unfit: Vec<UnfitEntry>,
}

impl Packer {
    /// Creates a driver with the default configuration.
    pub fn new() -> Self {
        Self::with_config(PackerConfig::default())
    }

    /// Creates a driver with a custom configuration.
    pub fn with_config(config: PackerConfig) -> Self {
        Self {
            config,
            items: Vec::new(),
            containers: Vec::new(),
            unfit: Vec::new(),
        }
    }

    /// Registers a container.
    pub fn add_container(&mut self, container: Container) {
        self.containers.push(container);
    }

    /// Registers an item.
    pub fn add_item(&mut self, item: Item) {
        self.items.push(item);
    }

    /// All registered items. After `pack()`, placed items carry their final
    /// position and rotation; positions of unfit items are meaningless.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// All registered containers, each listing its placed items in
    /// insertion order. Sorted by ascending volume once `pack()` has run.
    pub fn containers(&self) -> &[Container] {
        &self.containers
    }

    /// The items that could not be placed.
    pub fn unfit_items(&self) -> impl Iterator<Item = &Item> + '_ {
        self.unfit.iter().map(|entry| &self.items[entry.item])
    }

    /// The unfit list with reasons, in the order items were given up on.
    pub fn unfit_entries(&self) -> &[UnfitEntry] {
        &self.unfit
    }

    /// The placed items of one container, in insertion order.
    pub fn placed_items<'a>(
        &'a self,
        container: &'a Container,
    ) -> impl Iterator<Item = &'a Item> + 'a {
        container.items.iter().map(|&idx| &self.items[idx])
    }

    /// Runs the driver to completion (or budget expiry).
    pub fn pack(&mut self) {
        self.pack_with_progress(|_| {});
    }

    /// Runs the driver, reporting each step through the callback.
    ///
    /// The callback is invoked in placement order; events carry caller item
    /// and container ids, never store indices.
    pub fn pack_with_progress(&mut self, mut on_event: impl FnMut(&PackEvent)) {
        for container in &mut self.containers {
            container.items.clear();
        }
        self.unfit.clear();

        // Smallest container first, so items land in the tightest box that
        // still accepts them.
        self.containers.sort_by_key(Container::volume);
        // Constrained items first (layer-capped ones ahead of the rest),
        // then large before small. The sort is stable, so ties keep input
        // order and the run stays deterministic.
        self.items.sort_by(|a, b| {
            constraint_tier(a)
                .cmp(&constraint_tier(b))
                .then_with(|| b.volume().cmp(&a.volume()))
        });

        let started = Instant::now();
        let mut events: Vec<PackEvent> = Vec::new();
        let mut queue: Vec<usize> = (0..self.items.len()).collect();

        while !queue.is_empty() {
            if started.elapsed() >= self.config.time_budget {
                for &idx in &queue {
                    self.unfit.push(UnfitEntry {
                        item: idx,
                        reason: UnfitReason::TimeBudgetExhausted,
                    });
                    events.push(PackEvent::unfit(
                        &self.items[idx],
                        UnfitReason::TimeBudgetExhausted,
                    ));
                }
                queue.clear();
            } else {
                match self.find_container_for(queue[0]) {
                    None => {
                        let idx = queue.remove(0);
                        self.unfit.push(UnfitEntry {
                            item: idx,
                            reason: UnfitReason::NoFittingContainer,
                        });
                        events.push(PackEvent::unfit(
                            &self.items[idx],
                            UnfitReason::NoFittingContainer,
                        ));
                    }
                    Some(target) => {
                        let queue_snapshot = std::mem::take(&mut queue);
                        queue = self.pack_into(target, &queue_snapshot, &mut events);
                    }
                }
            }
            for event in events.drain(..) {
                on_event(&event);
            }
        }

        if !self.config.stacking.exact_at_placement {
            self.evict_unsatisfied_exact_stacks(&mut events);
            for event in events.drain(..) {
                on_event(&event);
            }
        }

        let placed: usize = self.containers.iter().map(|c| c.items.len()).sum();
        on_event(&PackEvent::Finished {
            placed,
            unfit: self.unfit.len(),
        });
    }

    /// Probes the containers in order for one that accepts the item at the
    /// origin, constraints included.
    ///
    /// The probe placement is always rolled back; the authoritative
    /// placement happens in [`pack_into`](Self::pack_into).
    fn find_container_for(&mut self, idx: usize) -> Option<usize> {
        for ci in 0..self.containers.len() {
            if !self.containers[ci].try_place(&mut self.items, idx, START_POSITION) {
                continue;
            }
            let allowed =
                self.config
                    .stacking
                    .allows_placement(&self.containers[ci], &self.items, idx);
            self.containers[ci].remove_item(idx);
            if allowed {
                return Some(ci);
            }
        }
        None
    }

    /// The first container in the volume-sorted list strictly larger than
    /// the given one.
    fn bigger_container_than(&self, ci: usize) -> Option<usize> {
        let volume = self.containers[ci].volume();
        self.containers.iter().position(|c| c.volume() > volume)
    }

    /// Packs as much of the queue as possible into one container.
    ///
    /// The head item goes to the origin; every further item is tried at
    /// candidate positions extending the already-placed items along height,
    /// depth and width, nearest the origin first. Items that fit nowhere
    /// escalate the remaining queue to a strictly larger container; a
    /// partial escalation is rolled back wholesale so that no item ends up
    /// placed twice.
    ///
    /// # Returns
    /// The items (store indices) this pass could not place
    fn pack_into(&mut self, ci: usize, queue: &[usize], events: &mut Vec<PackEvent>) -> Vec<usize> {
        let started = Instant::now();
        let head = queue[0];

        let mut placed = self
            .containers[ci]
            .try_place(&mut self.items, head, START_POSITION);
        if placed
            && !self
                .config
                .stacking
                .allows_placement(&self.containers[ci], &self.items, head)
        {
            self.containers[ci].remove_item(head);
            placed = false;
        }
        if !placed {
            if let Some(bigger) = self.bigger_container_than(ci) {
                events.push(PackEvent::ContainerEscalated {
                    from_container_id: self.containers[ci].id,
                    to_container_id: self.containers[bigger].id,
                });
                return self.pack_into(bigger, queue, events);
            }
            return queue.to_vec();
        }
        events.push(PackEvent::placed(&self.containers[ci], &self.items[head]));

        let mut unpacked = Vec::new();
        for (offset, &idx) in queue.iter().enumerate().skip(1) {
            if started.elapsed() >= self.config.single_pass_budget() {
                unpacked.extend_from_slice(&queue[offset..]);
                break;
            }

            // Extend each placed item along its top, far-depth and right
            // face, and try the positions nearest the origin first.
            let mut candidates: Vec<Vec3> = Vec::new();
            for &anchor in &self.containers[ci].items {
                let base = self.items[anchor].position;
                let ext = self.items[anchor].projected_dims();
                candidates.push(Vec3::new(base.x, base.y + ext.y, base.z));
                candidates.push(Vec3::new(base.x, base.y, base.z + ext.z));
                candidates.push(Vec3::new(base.x + ext.x, base.y, base.z));
            }
            candidates.sort_by_key(|position| position.manhattan());

            let mut fitted = false;
            for position in candidates {
                if !self.containers[ci].try_place(&mut self.items, idx, position) {
                    continue;
                }
                if self
                    .config
                    .stacking
                    .allows_placement(&self.containers[ci], &self.items, idx)
                {
                    events.push(PackEvent::placed(&self.containers[ci], &self.items[idx]));
                    fitted = true;
                    break;
                }
                self.containers[ci].remove_item(idx);
            }

            if !fitted {
                if let Some(bigger) = self.bigger_container_than(ci) {
                    let snapshot: Vec<Vec<usize>> = self
                        .containers
                        .iter()
                        .map(|container| container.items.clone())
                        .collect();
                    let mark = events.len();
                    events.push(PackEvent::ContainerEscalated {
                        from_container_id: self.containers[ci].id,
                        to_container_id: self.containers[bigger].id,
                    });
                    let left = self.pack_into(bigger, &queue[offset..], events);
                    if left.is_empty() {
                        // The entire tail lives in larger containers now.
                        return unpacked;
                    }
                    events.truncate(mark);
                    for (container, items) in self.containers.iter_mut().zip(snapshot) {
                        container.items = items;
                    }
                }
                unpacked.push(idx);
            }
        }

        unpacked
    }

    /// Moves placed items whose "exactly" constraints remained unsatisfied
    /// to the unfit list.
    ///
    /// Runs at final acceptance. Evicting one item can change another's
    /// stack, so each container is re-checked until it is clean.
    fn evict_unsatisfied_exact_stacks(&mut self, events: &mut Vec<PackEvent>) {
        for ci in 0..self.containers.len() {
            loop {
                let violator = self.containers[ci].items.iter().copied().find(|&idx| {
                    !self.config.stacking.exact_rules_satisfied(
                        &self.containers[ci],
                        &self.items,
                        idx,
                    )
                });
                let Some(idx) = violator else { break };
                self.containers[ci].remove_item(idx);
                self.unfit.push(UnfitEntry {
                    item: idx,
                    reason: UnfitReason::ExactStackUnsatisfied,
                });
                events.push(PackEvent::unfit(
                    &self.items[idx],
                    UnfitReason::ExactStackUnsatisfied,
                ));
            }
        }
    }
}

/// Sort tier of an item: layer-capped items first, then items with any
/// other stacking rule, then unconstrained ones.
fn constraint_tier(item: &Item) -> u8 {
    if item.rules.max_layers_above > 0 {
        0
    } else if !item.rules.is_empty() {
        1
    } else {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry;
    use crate::model::{HeightKind, StackingRules};
    use crate::types::Rotation;
    use std::collections::BTreeSet;

    fn item(id: usize, dims: (i64, i64, i64), weight: f64) -> Item {
        Item::new(id, dims, weight).unwrap()
    }

    fn container(id: usize, dims: (i64, i64, i64)) -> Container {
        Container::new(id, dims, 0.0).unwrap()
    }

    /// Locates a placed item by its caller id.
    fn placement<'a>(packer: &'a Packer, item_id: usize) -> Option<(&'a Container, &'a Item)> {
        for container in packer.containers() {
            for placed in packer.placed_items(container) {
                if placed.id == item_id {
                    return Some((container, placed));
                }
            }
        }
        None
    }

    fn unfit_ids(packer: &Packer) -> Vec<usize> {
        packer.unfit_items().map(|i| i.id).collect()
    }

    /// Checks every universal invariant of a finished run.
    fn assert_invariants(packer: &Packer) {
        let mut seen: BTreeSet<usize> = BTreeSet::new();
        let mut placed_count = 0usize;

        for container in packer.containers() {
            let placed: Vec<&Item> = packer.placed_items(container).collect();
            placed_count += placed.len();

            for &idx in &container.items {
                assert!(seen.insert(idx), "item placed twice (store index {})", idx);
            }

            for item in &placed {
                let p = item.position;
                let d = item.projected_dims();
                assert!(
                    p.x >= 0 && p.y >= 0 && p.z >= 0,
                    "item {} at negative position",
                    item.id
                );
                assert!(
                    p.x + d.x <= container.dims.width
                        && p.y + d.y <= container.dims.height
                        && p.z + d.z <= container.dims.depth,
                    "item {} sticks out of container {}",
                    item.id,
                    container.id
                );
                if item.rules.bottom_load_only {
                    assert_eq!(p.y, 0, "bottom-load item {} floats at y={}", item.id, p.y);
                }
            }

            for (i, a) in placed.iter().enumerate() {
                for b in placed.iter().skip(i + 1) {
                    assert!(
                        !geometry::intersects(a, b),
                        "items {} and {} intersect in container {}",
                        a.id,
                        b.id,
                        container.id
                    );
                }
            }

            if container.max_weight > 0.0 {
                let total: f64 = placed.iter().map(|i| i.weight).sum();
                assert!(
                    total <= container.max_weight + 1e-9,
                    "container {} overloaded: {} > {}",
                    container.id,
                    total,
                    container.max_weight
                );
            }

            for (li, lower) in placed.iter().enumerate() {
                if lower.rules.disable_stacking {
                    for (ui, upper) in placed.iter().enumerate() {
                        if ui == li {
                            continue;
                        }
                        assert!(
                            !geometry::is_above_touching(upper, lower),
                            "item {} stacked onto no-stacking item {}",
                            upper.id,
                            lower.id
                        );
                    }
                }
                if lower.rules.max_layers_above > 0 && lower.rules.height_kind == HeightKind::Maximum
                {
                    let layers: BTreeSet<i64> = placed
                        .iter()
                        .enumerate()
                        .filter(|&(ui, _)| ui != li)
                        .filter(|(_, upper)| {
                            geometry::is_above_with_overlap(
                                upper,
                                lower,
                                crate::types::COUNTING_OVERLAP_RATIO,
                            )
                        })
                        .map(|(_, upper)| upper.position.y)
                        .collect();
                    assert!(
                        layers.len() as u32 <= lower.rules.max_layers_above,
                        "item {} carries {} layers, allowed {}",
                        lower.id,
                        layers.len(),
                        lower.rules.max_layers_above
                    );
                }
            }
        }

        for entry in packer.unfit_entries() {
            assert!(
                seen.insert(entry.item),
                "unfit item also placed (store index {})",
                entry.item
            );
        }
        assert_eq!(
            placed_count + packer.unfit_entries().len(),
            packer.items().len(),
            "items were lost or duplicated"
        );
    }

    #[test]
    fn saturates_a_single_container() {
        let mut packer = Packer::new();
        packer.add_container(container(1, (10, 10, 10)));
        packer.add_item(item(1, (5, 10, 10), 1.0));
        packer.add_item(item(2, (5, 10, 10), 1.0));
        packer.add_item(item(3, (5, 10, 10), 1.0));
        packer.pack();

        let (_, a) = placement(&packer, 1).expect("first item placed");
        let (_, b) = placement(&packer, 2).expect("second item placed");
        assert_eq!(a.position, Vec3::zero());
        assert_eq!(b.position, Vec3::new(5, 0, 0));
        assert_eq!(unfit_ids(&packer), vec![3]);
        assert_eq!(
            packer.unfit_entries()[0].reason,
            UnfitReason::NoFittingContainer
        );
        assert_invariants(&packer);
    }

    #[test]
    fn prefers_the_rotation_that_fills_the_container() {
        let mut packer = Packer::new();
        packer.add_container(container(1, (10, 2, 2)));
        packer.add_item(item(1, (2, 10, 2), 1.0));
        packer.pack();

        let (_, placed) = placement(&packer, 1).expect("item placed");
        assert_eq!(placed.rotation, Rotation::Hwd);
        assert_eq!(placed.position, Vec3::zero());
        assert_eq!(placed.projected_dims(), Vec3::new(10, 2, 2));
        assert_invariants(&packer);
    }

    #[test]
    fn escalates_to_a_larger_container() {
        let mut packer = Packer::new();
        packer.add_container(container(1, (4, 4, 4)));
        packer.add_container(container(2, (10, 10, 10)));
        // Equal volumes keep the input order; the second item fits no
        // orientation of the small container.
        packer.add_item(item(1, (4, 4, 4), 1.0));
        packer.add_item(item(2, (8, 8, 1), 1.0));
        packer.pack();

        let (small, x) = placement(&packer, 1).expect("cube placed");
        let (large, y) = placement(&packer, 2).expect("slab placed");
        assert_eq!(small.id, 1);
        assert_eq!(large.id, 2);
        assert_eq!(x.position, Vec3::zero());
        assert_eq!(y.position, Vec3::zero());
        assert!(unfit_ids(&packer).is_empty());
        assert_invariants(&packer);
    }

    #[test]
    fn bottom_load_item_gets_the_floor_when_sorted_first() {
        let mut packer = Packer::new();
        packer.add_container(container(1, (10, 10, 10)));
        packer.add_item(item(1, (10, 1, 10), 1.0));
        packer.add_item(item(2, (4, 4, 4), 1.0).with_rules(StackingRules {
            bottom_load_only: true,
            ..StackingRules::default()
        }));
        packer.pack();

        // The constraint tier pulls the smaller bottom-load item ahead of
        // the larger plain one.
        let (_, bottom) = placement(&packer, 2).expect("bottom-load item placed");
        let (_, plain) = placement(&packer, 1).expect("plain item placed");
        assert_eq!(bottom.position, Vec3::zero());
        assert_eq!(plain.position, Vec3::new(0, 4, 0));
        assert_invariants(&packer);
    }

    #[test]
    fn bottom_load_item_is_unfit_when_the_floor_is_taken() {
        let mut packer = Packer::new();
        packer.add_container(container(1, (10, 10, 10)));
        // Both items are constrained, so the larger floor plate sorts
        // first and covers y=0 entirely.
        packer.add_item(item(1, (10, 1, 10), 1.0).with_rules(StackingRules {
            disable_stacking: true,
            ..StackingRules::default()
        }));
        packer.add_item(item(2, (4, 4, 4), 1.0).with_rules(StackingRules {
            bottom_load_only: true,
            ..StackingRules::default()
        }));
        packer.pack();

        assert!(placement(&packer, 1).is_some());
        assert_eq!(unfit_ids(&packer), vec![2]);
        assert_invariants(&packer);
    }

    #[test]
    fn layer_cap_rejects_the_second_layer() {
        let mut packer = Packer::new();
        packer.add_container(container(1, (10, 10, 10)));
        packer.add_item(item(1, (10, 1, 10), 1.0).with_rules(StackingRules {
            max_layers_above: 1,
            ..StackingRules::default()
        }));
        packer.add_item(item(2, (10, 1, 10), 1.0));
        packer.add_item(item(3, (10, 1, 10), 1.0));
        packer.pack();

        let (_, base) = placement(&packer, 1).expect("capped item placed");
        let (_, first) = placement(&packer, 2).expect("first layer placed");
        assert_eq!(base.position, Vec3::zero());
        assert_eq!(first.position, Vec3::new(0, 1, 0));
        assert_eq!(
            unfit_ids(&packer),
            vec![3],
            "the second layer above the capped item must be rejected"
        );
        assert_invariants(&packer);
    }

    #[test]
    fn constraint_rejection_redirects_to_a_free_spot() {
        let mut packer = Packer::new();
        packer.add_container(container(1, (10, 10, 10)));
        packer.add_item(item(1, (5, 1, 10), 1.0).with_rules(StackingRules {
            disable_stacking: true,
            ..StackingRules::default()
        }));
        packer.add_item(item(2, (5, 1, 10), 1.0));
        packer.pack();

        // The top-of-anchor candidate is nearest the origin but violates
        // the no-stacking rule, so the item moves on to the side position.
        let (_, second) = placement(&packer, 2).expect("item placed");
        assert_eq!(second.position, Vec3::new(5, 0, 0));
        assert_invariants(&packer);
    }

    #[test]
    fn weight_capacity_diverts_items_to_the_unfit_list() {
        let mut packer = Packer::new();
        packer.add_container(Container::new(1, (10, 10, 10), 10.0).unwrap());
        packer.add_item(item(1, (5, 10, 10), 6.0));
        packer.add_item(item(2, (5, 10, 10), 6.0));
        packer.add_item(item(3, (5, 10, 10), 4.0));
        packer.pack();

        assert!(placement(&packer, 1).is_some());
        assert!(placement(&packer, 3).is_some());
        assert_eq!(unfit_ids(&packer), vec![2]);
        assert_invariants(&packer);
    }

    #[test]
    fn exact_stack_evicts_at_final_acceptance() {
        let mut packer = Packer::new();
        packer.add_container(container(1, (10, 10, 10)));
        packer.add_item(item(1, (10, 1, 10), 1.0).with_rules(StackingRules {
            max_layers_above: 2,
            height_kind: HeightKind::Exact,
            ..StackingRules::default()
        }));
        packer.add_item(item(2, (10, 1, 10), 1.0));
        packer.pack();

        // Only one of the two demanded layers materializes, so the exact
        // item is evicted once packing has finished.
        assert!(placement(&packer, 2).is_some());
        assert_eq!(unfit_ids(&packer), vec![1]);
        assert_eq!(
            packer.unfit_entries()[0].reason,
            UnfitReason::ExactStackUnsatisfied
        );
        assert_invariants(&packer);
    }

    #[test]
    fn exact_at_placement_rejects_incomplete_stacks_upfront() {
        let config = PackerConfig::builder().exact_at_placement(true).build();
        let mut packer = Packer::with_config(config);
        packer.add_container(container(1, (10, 10, 10)));
        packer.add_item(item(1, (10, 1, 10), 1.0).with_rules(StackingRules {
            max_layers_above: 2,
            height_kind: HeightKind::Exact,
            ..StackingRules::default()
        }));
        packer.add_item(item(2, (10, 1, 10), 1.0));
        packer.pack();

        // In strict mode the demand for two layers already fails when the
        // base item is placed into an empty container, so the base item
        // itself is turned away and the plain item packs alone.
        assert_eq!(unfit_ids(&packer), vec![1]);
        assert_eq!(
            packer.unfit_entries()[0].reason,
            UnfitReason::NoFittingContainer
        );
        let (_, plain) = placement(&packer, 2).expect("unconstrained item placed");
        assert_eq!(plain.position, Vec3::zero());
        assert_invariants(&packer);
    }

    #[test]
    fn zero_budget_reports_everything_unfit() {
        let config = PackerConfig::builder().time_budget_ms(0).build();
        let mut packer = Packer::with_config(config);
        packer.add_container(container(1, (10, 10, 10)));
        packer.add_item(item(1, (2, 2, 2), 1.0));
        packer.add_item(item(2, (2, 2, 2), 1.0));
        packer.pack();

        assert_eq!(unfit_ids(&packer), vec![1, 2]);
        assert!(
            packer
                .unfit_entries()
                .iter()
                .all(|e| e.reason == UnfitReason::TimeBudgetExhausted)
        );
        assert_invariants(&packer);
    }

    #[test]
    fn no_containers_means_everything_unfit() {
        let mut packer = Packer::new();
        packer.add_item(item(1, (2, 2, 2), 1.0));
        packer.pack();

        assert_eq!(unfit_ids(&packer), vec![1]);
        assert_invariants(&packer);
    }

    #[test]
    fn packing_is_deterministic() {
        let build = || {
            let mut packer = Packer::new();
            packer.add_container(container(1, (12, 12, 12)));
            packer.add_container(container(2, (6, 6, 6)));
            packer.add_item(item(1, (6, 6, 6), 2.0));
            packer.add_item(item(2, (6, 6, 6), 2.0));
            packer.add_item(item(3, (4, 4, 4), 1.0).with_rules(StackingRules {
                bottom_load_only: true,
                ..StackingRules::default()
            }));
            packer.add_item(item(4, (12, 2, 12), 3.0).with_rules(StackingRules {
                max_layers_above: 1,
                ..StackingRules::default()
            }));
            packer.add_item(item(5, (3, 3, 3), 0.5));
            packer
        };

        let fingerprint = |packer: &Packer| {
            let mut placements: Vec<(usize, usize, (i64, i64, i64), Rotation)> = Vec::new();
            for container in packer.containers() {
                for placed in packer.placed_items(container) {
                    placements.push((
                        container.id,
                        placed.id,
                        placed.position.as_tuple(),
                        placed.rotation,
                    ));
                }
            }
            (placements, unfit_ids(packer))
        };

        let mut first = build();
        let mut second = build();
        first.pack();
        second.pack();

        assert_eq!(fingerprint(&first), fingerprint(&second));
        assert_invariants(&first);

        // Re-running the same driver reproduces its own result as well.
        let before = fingerprint(&first);
        first.pack();
        assert_eq!(before, fingerprint(&first));
    }

    #[test]
    fn events_narrate_the_run() {
        let mut packer = Packer::new();
        packer.add_container(container(1, (10, 10, 10)));
        packer.add_item(item(1, (5, 10, 10), 1.0));
        packer.add_item(item(2, (5, 10, 10), 1.0));
        packer.add_item(item(3, (5, 10, 10), 1.0));

        let mut events = Vec::new();
        packer.pack_with_progress(|event| events.push(event.clone()));

        let placed_ids: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                PackEvent::ItemPlaced { item_id, .. } => Some(*item_id),
                _ => None,
            })
            .collect();
        assert_eq!(placed_ids, vec![1, 2]);

        let unfit: Vec<(usize, String)> = events
            .iter()
            .filter_map(|e| match e {
                PackEvent::ItemUnfit {
                    item_id,
                    reason_code,
                    ..
                } => Some((*item_id, reason_code.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(unfit, vec![(3, "no_fitting_container".to_string())]);

        match events.last() {
            Some(PackEvent::Finished { placed, unfit }) => {
                assert_eq!((*placed, *unfit), (2, 1));
            }
            other => panic!("expected a Finished event last, got {:?}", other),
        }
    }

    #[test]
    fn escalation_events_name_both_containers() {
        let mut packer = Packer::new();
        packer.add_container(container(7, (4, 4, 4)));
        packer.add_container(container(9, (10, 10, 10)));
        packer.add_item(item(1, (4, 4, 4), 1.0));
        packer.add_item(item(2, (8, 8, 1), 1.0));

        let mut escalations = Vec::new();
        packer.pack_with_progress(|event| {
            if let PackEvent::ContainerEscalated {
                from_container_id,
                to_container_id,
            } = event
            {
                escalations.push((*from_container_id, *to_container_id));
            }
        });

        assert_eq!(escalations, vec![(7, 9)]);
        assert_invariants(&packer);
    }
}
