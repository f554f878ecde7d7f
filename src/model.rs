//! Data model for the packing engine.
//!
//! This module defines the two central structures:
//! - `Item`: a box with allowed rotations, weight, color tag and optional
//!   stacking rules
//! - `Container`: a box with a weight capacity and the list of items
//!   currently placed in it
//!
//! The packing driver owns all items in a single store (`Vec<Item>`);
//! containers refer to placed items by their index in that store. Index
//! equality is item identity: two entries are the same item iff they have
//! the same index, never because their fields compare equal.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::geometry;
use crate::types::{Dimensions, Rotation, Vec3};

/// Validation error for item and container data.
#[derive(Debug, Clone)]
pub enum ValidationError {
    InvalidDimension(String),
    InvalidWeight(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidDimension(msg) => write!(f, "Invalid dimension: {}", msg),
            ValidationError::InvalidWeight(msg) => write!(f, "Invalid weight: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validates a single dimension.
fn validate_dimension(value: i64, name: &str) -> Result<(), ValidationError> {
    if value < 0 {
        return Err(ValidationError::InvalidDimension(format!(
            "{} must not be negative, got: {}",
            name, value
        )));
    }
    Ok(())
}

/// Validates a weight value.
fn validate_weight_value(value: f64, name: &str) -> Result<(), ValidationError> {
    if value < 0.0 || value.is_nan() || value.is_infinite() {
        return Err(ValidationError::InvalidWeight(format!(
            "{} must be a non-negative number, got: {}",
            name, value
        )));
    }
    Ok(())
}

/// Validates all three extents of a box.
fn validate_dims(dims: (i64, i64, i64)) -> Result<(), ValidationError> {
    validate_dimension(dims.0, "Width")?;
    validate_dimension(dims.1, "Height")?;
    validate_dimension(dims.2, "Depth")?;
    Ok(())
}

/// Whether a height or layer limit is an upper bound or must be hit exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HeightKind {
    Maximum,
    Exact,
}

impl Default for HeightKind {
    fn default() -> Self {
        HeightKind::Maximum
    }
}

/// Optional stacking rules of an item. The default disables every rule.
///
/// A value of 0 disables the corresponding limit. `height_limit` and
/// `height_kind` are independent knobs: the mere presence of a height limit
/// forbids stacking anything onto the item (same effect as
/// `disable_stacking`), while the kind switches the layer and
/// stacking-height rules between "at most" and "exactly" semantics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct StackingRules {
    /// Maximum number of distinct y-positions occupied by items stacked
    /// above this one.
    pub max_layers_above: u32,
    /// Maximum summed weight of items stacked above this one.
    pub max_weight_above: f64,
    /// Maximum vertical span items above this one may occupy, measured from
    /// this item's top face.
    pub stacking_height: i64,
    /// Declared height limit. Presence marks the item as height constrained
    /// and forbids stacking above it.
    pub height_limit: Option<i64>,
    /// Evaluation kind for the layer and stacking-height rules.
    pub height_kind: HeightKind,
    /// The item may only rest on the container floor (y = 0).
    pub bottom_load_only: bool,
    /// Nothing may be placed on top of this item.
    pub disable_stacking: bool,
}

impl StackingRules {
    /// True if no rule is active at all.
    pub fn is_empty(&self) -> bool {
        self.max_layers_above == 0
            && self.max_weight_above <= 0.0
            && self.stacking_height <= 0
            && self.height_limit.is_none()
            && !self.bottom_load_only
            && !self.disable_stacking
    }

    /// True if the item categorically forbids items above itself.
    pub fn forbids_stacking_above(&self) -> bool {
        self.disable_stacking || self.height_limit.is_some()
    }

    /// True if any of the counting rules (layers, weight, height span) is
    /// active.
    pub fn has_counting_rule(&self) -> bool {
        self.max_layers_above > 0 || self.max_weight_above > 0.0 || self.stacking_height > 0
    }
}

/// An item to be packed: a box with permitted rotations, weight, an opaque
/// color tag and optional stacking rules.
///
/// `rotation` and `position` describe the current placement. Both are
/// unchecked fields that the packing driver overwrites during trial
/// placements; they carry meaning only once the engine reports the item
/// as placed in some container.
#[derive(Clone, Debug)]
pub struct Item {
    /// Caller-supplied tag, opaque to the engine.
    pub id: usize,
    pub dims: Dimensions,
    pub weight: f64,
    /// Opaque display tag, not interpreted by the engine.
    pub color: String,
    /// Non-empty, in caller-preferred order. Defaults to all six rotations.
    pub allowed_rotations: Vec<Rotation>,
    pub rotation: Rotation,
    pub position: Vec3,
    pub rules: StackingRules,
}

impl Item {
    /// Creates an item with all six rotations allowed and no stacking
    /// rules.
    ///
    /// # Parameters
    /// * `id` - Caller-supplied tag, echoed in results and events
    /// * `dims` - Native (width, height, depth) in integer units
    /// * `weight` - Weight in kg
    ///
    /// # Returns
    /// `Ok(Item)` for valid values, otherwise `Err(ValidationError)`
    pub fn new(id: usize, dims: (i64, i64, i64), weight: f64) -> Result<Self, ValidationError> {
        validate_dims(dims)?;
        validate_weight_value(weight, "Weight")?;
        Ok(Self {
            id,
            dims: Dimensions::new(dims.0, dims.1, dims.2),
            weight,
            color: "#000000".to_string(),
            allowed_rotations: Rotation::ALL.to_vec(),
            rotation: Rotation::Whd,
            position: Vec3::zero(),
            rules: StackingRules::default(),
        })
    }

    /// Restricts the item to the given rotations.
    ///
    /// The current rotation becomes the first entry. An empty list is
    /// treated as "no restriction" and keeps all six rotations.
    pub fn with_allowed_rotations(mut self, rotations: Vec<Rotation>) -> Self {
        if let Some(&first) = rotations.first() {
            self.rotation = first;
            self.allowed_rotations = rotations;
        }
        self
    }

    /// Sets the color tag.
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Sets the stacking rules.
    pub fn with_rules(mut self, rules: StackingRules) -> Self {
        self.rules = rules;
        self
    }

    /// The item's extents along the container axes under its current
    /// rotation.
    #[inline]
    pub fn projected_dims(&self) -> Vec3 {
        self.rotation.project(self.dims)
    }

    /// The y coordinate of the item's top face at its current placement.
    #[inline]
    pub fn top(&self) -> i64 {
        self.position.y + self.projected_dims().y
    }

    /// Area of the item's footprint (xz projection) under its current
    /// rotation.
    #[inline]
    pub fn footprint_area(&self) -> i64 {
        let d = self.projected_dims();
        d.x * d.z
    }

    /// Volume; rotation-independent.
    #[inline]
    pub fn volume(&self) -> i64 {
        self.dims.volume()
    }
}

/// A packing container: a box with an optional weight capacity and the
/// insertion-ordered list of placed items.
///
/// `items` holds indices into the driver's item store.
#[derive(Clone, Debug)]
pub struct Container {
    /// Caller-supplied tag, opaque to the engine.
    pub id: usize,
    /// Opaque metadata, not interpreted by the engine.
    pub label: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub dims: Dimensions,
    /// Maximum total weight in kg; 0 means unlimited.
    pub max_weight: f64,
    /// Indices of placed items, in insertion order.
    pub items: Vec<usize>,
}

impl Container {
    /// Creates an empty container.
    ///
    /// # Parameters
    /// * `id` - Caller-supplied tag
    /// * `dims` - (width, height, depth) in integer units
    /// * `max_weight` - Weight capacity in kg, 0 for unlimited
    pub fn new(id: usize, dims: (i64, i64, i64), max_weight: f64) -> Result<Self, ValidationError> {
        validate_dims(dims)?;
        validate_weight_value(max_weight, "Maximum weight")?;
        Ok(Self {
            id,
            label: None,
            description: None,
            image: None,
            dims: Dimensions::new(dims.0, dims.1, dims.2),
            max_weight,
            items: Vec::new(),
        })
    }

    /// Sets the display label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Volume of the container.
    #[inline]
    pub fn volume(&self) -> i64 {
        self.dims.volume()
    }

    /// Total weight of all placed items.
    pub fn total_weight(&self, store: &[Item]) -> f64 {
        self.items.iter().map(|&idx| store[idx].weight).sum()
    }

    /// Scores how well a rotation of `item` fills this container.
    ///
    /// The score is the sum of squared extent ratios
    /// `(dx/W)² + (dy/H)² + (dz/D)²`; rotations whose extents exceed the
    /// container on any axis score 0. Higher is better.
    pub fn score_rotation(&self, item: &Item, rotation: Rotation) -> f64 {
        let d = rotation.project(item.dims);
        if d.x > self.dims.width || d.y > self.dims.height || d.z > self.dims.depth {
            return 0.0;
        }
        let width_score = (d.x as f64 / self.dims.width as f64).powi(2);
        let height_score = (d.y as f64 / self.dims.height as f64).powi(2);
        let depth_score = (d.z as f64 / self.dims.depth as f64).powi(2);
        width_score + height_score + depth_score
    }

    /// Selects the allowed rotation with the highest [`score_rotation`]
    /// value.
    ///
    /// Ties break toward the smallest rotation ordinal (`whd` < `hwd` <
    /// `hdw` < `dhw` < `dwh` < `wdh`), which makes the selection
    /// deterministic regardless of the order of `allowed_rotations`.
    ///
    /// [`score_rotation`]: Self::score_rotation
    pub fn best_rotation(&self, item: &Item) -> Rotation {
        let mut best = item.rotation;
        let mut best_score = f64::NEG_INFINITY;
        for &rotation in &item.allowed_rotations {
            let score = self.score_rotation(item, rotation);
            if score > best_score || (score == best_score && rotation < best) {
                best = rotation;
                best_score = score;
            }
        }
        best
    }

    /// Attempts to place one item at a fixed position.
    ///
    /// Sets the item's position to `position` and its rotation to the best
    /// scoring allowed rotation, then checks containment, the weight
    /// capacity and intersection against every already-placed item. On
    /// success the item's index is appended to `items`.
    ///
    /// On failure the placement list is untouched, but the item's position
    /// and rotation fields may have been overwritten; callers treat them
    /// as meaningful only after a reported success.
    ///
    /// # Returns
    /// `true` if the item was placed
    pub fn try_place(&mut self, store: &mut [Item], idx: usize, position: Vec3) -> bool {
        let rotation = self.best_rotation(&store[idx]);
        store[idx].position = position;
        store[idx].rotation = rotation;

        let d = store[idx].projected_dims();
        if position.x + d.x > self.dims.width
            || position.y + d.y > self.dims.height
            || position.z + d.z > self.dims.depth
        {
            return false;
        }

        if self.max_weight > 0.0 && self.total_weight(store) + store[idx].weight > self.max_weight {
            return false;
        }

        let collides = self
            .items
            .iter()
            .any(|&other| other != idx && geometry::intersects(&store[other], &store[idx]));
        if collides {
            return false;
        }

        self.items.push(idx);
        true
    }

    /// Removes the first placement entry for the given item index.
    ///
    /// # Returns
    /// `true` if an entry was removed
    pub fn remove_item(&mut self, idx: usize) -> bool {
        match self.items.iter().position(|&other| other == idx) {
            Some(at) => {
                self.items.remove(at);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_dimensions() {
        assert!(Item::new(1, (-1, 2, 3), 1.0).is_err());
        assert!(Container::new(1, (10, -10, 10), 0.0).is_err());
        assert!(Item::new(1, (0, 2, 3), 1.0).is_ok(), "zero extents are legal");
    }

    #[test]
    fn rejects_invalid_weights() {
        assert!(Item::new(1, (1, 1, 1), -0.5).is_err());
        assert!(Item::new(1, (1, 1, 1), f64::NAN).is_err());
        assert!(Container::new(1, (10, 10, 10), f64::INFINITY).is_err());
    }

    #[test]
    fn new_item_allows_all_rotations_and_starts_at_first() {
        let item = Item::new(1, (1, 2, 3), 0.0).unwrap();
        assert_eq!(item.allowed_rotations, Rotation::ALL.to_vec());
        assert_eq!(item.rotation, Rotation::Whd);
        assert_eq!(item.position, Vec3::zero());
    }

    #[test]
    fn restricting_rotations_moves_to_first_allowed() {
        let item = Item::new(1, (1, 2, 3), 0.0)
            .unwrap()
            .with_allowed_rotations(vec![Rotation::Dwh, Rotation::Whd]);
        assert_eq!(item.rotation, Rotation::Dwh);

        let unrestricted = Item::new(2, (1, 2, 3), 0.0)
            .unwrap()
            .with_allowed_rotations(Vec::new());
        assert_eq!(unrestricted.allowed_rotations.len(), 6);
    }

    #[test]
    fn oversize_rotation_scores_zero() {
        let container = Container::new(1, (10, 2, 2), 0.0).unwrap();
        let item = Item::new(1, (2, 10, 2), 0.0).unwrap();
        assert_eq!(container.score_rotation(&item, Rotation::Whd), 0.0);
        assert!(container.score_rotation(&item, Rotation::Hwd) > 0.0);
    }

    #[test]
    fn best_rotation_lays_tall_item_along_x() {
        // A 2x10x2 item only fits a 10x2x2 container with its native height
        // along x; hwd and hdw tie on score, the smaller ordinal wins.
        let container = Container::new(1, (10, 2, 2), 0.0).unwrap();
        let item = Item::new(1, (2, 10, 2), 0.0).unwrap();
        assert_eq!(container.best_rotation(&item), Rotation::Hwd);
    }

    #[test]
    fn best_rotation_breaks_full_tie_toward_smallest_ordinal() {
        let container = Container::new(1, (10, 10, 10), 0.0).unwrap();
        let cube = Item::new(1, (4, 4, 4), 0.0)
            .unwrap()
            .with_allowed_rotations(vec![Rotation::Wdh, Rotation::Hdw, Rotation::Whd]);
        assert_eq!(container.best_rotation(&cube), Rotation::Whd);
    }

    #[test]
    fn try_place_commits_on_success() {
        let mut container = Container::new(1, (10, 10, 10), 0.0).unwrap();
        let mut store = vec![Item::new(1, (5, 10, 10), 0.0).unwrap()];

        assert!(container.try_place(&mut store, 0, Vec3::zero()));
        assert_eq!(container.items, vec![0]);
        assert_eq!(store[0].position, Vec3::zero());
    }

    #[test]
    fn try_place_rejects_out_of_bounds() {
        let mut container = Container::new(1, (10, 10, 10), 0.0).unwrap();
        let mut store = vec![Item::new(1, (5, 10, 10), 0.0).unwrap()];

        assert!(!container.try_place(&mut store, 0, Vec3::new(6, 0, 0)));
        assert!(container.items.is_empty(), "failed trial must not commit");
    }

    #[test]
    fn try_place_rejects_intersection_but_allows_touching() {
        let mut container = Container::new(1, (10, 10, 10), 0.0).unwrap();
        let mut store = vec![
            Item::new(1, (5, 10, 10), 0.0).unwrap(),
            Item::new(2, (5, 10, 10), 0.0).unwrap(),
        ];

        assert!(container.try_place(&mut store, 0, Vec3::zero()));
        assert!(!container.try_place(&mut store, 1, Vec3::new(4, 0, 0)));
        assert!(container.try_place(&mut store, 1, Vec3::new(5, 0, 0)));
        assert_eq!(container.items, vec![0, 1]);
    }

    #[test]
    fn try_place_applies_the_best_rotation() {
        let mut container = Container::new(1, (10, 2, 2), 0.0).unwrap();
        let mut store = vec![Item::new(1, (2, 10, 2), 0.0).unwrap()];

        assert!(container.try_place(&mut store, 0, Vec3::zero()));
        assert_eq!(store[0].rotation, Rotation::Hwd);
        assert_eq!(store[0].projected_dims(), Vec3::new(10, 2, 2));
    }

    #[test]
    fn try_place_enforces_weight_capacity() {
        let mut container = Container::new(1, (10, 10, 10), 10.0).unwrap();
        let mut store = vec![
            Item::new(1, (2, 2, 2), 6.0).unwrap(),
            Item::new(2, (2, 2, 2), 6.0).unwrap(),
            Item::new(3, (2, 2, 2), 4.0).unwrap(),
        ];

        assert!(container.try_place(&mut store, 0, Vec3::zero()));
        assert!(
            !container.try_place(&mut store, 1, Vec3::new(2, 0, 0)),
            "second item would exceed the 10kg capacity"
        );
        assert!(container.try_place(&mut store, 2, Vec3::new(2, 0, 0)));
        assert!((container.total_weight(&store) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn unlimited_capacity_accepts_any_weight() {
        let mut container = Container::new(1, (10, 10, 10), 0.0).unwrap();
        let mut store = vec![Item::new(1, (2, 2, 2), 900.0).unwrap()];
        assert!(container.try_place(&mut store, 0, Vec3::zero()));
    }

    #[test]
    fn remove_item_drops_first_matching_entry() {
        let mut container = Container::new(1, (10, 10, 10), 0.0).unwrap();
        let mut store = vec![
            Item::new(1, (2, 2, 2), 0.0).unwrap(),
            Item::new(2, (2, 2, 2), 0.0).unwrap(),
        ];
        assert!(container.try_place(&mut store, 0, Vec3::zero()));
        assert!(container.try_place(&mut store, 1, Vec3::new(2, 0, 0)));

        assert!(container.remove_item(0));
        assert_eq!(container.items, vec![1]);
        assert!(!container.remove_item(0), "already removed");
    }

    #[test]
    fn stacking_rule_queries() {
        let none = StackingRules::default();
        assert!(none.is_empty());
        assert!(!none.forbids_stacking_above());
        assert_eq!(none.height_kind, HeightKind::Maximum);

        let constrained = StackingRules {
            max_layers_above: 2,
            height_limit: Some(40),
            ..StackingRules::default()
        };
        assert!(!constrained.is_empty());
        assert!(constrained.forbids_stacking_above());
        assert!(constrained.has_counting_rule());

        let bottom = StackingRules {
            bottom_load_only: true,
            ..StackingRules::default()
        };
        assert!(!bottom.is_empty());
        assert!(!bottom.has_counting_rule());
        assert!(!bottom.forbids_stacking_above());
    }
}
