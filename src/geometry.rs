//! Geometric primitives for collision detection and stacking queries.
//!
//! All functions operate on items through their *projected* extents, i.e.
//! the permutation of the native dimensions selected by the item's current
//! rotation. Positions and extents are integers, so every comparison here
//! is exact.
//!
//! Touching faces never count as an intersection: an item whose maximum
//! coordinate equals another item's minimum coordinate on some axis sits
//! flush against it.

use crate::model::Item;

/// Length of the overlap of two 1D intervals, at least 0.
///
/// # Parameters
/// * `a1`, `a2` - Start and end of the first interval
/// * `b1`, `b2` - Start and end of the second interval
#[inline]
pub fn overlap_1d(a1: i64, a2: i64, b1: i64, b2: i64) -> i64 {
    (a2.min(b2) - a1.max(b1)).max(0)
}

/// Checks whether two placed items intersect with positive volume.
///
/// Two axis-aligned boxes intersect iff their projections overlap with
/// positive length on all three axes (separating axis theorem).
///
/// # Returns
/// `true` if the items share interior volume, `false` for disjoint or
/// merely touching items
#[inline]
pub fn intersects(a: &Item, b: &Item) -> bool {
    let ap = a.position;
    let ad = a.projected_dims();
    let bp = b.position;
    let bd = b.projected_dims();

    overlap_1d(ap.x, ap.x + ad.x, bp.x, bp.x + bd.x) > 0
        && overlap_1d(ap.y, ap.y + ad.y, bp.y, bp.y + bd.y) > 0
        && overlap_1d(ap.z, ap.z + ad.z, bp.z, bp.z + bd.z) > 0
}

/// Overlap area of two items' footprints (their xz projections).
///
/// # Returns
/// The shared area in square units, 0 for disjoint footprints
#[inline]
pub fn footprint_overlap_area(a: &Item, b: &Item) -> i64 {
    let ap = a.position;
    let ad = a.projected_dims();
    let bp = b.position;
    let bd = b.projected_dims();

    let overlap_x = overlap_1d(ap.x, ap.x + ad.x, bp.x, bp.x + bd.x);
    let overlap_z = overlap_1d(ap.z, ap.z + ad.z, bp.z, bp.z + bd.z);
    overlap_x * overlap_z
}

/// Checks whether `upper` sits above `lower` with at least the given share
/// of `lower`'s footprint covered.
///
/// "Above" means the upper item's bottom face is at or beyond the lower
/// item's top face; there may be empty space between them.
///
/// # Parameters
/// * `upper` - The candidate upper item
/// * `lower` - The item whose stack is examined
/// * `min_overlap_ratio` - Required overlap as a fraction of `lower`'s footprint area
#[inline]
pub fn is_above_with_overlap(upper: &Item, lower: &Item, min_overlap_ratio: f64) -> bool {
    if upper.position.y < lower.top() {
        return false;
    }
    let overlap = footprint_overlap_area(upper, lower) as f64;
    overlap >= min_overlap_ratio * lower.footprint_area() as f64
}

/// Checks whether `upper` sits above `lower` with any positive footprint
/// overlap at all.
///
/// This is the trigger predicate for the hard no-stacking rules, which
/// block placement on even marginal contact.
#[inline]
pub fn is_above_touching(upper: &Item, lower: &Item) -> bool {
    upper.position.y >= lower.top() && footprint_overlap_area(upper, lower) > 0
}
