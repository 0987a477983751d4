// src/occlusion_lib/los_merge.rs
//
// Lines up an occluder's LOS segment with its neighbors so that walls meeting
// at a corner or end to end produce one continuous sight line.

use glam::Vec2;

use crate::intersection::{closest_point_on_segment, line_intersection};
use crate::occlusion_lib::occluder::Occluder;

pub const MIN_PARALLEL_ALLOWANCE: f32 = 16.0;
pub const MAX_PARALLEL_ALLOWANCE: f32 = 512.0;
/// Fraction of an occluder's own thickness its LOS endpoints may move sideways.
pub const PERPENDICULAR_FRACTION: f32 = 0.35;
/// |cos| above which two LOS segments are treated as parallel.
const PARALLEL_COS: f32 = 0.9;
const ENDPOINT_EPSILON: f32 = 1e-3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MergeTolerance {
    /// How far an endpoint may move along its own LOS direction.
    pub parallel: f32,
    /// How far an endpoint may move across its own LOS direction.
    pub perpendicular: f32,
}

/// Allowed stretch for `own`'s endpoints towards `neighbor`, or `None` when the
/// two are too far apart to ever merge.
pub fn tolerance(own: &Occluder, neighbor: &Occluder) -> Option<MergeTolerance> {
    let own_bounds = own.bounds();
    let neighbor_bounds = neighbor.bounds();
    let mut parallel = neighbor
        .thickness()
        .clamp(MIN_PARALLEL_ALLOWANCE, MAX_PARALLEL_ALLOWANCE);
    if !own_bounds.intersects(&neighbor_bounds) {
        if !own_bounds.inflate(MIN_PARALLEL_ALLOWANCE).intersects(&neighbor_bounds) {
            return None;
        }
        parallel = parallel.min(MIN_PARALLEL_ALLOWANCE);
    }
    Some(MergeTolerance {
        parallel,
        perpendicular: own.thickness() * PERPENDICULAR_FRACTION,
    })
}

/// Offsets for each of `own`'s LOS endpoints that would join it to `neighbor`'s
/// LOS segment. Both entries are `None` when the two do not merge.
pub fn merge_offsets(own: &Occluder, neighbor: &Occluder) -> [Option<Vec2>; 2] {
    if own.id() == neighbor.id() {
        return [None; 2];
    }
    let Some(tol) = tolerance(own, neighbor) else {
        return [None; 2];
    };

    let base = own.base_los_points();
    let Some(axis) = (base[1] - base[0]).try_normalize() else {
        return [None; 2];
    };
    let across_axis = axis.perp();
    let neighbor_base = neighbor.base_los_points();
    let [b0, b1] = neighbor.los_segment();
    let neighbor_axis = (b1 - b0).normalize_or_zero();
    let parallel = axis.dot(neighbor_axis).abs() > PARALLEL_COS;
    let center = own.center();
    let current = own.los_segment();

    let mut proposed: [Option<Vec2>; 2] = [None; 2];
    for i in 0..2 {
        let p = base[i];
        let outward = if i == 0 { -axis } else { axis };
        let within = |target: Vec2| {
            let d = target - p;
            d.dot(axis).abs() <= tol.parallel && d.dot(across_axis).abs() <= tol.perpendicular
        };
        // never pull an endpoint back into its own wall
        let outward_enough = |target: Vec2| (target - p).dot(outward) >= -tol.perpendicular;

        let q = closest_point_on_segment(b0, b1, p);
        let gap = q - p;
        if gap.dot(axis).abs() > tol.parallel || gap.dot(across_axis).abs() > tol.parallel {
            continue;
        }

        let target = if parallel {
            // end to end: meet halfway between the two unmerged endpoints
            let near_end = [b0, b1]
                .iter()
                .position(|b| b.distance_squared(q) < ENDPOINT_EPSILON);
            let t = match near_end {
                Some(j) => (p + neighbor_base[j]) * 0.5,
                None => q,
            };
            Some(t).filter(|t| within(*t) && outward_enough(*t))
        } else {
            let sharp = line_intersection(base[0], base[1], b0, b1)
                .filter(|x| (*x - center).dot(outward) > 0.0 && within(*x));
            sharp.or(Some(q).filter(|q| within(*q) && outward_enough(*q)))
        };

        if let Some(target) = target {
            proposed[i] = Some(target - p);
        }
    }

    if proposed.iter().all(Option::is_none) {
        return proposed;
    }
    let end = |i: usize| proposed[i].map_or(current[i], |offset| base[i] + offset);
    if end(0).distance(end(1)) < tol.perpendicular {
        return [None; 2];
    }
    proposed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::occlusion_lib::occluder::OccluderId;

    fn occluder(index: u32, min: (f32, f32), max: (f32, f32)) -> Occluder {
        Occluder::from_rect(
            OccluderId { index, generation: 0 },
            None,
            Rect::new(Vec2::new(min.0, min.1), Vec2::new(max.0, max.1)),
            None,
            0,
        )
    }

    #[test]
    fn end_to_end_walls_meet_in_the_middle() {
        let a = occluder(0, (-100.0, -10.0), (-6.0, 10.0));
        let b = occluder(1, (6.0, -10.0), (100.0, 10.0));
        let from_a = merge_offsets(&a, &b);
        let from_b = merge_offsets(&b, &a);
        assert_eq!(from_a, [None, Some(Vec2::new(6.0, 0.0))]);
        assert_eq!(from_b, [Some(Vec2::new(-6.0, 0.0)), None]);
    }

    #[test]
    fn corner_is_sharp() {
        // horizontal wall ending inside a vertical one
        let a = occluder(0, (-100.0, -10.0), (50.0, 10.0));
        let b = occluder(1, (50.0, -100.0), (70.0, 10.0));
        let offsets = merge_offsets(&a, &b);
        assert_eq!(offsets[0], None);
        assert!((offsets[1].unwrap() - Vec2::new(10.0, 0.0)).length() < 1e-3);

        // the vertical wall shrinks down to the same corner
        let back = merge_offsets(&b, &a);
        assert_eq!(back[0], None);
        assert!((back[1].unwrap() - Vec2::new(0.0, -10.0)).length() < 1e-3);
    }

    #[test]
    fn distant_walls_do_not_merge() {
        let a = occluder(0, (-100.0, -10.0), (-40.0, 10.0));
        let b = occluder(1, (40.0, -10.0), (100.0, 10.0));
        assert!(tolerance(&a, &b).is_none());
        assert_eq!(merge_offsets(&a, &b), [None, None]);
    }

    #[test]
    fn stacked_walls_stay_apart() {
        let a = occluder(0, (-50.0, -10.0), (50.0, 10.0));
        let b = occluder(1, (-50.0, 10.0), (50.0, 30.0));
        assert_eq!(merge_offsets(&a, &b), [None, None]);
    }

    #[test]
    fn wall_crossing_the_middle_does_not_pull_endpoints_inward() {
        let a = occluder(0, (-50.0, -10.0), (50.0, 10.0));
        let b = occluder(1, (-60.0, -200.0), (60.0, 200.0));
        assert_eq!(merge_offsets(&a, &b), [None, None]);
    }

    #[test]
    fn tolerance_is_clamped() {
        let a = occluder(0, (-100.0, -10.0), (0.0, 10.0));
        let thin = occluder(1, (0.0, -2.0), (100.0, 2.0));
        let huge = occluder(2, (0.0, -1000.0), (2000.0, 1000.0));
        assert_eq!(tolerance(&a, &thin).unwrap().parallel, MIN_PARALLEL_ALLOWANCE);
        assert_eq!(tolerance(&a, &huge).unwrap().parallel, MAX_PARALLEL_ALLOWANCE);
        assert!((tolerance(&a, &thin).unwrap().perpendicular - 7.0).abs() < 1e-4);
    }
}
