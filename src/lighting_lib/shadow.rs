// src/lighting_lib/shadow.rs

use std::collections::BTreeSet;

use glam::Vec2;

use crate::error::LightingError;
use crate::geometry::angular_order;
use crate::intersection::{axis_aligned_intersection, segment_intersection, segment_point_distance_squared};
use crate::occlusion_lib::occluder::{OccluderId, Segment};

/// Intersections closer than this (squared) to an existing endpoint are not split.
const SPLIT_SKIP_DISTANCE_SQ: f32 = 5.0;
/// Points closer than this on both axes are merged.
pub const POINT_MERGE_DISTANCE: f32 = 6.0;
/// Sideways offset of the two rays cast towards each point.
const RAY_JITTER: f32 = 3.0;
/// A ray that lands within this distance (squared) of its target counts as hitting it.
const TARGET_HIT_DISTANCE_SQ: f32 = 25.0;
const MIN_SEGMENT_LENGTH_SQ: f32 = 0.01;
const MAX_SPLITS: usize = 2048;

/// Everything a shadow pass needs, owned so it can be moved to the worker thread.
#[derive(Clone, Debug)]
pub struct RaycastInput {
    /// Light position in its own frame.
    pub origin: Vec2,
    /// Offset of the boundary square's center from `origin`.
    pub bounds_offset: Vec2,
    /// Half size of the boundary square.
    pub bounds_extent: f32,
    /// Light-facing occluder sides, already in the light's frame.
    pub segments: Vec<Segment>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RaycastOutcome {
    /// Boundary of the lit area, sorted by angle around the light.
    pub hits: Vec<Vec2>,
    /// Occluders that contributed at least one accepted hit.
    pub used: BTreeSet<OccluderId>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub segment: usize,
    pub point: Vec2,
}

/// Closest intersection of the ray `start-end` with `segments`.
pub fn raycast(start: Vec2, end: Vec2, segments: &[Segment]) -> Option<RayHit> {
    let mut end = end;
    let mut min = start.min(end);
    let mut max = start.max(end);
    let mut closest = None;

    for (i, s) in segments.iter().enumerate() {
        let s_min = s.start.min(s.end);
        let s_max = s.start.max(s.end);
        if s_min.y > max.y || s_max.y < min.y || s_min.x > max.x || s_max.x < min.x {
            continue;
        }

        let hit = if s.is_axis_aligned {
            axis_aligned_intersection(start, end, s.start, s.end, s.is_horizontal)
        } else {
            segment_intersection(start, end, s.start, s.end)
        };

        if let Some(point) = hit {
            // shrink the ray so later segments must be closer to count
            end = point;
            min = start.min(end);
            max = start.max(end);
            closest = Some(RayHit { segment: i, point });
        }
    }
    closest
}

fn intersect(a: &Segment, b: &Segment) -> Option<Vec2> {
    if a.is_axis_aligned {
        axis_aligned_intersection(b.start, b.end, a.start, a.end, a.is_horizontal)
    } else if b.is_axis_aligned {
        axis_aligned_intersection(a.start, a.end, b.start, b.end, b.is_horizontal)
    } else {
        segment_intersection(a.start, a.end, b.start, b.end)
    }
}

fn near_endpoint(s: &Segment, p: Vec2) -> bool {
    s.start.distance_squared(p) < SPLIT_SKIP_DISTANCE_SQ || s.end.distance_squared(p) < SPLIT_SKIP_DISTANCE_SQ
}

fn shares_endpoint(a: &Segment, b: &Segment) -> bool {
    near_endpoint(b, a.start) || near_endpoint(b, a.end)
}

/// Splits crossing segments at their intersection so rays cannot leak through T-junctions.
fn split_intersections(segments: &mut Vec<Segment>) {
    let mut splits = 0;
    let mut i = 0;
    while i < segments.len() {
        let mut found = None;
        for j in i + 1..segments.len() {
            let (a, b) = (&segments[i], &segments[j]);
            if a.is_axis_aligned && b.is_axis_aligned && a.is_horizontal == b.is_horizontal {
                continue;
            }
            if shares_endpoint(a, b) {
                continue;
            }
            if let Some(mid) = intersect(a, b) {
                if near_endpoint(a, mid) && near_endpoint(b, mid) {
                    continue;
                }
                found = Some((j, mid));
                break;
            }
        }

        let Some((j, mid)) = found else {
            i += 1;
            continue;
        };
        if splits >= MAX_SPLITS {
            log::warn!(
                "Gave up splitting intersecting segments after {} splits ({} segments)",
                splits,
                segments.len()
            );
            return;
        }
        splits += 1;

        // j > i, so splitting j first keeps i's index valid
        for k in [j, i] {
            let s = segments[k];
            if near_endpoint(&s, mid) {
                continue;
            }
            segments[k] = Segment::new(s.start, mid, s.owner);
            segments.insert(k + 1, Segment::new(mid, s.end, s.owner));
        }
    }
}

fn boundary_square(center: Vec2, extent: f32) -> [Segment; 4] {
    let min = center - Vec2::splat(extent);
    let max = center + Vec2::splat(extent);
    let corners = [max, Vec2::new(max.x, min.y), min, Vec2::new(min.x, max.y)];
    [0, 1, 2, 3].map(|i| Segment::new(corners[i], corners[(i + 1) % 4], None))
}

fn dedup_points(points: &mut Vec<(Vec2, Option<OccluderId>)>) {
    let mut kept: Vec<(Vec2, Option<OccluderId>)> = Vec::with_capacity(points.len());
    for (p, owner) in points.drain(..) {
        let duplicate = kept.iter().any(|(k, _)| {
            (k.x - p.x).abs() < POINT_MERGE_DISTANCE && (k.y - p.y).abs() < POINT_MERGE_DISTANCE
        });
        if !duplicate {
            kept.push((p, owner));
        }
    }
    *points = kept;
}

/// Builds the outline of the area lit by a point light.
///
/// Two rays are cast past every segment endpoint; where they land on
/// different segments the outline gets a vertex on each side, which is what
/// lets light wrap around corners.
pub fn find_raycast_hits(input: &RaycastInput) -> Result<RaycastOutcome, LightingError> {
    let origin = input.origin;
    let center = origin + input.bounds_offset;
    let extent = input.bounds_extent;
    if !center.is_finite() || !extent.is_finite() {
        return Err(LightingError::DegenerateGeometry {
            light_pos: origin,
            points: Vec::new(),
        });
    }

    let mut segments: Vec<Segment> = input
        .segments
        .iter()
        .filter(|s| s.start.is_finite() && s.end.is_finite())
        .filter(|s| s.length_squared() >= MIN_SEGMENT_LENGTH_SQ)
        .copied()
        .collect();
    segments.extend(boundary_square(center, extent));

    split_intersections(&mut segments);

    let limit = extent + 1.0;
    let out_of_bounds = |p: Vec2| (p.x - center.x).abs() > limit || (p.y - center.y).abs() > limit;
    segments.retain(|s| !out_of_bounds(s.start) && !out_of_bounds(s.end));

    let mut points: Vec<(Vec2, Option<OccluderId>)> = segments
        .iter()
        .flat_map(|s| [(s.start, s.owner), (s.end, s.owner)])
        .collect();
    dedup_points(&mut points);

    segments.sort_by(|a, b| {
        segment_point_distance_squared(a.start, a.end, origin)
            .total_cmp(&segment_point_distance_squared(b.start, b.end, origin))
    });

    let mut outcome = RaycastOutcome::default();
    let mut used = |owners: [Option<OccluderId>; 3]| {
        outcome.used.extend(owners.into_iter().flatten());
    };
    let mut hits: Vec<Vec2> = Vec::with_capacity(points.len() * 2);

    for (p, owner) in &points {
        let Some(dir) = (*p - origin).try_normalize() else {
            continue;
        };
        let jitter = dir.perp() * RAY_JITTER;
        let far = origin + dir * extent * 2.0;

        let first = raycast(origin, far - jitter, &segments).ok_or(LightingError::RaycastMiss { origin })?;
        let second = raycast(origin, far + jitter, &segments).ok_or(LightingError::RaycastMiss { origin })?;
        let (s1, s2) = (&segments[first.segment], &segments[second.segment]);

        let on_first = segment_point_distance_squared(s1.start, s1.end, *p) < TARGET_HIT_DISTANCE_SQ;
        let on_second = segment_point_distance_squared(s2.start, s2.end, *p) < TARGET_HIT_DISTANCE_SQ;

        if on_first && on_second {
            hits.push(*p);
            used([*owner, s1.owner, s2.owner]);
        } else if first.segment != second.segment {
            hits.push(if on_first { *p } else { first.point });
            hits.push(if on_second { *p } else { second.point });
            used([*owner, s1.owner, s2.owner]);
        }
        // both rays on the same segment away from the point: nothing new here
    }

    let mut tagged: Vec<(Vec2, Option<OccluderId>)> = hits.into_iter().map(|h| (h, None)).collect();
    dedup_points(&mut tagged);
    let mut hits: Vec<Vec2> = tagged.into_iter().map(|(h, _)| h).collect();

    if hits.iter().any(|h| !h.is_finite()) {
        return Err(LightingError::DegenerateGeometry {
            light_pos: origin,
            points: hits,
        });
    }
    hits.sort_by(|a, b| angular_order(origin, *a, *b));
    outcome.hits = hits;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::occlusion_lib::occluder::Occluder;

    fn wall_segments(light: Vec2) -> Vec<Segment> {
        let o = Occluder::from_rect(
            OccluderId { index: 0, generation: 0 },
            None,
            Rect::new(Vec2::new(-50.0, -10.0), Vec2::new(50.0, 10.0)),
            None,
            0,
        );
        o.facing_segments(light, Vec2::ZERO).collect()
    }

    fn has_point(hits: &[Vec2], p: Vec2) -> bool {
        hits.iter().any(|h| h.distance(p) < 1e-3)
    }

    #[test]
    fn raycast_picks_nearest_segment() {
        let segments = vec![
            Segment::new(Vec2::new(-10.0, 20.0), Vec2::new(10.0, 20.0), None),
            Segment::new(Vec2::new(-10.0, 10.0), Vec2::new(10.0, 10.0), None),
        ];
        let hit = raycast(Vec2::ZERO, Vec2::new(0.0, 100.0), &segments).unwrap();
        assert_eq!(hit.segment, 1);
        assert!((hit.point - Vec2::new(0.0, 10.0)).length() < 1e-4);
        assert!(raycast(Vec2::ZERO, Vec2::new(0.0, -100.0), &segments).is_none());
    }

    #[test]
    fn open_space_yields_the_boundary_square() {
        let input = RaycastInput {
            origin: Vec2::ZERO,
            bounds_offset: Vec2::ZERO,
            bounds_extent: 100.0,
            segments: Vec::new(),
        };
        let outcome = find_raycast_hits(&input).unwrap();
        assert_eq!(outcome.hits.len(), 4);
        for corner in [(100.0, 100.0), (100.0, -100.0), (-100.0, -100.0), (-100.0, 100.0)] {
            assert!(has_point(&outcome.hits, Vec2::new(corner.0, corner.1)));
        }
        assert!(outcome.used.is_empty());
    }

    #[test]
    fn wall_above_light_casts_one_shadow() {
        let light = Vec2::new(0.0, 200.0);
        let input = RaycastInput {
            origin: light,
            bounds_offset: Vec2::ZERO,
            bounds_extent: 300.0,
            segments: wall_segments(light),
        };
        let outcome = find_raycast_hits(&input).unwrap();
        assert_eq!(outcome.hits.len(), 8);
        assert!(has_point(&outcome.hits, Vec2::new(-50.0, 10.0)));
        assert!(has_point(&outcome.hits, Vec2::new(50.0, 10.0)));
        // the far ends of the shadow land on the bottom of the boundary square
        let far: Vec<&Vec2> = outcome.hits.iter().filter(|h| (h.y + 100.0).abs() < 1e-2 && h.x.abs() < 100.0).collect();
        assert_eq!(far.len(), 2);
        assert!(far.iter().all(|h| (h.x.abs() - 79.0).abs() < 3.0));
        assert_eq!(outcome.used.len(), 1);
    }

    #[test]
    fn hits_are_sorted_by_angle() {
        let light = Vec2::new(0.0, 200.0);
        let input = RaycastInput {
            origin: light,
            bounds_offset: Vec2::ZERO,
            bounds_extent: 300.0,
            segments: wall_segments(light),
        };
        let hits = find_raycast_hits(&input).unwrap().hits;
        let angles: Vec<f32> = hits.iter().map(|h| (*h - light).y.atan2((*h - light).x)).collect();
        assert!(angles.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn crossing_segments_are_split() {
        let mut segments = vec![
            Segment::new(Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0), None),
            Segment::new(Vec2::new(0.0, -10.0), Vec2::new(0.0, 10.0), None),
        ];
        split_intersections(&mut segments);
        assert_eq!(segments.len(), 4);
        assert!(segments.iter().filter(|s| s.end == Vec2::ZERO || s.start == Vec2::ZERO).count() == 4);
    }

    #[test]
    fn near_collinear_walls_still_sort() {
        // short walls stacked along almost the same ray from the light
        let segments: Vec<Segment> = (0..40)
            .map(|k| {
                let dir = Vec2::from_angle(k as f32 * 0.6e-6);
                let r = 40.0 + (k % 7) as f32 * 20.0;
                Segment::new(dir * r + dir.perp() * 0.5, dir * (r + 1.0) - dir.perp() * 0.5, None)
            })
            .collect();
        let input = RaycastInput { origin: Vec2::ZERO, bounds_offset: Vec2::ZERO, bounds_extent: 300.0, segments };
        if let Ok(outcome) = find_raycast_hits(&input) {
            assert!(outcome
                .hits
                .windows(2)
                .all(|w| angular_order(Vec2::ZERO, w[0], w[1]) != std::cmp::Ordering::Greater));
        }
    }

    #[test]
    fn non_finite_origin_is_degenerate() {
        let input = RaycastInput {
            origin: Vec2::new(f32::NAN, 0.0),
            bounds_offset: Vec2::ZERO,
            bounds_extent: 100.0,
            segments: Vec::new(),
        };
        assert!(find_raycast_hits(&input).is_err());
    }
}
