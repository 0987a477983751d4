// src/intersection.rs

use glam::Vec2;

const PARALLEL_EPSILON: f32 = 1e-10;

#[inline(always)]
fn cross(a: Vec2, b: Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

/// Intersection of the two infinite lines through `a1-a2` and `b1-b2`.
pub fn line_intersection(a1: Vec2, a2: Vec2, b1: Vec2, b2: Vec2) -> Option<Vec2> {
    let da = a2 - a1;
    let db = b2 - b1;
    let denominator = cross(da, db);
    if denominator.abs() < PARALLEL_EPSILON {
        return None;
    }
    let t = cross(b1 - a1, db) / denominator;
    Some(a1 + da * t)
}

/// Intersection of the closed segments `a1-a2` and `b1-b2`.
pub fn segment_intersection(a1: Vec2, a2: Vec2, b1: Vec2, b2: Vec2) -> Option<Vec2> {
    let da = a2 - a1;
    let db = b2 - b1;
    let denominator = cross(da, db);
    if denominator.abs() < PARALLEL_EPSILON {
        return None;
    }
    let diff = b1 - a1;
    let t = cross(diff, db) / denominator;
    let u = cross(diff, da) / denominator;
    if !(0.0..=1.0).contains(&t) || !(0.0..=1.0).contains(&u) {
        return None;
    }
    Some(a1 + da * t)
}

/// Fast path for `a1-a2` against a segment `b1-b2` lying on a horizontal or vertical line.
pub fn axis_aligned_intersection(
    a1: Vec2,
    a2: Vec2,
    b1: Vec2,
    b2: Vec2,
    b_is_horizontal: bool,
) -> Option<Vec2> {
    if b_is_horizontal {
        let y = b1.y;
        if (a1.y - y) * (a2.y - y) > 0.0 || (a2.y - a1.y).abs() < PARALLEL_EPSILON {
            return None;
        }
        let t = (y - a1.y) / (a2.y - a1.y);
        let x = a1.x + (a2.x - a1.x) * t;
        if x < b1.x.min(b2.x) || x > b1.x.max(b2.x) {
            return None;
        }
        Some(Vec2::new(x, y))
    } else {
        let x = b1.x;
        if (a1.x - x) * (a2.x - x) > 0.0 || (a2.x - a1.x).abs() < PARALLEL_EPSILON {
            return None;
        }
        let t = (x - a1.x) / (a2.x - a1.x);
        let y = a1.y + (a2.y - a1.y) * t;
        if y < b1.y.min(b2.y) || y > b1.y.max(b2.y) {
            return None;
        }
        Some(Vec2::new(x, y))
    }
}

pub fn segments_cross(a1: Vec2, a2: Vec2, b1: Vec2, b2: Vec2) -> bool {
    segment_intersection(a1, a2, b1, b2).is_some()
}

pub fn closest_point_on_segment(a: Vec2, b: Vec2, point: Vec2) -> Vec2 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq < PARALLEL_EPSILON {
        return a;
    }
    let t = ((point - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

pub fn segment_point_distance_squared(a: Vec2, b: Vec2, point: Vec2) -> f32 {
    closest_point_on_segment(a, b, point).distance_squared(point)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossing_segments() {
        let hit = segment_intersection(
            Vec2::new(-1.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, -1.0),
            Vec2::new(0.0, 1.0),
        );
        assert_eq!(hit, Some(Vec2::ZERO));
    }

    #[test]
    fn disjoint_segments_do_not_cross_but_lines_do() {
        let (a1, a2) = (Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0));
        let (b1, b2) = (Vec2::new(5.0, -1.0), Vec2::new(5.0, 1.0));
        assert!(segment_intersection(a1, a2, b1, b2).is_none());
        let on_line = line_intersection(a1, a2, b1, b2).unwrap();
        assert!((on_line - Vec2::new(5.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn parallel_lines_never_intersect() {
        assert!(line_intersection(Vec2::ZERO, Vec2::X, Vec2::Y, Vec2::new(1.0, 1.0)).is_none());
    }

    #[test]
    fn axis_aligned_matches_general_case() {
        let a1 = Vec2::new(-3.0, -4.0);
        let a2 = Vec2::new(5.0, 6.0);
        let b1 = Vec2::new(-10.0, 1.0);
        let b2 = Vec2::new(10.0, 1.0);
        let fast = axis_aligned_intersection(a1, a2, b1, b2, true).unwrap();
        let general = segment_intersection(a1, a2, b1, b2).unwrap();
        assert!((fast - general).length() < 1e-4);

        let c1 = Vec2::new(2.0, -10.0);
        let c2 = Vec2::new(2.0, 10.0);
        let fast = axis_aligned_intersection(a1, a2, c1, c2, false).unwrap();
        let general = segment_intersection(a1, a2, c1, c2).unwrap();
        assert!((fast - general).length() < 1e-4);
    }

    #[test]
    fn closest_point_clamps_to_endpoints() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, 0.0);
        assert_eq!(closest_point_on_segment(a, b, Vec2::new(-5.0, 3.0)), a);
        assert_eq!(closest_point_on_segment(a, b, Vec2::new(4.0, 3.0)), Vec2::new(4.0, 0.0));
        assert_eq!(segment_point_distance_squared(a, b, Vec2::new(12.0, 0.0)), 4.0);
    }
}
