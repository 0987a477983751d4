// src/geometry.rs

use std::cmp::Ordering;

use glam::Vec2;

/// Axis-aligned bounds in some vessel's local space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn from_pos_size(pos: Vec2, size: Vec2) -> Self {
        Self::new(pos, pos + size)
    }

    pub fn from_center(center: Vec2, half_extents: Vec2) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    pub fn from_points(points: &[Vec2]) -> Self {
        let mut min = Vec2::splat(f32::MAX);
        let mut max = Vec2::splat(f32::MIN);
        for p in points {
            min = min.min(*p);
            max = max.max(*p);
        }
        if points.is_empty() {
            return Self::new(Vec2::ZERO, Vec2::ZERO);
        }
        Self { min, max }
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        if !self.intersects(other) {
            return None;
        }
        Some(Rect {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        })
    }

    pub fn inflate(&self, amount: f32) -> Rect {
        Rect::new(self.min - Vec2::splat(amount), self.max + Vec2::splat(amount))
    }

    pub fn translate(&self, offset: Vec2) -> Rect {
        Rect {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// Distance from `point` to the closest point of the rectangle (0 inside).
    pub fn distance_to_point(&self, point: Vec2) -> f32 {
        let clamped = point.clamp(self.min, self.max);
        clamped.distance(point)
    }

    /// Corners in counter-clockwise order (y up), starting at `min`.
    pub fn corners(&self) -> [Vec2; 4] {
        [
            self.min,
            Vec2::new(self.max.x, self.min.y),
            self.max,
            Vec2::new(self.min.x, self.max.y),
        ]
    }
}

pub fn circle_intersects_rect(center: Vec2, radius: f32, rect: &Rect) -> bool {
    let closest = center.clamp(rect.min, rect.max);
    closest.distance_squared(center) <= radius * radius
}

pub fn rotate_about(point: Vec2, pivot: Vec2, angle: f32) -> Vec2 {
    let rotation = Vec2::from_angle(angle);
    pivot + rotation.rotate(point - pivot)
}

/// Total order of points by angle around `center`, ties broken by distance
/// and then by coordinates.
///
/// Every key is compared exactly (`total_cmp`), so the order stays transitive
/// for near-collinear clusters and non-finite input cannot make a sort panic.
pub fn angular_order(center: Vec2, a: Vec2, b: Vec2) -> Ordering {
    let da = a - center;
    let db = b - center;
    da.y.atan2(da.x)
        .total_cmp(&db.y.atan2(db.x))
        .then_with(|| da.length_squared().total_cmp(&db.length_squared()))
        .then_with(|| a.x.total_cmp(&b.x))
        .then_with(|| a.y.total_cmp(&b.y))
}

/// Removes points that are within `tolerance` of an earlier kept point on both axes.
pub fn dedup_close_points(points: &mut Vec<Vec2>, tolerance: f32) {
    let mut kept: Vec<Vec2> = Vec::with_capacity(points.len());
    for p in points.iter() {
        let duplicate = kept
            .iter()
            .any(|k| (k.x - p.x).abs() < tolerance && (k.y - p.y).abs() < tolerance);
        if !duplicate {
            kept.push(*p);
        }
    }
    *points = kept;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_normalizes_corners() {
        let r = Rect::new(Vec2::new(10.0, 5.0), Vec2::new(-10.0, -5.0));
        assert_eq!(r.min, Vec2::new(-10.0, -5.0));
        assert_eq!(r.max, Vec2::new(10.0, 5.0));
        assert_eq!(r.area(), 200.0);
    }

    #[test]
    fn circle_rect_overlap() {
        let r = Rect::new(Vec2::ZERO, Vec2::new(10.0, 10.0));
        assert!(circle_intersects_rect(Vec2::new(15.0, 5.0), 5.5, &r));
        assert!(!circle_intersects_rect(Vec2::new(15.0, 15.0), 6.0, &r));
        assert!(circle_intersects_rect(Vec2::new(5.0, 5.0), 0.1, &r));
    }

    #[test]
    fn rotate_quarter_turn() {
        let p = rotate_about(Vec2::new(2.0, 1.0), Vec2::new(1.0, 1.0), std::f32::consts::FRAC_PI_2);
        assert!((p - Vec2::new(1.0, 2.0)).length() < 1e-5);
    }

    #[test]
    fn angular_order_is_transitive_for_collinear_points() {
        let center = Vec2::ZERO;
        let mut points = vec![
            Vec2::new(3.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(-1.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(0.0, 1.0),
        ];
        points.sort_by(|a, b| angular_order(center, *a, *b));
        assert_eq!(points[0], Vec2::new(1.0, 0.0));
        assert_eq!(points[1], Vec2::new(2.0, 0.0));
        assert_eq!(points[2], Vec2::new(3.0, 0.0));
        assert_eq!(points[3], Vec2::new(0.0, 1.0));
        assert_eq!(points[4], Vec2::new(-1.0, 0.0));
    }

    #[test]
    fn angular_order_survives_near_collinear_clusters() {
        let center = Vec2::ZERO;
        let at = |angle: f32, radius: f32| Vec2::new(angle.cos(), angle.sin()) * radius;

        // three points a few micro-radians apart must still order consistently
        let (a, b, d) = (at(0.0, 300.0), at(0.9e-6, 200.0), at(1.8e-6, 100.0));
        let ab = angular_order(center, a, b);
        let bd = angular_order(center, b, d);
        let ad = angular_order(center, a, d);
        if ab == bd {
            assert_eq!(ad, ab);
        }

        let mut points: Vec<Vec2> = (0..40)
            .flat_map(|cluster| {
                (0..10).map(move |i| at(cluster as f32 * 0.6e-6 + i as f32 * 0.1e-6, 100.0 + (i * 37 % 10) as f32 * 20.0))
            })
            .collect();
        points.reverse();
        points.sort_by(|p, q| angular_order(center, *p, *q));
        assert!(points
            .windows(2)
            .all(|w| angular_order(center, w[0], w[1]) != Ordering::Greater));
    }

    #[test]
    fn dedup_keeps_first_of_cluster() {
        let mut points = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(3.0, 2.0),
            Vec2::new(10.0, 0.0),
            Vec2::new(0.5, -5.5),
        ];
        dedup_close_points(&mut points, 6.0);
        assert_eq!(points, vec![Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0)]);
    }
}
