//! Page and screen geometry primitives
//!
//! Rectangles use a top-left origin with y growing downwards, matching the
//! pixel space of rendered pages and OCR output.

use serde::{Deserialize, Serialize};

/// A point in page or screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    /// Create a new point
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Calculate distance to another point
    pub fn distance_to(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Axis-aligned rectangle (x, y, width, height).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    /// Create a new rectangle
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a rectangle from its left/top/right/bottom edges
    pub fn from_edges(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self::new(left, top, right - left, bottom - top)
    }

    pub fn left(&self) -> f32 {
        self.x
    }

    pub fn top(&self) -> f32 {
        self.y
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Check if the rectangle has no area
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Check if this rectangle contains a point (edges inclusive)
    pub fn contains(&self, point: &Point) -> bool {
        point.x >= self.left()
            && point.x <= self.right()
            && point.y >= self.top()
            && point.y <= self.bottom()
    }

    /// Euclidean distance from a point to the nearest point of the rectangle.
    ///
    /// Zero when the point lies inside.
    pub fn distance_to_point(&self, point: &Point) -> f32 {
        let nearest = Point::new(
            point.x.clamp(self.left(), self.right().max(self.left())),
            point.y.clamp(self.top(), self.bottom().max(self.top())),
        );
        nearest.distance_to(point)
    }

    /// Smallest rectangle covering both rectangles
    pub fn union(&self, other: &Rect) -> Rect {
        Rect::from_edges(
            self.left().min(other.left()),
            self.top().min(other.top()),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    /// Move the rectangle by an offset
    pub fn translated(&self, dx: f32, dy: f32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Scale position and size by independent factors
    pub fn scaled(&self, sx: f32, sy: f32) -> Rect {
        Rect::new(self.x * sx, self.y * sy, self.width * sx, self.height * sy)
    }
}

/// Quadrilateral as produced by text detectors: four corners, usually in
/// clockwise order starting at the top-left.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Quad {
    pub points: [Point; 4],
}

impl Quad {
    /// Create a quad from four corners
    pub fn new(points: [Point; 4]) -> Self {
        Self { points }
    }

    /// Create an axis-aligned quad covering a rectangle
    pub fn from_rect(rect: &Rect) -> Self {
        Self::new([
            Point::new(rect.left(), rect.top()),
            Point::new(rect.right(), rect.top()),
            Point::new(rect.right(), rect.bottom()),
            Point::new(rect.left(), rect.bottom()),
        ])
    }

    /// Axis-aligned bounding rectangle of the four corners.
    ///
    /// Minimums are floored and maximums ceiled so the rectangle lands on
    /// whole pixels and never clips the detected glyphs.
    pub fn bounding_rect(&self) -> Rect {
        let mut min_x = f32::MAX;
        let mut min_y = f32::MAX;
        let mut max_x = f32::MIN;
        let mut max_y = f32::MIN;

        for point in &self.points {
            min_x = min_x.min(point.x);
            min_y = min_y.min(point.y);
            max_x = max_x.max(point.x);
            max_y = max_y.max(point.y);
        }

        Rect::from_edges(min_x.floor(), min_y.floor(), max_x.ceil(), max_y.ceil())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert_eq!(a.distance_to(&b), 5.0);
    }

    #[test]
    fn test_rect_edges() {
        let rect = Rect::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(rect.left(), 10.0);
        assert_eq!(rect.top(), 20.0);
        assert_eq!(rect.right(), 40.0);
        assert_eq!(rect.bottom(), 60.0);
        assert_eq!(Rect::from_edges(10.0, 20.0, 40.0, 60.0), rect);
    }

    #[test]
    fn test_rect_contains_inclusive() {
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(rect.contains(&Point::new(5.0, 5.0)));
        assert!(rect.contains(&Point::new(10.0, 10.0)));
        assert!(!rect.contains(&Point::new(10.5, 5.0)));
    }

    #[test]
    fn test_distance_inside_is_zero() {
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(rect.distance_to_point(&Point::new(3.0, 7.0)), 0.0);
    }

    #[test]
    fn test_distance_to_edge_and_corner() {
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(rect.distance_to_point(&Point::new(15.0, 5.0)), 5.0);
        assert_eq!(rect.distance_to_point(&Point::new(5.0, -2.0)), 2.0);
        assert_eq!(rect.distance_to_point(&Point::new(13.0, 14.0)), 5.0);
    }

    #[test]
    fn test_union_and_translate() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 5.0, 5.0, 10.0);
        assert_eq!(a.union(&b), Rect::new(0.0, 0.0, 25.0, 15.0));
        assert_eq!(a.translated(2.0, 3.0), Rect::new(2.0, 3.0, 10.0, 10.0));
        assert_eq!(a.scaled(0.5, 2.0), Rect::new(0.0, 0.0, 5.0, 20.0));
    }

    #[test]
    fn test_quad_bounding_rect_floors_and_ceils() {
        let quad = Quad::new([
            Point::new(10.4, 5.6),
            Point::new(99.2, 4.9),
            Point::new(99.7, 25.1),
            Point::new(10.9, 24.3),
        ]);

        let rect = quad.bounding_rect();
        assert_eq!(rect, Rect::from_edges(10.0, 4.0, 100.0, 26.0));
    }

    #[test]
    fn test_quad_from_rect_round_trips_bounds() {
        let rect = Rect::new(1.0, 2.0, 30.0, 4.0);
        assert_eq!(Quad::from_rect(&rect).bounding_rect(), rect);
    }
}
