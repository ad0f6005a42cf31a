//! Geometric primitives for layout analysis.
//!
//! Coordinates are in document units with the origin at the bottom-left of
//! the page, so "top" means the larger y value.

use serde::{Deserialize, Serialize};

/// A 2D point in document space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate
    pub x: f32,
    /// Y coordinate
    pub y: f32,
}

impl Point {
    /// Create a new point.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdf_tabula::geometry::Point;
    ///
    /// let point = Point::new(10.0, 20.0);
    /// assert_eq!(point.x, 10.0);
    /// assert_eq!(point.y, 20.0);
    /// ```
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle given by its lower-left and upper-right corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge
    pub x0: f32,
    /// Bottom edge
    pub y0: f32,
    /// Right edge
    pub x1: f32,
    /// Top edge
    pub y1: f32,
}

impl Rect {
    /// Create a rectangle from two opposite corners, in any order.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdf_tabula::geometry::Rect;
    ///
    /// let rect = Rect::new(110.0, 70.0, 10.0, 20.0);
    /// assert_eq!(rect.x0, 10.0);
    /// assert_eq!(rect.y1, 70.0);
    /// assert_eq!(rect.width(), 100.0);
    /// ```
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Smallest rectangle containing every point.
    ///
    /// Returns `None` for an empty iterator.
    pub fn bounding<I: IntoIterator<Item = Point>>(points: I) -> Option<Rect> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut rect = Rect::new(first.x, first.y, first.x, first.y);
        for p in iter {
            rect.x0 = rect.x0.min(p.x);
            rect.y0 = rect.y0.min(p.y);
            rect.x1 = rect.x1.max(p.x);
            rect.y1 = rect.y1.max(p.y);
        }
        Some(rect)
    }

    /// Width of the rectangle.
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    /// Height of the rectangle.
    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Get the center point of the rectangle.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdf_tabula::geometry::Rect;
    ///
    /// let rect = Rect::new(0.0, 0.0, 100.0, 50.0);
    /// let center = rect.center();
    /// assert_eq!(center.x, 50.0);
    /// assert_eq!(center.y, 25.0);
    /// ```
    pub fn center(&self) -> Point {
        Point::new((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    /// Area of the rectangle.
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Check whether a point lies inside or on the border.
    pub fn contains_point(&self, point: &Point) -> bool {
        point.x >= self.x0 && point.x <= self.x1 && point.y >= self.y0 && point.y <= self.y1
    }

    /// Check whether `other` lies entirely inside this rectangle, allowing
    /// `tolerance` on every side.
    pub fn contains_rect(&self, other: &Rect, tolerance: f32) -> bool {
        other.x0 >= self.x0 - tolerance
            && other.x1 <= self.x1 + tolerance
            && other.y0 >= self.y0 - tolerance
            && other.y1 <= self.y1 + tolerance
    }

    /// Check if this rectangle intersects with another.
    ///
    /// Rectangles that only touch along an edge intersect.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdf_tabula::geometry::Rect;
    ///
    /// let r1 = Rect::new(0.0, 0.0, 100.0, 100.0);
    /// let r2 = Rect::new(50.0, 50.0, 150.0, 150.0);
    /// let r3 = Rect::new(200.0, 200.0, 250.0, 250.0);
    ///
    /// assert!(r1.intersects(&r2));
    /// assert!(!r1.intersects(&r3));
    /// ```
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x0 <= other.x1 && other.x0 <= self.x1 && self.y0 <= other.y1 && other.y0 <= self.y1
    }

    /// Area of the overlap between two rectangles, zero when disjoint.
    pub fn overlap_area(&self, other: &Rect) -> f32 {
        let w = self.x1.min(other.x1) - self.x0.max(other.x0);
        let h = self.y1.min(other.y1) - self.y0.max(other.y0);
        if w <= 0.0 || h <= 0.0 {
            0.0
        } else {
            w * h
        }
    }

    /// Compute the union of two rectangles.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Grow the rectangle by `amount` on every side.
    pub fn expand(&self, amount: f32) -> Rect {
        Rect {
            x0: self.x0 - amount,
            y0: self.y0 - amount,
            x1: self.x1 + amount,
            y1: self.y1 + amount,
        }
    }
}

/// Length of the overlap between the closed intervals `[a0, a1]` and `[b0, b1]`.
pub fn interval_overlap(a0: f32, a1: f32, b0: f32, b1: f32) -> f32 {
    (a1.min(b1) - a0.max(b0)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_corners() {
        let rect = Rect::new(10.0, 50.0, 0.0, 20.0);
        assert_eq!(rect, Rect { x0: 0.0, y0: 20.0, x1: 10.0, y1: 50.0 });
        assert_eq!(rect.height(), 30.0);
    }

    #[test]
    fn test_bounding() {
        let rect = Rect::bounding(vec![
            Point::new(3.0, 4.0),
            Point::new(-1.0, 10.0),
            Point::new(5.0, 0.0),
        ])
        .unwrap();
        assert_eq!(rect, Rect::new(-1.0, 0.0, 5.0, 10.0));
        assert!(Rect::bounding(Vec::new()).is_none());
    }

    #[test]
    fn test_overlap_area() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 20.0, 20.0);
        assert_eq!(a.overlap_area(&b), 25.0);
        let c = Rect::new(10.0, 0.0, 20.0, 10.0);
        assert_eq!(a.overlap_area(&c), 0.0);
    }

    #[test]
    fn test_contains() {
        let outer = Rect::new(0.0, 0.0, 100.0, 100.0);
        assert!(outer.contains_point(&Point::new(100.0, 0.0)));
        assert!(!outer.contains_point(&Point::new(100.1, 0.0)));
        assert!(outer.contains_rect(&Rect::new(-1.0, 0.0, 50.0, 50.0), 2.0));
        assert!(!outer.contains_rect(&Rect::new(-3.0, 0.0, 50.0, 50.0), 2.0));
    }

    #[test]
    fn test_interval_overlap() {
        assert_eq!(interval_overlap(0.0, 10.0, 5.0, 20.0), 5.0);
        assert_eq!(interval_overlap(0.0, 10.0, 11.0, 20.0), 0.0);
    }
}
