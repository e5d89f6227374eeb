//! Orientation of point triplets and rings.

use crate::Point2d;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Orientation of a triplet of points (or a ring) in a Y-up coordinate system.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Orientation {
    /// Clockwise
    Clockwise,
    /// Counterclockwise
    Counterclockwise,
    /// Collinear
    Collinear,
}

impl Orientation {
    /// Determines orientation of a triplet of points.
    pub fn triplet(p: &Point2d, q: &Point2d, r: &Point2d) -> Self {
        let v = (q.y - p.y) * (r.x - q.x) - (q.x - p.x) * (r.y - q.y);
        if v > 0.0 {
            Self::Clockwise
        } else if v < 0.0 {
            Self::Counterclockwise
        } else {
            Self::Collinear
        }
    }

    /// Opposite orientation. Collinear stays collinear.
    pub fn reverse(self) -> Self {
        match self {
            Self::Clockwise => Self::Counterclockwise,
            Self::Counterclockwise => Self::Clockwise,
            Self::Collinear => Self::Collinear,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triplet() {
        let a = Point2d::new(0.0, 0.0);
        let b = Point2d::new(1.0, 0.0);
        let c = Point2d::new(1.0, 1.0);
        assert_eq!(Orientation::triplet(&a, &b, &c), Orientation::Counterclockwise);
        assert_eq!(Orientation::triplet(&c, &b, &a), Orientation::Clockwise);
        assert_eq!(
            Orientation::triplet(&a, &b, &Point2d::new(2.0, 0.0)),
            Orientation::Collinear
        );
    }
}
