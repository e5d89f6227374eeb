//! Collision detection of labels and markers.

mod collision;
mod quad_tree;

pub use collision::{LabelCollisionDetector, PlacedLabel};
pub use quad_tree::QuadTree;
