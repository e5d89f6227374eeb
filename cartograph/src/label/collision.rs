use cartograph_types::Box2d;

use super::quad_tree::QuadTree;

/// Box registered in the collision detector.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLabel {
    /// Occupied area.
    pub bbox: Box2d,
    /// Repeat key, usually the text of the label.
    pub key: Option<String>,
}

/// Set of boxes occupied by the labels and markers placed so far.
///
/// Two boxes collide only if their interiors overlap, touching boxes don't. The detector covers the
/// whole rendered image (plus a buffer), but boxes outside of the extent are handled too: the
/// `avoid_edges` policy is a separate check done by the placement finders.
///
/// The detector lives for one render request. It is not synchronized, each concurrent render must
/// use its own detector.
#[derive(Debug, Clone)]
pub struct LabelCollisionDetector {
    tree: QuadTree<PlacedLabel>,
}

impl LabelCollisionDetector {
    /// Creates an empty detector.
    pub fn new(extent: Box2d) -> Self {
        Self {
            tree: QuadTree::new(extent),
        }
    }

    /// Extent of the detector.
    pub fn extent(&self) -> Box2d {
        self.tree.extent()
    }

    /// Returns true if the box doesn't overlap any registered box.
    pub fn has_placement(&self, bbox: &Box2d) -> bool {
        self.tree.query(bbox, |placed, _| !placed.overlaps(bbox))
    }

    /// Returns true if the box grown by `margin` doesn't overlap any registered box.
    pub fn has_placement_with_margin(&self, bbox: &Box2d, margin: f64) -> bool {
        if margin > 0.0 {
            self.has_placement(&bbox.pad(margin))
        } else {
            self.has_placement(bbox)
        }
    }

    /// Same as [`has_placement_with_margin`](Self::has_placement_with_margin), and additionally
    /// returns false if a box with the same `key` lies closer than `repeat_distance`.
    pub fn has_placement_with_repeat(
        &self,
        bbox: &Box2d,
        margin: f64,
        key: &str,
        repeat_distance: f64,
    ) -> bool {
        if repeat_distance <= 0.0 {
            return self.has_placement_with_margin(bbox, margin);
        }

        let margin_box = if margin > 0.0 { bbox.pad(margin) } else { *bbox };
        let repeat_box = bbox.pad(repeat_distance);
        let query_box = margin_box.merge(&repeat_box);

        self.tree.query(&query_box, |placed, label| {
            if placed.overlaps(&margin_box) {
                return false;
            }

            label.key.as_deref() != Some(key) || !placed.overlaps(&repeat_box)
        })
    }

    /// Placement check for point symbols: the box grown by `distance` must not overlap any
    /// registered box.
    pub fn has_point_placement(&self, bbox: &Box2d, distance: f64) -> bool {
        self.has_placement_with_margin(bbox, distance)
    }

    /// Registers a box.
    pub fn insert(&mut self, bbox: Box2d) {
        self.tree.insert(bbox, PlacedLabel { bbox, key: None });
    }

    /// Registers a box together with its repeat key.
    pub fn insert_with_key(&mut self, bbox: Box2d, key: impl Into<String>) {
        self.tree.insert(
            bbox,
            PlacedLabel {
                bbox,
                key: Some(key.into()),
            },
        );
    }

    /// Removes all registered boxes.
    pub fn clear(&mut self) {
        log::debug!("Clearing {} labels from the collision detector", self.tree.len());
        self.tree.clear();
    }

    /// Number of registered boxes.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns true if no box is registered.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// All registered boxes.
    pub fn boxes(&self) -> impl Iterator<Item = &PlacedLabel> {
        self.tree.iter().map(|(_, label)| label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> LabelCollisionDetector {
        LabelCollisionDetector::new(Box2d::new(0.0, 0.0, 256.0, 256.0))
    }

    #[test]
    fn overlapping_boxes_are_rejected() {
        let mut detector = detector();
        let boxes = [
            Box2d::new(10.0, 10.0, 20.0, 20.0),
            Box2d::new(30.0, 10.0, 40.0, 20.0),
            Box2d::new(200.0, 200.0, 300.0, 300.0),
        ];
        for bbox in boxes {
            assert!(detector.has_placement(&bbox));
            detector.insert(bbox);
        }

        for bbox in &boxes {
            assert!(!detector.has_placement(bbox));
        }
        assert!(!detector.has_placement(&Box2d::new(15.0, 15.0, 35.0, 16.0)));
        assert!(!detector.has_placement(&Box2d::new(290.0, 290.0, 310.0, 310.0)));
        assert!(detector.has_placement(&Box2d::new(21.0, 10.0, 29.0, 20.0)));
        assert_eq!(detector.boxes().count(), 3);
    }

    #[test]
    fn touching_boxes_do_not_collide() {
        let mut detector = detector();
        detector.insert(Box2d::new(10.0, 10.0, 20.0, 20.0));
        assert!(detector.has_placement(&Box2d::new(20.0, 10.0, 30.0, 20.0)));
        assert!(!detector.has_placement_with_margin(&Box2d::new(20.0, 10.0, 30.0, 20.0), 1.0));
    }

    #[test]
    fn repeat_distance_applies_to_same_key_only() {
        let mut detector = detector();
        detector.insert_with_key(Box2d::new(10.0, 10.0, 20.0, 14.0), "Main St");

        let nearby = Box2d::new(40.0, 10.0, 50.0, 14.0);
        assert!(detector.has_placement(&nearby));
        assert!(!detector.has_placement_with_repeat(&nearby, 0.0, "Main St", 50.0));
        assert!(detector.has_placement_with_repeat(&nearby, 0.0, "High St", 50.0));
        assert!(detector.has_placement_with_repeat(&nearby, 0.0, "Main St", 10.0));

        let far = Box2d::new(100.0, 10.0, 110.0, 14.0);
        assert!(detector.has_placement_with_repeat(&far, 0.0, "Main St", 50.0));
    }

    #[test]
    fn clear_removes_everything() {
        let mut detector = detector();
        detector.insert(Box2d::new(0.0, 0.0, 10.0, 10.0));
        assert!(!detector.is_empty());
        detector.clear();
        assert!(detector.is_empty());
        assert!(detector.has_placement(&Box2d::new(0.0, 0.0, 10.0, 10.0)));
        assert_eq!(detector.extent(), Box2d::new(0.0, 0.0, 256.0, 256.0));
    }
}
