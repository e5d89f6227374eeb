use cartograph_types::Box2d;

const DEFAULT_MAX_DEPTH: usize = 8;
const DEFAULT_RATIO: f64 = 0.55;

/// Region quad tree storing items with their bounding boxes.
///
/// Every node covers a part of the tree extent. Child nodes overlap a little (each covers `ratio`
/// of the parent in each direction), so boxes lying on the split lines still go down the tree. An
/// item is stored in the deepest node that fully contains its box. Items that are not contained by
/// the tree extent are stored in the root node.
#[derive(Debug, Clone)]
pub struct QuadTree<T> {
    nodes: Vec<Node<T>>,
    max_depth: usize,
    ratio: f64,
    len: usize,
}

#[derive(Debug, Clone)]
struct Node<T> {
    extent: Box2d,
    children: [Option<usize>; 4],
    items: Vec<(Box2d, T)>,
}

impl<T> Node<T> {
    fn new(extent: Box2d) -> Self {
        Self {
            extent,
            children: [None; 4],
            items: vec![],
        }
    }
}

impl<T> QuadTree<T> {
    /// Creates an empty tree with default depth and split ratio.
    pub fn new(extent: Box2d) -> Self {
        Self::with_params(extent, DEFAULT_MAX_DEPTH, DEFAULT_RATIO)
    }

    /// Creates an empty tree.
    pub fn with_params(extent: Box2d, max_depth: usize, ratio: f64) -> Self {
        Self {
            nodes: vec![Node::new(extent)],
            max_depth,
            ratio: ratio.clamp(0.5, 1.0),
            len: 0,
        }
    }

    /// Extent of the tree.
    pub fn extent(&self) -> Box2d {
        self.nodes[0].extent
    }

    /// Number of items in the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the tree contains no items.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Removes all items.
    pub fn clear(&mut self) {
        let extent = self.extent();
        self.nodes.clear();
        self.nodes.push(Node::new(extent));
        self.len = 0;
    }

    /// Adds an item.
    pub fn insert(&mut self, bbox: Box2d, item: T) {
        let mut node = 0;
        if self.nodes[0].extent.contains(&bbox) {
            for _ in 0..self.max_depth {
                let quadrants = self.quadrants(&self.nodes[node].extent);
                let Some(quadrant) = quadrants.iter().position(|q| q.contains(&bbox)) else {
                    break;
                };

                node = match self.nodes[node].children[quadrant] {
                    Some(child) => child,
                    None => {
                        let child = self.nodes.len();
                        self.nodes.push(Node::new(quadrants[quadrant]));
                        self.nodes[node].children[quadrant] = Some(child);
                        child
                    }
                };
            }
        }

        self.nodes[node].items.push((bbox, item));
        self.len += 1;
    }

    /// Calls `f` for every item which box intersects the given box (touching included). Stops
    /// when `f` returns `false`. Returns `false` if the iteration was stopped.
    pub fn query(&self, bbox: &Box2d, mut f: impl FnMut(&Box2d, &T) -> bool) -> bool {
        let mut stack = vec![0];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            for (item_box, item) in &node.items {
                if item_box.intersects(bbox) && !f(item_box, item) {
                    return false;
                }
            }

            stack.extend(
                node.children
                    .iter()
                    .flatten()
                    .filter(|&&child| self.nodes[child].extent.intersects(bbox)),
            );
        }

        true
    }

    /// Iterates over all items.
    pub fn iter(&self) -> impl Iterator<Item = (&Box2d, &T)> {
        self.nodes
            .iter()
            .flat_map(|node| node.items.iter().map(|(bbox, item)| (bbox, item)))
    }

    fn quadrants(&self, extent: &Box2d) -> [Box2d; 4] {
        let (lox, loy) = (extent.min_x(), extent.min_y());
        let (hix, hiy) = (extent.max_x(), extent.max_y());
        let width = extent.width() * self.ratio;
        let height = extent.height() * self.ratio;

        [
            Box2d::new(lox, loy, lox + width, loy + height),
            Box2d::new(hix - width, loy, hix, loy + height),
            Box2d::new(lox, hiy - height, lox + width, hiy),
            Box2d::new(hix - width, hiy - height, hix, hiy),
        ]
    }

    #[cfg(test)]
    fn depth_of(&self, bbox: &Box2d) -> Option<usize> {
        let mut stack = vec![(0, 0)];
        while let Some((index, depth)) = stack.pop() {
            let node = &self.nodes[index];
            if node.items.iter().any(|(b, _)| b == bbox) {
                return Some(depth);
            }
            stack.extend(node.children.iter().flatten().map(|&c| (c, depth + 1)));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(tree: &QuadTree<u32>, bbox: &Box2d) -> Vec<u32> {
        let mut result = vec![];
        tree.query(bbox, |_, item| {
            result.push(*item);
            true
        });
        result.sort();
        result
    }

    #[test]
    fn query_finds_intersecting_items() {
        let mut tree = QuadTree::new(Box2d::new(0.0, 0.0, 256.0, 256.0));
        tree.insert(Box2d::new(1.0, 1.0, 2.0, 2.0), 1);
        tree.insert(Box2d::new(100.0, 100.0, 150.0, 150.0), 2);
        tree.insert(Box2d::new(250.0, 250.0, 300.0, 300.0), 3);
        tree.insert(Box2d::new(-50.0, -50.0, -40.0, -40.0), 4);

        assert_eq!(tree.len(), 4);
        assert_eq!(collect(&tree, &Box2d::new(0.0, 0.0, 10.0, 10.0)), vec![1]);
        assert_eq!(collect(&tree, &Box2d::new(140.0, 140.0, 260.0, 260.0)), vec![2, 3]);
        assert_eq!(collect(&tree, &Box2d::new(-45.0, -45.0, 0.0, 0.0)), vec![4]);
        assert!(collect(&tree, &Box2d::new(10.0, 10.0, 20.0, 20.0)).is_empty());

        tree.clear();
        assert!(tree.is_empty());
        assert!(collect(&tree, &Box2d::new(0.0, 0.0, 256.0, 256.0)).is_empty());
    }

    #[test]
    fn small_items_go_deep() {
        let mut tree = QuadTree::new(Box2d::new(0.0, 0.0, 1024.0, 1024.0));
        let small = Box2d::new(1.0, 1.0, 2.0, 2.0);
        let big = Box2d::new(100.0, 100.0, 900.0, 900.0);
        tree.insert(small, 1);
        tree.insert(big, 2);

        assert_eq!(tree.depth_of(&small), Some(DEFAULT_MAX_DEPTH));
        assert_eq!(tree.depth_of(&big), Some(0));
    }

    #[test]
    fn query_can_stop_early() {
        let mut tree = QuadTree::new(Box2d::new(0.0, 0.0, 10.0, 10.0));
        for i in 0..5 {
            tree.insert(Box2d::new(0.0, 0.0, 1.0, 1.0), i);
        }

        let mut visited = 0;
        let finished = tree.query(&Box2d::new(0.0, 0.0, 1.0, 1.0), |_, _| {
            visited += 1;
            visited < 2
        });
        assert!(!finished);
        assert_eq!(visited, 2);
    }
}
