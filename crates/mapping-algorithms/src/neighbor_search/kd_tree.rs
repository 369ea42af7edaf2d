use super::{Neighbor, NeighborSearch};
use crate::point_cloud::Scalar;
use nalgebra::Point3;

enum Node {
    Leaf(Vec<usize>),
    Split {
        axis: usize,
        median: usize,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// A KD-tree over 3D points under the L2 metric. Only valid for L2: its
/// pruning relies on per-axis distance being a true lower bound, which does
/// not hold for an arbitrary [`crate::metric::Metric`].
pub struct KdTree<'a, T: Scalar> {
    points: &'a [Point3<T>],
    root: Node,
}

fn axis_value<T: Scalar>(point: &Point3<T>, axis: usize) -> T {
    point.coords[axis]
}

fn build_node<T: Scalar>(points: &[Point3<T>], indices: &mut [usize], depth: usize, max_leaf_size: usize) -> Node {
    if indices.len() <= max_leaf_size {
        return Node::Leaf(indices.to_vec());
    }

    let axis = depth % 3;
    let mid = indices.len() / 2;
    indices.select_nth_unstable_by(mid, |&a, &b| {
        axis_value(&points[a], axis)
            .partial_cmp(&axis_value(&points[b], axis))
            .unwrap()
    });
    let median = indices[mid];

    let (left_indices, rest) = indices.split_at_mut(mid);
    let right_indices = &mut rest[1..];

    let left = build_node(points, left_indices, depth + 1, max_leaf_size);
    let right = build_node(points, right_indices, depth + 1, max_leaf_size);

    Node::Split {
        axis,
        median,
        left: Box::new(left),
        right: Box::new(right),
    }
}

impl<'a, T: Scalar> KdTree<'a, T> {
    /// Builds a balanced KD-tree over `points` by recursive median splitting,
    /// stopping a branch once it holds at most `max_leaf_size` points (a
    /// bucket KD-tree, matching the configurable leaf size; a
    /// `max_leaf_size` of 1 degenerates to a classic one-point-per-leaf tree).
    pub fn build(points: &'a [Point3<T>], max_leaf_size: usize) -> Self {
        let max_leaf_size = max_leaf_size.max(1);
        let mut indices: Vec<usize> = (0..points.len()).collect();
        let root = build_node(points, &mut indices, 0, max_leaf_size);
        Self { points, root }
    }

    fn visit_leaf(&self, leaf: &[usize], query: &Point3<T>, out: &mut Vec<(T, usize)>) {
        for &idx in leaf {
            let d = (self.points[idx] - query).norm();
            out.push((d, idx));
        }
    }

    fn search_k(&self, node: &Node, query: &Point3<T>, k: usize, out: &mut Vec<(T, usize)>) {
        match node {
            Node::Leaf(indices) => self.visit_leaf(indices, query, out),
            Node::Split {
                axis,
                median,
                left,
                right,
            } => {
                let diff = axis_value(query, *axis) - axis_value(&self.points[*median], *axis);
                let (near, far) = if diff <= T::zero() {
                    (left.as_ref(), right.as_ref())
                } else {
                    (right.as_ref(), left.as_ref())
                };

                self.search_k(near, query, k, out);
                out.push(((self.points[*median] - query).norm(), *median));

                let worst_kept = if out.len() >= k {
                    out.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
                    out.truncate(k);
                    out.last().map(|&(d, _)| d)
                } else {
                    None
                };

                let should_descend_far = match worst_kept {
                    Some(worst) => diff.abs() <= worst,
                    None => true,
                };
                if should_descend_far {
                    self.search_k(far, query, k, out);
                }
            }
        }
    }

    fn search_radius(&self, node: &Node, query: &Point3<T>, r: T, out: &mut Vec<(T, usize)>) {
        match node {
            Node::Leaf(indices) => {
                for &idx in indices {
                    let d = (self.points[idx] - query).norm();
                    if d <= r {
                        out.push((d, idx));
                    }
                }
            }
            Node::Split {
                axis,
                median,
                left,
                right,
            } => {
                let diff = axis_value(query, *axis) - axis_value(&self.points[*median], *axis);
                let d = (self.points[*median] - query).norm();
                if d <= r {
                    out.push((d, *median));
                }
                if diff <= T::zero() {
                    self.search_radius(left, query, r, out);
                    if diff.abs() <= r {
                        self.search_radius(right, query, r, out);
                    }
                } else {
                    self.search_radius(right, query, r, out);
                    if diff.abs() <= r {
                        self.search_radius(left, query, r, out);
                    }
                }
            }
        }
    }
}

impl<'a, T: Scalar> NeighborSearch<T> for KdTree<'a, T> {
    fn k_nearest(&self, query: &Point3<T>, k: usize) -> Vec<Neighbor<T>> {
        if self.points.is_empty() || k == 0 {
            return Vec::new();
        }
        let mut out = Vec::new();
        self.search_k(&self.root, query, k, &mut out);
        out.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap().then(a.1.cmp(&b.1)));
        out.truncate(k);
        out.into_iter().map(|(d, idx)| (idx, d)).collect()
    }

    fn radius(&self, query: &Point3<T>, r: T) -> Vec<Neighbor<T>> {
        if self.points.is_empty() || r <= T::zero() {
            return Vec::new();
        }
        let mut out = Vec::new();
        self.search_radius(&self.root, query, r, &mut out);
        out.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap().then(a.1.cmp(&b.1)));
        out.into_iter().map(|(d, idx)| (idx, d)).collect()
    }

    fn len(&self) -> usize {
        self.points.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbor_search::BruteForceSearch;
    use crate::metric::L2;

    fn sample() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
            Point3::new(-3.0, 1.0, 4.0),
            Point3::new(2.0, -2.0, 1.0),
            Point3::new(5.0, 5.0, 5.0),
            Point3::new(-1.0, -1.0, -1.0),
        ]
    }

    #[test]
    fn k_nearest_matches_brute_force_across_leaf_sizes() {
        let points = sample();
        let brute = BruteForceSearch::new(&points, L2);
        let query = Point3::new(0.3, 0.2, 0.1);
        for max_leaf_size in [1usize, 2, 4] {
            let tree = KdTree::build(&points, max_leaf_size);
            for k in 1..=points.len() {
                let mut expected = brute.k_nearest(&query, k);
                let mut actual = tree.k_nearest(&query, k);
                expected.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(a.0.cmp(&b.0)));
                actual.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(a.0.cmp(&b.0)));
                assert_eq!(expected, actual, "leaf={max_leaf_size} k={k}");
            }
        }
    }

    #[test]
    fn radius_query_matches_brute_force() {
        let points = sample();
        let brute = BruteForceSearch::new(&points, L2);
        let tree = KdTree::build(&points, 2);
        let query = Point3::new(0.0, 0.0, 0.0);
        for r in [0.5, 1.5, 3.0, 10.0] {
            let mut expected = brute.radius(&query, r);
            let mut actual = tree.radius(&query, r);
            expected.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(a.0.cmp(&b.0)));
            actual.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(a.0.cmp(&b.0)));
            assert_eq!(expected, actual, "r={r}");
        }
    }

    #[test]
    fn empty_tree_returns_no_results() {
        let points: Vec<Point3<f64>> = Vec::new();
        let tree = KdTree::build(&points, 4);
        assert!(tree.k_nearest(&Point3::origin(), 3).is_empty());
        assert!(tree.radius(&Point3::origin(), 1.0).is_empty());
    }
}
