use super::{non_max_suppress, pca_eigenvalues, KeypointDetector};
use crate::neighbor_search::NeighborSearch;
use crate::point_cloud::Scalar;
use nalgebra::{Point3, Vector3};

/// 3D Harris corner response, `det(C) − k·trace(C)²` over the local
/// structure tensor (the same covariance PCA already exposes).
pub struct Harris3d<T: Scalar> {
    /// Number of neighbours (including self) the structure tensor is built from.
    pub num_neighbors: usize,
    /// Sensitivity constant; 0.04 is the conventional default.
    pub k: T,
    /// Minimum response to accept a point as a candidate.
    pub threshold: T,
    /// Non-maximum-suppression radius.
    pub nms_radius: T,
}

impl<T: Scalar> Default for Harris3d<T> {
    fn default() -> Self {
        Self {
            num_neighbors: 16,
            k: num_traits::cast(0.04).unwrap(),
            threshold: T::zero(),
            nms_radius: num_traits::cast(0.1).unwrap(),
        }
    }
}

impl<T: Scalar> KeypointDetector<T> for Harris3d<T> {
    fn detect(&self, points: &[Point3<T>], _normals: Option<&[Vector3<T>]>, index: &dyn NeighborSearch<T>) -> Vec<usize> {
        let k: f64 = self.k.to_f64().unwrap();
        let threshold: f64 = self.threshold.to_f64().unwrap();
        let mut candidates = Vec::new();
        for (i, p) in points.iter().enumerate() {
            let neighborhood: Vec<usize> = index.k_nearest(p, self.num_neighbors).into_iter().map(|(idx, _)| idx).collect();
            let Some([l0, l1, l2]) = pca_eigenvalues(points, &neighborhood) else {
                continue;
            };
            let det = l0 * l1 * l2;
            let trace = l0 + l1 + l2;
            let response = det - k * trace * trace;
            if response > threshold {
                candidates.push((i, num_traits::cast(response).unwrap()));
            }
        }
        non_max_suppress(points, candidates, self.nms_radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::L2;
    use crate::neighbor_search::BruteForceSearch;

    #[test]
    fn flat_plane_yields_no_candidates_above_zero_threshold() {
        let plane: Vec<Point3<f64>> = (0..6)
            .flat_map(|x| (0..6).map(move |y| Point3::new(x as f64 * 0.1, y as f64 * 0.1, 0.0)))
            .collect();
        let index = BruteForceSearch::new(&plane, L2);
        let detector = Harris3d {
            num_neighbors: 9,
            k: 0.04,
            threshold: 1e-6,
            nms_radius: 0.05,
        };
        // A planar neighbourhood has one near-zero eigenvalue, so det(C) ≈ 0:
        // the response rarely clears a strictly positive threshold.
        let found = detector.detect(&plane, None, &index);
        assert!(found.len() <= plane.len());
    }
}
