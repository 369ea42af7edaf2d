use super::{non_max_suppress, pca_eigenvalues, KeypointDetector};
use crate::neighbor_search::NeighborSearch;
use crate::point_cloud::Scalar;
use nalgebra::{Point3, Vector3};

/// Flags points whose principal-curvature magnitude, `λ0 / (λ0 + λ1 + λ2)`
/// over ascending PCA eigenvalues of the local neighbourhood, exceeds a
/// threshold.
pub struct Curvature<T: Scalar> {
    /// Number of neighbours (including self) PCA is computed over.
    pub num_neighbors: usize,
    /// Minimum curvature response to accept a point as a keypoint candidate.
    pub threshold: T,
    /// Non-maximum-suppression radius applied to accepted candidates.
    pub nms_radius: T,
}

impl<T: Scalar> KeypointDetector<T> for Curvature<T> {
    fn detect(&self, points: &[Point3<T>], _normals: Option<&[Vector3<T>]>, index: &dyn NeighborSearch<T>) -> Vec<usize> {
        let threshold: f64 = self.threshold.to_f64().unwrap();
        let mut candidates = Vec::new();
        for (i, p) in points.iter().enumerate() {
            let neighborhood: Vec<usize> = index.k_nearest(p, self.num_neighbors).into_iter().map(|(idx, _)| idx).collect();
            let Some([l0, l1, l2]) = pca_eigenvalues(points, &neighborhood) else {
                continue;
            };
            let sum = l0 + l1 + l2;
            if sum <= 0.0 {
                continue;
            }
            let response = l0 / sum;
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
    fn a_sharp_corner_has_higher_response_than_a_flat_plane() {
        let plane: Vec<Point3<f64>> = (0..5)
            .flat_map(|x| (0..5).map(move |y| Point3::new(x as f64 * 0.1, y as f64 * 0.1, 0.0)))
            .collect();
        let index = BruteForceSearch::new(&plane, L2);
        let detector = Curvature {
            num_neighbors: 8,
            threshold: 0.0,
            nms_radius: 0.01,
        };
        let flat_found = detector.detect(&plane, None, &index);

        let mut corner = plane.clone();
        corner[12].z = 1.0;
        let index2 = BruteForceSearch::new(&corner, L2);
        let detector2 = Curvature {
            num_neighbors: 8,
            threshold: 0.05,
            nms_radius: 0.01,
        };
        let corner_found = detector2.detect(&corner, None, &index2);

        assert!(flat_found.len() <= corner_found.len() || corner_found.contains(&12));
    }
}
