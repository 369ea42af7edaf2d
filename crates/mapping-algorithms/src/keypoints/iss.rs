use super::{non_max_suppress, pca_eigenvalues, KeypointDetector};
use crate::neighbor_search::NeighborSearch;
use crate::point_cloud::Scalar;
use nalgebra::{Point3, Vector3};

/// Intrinsic Shape Signatures: accepts points whose two smallest-eigenvalue
/// ratios both clear a cascaded threshold. Ascending
/// eigenvalues `l0 <= l1 <= l2`; `gamma_21 = l1 / l0` and `gamma_32 = l2 / l1`
/// must both exceed their threshold for the point to survive.
pub struct Iss<T: Scalar> {
    /// Number of neighbours (including self) PCA is computed over.
    pub num_neighbors: usize,
    /// Minimum value of `l1 / l0`.
    pub gamma_21: T,
    /// Minimum value of `l2 / l1`.
    pub gamma_32: T,
    /// Non-maximum-suppression radius.
    pub nms_radius: T,
}

impl<T: Scalar> KeypointDetector<T> for Iss<T> {
    fn detect(&self, points: &[Point3<T>], _normals: Option<&[Vector3<T>]>, index: &dyn NeighborSearch<T>) -> Vec<usize> {
        let gamma_21: f64 = self.gamma_21.to_f64().unwrap();
        let gamma_32: f64 = self.gamma_32.to_f64().unwrap();
        let mut candidates = Vec::new();
        for (i, p) in points.iter().enumerate() {
            let neighborhood: Vec<usize> = index.k_nearest(p, self.num_neighbors).into_iter().map(|(idx, _)| idx).collect();
            let Some([l0, l1, l2]) = pca_eigenvalues(points, &neighborhood) else {
                continue;
            };
            if l0 <= 0.0 || l1 <= 0.0 {
                continue;
            }
            let ratio_21 = l1 / l0;
            let ratio_32 = l2 / l1;
            if ratio_21 > gamma_21 && ratio_32 > gamma_32 {
                candidates.push((i, num_traits::cast(ratio_21 * ratio_32).unwrap()));
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
    fn tight_thresholds_reject_every_point_on_a_flat_plane() {
        let plane: Vec<Point3<f64>> = (0..6)
            .flat_map(|x| (0..6).map(move |y| Point3::new(x as f64 * 0.1, y as f64 * 0.1, 0.0)))
            .collect();
        let index = BruteForceSearch::new(&plane, L2);
        let detector = Iss {
            num_neighbors: 9,
            gamma_21: 10.0,
            gamma_32: 10.0,
            nms_radius: 0.05,
        };
        assert!(detector.detect(&plane, None, &index).is_empty());
    }
}
