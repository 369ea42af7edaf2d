use super::{non_max_suppress, KeypointDetector};
use crate::neighbor_search::NeighborSearch;
use crate::point_cloud::Scalar;
use nalgebra::{Point3, Vector3};

/// SUSAN ("Smallest Univalue Segment Assimilating Nucleus"): counts
/// neighbours whose normal agrees with the centre point's within
/// `angle_threshold`, and accepts points whose count falls below
/// `similarity_fraction` of the neighbourhood — few similar neighbours means
/// a corner. Requires normals.
pub struct Susan<T: Scalar> {
    /// Search radius defining the local neighbourhood.
    pub radius: T,
    /// Maximum angle (radians) between two normals to count as "similar".
    pub angle_threshold: T,
    /// Fraction of the neighbourhood that must be dissimilar for a point to
    /// be accepted as a corner (the "USAN" fraction, lower means sharper).
    pub similarity_fraction: T,
    /// Non-maximum-suppression radius.
    pub nms_radius: T,
}

impl<T: Scalar> KeypointDetector<T> for Susan<T> {
    fn detect(&self, points: &[Point3<T>], normals: Option<&[Vector3<T>]>, index: &dyn NeighborSearch<T>) -> Vec<usize> {
        let Some(normals) = normals else {
            return Vec::new();
        };
        let cos_threshold = self.angle_threshold.cos();
        let fraction: f64 = self.similarity_fraction.to_f64().unwrap();
        let mut candidates = Vec::new();
        for (i, p) in points.iter().enumerate() {
            let neighbors = index.radius(p, self.radius);
            if neighbors.is_empty() {
                continue;
            }
            let center_normal = normals[i];
            let similar = neighbors
                .iter()
                .filter(|&&(idx, _)| idx != i && normals[idx].dot(&center_normal) >= cos_threshold)
                .count();
            let usan_fraction = similar as f64 / neighbors.len() as f64;
            if usan_fraction < fraction {
                // Lower similarity fraction means a sharper corner: rank by scarcity.
                candidates.push((i, num_traits::cast(1.0 - usan_fraction).unwrap()));
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
    fn no_normals_yields_no_candidates() {
        let points = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        let index = BruteForceSearch::new(&points, L2);
        let detector = Susan {
            radius: 2.0,
            angle_threshold: 0.1,
            similarity_fraction: 0.5,
            nms_radius: 0.1,
        };
        assert!(detector.detect(&points, None, &index).is_empty());
    }

    #[test]
    fn uniform_normals_have_a_high_similarity_fraction() {
        let points: Vec<Point3<f64>> = (0..5).map(|i| Point3::new(i as f64 * 0.1, 0.0, 0.0)).collect();
        let normals: Vec<Vector3<f64>> = points.iter().map(|_| Vector3::new(0.0, 0.0, 1.0)).collect();
        let index = BruteForceSearch::new(&points, L2);
        let detector = Susan {
            radius: 1.0,
            angle_threshold: 0.01,
            similarity_fraction: 0.5,
            nms_radius: 0.01,
        };
        assert!(detector.detect(&points, Some(&normals), &index).is_empty());
    }
}
