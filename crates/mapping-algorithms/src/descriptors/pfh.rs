use super::{bin_index, darboux_features, DescriptorExtractor, Signature};
use crate::neighbor_search::NeighborSearch;
use crate::point_cloud::Scalar;
use nalgebra::{Point3, Vector3};
use std::f64::consts::PI;

const SUBDIVISIONS: usize = 5;
const NUM_BINS: usize = SUBDIVISIONS * SUBDIVISIONS * SUBDIVISIONS;

/// Point Feature Histogram: bins the three Darboux-frame angles of every
/// unordered pair in a keypoint's neighbourhood into a 5×5×5 = 125-cell
/// histogram. Cost is `O(k²)` per keypoint.
pub struct Pfh<T: Scalar> {
    /// Radius defining each keypoint's neighbourhood.
    pub search_radius: T,
    /// Cap on the number of neighbours considered (the closest `num_neighbors`
    /// within `search_radius` are kept, bounding the `O(k²)` pair cost).
    pub num_neighbors: usize,
}

/// Picks the consistently-ordered `(reference, other)` pair the way PCL's
/// PFH does: the point whose normal makes the smaller angle with the
/// connecting line becomes the reference, so `(a, b)` and `(b, a)` always
/// yield the same feature.
fn ordered_pair<'a, T: Scalar>(
    points: &'a [Point3<T>],
    normals: &'a [Vector3<T>],
    a: usize,
    b: usize,
) -> (usize, usize) {
    let d = points[b] - points[a];
    let angle_a = normals[a].dot(&d).abs();
    let angle_b = normals[b].dot(&(-d)).abs();
    if angle_a <= angle_b {
        (a, b)
    } else {
        (b, a)
    }
}

impl<T: Scalar> DescriptorExtractor<T> for Pfh<T> {
    fn extract(
        &self,
        points: &[Point3<T>],
        normals: &[Vector3<T>],
        index: &dyn NeighborSearch<T>,
        keypoint_indices: &[usize],
    ) -> Vec<Signature<T>> {
        let alpha_lo = -T::one();
        let alpha_hi = T::one();
        let phi_lo = -T::one();
        let phi_hi = T::one();
        let theta_lo: T = num_traits::cast(-PI).unwrap();
        let theta_hi: T = num_traits::cast(PI).unwrap();

        keypoint_indices
            .iter()
            .map(|&kp| {
                let mut neighborhood: Vec<usize> = index
                    .radius(&points[kp], self.search_radius)
                    .into_iter()
                    .map(|(idx, _)| idx)
                    .collect();
                neighborhood.truncate(self.num_neighbors.max(3));

                if neighborhood.len() < 3 {
                    return Signature::zeros(NUM_BINS);
                }

                let mut histogram = vec![T::zero(); NUM_BINS];
                let mut pair_count = 0usize;
                for i in 0..neighborhood.len() {
                    for j in (i + 1)..neighborhood.len() {
                        let (ref_idx, other_idx) = ordered_pair(points, normals, neighborhood[i], neighborhood[j]);
                        let Some((alpha, phi, theta)) =
                            darboux_features(&points[ref_idx], &normals[ref_idx], &points[other_idx], &normals[other_idx])
                        else {
                            continue;
                        };
                        let a_bin = bin_index(alpha, alpha_lo, alpha_hi, SUBDIVISIONS);
                        let p_bin = bin_index(phi, phi_lo, phi_hi, SUBDIVISIONS);
                        let t_bin = bin_index(theta, theta_lo, theta_hi, SUBDIVISIONS);
                        let bin = a_bin * SUBDIVISIONS * SUBDIVISIONS + p_bin * SUBDIVISIONS + t_bin;
                        histogram[bin] = histogram[bin] + T::one();
                        pair_count += 1;
                    }
                }

                let mut signature = Signature { bins: histogram };
                if pair_count > 0 {
                    signature.l1_normalize();
                }
                signature
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::L2;
    use crate::neighbor_search::BruteForceSearch;

    #[test]
    fn planar_grid_signature_has_125_bins_and_is_finite() {
        let points: Vec<Point3<f64>> = (0..5)
            .flat_map(|x| (0..5).map(move |y| Point3::new(x as f64 * 0.1, y as f64 * 0.1, 0.0)))
            .collect();
        let normals: Vec<Vector3<f64>> = points.iter().map(|_| Vector3::new(0.0, 0.0, 1.0)).collect();
        let index = BruteForceSearch::new(&points, L2);
        let pfh = Pfh {
            search_radius: 0.3,
            num_neighbors: 12,
        };
        let signatures = pfh.extract(&points, &normals, &index, &[12]);
        assert_eq!(signatures.len(), 1);
        assert_eq!(signatures[0].bins.len(), NUM_BINS);
        assert!(signatures[0].bins.iter().all(|b| b.is_finite()));
    }

    #[test]
    fn empty_neighborhood_yields_a_default_zero_signature() {
        let points = vec![Point3::new(0.0, 0.0, 0.0)];
        let normals = vec![Vector3::new(0.0, 0.0, 1.0)];
        let index = BruteForceSearch::new(&points, L2);
        let pfh = Pfh {
            search_radius: 0.01,
            num_neighbors: 10,
        };
        let signatures = pfh.extract(&points, &normals, &index, &[0]);
        assert_eq!(signatures[0].bins, vec![0.0; NUM_BINS]);
    }
}
