use super::{bin_index, darboux_features, DescriptorExtractor, Signature};
use crate::neighbor_search::NeighborSearch;
use crate::point_cloud::Scalar;
use nalgebra::{Point3, Vector3};
use std::f64::consts::PI;

const ANGLE_BINS: usize = 45;
const DISTANCE_BINS: usize = 45;
const VIEWPOINT_BINS: usize = 128;
const NUM_BINS: usize = ANGLE_BINS * 3 + DISTANCE_BINS + VIEWPOINT_BINS;

/// Viewpoint Feature Histogram: a *global* 308-bin descriptor (extended FPFH
/// angles between every point and the cloud centroid, 3×45 bins; a 45-bin
/// normalised-distance component; a 128-bin viewpoint-direction component),
/// Keypoint indices are ignored — exactly one
/// signature is returned per call, regardless of how many were requested.
pub struct Vfh<T: Scalar> {
    /// Direction from which the cloud was observed, used by the viewpoint
    /// component. Defaults to `+Z` when not otherwise known.
    pub viewpoint_direction: Vector3<T>,
}

impl<T: Scalar> Default for Vfh<T> {
    fn default() -> Self {
        Self {
            viewpoint_direction: Vector3::new(T::zero(), T::zero(), T::one()),
        }
    }
}

impl<T: Scalar> DescriptorExtractor<T> for Vfh<T> {
    fn extract(
        &self,
        points: &[Point3<T>],
        normals: &[Vector3<T>],
        _index: &dyn NeighborSearch<T>,
        _keypoint_indices: &[usize],
    ) -> Vec<Signature<T>> {
        if points.is_empty() {
            return vec![Signature::zeros(NUM_BINS)];
        }

        let centroid = crate::utils::centroid(points);
        let mean_normal = {
            let sum = normals.iter().fold(Vector3::zeros(), |acc, n| acc + n);
            let norm = sum.norm();
            if norm > T::zero() {
                sum / norm
            } else {
                Vector3::new(T::zero(), T::zero(), T::one())
            }
        };

        let alpha_lo = -T::one();
        let alpha_hi = T::one();
        let phi_lo = -T::one();
        let phi_hi = T::one();
        let theta_lo: T = num_traits::cast(-PI).unwrap();
        let theta_hi: T = num_traits::cast(PI).unwrap();

        let mut alpha_hist = vec![T::zero(); ANGLE_BINS];
        let mut phi_hist = vec![T::zero(); ANGLE_BINS];
        let mut theta_hist = vec![T::zero(); ANGLE_BINS];
        let mut distance_hist = vec![T::zero(); DISTANCE_BINS];
        let mut viewpoint_hist = vec![T::zero(); VIEWPOINT_BINS];

        let max_distance = points
            .iter()
            .map(|p| (p - centroid).norm())
            .fold(T::zero(), |a, b| if b > a { b } else { a });

        for (p, n) in points.iter().zip(normals) {
            if let Some((alpha, phi, theta)) = darboux_features(&centroid, &mean_normal, p, n) {
                let a_bin = bin_index(alpha, alpha_lo, alpha_hi, ANGLE_BINS);
                let p_bin = bin_index(phi, phi_lo, phi_hi, ANGLE_BINS);
                let t_bin = bin_index(theta, theta_lo, theta_hi, ANGLE_BINS);
                alpha_hist[a_bin] = alpha_hist[a_bin] + T::one();
                phi_hist[p_bin] = phi_hist[p_bin] + T::one();
                theta_hist[t_bin] = theta_hist[t_bin] + T::one();
            }

            if max_distance > T::zero() {
                let d_norm = (p - centroid).norm() / max_distance;
                let d_bin = bin_index(d_norm, T::zero(), T::one(), DISTANCE_BINS);
                distance_hist[d_bin] = distance_hist[d_bin] + T::one();
            }

            let cos_angle = n.dot(&self.viewpoint_direction).max(-T::one()).min(T::one());
            let v_bin = bin_index(cos_angle, -T::one(), T::one(), VIEWPOINT_BINS);
            viewpoint_hist[v_bin] = viewpoint_hist[v_bin] + T::one();
        }

        let mut bins = Vec::with_capacity(NUM_BINS);
        bins.extend(alpha_hist);
        bins.extend(phi_hist);
        bins.extend(theta_hist);
        bins.extend(distance_hist);
        bins.extend(viewpoint_hist);

        let mut signature = Signature { bins };
        signature.l1_normalize();
        vec![signature]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::L2;
    use crate::neighbor_search::BruteForceSearch;

    #[test]
    fn signature_length_is_308_regardless_of_keypoint_count() {
        let points: Vec<Point3<f64>> = (0..6)
            .flat_map(|x| (0..6).map(move |y| Point3::new(x as f64 * 0.1, y as f64 * 0.1, 0.0)))
            .collect();
        let normals: Vec<Vector3<f64>> = points.iter().map(|_| Vector3::new(0.0, 0.0, 1.0)).collect();
        let index = BruteForceSearch::new(&points, L2);
        let vfh = Vfh::default();
        let signatures = vfh.extract(&points, &normals, &index, &[0, 1, 2, 3]);
        assert_eq!(signatures.len(), 1);
        assert_eq!(signatures[0].bins.len(), NUM_BINS);
    }

    #[test]
    fn empty_cloud_yields_a_default_zero_signature() {
        let points: Vec<Point3<f64>> = Vec::new();
        let normals: Vec<Vector3<f64>> = Vec::new();
        let index = BruteForceSearch::new(&points, L2);
        let vfh = Vfh::default();
        let signatures = vfh.extract(&points, &normals, &index, &[]);
        assert_eq!(signatures[0].bins, vec![0.0; NUM_BINS]);
    }
}
