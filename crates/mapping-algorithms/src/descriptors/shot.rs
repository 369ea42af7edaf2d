use super::{DescriptorExtractor, Signature};
use crate::neighbor_search::NeighborSearch;
use crate::point_cloud::Scalar;
use nalgebra::{Matrix3, Point3, Vector3};
use std::f64::consts::PI;

const AZIMUTH_BINS: usize = 8;
const ELEVATION_BINS: usize = 2;
const RADIAL_BINS: usize = 2;
const ANGLE_BINS: usize = 11;
const SPATIAL_BINS: usize = AZIMUTH_BINS * ELEVATION_BINS * RADIAL_BINS;
const NUM_BINS: usize = SPATIAL_BINS * ANGLE_BINS;

/// Signature HOT (SHOT): builds a unique local reference frame, partitions
/// the neighbourhood into 8 azimuth × 2 elevation × 2 radial = 32 spatial
/// bins, and within each bin builds an 11-bin histogram of the angle between
/// a neighbour's normal and the central normal, softly assigned across
/// adjacent bins in all four dimensions.
pub struct Shot<T: Scalar> {
    /// Radius defining the local reference frame and the spatial grid extent.
    pub search_radius: T,
}

struct LocalFrame<T: Scalar> {
    x: Vector3<T>,
    y: Vector3<T>,
    z: Vector3<T>,
}

fn local_reference_frame<T: Scalar>(points: &[Point3<T>], center: usize, neighborhood: &[usize], radius: T) -> Option<LocalFrame<T>> {
    if neighborhood.len() < 3 {
        return None;
    }
    let p = points[center];
    let mut cov = Matrix3::<f64>::zeros();
    let mut weight_sum = 0.0_f64;
    for &idx in neighborhood {
        if idx == center {
            continue;
        }
        let d = points[idx] - p;
        let dist = d.norm().to_f64().unwrap();
        let weight = (radius.to_f64().unwrap() - dist).max(0.0);
        if weight <= 0.0 {
            continue;
        }
        let d64 = Vector3::new(d.x.to_f64().unwrap(), d.y.to_f64().unwrap(), d.z.to_f64().unwrap());
        cov += weight * (d64 * d64.transpose());
        weight_sum += weight;
    }
    if weight_sum <= 0.0 {
        return None;
    }
    cov /= weight_sum;

    let eigen = cov.symmetric_eigen();
    let mut order: Vec<usize> = (0..3).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].partial_cmp(&eigen.eigenvalues[a]).unwrap());
    let mut x = eigen.eigenvectors.column(order[0]).into_owned();
    let mut z = eigen.eigenvectors.column(order[2]).into_owned();

    let mut sign_x = 0.0_f64;
    let mut sign_z = 0.0_f64;
    for &idx in neighborhood {
        if idx == center {
            continue;
        }
        let d = points[idx] - p;
        let d64 = Vector3::new(d.x.to_f64().unwrap(), d.y.to_f64().unwrap(), d.z.to_f64().unwrap());
        sign_x += d64.dot(&x);
        sign_z += d64.dot(&z);
    }
    if sign_x < 0.0 {
        x = -x;
    }
    if sign_z < 0.0 {
        z = -z;
    }
    let y = z.cross(&x);

    let cast = |v: Vector3<f64>| Vector3::new(
        num_traits::cast(v.x).unwrap(),
        num_traits::cast(v.y).unwrap(),
        num_traits::cast(v.z).unwrap(),
    );
    Some(LocalFrame { x: cast(x), y: cast(y), z: cast(z) })
}

fn soft_bin_1d(value: f64, num_bins: usize) -> [(usize, f64); 2] {
    let scaled = value.clamp(0.0, 0.999_999) * num_bins as f64;
    let base = scaled.floor() as usize;
    let frac = scaled - base as f64;
    let base = base.min(num_bins - 1);
    let next = (base + 1).min(num_bins - 1);
    [(base, 1.0 - frac), (next, frac)]
}

impl<T: Scalar> DescriptorExtractor<T> for Shot<T> {
    fn extract(
        &self,
        points: &[Point3<T>],
        normals: &[Vector3<T>],
        index: &dyn NeighborSearch<T>,
        keypoint_indices: &[usize],
    ) -> Vec<Signature<T>> {
        keypoint_indices
            .iter()
            .map(|&kp| {
                let neighborhood: Vec<usize> = index.radius(&points[kp], self.search_radius).into_iter().map(|(idx, _)| idx).collect();
                let Some(frame) = local_reference_frame(points, kp, &neighborhood, self.search_radius) else {
                    return Signature::zeros(NUM_BINS);
                };

                let mut histogram = vec![0.0_f64; NUM_BINS];
                let center_normal = normals[kp];
                let radius = self.search_radius.to_f64().unwrap().max(1e-12);

                for &idx in &neighborhood {
                    if idx == kp {
                        continue;
                    }
                    let d = points[idx] - points[kp];
                    let local_x = d.dot(&frame.x).to_f64().unwrap();
                    let local_y = d.dot(&frame.y).to_f64().unwrap();
                    let local_z = d.dot(&frame.z).to_f64().unwrap();

                    let azimuth = local_y.atan2(local_x);
                    let azimuth_norm = (azimuth + PI) / (2.0 * PI);
                    let elevation_norm = (local_z / radius + 1.0) / 2.0;
                    let radial_norm = d.norm().to_f64().unwrap() / radius;

                    let cos_angle = center_normal.dot(&normals[idx]).to_f64().unwrap().clamp(-1.0, 1.0);
                    let angle_norm = (cos_angle + 1.0) / 2.0;

                    for (a_bin, a_w) in soft_bin_1d(azimuth_norm, AZIMUTH_BINS) {
                        for (e_bin, e_w) in soft_bin_1d(elevation_norm.clamp(0.0, 1.0), ELEVATION_BINS) {
                            for (r_bin, r_w) in soft_bin_1d(radial_norm.clamp(0.0, 1.0), RADIAL_BINS) {
                                for (g_bin, g_w) in soft_bin_1d(angle_norm, ANGLE_BINS) {
                                    let spatial_bin = (a_bin * ELEVATION_BINS + e_bin) * RADIAL_BINS + r_bin;
                                    let bin = spatial_bin * ANGLE_BINS + g_bin;
                                    histogram[bin] += a_w * e_w * r_w * g_w;
                                }
                            }
                        }
                    }
                }

                let mut signature = Signature {
                    bins: histogram.into_iter().map(|v| num_traits::cast(v).unwrap()).collect(),
                };
                signature.l2_normalize();
                signature
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::L2 as L2Metric;
    use crate::neighbor_search::BruteForceSearch;

    #[test]
    fn signature_length_is_352_and_unit_normalised() {
        let points: Vec<Point3<f64>> = (0..8)
            .flat_map(|x| (0..8).map(move |y| Point3::new(x as f64 * 0.1, y as f64 * 0.1, 0.0)))
            .collect();
        let normals: Vec<Vector3<f64>> = points.iter().map(|_| Vector3::new(0.0, 0.0, 1.0)).collect();
        let index = BruteForceSearch::new(&points, L2Metric);
        let shot = Shot { search_radius: 0.3 };
        let signatures = shot.extract(&points, &normals, &index, &[36]);
        assert_eq!(signatures[0].bins.len(), NUM_BINS);
        let norm: f64 = signatures[0].bins.iter().map(|b| b * b).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6 || norm == 0.0);
    }

    #[test]
    fn empty_neighborhood_yields_default_zero_signature() {
        let points = vec![Point3::new(0.0, 0.0, 0.0)];
        let normals = vec![Vector3::new(0.0, 0.0, 1.0)];
        let index = BruteForceSearch::new(&points, L2Metric);
        let shot = Shot { search_radius: 0.01 };
        let signatures = shot.extract(&points, &normals, &index, &[0]);
        assert_eq!(signatures[0].bins, vec![0.0; NUM_BINS]);
    }
}
