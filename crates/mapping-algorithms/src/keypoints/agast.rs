use super::{non_max_suppress, KeypointDetector};
use crate::neighbor_search::NeighborSearch;
use crate::point_cloud::Scalar;
use nalgebra::{Point3, Vector3};

/// AGAST ported to point clouds: samples a discrete ring of neighbours
/// around the candidate's tangent plane (normal required), measures each
/// sample's signed height above the plane as a brightness analogue, and
/// accepts the point when a contiguous arc of at least `min_arc_length`
/// samples is consistently above or below `height_threshold`.
pub struct Agast<T: Scalar> {
    /// Radius of the sampling ring.
    pub radius: T,
    /// Number of angularly-binned samples on the ring.
    pub num_samples: usize,
    /// Minimum contiguous run of same-sign samples to accept a corner.
    pub min_arc_length: usize,
    /// Minimum out-of-plane height (same units as the cloud) to count a
    /// sample as "bright" or "dark".
    pub height_threshold: T,
    /// Non-maximum-suppression radius.
    pub nms_radius: T,
}

fn tangent_basis<T: Scalar>(normal: Vector3<T>) -> (Vector3<T>, Vector3<T>) {
    let helper = if normal.z.abs() < num_traits::cast(0.9).unwrap() {
        Vector3::new(T::zero(), T::zero(), T::one())
    } else {
        Vector3::new(T::one(), T::zero(), T::zero())
    };
    let u = normal.cross(&helper).normalize();
    let v = normal.cross(&u).normalize();
    (u, v)
}

impl<T: Scalar> KeypointDetector<T> for Agast<T> {
    fn detect(&self, points: &[Point3<T>], normals: Option<&[Vector3<T>]>, index: &dyn NeighborSearch<T>) -> Vec<usize> {
        let Some(normals) = normals else {
            return Vec::new();
        };
        let num_samples = self.num_samples.max(4);
        let height_threshold: f64 = self.height_threshold.to_f64().unwrap();

        let mut candidates = Vec::new();
        for (i, p) in points.iter().enumerate() {
            let neighbors = index.radius(p, self.radius);
            if neighbors.len() < num_samples {
                continue;
            }
            let normal = normals[i];
            let (u, v) = tangent_basis(normal);

            let mut bins = vec![0.0_f64; num_samples];
            let mut bin_has_sample = vec![false; num_samples];
            for (idx, _) in &neighbors {
                if *idx == i {
                    continue;
                }
                let d = points[*idx] - p;
                let height = d.dot(&normal).to_f64().unwrap();
                let x = d.dot(&u).to_f64().unwrap();
                let y = d.dot(&v).to_f64().unwrap();
                let angle = y.atan2(x);
                let bin = (((angle + std::f64::consts::PI) / (2.0 * std::f64::consts::PI)) * num_samples as f64) as usize;
                let bin = bin.min(num_samples - 1);
                if !bin_has_sample[bin] || height.abs() > bins[bin].abs() {
                    bins[bin] = height;
                    bin_has_sample[bin] = true;
                }
            }

            let signs: Vec<i8> = bins
                .iter()
                .map(|&h| {
                    if h > height_threshold {
                        1
                    } else if h < -height_threshold {
                        -1
                    } else {
                        0
                    }
                })
                .collect();

            let longest = longest_circular_run(&signs);
            if longest >= self.min_arc_length {
                candidates.push((i, num_traits::cast(longest as f64).unwrap()));
            }
        }
        non_max_suppress(points, candidates, self.nms_radius)
    }
}

fn longest_circular_run(signs: &[i8]) -> usize {
    let n = signs.len();
    if n == 0 {
        return 0;
    }
    let doubled: Vec<i8> = signs.iter().chain(signs.iter()).copied().collect();
    let mut best = 0;
    let mut run = 0;
    let mut prev: Option<i8> = None;
    for &s in &doubled {
        if s != 0 && Some(s) == prev {
            run += 1;
        } else if s != 0 {
            run = 1;
        } else {
            run = 0;
        }
        prev = if s != 0 { Some(s) } else { None };
        best = best.max(run);
    }
    best.min(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_circular_run_wraps_around() {
        assert_eq!(longest_circular_run(&[1, 1, 0, 1, 1]), 4);
        assert_eq!(longest_circular_run(&[1, -1, 1, -1]), 1);
        assert_eq!(longest_circular_run(&[0, 0, 0]), 0);
    }

    #[test]
    fn missing_normals_yields_no_candidates() {
        let points = vec![Point3::new(0.0, 0.0, 0.0)];
        let index = crate::neighbor_search::BruteForceSearch::new(&points, crate::metric::L2);
        let detector = Agast {
            radius: 1.0,
            num_samples: 8,
            min_arc_length: 3,
            height_threshold: 0.05,
            nms_radius: 0.1,
        };
        assert!(detector.detect(&points, None, &index).is_empty());
    }
}
