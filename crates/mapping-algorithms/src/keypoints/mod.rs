// SPDX-License-Identifier: MIT
/*
 * Copyright (c) [2023 - Present] Emily Matheys <emilymatt96@gmail.com>
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

//! Geometrically salient keypoint detectors.
//!
//! Every detector consumes a cloud, a neighbour-search index and its own
//! parameters, and produces indices into the cloud; all but [`loam`] share
//! the [`non_max_suppress`] stage.

mod agast;
mod curvature;
mod harris3d;
mod iss;
mod loam;
mod mls;
mod sift3d;
mod susan;

pub use agast::Agast;
pub use curvature::Curvature;
pub use harris3d::Harris3d;
pub use iss::Iss;
pub use loam::{Loam, ScanPointLabel};
pub use mls::{Mls, PolynomialOrder};
pub use sift3d::Sift3d;
pub use susan::Susan;

use crate::neighbor_search::NeighborSearch;
use crate::point_cloud::Scalar;
use nalgebra::{Matrix3, Point3, Vector3};

/// Consumes a cloud and a neighbour-search index over it, producing the
/// indices of points judged geometrically salient.
pub trait KeypointDetector<T: Scalar> {
    /// Detects keypoints in `points`, optionally using `normals` when the
    /// detector needs them (Harris 3D, SUSAN). `index` must be built over
    /// `points`.
    fn detect(
        &self,
        points: &[Point3<T>],
        normals: Option<&[Vector3<T>]>,
        index: &dyn NeighborSearch<T>,
    ) -> Vec<usize>;
}

/// Ascending PCA eigenvalues of the neighbourhood's covariance (own point
/// included), shared by every response-based detector in this module.
pub(crate) fn pca_eigenvalues<T: Scalar>(points: &[Point3<T>], neighborhood: &[usize]) -> Option<[f64; 3]> {
    if neighborhood.len() < 3 {
        return None;
    }
    let n = neighborhood.len() as f64;
    let mut centroid = nalgebra::Point3::<f64>::origin();
    for &idx in neighborhood {
        let p = points[idx];
        centroid.x += p.x.to_f64().unwrap();
        centroid.y += p.y.to_f64().unwrap();
        centroid.z += p.z.to_f64().unwrap();
    }
    centroid.coords /= n;

    let mut cov = Matrix3::<f64>::zeros();
    for &idx in neighborhood {
        let p = points[idx];
        let d = Vector3::new(
            p.x.to_f64().unwrap() - centroid.x,
            p.y.to_f64().unwrap() - centroid.y,
            p.z.to_f64().unwrap() - centroid.z,
        );
        cov += d * d.transpose();
    }
    cov /= n;

    let eigen = cov.symmetric_eigen();
    let mut values = [eigen.eigenvalues[0], eigen.eigenvalues[1], eigen.eigenvalues[2]];
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    Some(values)
}

/// Greedy non-maximum suppression: candidates are visited in descending
/// response order, and a candidate is kept only if no already-kept point
/// lies within `radius` of it.
pub fn non_max_suppress<T: Scalar>(points: &[Point3<T>], mut candidates: Vec<(usize, T)>, radius: T) -> Vec<usize> {
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(a.0.cmp(&b.0)));
    let mut kept: Vec<usize> = Vec::new();
    'candidate: for (idx, _) in candidates {
        for &kept_idx in &kept {
            if (points[idx] - points[kept_idx]).norm() < radius {
                continue 'candidate;
            }
        }
        kept.push(idx);
    }
    kept.sort_unstable();
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nms_keeps_only_the_strongest_point_within_radius() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.1, 0.0, 0.0),
            Point3::new(5.0, 0.0, 0.0),
        ];
        let candidates = vec![(0, 1.0_f64), (1, 2.0), (2, 0.5)];
        let kept = non_max_suppress(&points, candidates, 1.0);
        assert_eq!(kept, vec![1, 2]);
    }

    #[test]
    fn pca_eigenvalues_needs_at_least_three_points() {
        let points = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        assert!(pca_eigenvalues(&points, &[0, 1]).is_none());
    }
}
