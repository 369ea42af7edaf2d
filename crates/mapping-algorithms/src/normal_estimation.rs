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

//! PCA-based per-point surface normal estimation.

use crate::neighbor_search::NeighborSearch;
use crate::point_cloud::Scalar;
use nalgebra::{Matrix3, Point3, Vector3};

/// The normal a degenerate neighbourhood (too few points, rank-deficient
/// covariance, or a non-converging eigensolver) falls back to.
#[inline]
fn fallback_normal<T: Scalar>() -> Vector3<T> {
    Vector3::new(T::zero(), T::zero(), T::one())
}

/// Covariance is always accumulated in `f64` regardless of `T`, then the
/// resulting eigenvector is cast back down.
fn covariance_and_centroid<T: Scalar>(points: &[Point3<T>]) -> (nalgebra::Point3<f64>, Matrix3<f64>) {
    let n = points.len() as f64;
    let mut centroid = nalgebra::Point3::<f64>::origin();
    for p in points {
        centroid.x += p.x.to_f64().unwrap();
        centroid.y += p.y.to_f64().unwrap();
        centroid.z += p.z.to_f64().unwrap();
    }
    centroid.coords /= n;

    let mut cov = Matrix3::<f64>::zeros();
    for p in points {
        let d = Vector3::new(
            p.x.to_f64().unwrap() - centroid.x,
            p.y.to_f64().unwrap() - centroid.y,
            p.z.to_f64().unwrap() - centroid.z,
        );
        cov += d * d.transpose();
    }
    cov /= n;
    (centroid, cov)
}

fn normal_from_covariance<T: Scalar>(cov: Matrix3<f64>) -> Vector3<T> {
    let eigen = cov.symmetric_eigen();
    let (mut min_idx, mut min_val) = (0usize, eigen.eigenvalues[0]);
    for i in 1..3 {
        if eigen.eigenvalues[i] < min_val {
            min_val = eigen.eigenvalues[i];
            min_idx = i;
        }
    }
    let axis = eigen.eigenvectors.column(min_idx);
    Vector3::new(
        num_traits::cast(axis[0]).unwrap(),
        num_traits::cast(axis[1]).unwrap(),
        num_traits::cast(axis[2]).unwrap(),
    )
}

/// Estimates one point's normal from its (already-gathered) neighbourhood,
/// including itself. Fewer than 3 neighbours is a degenerate case.
fn estimate_one<T: Scalar>(neighborhood: &[Point3<T>]) -> Vector3<T> {
    if neighborhood.len() < 3 {
        return fallback_normal();
    }
    let (_, cov) = covariance_and_centroid(neighborhood);
    if cov.iter().all(|v| v.abs() < 1e-18) {
        return fallback_normal();
    }
    normal_from_covariance(cov)
}

/// Flips `normal` so that it points away from `p` toward `viewpoint`, per
/// the optional orientation step.
fn orient_toward<T: Scalar>(p: &Point3<T>, normal: Vector3<T>, viewpoint: &Point3<T>) -> Vector3<T> {
    let view_dir = viewpoint - p;
    if normal.dot(&view_dir) < T::zero() {
        -normal
    } else {
        normal
    }
}

/// Estimates one surface normal per point in `cloud`, using `k` nearest
/// neighbours from `index` (which must have been built over `cloud.points`).
/// `viewpoint`, if given, reorients each normal to point toward it.
pub fn estimate_normals<T: Scalar>(
    cloud_points: &[Point3<T>],
    index: &dyn NeighborSearch<T>,
    k: usize,
    viewpoint: Option<&Point3<T>>,
) -> Vec<Vector3<T>> {
    cloud_points
        .iter()
        .map(|p| {
            let neighbors = index.k_nearest(p, k);
            let neighborhood: Vec<Point3<T>> = neighbors.iter().map(|&(idx, _)| cloud_points[idx]).collect();
            let normal = estimate_one(&neighborhood);
            match viewpoint {
                Some(vp) => orient_toward(p, normal, vp),
                None => normal,
            }
        })
        .collect()
}

/// Data-parallel variant of [`estimate_normals`]; `index` must be safe to
/// query concurrently from many threads, which every [`NeighborSearch`]
/// implementation in this crate is (they only require `&self`).
#[cfg(feature = "parallel")]
pub fn estimate_normals_parallel<T: Scalar + Send + Sync>(
    cloud_points: &[Point3<T>],
    index: &(dyn NeighborSearch<T> + Sync),
    k: usize,
    viewpoint: Option<&Point3<T>>,
) -> Vec<Vector3<T>> {
    use rayon::prelude::*;
    cloud_points
        .par_iter()
        .map(|p| {
            let neighbors = index.k_nearest(p, k);
            let neighborhood: Vec<Point3<T>> = neighbors.iter().map(|&(idx, _)| cloud_points[idx]).collect();
            let normal = estimate_one(&neighborhood);
            match viewpoint {
                Some(vp) => orient_toward(p, normal, vp),
                None => normal,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::L2;
    use crate::neighbor_search::BruteForceSearch;

    #[test]
    fn flat_plane_normal_is_vertical() {
        let points: Vec<Point3<f64>> = (0..5)
            .flat_map(|x| (0..5).map(move |y| Point3::new(x as f64, y as f64, 0.0)))
            .collect();
        let index = BruteForceSearch::new(&points, L2);
        let normals = estimate_normals(&points, &index, 6, None);
        for n in normals {
            assert!((n.z.abs() - 1.0).abs() < 1e-6, "expected near-vertical normal, got {n:?}");
        }
    }

    #[test]
    fn fewer_than_three_neighbours_falls_back() {
        let points = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        let index = BruteForceSearch::new(&points, L2);
        let normals = estimate_normals(&points, &index, 1, None);
        assert_eq!(normals[0], Vector3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn colinear_points_fall_back_instead_of_nan() {
        let points: Vec<Point3<f64>> = (0..5).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect();
        let index = BruteForceSearch::new(&points, L2);
        let normals = estimate_normals(&points, &index, 5, None);
        for n in normals {
            assert!(!n.x.is_nan() && !n.y.is_nan() && !n.z.is_nan());
        }
    }

    #[test]
    fn viewpoint_orientation_flips_toward_viewer() {
        let points: Vec<Point3<f64>> = (0..5)
            .flat_map(|x| (0..5).map(move |y| Point3::new(x as f64, y as f64, 0.0)))
            .collect();
        let index = BruteForceSearch::new(&points, L2);
        let viewpoint = Point3::new(2.0, 2.0, 10.0);
        let normals = estimate_normals(&points, &index, 6, Some(&viewpoint));
        for (p, n) in points.iter().zip(normals) {
            assert!(n.dot(&(viewpoint - p)) >= -1e-9);
        }
    }
}
