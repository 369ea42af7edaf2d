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

use crate::error::CloudError;
use crate::point_cloud::Scalar;
use nalgebra::{Isometry3, Matrix3, Point3, Translation3, UnitQuaternion};

/// Closed-form least-squares rigid transform mapping `source` onto `target`
/// via centroid subtraction and SVD (Umeyama's method / Horn's absolute
/// orientation), matching [`crate::registration::transform`]'s role as the
/// shared building block for both coarse (RANSAC's minimal-sample estimate,
/// its refinement pass) and fine (point-to-point ICP) registration.
///
/// `source` and `target` must be the same length and at least 3 points,
/// matching the sample size Horn's method requires.
///
/// `R = V * diag(1, 1, det(V U^T)) * U^T`, `t = mean_target - R * mean_source`,
/// where `H = sum((s_i - mean_source)(t_i - mean_target)^T) = U S V^T`.
pub fn umeyama_alignment<T: Scalar>(source: &[Point3<T>], target: &[Point3<T>]) -> Result<Isometry3<T>, CloudError> {
    if source.len() != target.len() {
        return Err(CloudError::InvalidArgument(format!(
            "source and target must have equal length, got {} and {}",
            source.len(),
            target.len()
        )));
    }
    if source.len() < 3 {
        return Err(CloudError::InsufficientData(format!("umeyama alignment needs at least 3 points, got {}", source.len())));
    }

    let n: T = num_traits::cast(source.len()).unwrap();
    let mean_source = Point3::from(source.iter().fold(nalgebra::Vector3::zeros(), |acc, p| acc + p.coords) / n);
    let mean_target = Point3::from(target.iter().fold(nalgebra::Vector3::zeros(), |acc, p| acc + p.coords) / n);

    let mut h = Matrix3::<T>::zeros();
    for (s, t) in source.iter().zip(target.iter()) {
        let ds = s - mean_source;
        let dt = t - mean_target;
        h += ds * dt.transpose();
    }

    let svd = h.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Err(CloudError::NumericalFailure("SVD of cross-covariance did not converge".into())),
    };
    let v = v_t.transpose();
    let det = (v * u.transpose()).determinant();
    let d = nalgebra::Matrix3::from_diagonal(&nalgebra::Vector3::new(T::one(), T::one(), if det < T::zero() { -T::one() } else { T::one() }));
    let rotation_matrix = v * d * u.transpose();

    let rotation = UnitQuaternion::from_matrix(&rotation_matrix);
    let translation = Translation3::from(mean_target.coords - rotation * mean_source.coords);
    Ok(Isometry3::from_parts(translation, rotation))
}

/// Frobenius-norm deviation of `transform`'s rotation part from identity,
/// used by every fine-registration loop to test `transformation_epsilon`.
pub fn rotation_deviation_from_identity<T: Scalar>(transform: &Isometry3<T>) -> T {
    let r = transform.rotation.to_rotation_matrix();
    let diff = r.matrix() - Matrix3::<T>::identity();
    diff.norm()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn recovers_a_known_translation() {
        let source = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0), Point3::new(0.0, 0.0, 1.0)];
        let translation = Vector3::new(2.0, 1.0, 0.5);
        let target: Vec<_> = source.iter().map(|p| p + translation).collect();

        let transform = umeyama_alignment(&source, &target).unwrap();
        assert!((transform.translation.vector - translation).norm() < 1e-9);
        assert!(rotation_deviation_from_identity(&transform) < 1e-9);
    }

    #[test]
    fn recovers_a_known_rotation_and_translation() {
        let source = vec![Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0), Point3::new(0.0, 0.0, 1.0), Point3::new(1.0, 1.0, 1.0)];
        let rotation = UnitQuaternion::from_euler_angles(0.1, 0.2, -0.15);
        let translation = Vector3::new(0.3, -0.2, 0.1);
        let ground_truth = Isometry3::from_parts(Translation3::from(translation), rotation);
        let target: Vec<_> = source.iter().map(|p| ground_truth.transform_point(p)).collect();

        let estimated = umeyama_alignment(&source, &target).unwrap();
        for (s, t) in source.iter().zip(target.iter()) {
            assert!((estimated.transform_point(s) - t).norm() < 1e-6);
        }
    }

    #[test]
    fn rejects_fewer_than_three_points() {
        let source = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        let target = source.clone();
        assert!(umeyama_alignment(&source, &target).is_err());
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let source = vec![Point3::new(0.0, 0.0, 0.0); 3];
        let target = vec![Point3::new(0.0, 0.0, 0.0); 4];
        assert!(umeyama_alignment(&source, &target).is_err());
    }
}
