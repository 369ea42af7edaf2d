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

use crate::point_cloud::{PointCloud, Scalar};
use rand::seq::index::sample;
use rand::RngCore;

/// Keeps `keep_count` points chosen uniformly at random, without
/// replacement, using `rng`. `keep_count >= cloud.len()` keeps every point
/// (in its original order); an empty cloud returns an empty cloud.
pub fn random_downsample<T: Scalar>(cloud: &PointCloud<T>, keep_count: usize, rng: &mut dyn RngCore) -> PointCloud<T> {
    if cloud.is_empty() || keep_count >= cloud.len() {
        return cloud.clone();
    }
    let mut indices: Vec<usize> = sample(rng, cloud.len(), keep_count).into_vec();
    indices.sort_unstable();
    cloud.retain_indices(&indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;
    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn keeps_exactly_the_requested_count() {
        let cloud = PointCloud::from_points((0..20).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect());
        let mut rng = SmallRng::seed_from_u64(42);
        let reduced = random_downsample(&cloud, 7, &mut rng);
        assert_eq!(reduced.len(), 7);
    }

    #[test]
    fn keep_count_past_cloud_size_keeps_everything() {
        let cloud = PointCloud::from_points(vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)]);
        let mut rng = SmallRng::seed_from_u64(1);
        let reduced = random_downsample(&cloud, 100, &mut rng);
        assert_eq!(reduced.len(), 2);
    }

    #[test]
    fn is_deterministic_for_a_fixed_seed() {
        let cloud = PointCloud::from_points((0..50).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect());
        let mut rng_a = SmallRng::seed_from_u64(99);
        let mut rng_b = SmallRng::seed_from_u64(99);
        let a = random_downsample(&cloud, 10, &mut rng_a);
        let b = random_downsample(&cloud, 10, &mut rng_b);
        assert_eq!(a.points, b.points);
    }
}
