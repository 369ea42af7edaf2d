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

//! Point-cloud file formats.
//!
//! `mapping_algorithms` consumes clouds through no file-format-specific
//! trait at all (it only ever sees a built
//! [`mapping_algorithms::point_cloud::PointCloud`]); [`PointCloudLoader`] is
//! the minimal "a loader hands the pipeline a cloud" interface an external
//! collaborator needs, realised here since
//! this crate is the one that actually touches a filesystem.

pub mod kitti;
pub mod pcd;

use crate::error::SuiteResult;
use mapping_algorithms::point_cloud::{PointCloud, Scalar};
use std::path::Path;

/// Loads a point cloud from a path, the "point-cloud loader" collaborator
/// (`load(path) -> cloud`).
pub trait PointCloudLoader<T: Scalar> {
    /// Reads the cloud at `path`.
    fn load(&self, path: &Path) -> SuiteResult<PointCloud<T>>;
}

/// Loads KITTI Velodyne `.bin` files via [`kitti::read_kitti_bin`].
#[derive(Debug, Clone, Copy, Default)]
pub struct KittiBinLoader;

impl<T: Scalar> PointCloudLoader<T> for KittiBinLoader {
    fn load(&self, path: &Path) -> SuiteResult<PointCloud<T>> {
        kitti::read_kitti_bin(path)
    }
}

/// Loads PCD files (ASCII or binary, little-endian) via [`pcd::read_pcd`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PcdLoader;

impl<T: Scalar> PointCloudLoader<T> for PcdLoader {
    fn load(&self, path: &Path) -> SuiteResult<PointCloud<T>> {
        pcd::read_pcd(path)
    }
}

/// Picks [`KittiBinLoader`] or [`PcdLoader`] by extension (`.bin` vs
/// `.pcd`), the sole content check either format affords.
pub fn load_by_extension<T: Scalar>(path: &Path) -> SuiteResult<PointCloud<T>> {
    if kitti::can_read(path) {
        kitti::read_kitti_bin(path)
    } else {
        pcd::read_pcd(path)
    }
}
