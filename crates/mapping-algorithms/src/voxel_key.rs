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

//! Packed integer voxel-cell indexing, shared by the voxel-grid filter,
//! Super4PCS's pair index and NDT's distribution grid.

use crate::point_cloud::Scalar;
use nalgebra::Point3;

/// The three signed cell coordinates a point falls into under a given cell
/// size, before any linearisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoxelCoord {
    /// Cell index along x.
    pub ix: i64,
    /// Cell index along y.
    pub iy: i64,
    /// Cell index along z.
    pub iz: i64,
}

impl VoxelCoord {
    /// Buckets `point` into its cell under `cell_size`, flooring each axis
    /// independently so cells tile without gaps or overlap.
    pub fn of<T: Scalar>(point: &Point3<T>, cell_size: T) -> Self {
        let cell_size = cell_size.to_f64().unwrap();
        VoxelCoord {
            ix: (point.x.to_f64().unwrap() / cell_size).floor() as i64,
            iy: (point.y.to_f64().unwrap() / cell_size).floor() as i64,
            iz: (point.z.to_f64().unwrap() / cell_size).floor() as i64,
        }
    }
}

/// A linearised voxel key against a known bounding box:
/// `(ix - min_ix) + (iy - min_iy)*span_x + (iz - min_iz)*span_x*span_y`,
/// packed into a single `u64` so it can key a dense grid or a hash map
/// interchangeably.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoxelKey(pub u64);

/// Linearises [`VoxelCoord`] values against a fixed origin and span, for use
/// where a dense grid (NDT, Super4PCS) benefits from a single integer key
/// rather than a 3-tuple hash key.
#[derive(Debug, Clone, Copy)]
pub struct VoxelIndexer {
    min: VoxelCoord,
    span_x: i64,
    span_y: i64,
}

impl VoxelIndexer {
    /// Builds an indexer whose origin is the minimum cell coordinate seen
    /// across `coords`, and whose span covers every coordinate in it.
    /// An empty slice yields a degenerate 1x1x1 indexer anchored at the
    /// origin.
    pub fn covering(coords: &[VoxelCoord]) -> Self {
        if coords.is_empty() {
            return VoxelIndexer {
                min: VoxelCoord { ix: 0, iy: 0, iz: 0 },
                span_x: 1,
                span_y: 1,
            };
        }
        let (mut min, mut max) = (coords[0], coords[0]);
        for c in &coords[1..] {
            min.ix = min.ix.min(c.ix);
            min.iy = min.iy.min(c.iy);
            min.iz = min.iz.min(c.iz);
            max.ix = max.ix.max(c.ix);
            max.iy = max.iy.max(c.iy);
            max.iz = max.iz.max(c.iz);
        }
        VoxelIndexer {
            min,
            span_x: (max.ix - min.ix + 1).max(1),
            span_y: (max.iy - min.iy + 1).max(1),
        }
    }

    /// Packs `coord` into a [`VoxelKey`] under this indexer's origin/span.
    /// Coordinates outside the span the indexer was built to cover still
    /// produce a valid (if possibly colliding) key rather than panicking.
    pub fn key(&self, coord: VoxelCoord) -> VoxelKey {
        let x = coord.ix - self.min.ix;
        let y = coord.iy - self.min.iy;
        let z = coord.iz - self.min.iz;
        VoxelKey((x + y * self.span_x + z * self.span_x * self.span_y) as u64)
    }

    /// The 26-connected neighbourhood of cell coordinates around `coord`,
    /// including `coord` itself; used by Super4PCS's range queries to scan
    /// only voxels that could possibly hold a point within range.
    pub fn neighborhood(coord: VoxelCoord) -> [VoxelCoord; 27] {
        let mut out = [coord; 27];
        let mut i = 0;
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    out[i] = VoxelCoord {
                        ix: coord.ix + dx,
                        iy: coord.iy + dy,
                        iz: coord.iz + dz,
                    };
                    i += 1;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voxel_coord_floors_negative_and_positive_consistently() {
        let a = VoxelCoord::of(&Point3::new(-0.1f64, 0.0, 0.0), 1.0);
        let b = VoxelCoord::of(&Point3::new(0.9f64, 0.0, 0.0), 1.0);
        assert_eq!(a.ix, -1);
        assert_eq!(b.ix, 0);
    }

    #[test]
    fn indexer_keys_are_unique_across_covered_span() {
        let coords = vec![
            VoxelCoord { ix: 0, iy: 0, iz: 0 },
            VoxelCoord { ix: 1, iy: 0, iz: 0 },
            VoxelCoord { ix: 0, iy: 1, iz: 0 },
            VoxelCoord { ix: 0, iy: 0, iz: 1 },
        ];
        let indexer = VoxelIndexer::covering(&coords);
        let keys: std::collections::HashSet<u64> = coords.iter().map(|&c| indexer.key(c).0).collect();
        assert_eq!(keys.len(), coords.len());
    }

    #[test]
    fn neighborhood_includes_the_center_cell() {
        let center = VoxelCoord { ix: 3, iy: -2, iz: 1 };
        let neighbors = VoxelIndexer::neighborhood(center);
        assert!(neighbors.contains(&center));
        assert_eq!(neighbors.len(), 27);
    }
}
