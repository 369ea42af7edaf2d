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

//! Correspondence generation, filtering and ranking between two descriptor
//! sets.
//!
//! Descriptor-space nearest-neighbour search here is a deliberate departure
//! from [`crate::neighbor_search`]: that module indexes 3D points, but a
//! signature's dimensionality (33 to 352 depending on the extractor) is not
//! fixed at 3, so this module brute-force-scans descriptor distances itself
//! rather than reusing [`crate::neighbor_search::NeighborSearch`].

mod generator;
pub mod ranking;

pub use generator::{BruteForceCorrespondenceGenerator, CorrespondenceGenerator, CorrespondenceParams, KnnCorrespondenceGenerator};

use crate::point_cloud::Scalar;

/// A hypothesised pair of matching indices across a source and target set,
/// with the descriptor distance that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence<T: Scalar> {
    /// Index into the source keypoint/descriptor list.
    pub source_index: usize,
    /// Index into the target keypoint/descriptor list.
    pub target_index: usize,
    /// Descriptor distance between the two signatures, under whichever
    /// metric the generator was configured with.
    pub distance: T,
}

/// Counters tracking how many candidates survive each filtering stage, for
/// downstream diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrespondenceStats {
    /// Every source descriptor considered, before any filtering.
    pub total_candidates: usize,
    /// Candidates that passed Lowe's ratio test.
    pub ratio_test_passed: usize,
    /// Candidates that passed mutual verification (only computed when enabled).
    pub mutual_test_passed: usize,
    /// Candidates that passed the absolute distance threshold (only computed
    /// when a threshold is configured).
    pub distance_test_passed: usize,
}
