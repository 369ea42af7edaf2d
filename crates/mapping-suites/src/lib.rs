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

#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

//! End-to-end point-cloud alignment pipelines and dataset I/O, built on top
//! of [`mapping_algorithms`].
//!
//! [`mapping_algorithms`] deliberately treats file I/O, CLI parsing and
//! dataset iteration as external collaborators specified only by interface;
//! this crate is the one concrete collaborator that
//! closes the loop so the algorithms crate can be exercised end-to-end:
//!
//! - [`io`] reads KITTI `.bin` and PCD point clouds behind the
//!   [`io::PointCloudLoader`] trait.
//! - [`pipeline`] composes filter, keypoint, normal, descriptor,
//!   correspondence, ranking and registration stages from
//!   `mapping_algorithms` into a single [`pipeline::AlignmentPipeline`],
//!   mirroring the control flow.

/// Error kinds surfaced by pipeline composition and dataset I/O.
pub mod error;

/// Point-cloud file readers and writers (KITTI `.bin`, PCD).
pub mod io;

/// End-to-end alignment pipeline composing mapping_algorithms stages.
pub mod pipeline;

pub use error::{SuiteError, SuiteResult};
pub use pipeline::AlignmentPipeline;
