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

/// Error kinds surfaced by pipeline composition and dataset I/O.
///
/// Wraps [`mapping_algorithms::error::CloudError`] rather than duplicating
/// its variants, since most pipeline failures bottom out in an algorithm
/// stage; I/O and parsing get their own variants since the algorithms crate
/// has no notion of files.
#[derive(Debug, thiserror::Error)]
pub enum SuiteError {
    /// A stage of the pipeline (keypoints, descriptors, registration) failed.
    #[error(transparent)]
    Algorithm(#[from] mapping_algorithms::error::CloudError),

    /// The underlying file could not be opened, read, or written.
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// A file's content did not match its expected format (bad KITTI length,
    /// malformed or unsupported PCD header).
    #[error("malformed point-cloud file: {0}")]
    Parse(String),
}

/// A `Result` alias scoped to [`SuiteError`].
pub type SuiteResult<T> = Result<T, SuiteError>;
