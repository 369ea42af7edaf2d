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

/// The error kinds every algorithm in this crate can report.
///
/// Not every kind is fatal: [`CloudError::NumericalFailure`] is frequently
/// recovered locally (a degenerate normal estimation falls back to the
/// up-vector, a KD-tree incompatible with the configured metric falls back
/// to brute force) and only surfaces here when a caller asked for the
/// raw failure via a `try_*` entry point.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CloudError {
    /// A negative radius, zero `k`, empty cloud where one is required, missing
    /// normals, or mismatched array lengths.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An algorithm was run before a required input (search index, source or
    /// target cloud) was set.
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// An SVD or eigensolver failed to converge, or normal equations were
    /// singular.
    #[error("numerical failure: {0}")]
    NumericalFailure(String),

    /// Fewer correspondences were available than the minimum sample size an
    /// algorithm requires.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// A file could not be found, was short, or had a malformed header.
    #[error("I/O failure: {0}")]
    IOFailure(String),

    /// A frame index was past the end of a dataset, or a radius was too
    /// small for the requested operation.
    #[error("out of range: {0}")]
    OutOfRange(String),
}

/// A `Result` alias scoped to [`CloudError`].
pub type CloudResult<T> = Result<T, CloudError>;
