#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

//! Point-cloud registration core: nearest-neighbour search, normal
//! estimation, keypoint detection, descriptor extraction, correspondence
//! matching and rigid registration (coarse and fine) for unstructured 3D
//! point clouds.
//!
//! The crate is organised in the dependency order the algorithms are
//! actually used in an alignment pipeline:
//!
//! 1. [`metric`] — scalar distance functions, statically or dynamically dispatched.
//! 2. [`point_cloud`] — the `PointCloud` data model.
//! 3. [`neighbor_search`] — brute-force and KD-tree nearest-neighbour queries.
//! 4. [`normal_estimation`] — PCA-based per-point surface normals.
//! 5. [`keypoints`] — saliency detectors that select indices into a cloud.
//! 6. [`descriptors`] — per-keypoint signatures comparable under a [`metric`].
//! 7. [`correspondence`] — descriptor matching and quality ranking.
//! 8. [`registration`] — coarse (RANSAC, 4PCS, Super4PCS) and fine (ICP
//!    family, NDT) transform estimation.
//!
//! [`filters`], [`pool`] and [`voxel_key`] are supporting utilities shared by
//! several of the above.

/// Error kinds shared by every algorithm in this crate.
pub mod error;

/// Scalar distance metrics over equal-length vectors, statically and dynamically dispatched.
pub mod metric;

/// The point and point-cloud data model.
pub mod point_cloud;

/// Nearest-neighbour search over 3D points, brute-force or KD-tree backed.
pub mod neighbor_search;

/// PCA-based per-point surface normal estimation.
pub mod normal_estimation;

/// Geometrically salient keypoint detectors.
pub mod keypoints;

/// Fixed-length local and global descriptor extractors.
pub mod descriptors;

/// Correspondence generation, filtering and ranking between two descriptor sets.
pub mod correspondence;

/// Coarse and fine rigid registration from point correspondences.
pub mod registration;

/// Point-cloud reduction filters (voxel grid, random, uniform grid).
pub mod filters;

/// A fixed-block-size memory pool with scoped checkout handles.
pub mod pool;

/// Packed integer voxel-cell keys shared by the voxel filter and NDT.
pub mod voxel_key;

pub(crate) mod utils;

pub use point_cloud::{PointCloud, Scalar};
