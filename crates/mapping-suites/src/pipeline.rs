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

//! End-to-end alignment: filter -> keypoints -> normals -> descriptors ->
//! correspondences -> ranking -> coarse registration -> fine registration,
//! per the control flow.
//!
//! [`AlignmentPipeline`] is built with [`AlignmentPipelineBuilder`],
//! mirroring the `*ConfigurationBuilder` shape every single algorithm in
//! `mapping_algorithms` already uses (e.g.
//! `mapping_algorithms::registration::coarse::RansacConfigurationBuilder`);
//! this is simply that same shape one layer up, composing whole algorithms
//! instead of their parameters.

use crate::error::{SuiteError, SuiteResult};
use mapping_algorithms::correspondence::ranking::CorrespondenceSorter;
use mapping_algorithms::correspondence::{CorrespondenceGenerator, CorrespondenceParams};
use mapping_algorithms::descriptors::DescriptorExtractor;
use mapping_algorithms::error::CloudError;
use mapping_algorithms::keypoints::KeypointDetector;
use mapping_algorithms::metric::Metric;
use mapping_algorithms::neighbor_search::build_index;
use mapping_algorithms::normal_estimation::estimate_normals;
use mapping_algorithms::point_cloud::{PointCloud, Scalar};
use mapping_algorithms::registration::coarse::CoarseRegistration;
use mapping_algorithms::registration::fine::FineRegistration;
use mapping_algorithms::registration::RegistrationResult;
use nalgebra::Point3;

/// The result of running an [`AlignmentPipeline`] end to end: both stages'
/// outcomes, since a caller may want the coarse seed even when fine
/// registration fails to converge.
#[derive(Debug, Clone)]
pub struct AlignmentOutcome<T: Scalar> {
    /// Keypoint indices detected in the source cloud.
    pub source_keypoints: Vec<usize>,
    /// Keypoint indices detected in the target cloud.
    pub target_keypoints: Vec<usize>,
    /// Correspondence statistics from the generation stage.
    pub stats: mapping_algorithms::correspondence::CorrespondenceStats,
    /// The coarse registration's result, seeding fine registration.
    pub coarse: RegistrationResult<T>,
    /// The fine registration's result; the pipeline's final answer.
    pub fine: RegistrationResult<T>,
}

/// Composes a full alignment pipeline from `mapping_algorithms` stages.
///
/// Every stage is a boxed trait object so the builder can mix and match
/// concrete algorithms (e.g. [`mapping_algorithms::keypoints::Iss`] with
/// [`mapping_algorithms::registration::coarse::Super4Pcs`]) without the
/// pipeline itself being generic over each one's concrete type.
pub struct AlignmentPipeline<T: Scalar> {
    voxel_cell_size: Option<T>,
    keypoint_detector: Box<dyn KeypointDetector<T> + Send + Sync>,
    normal_neighbors: usize,
    descriptor_extractor: Box<dyn DescriptorExtractor<T> + Send + Sync>,
    correspondence_generator: Box<dyn CorrespondenceGenerator<T> + Send + Sync>,
    correspondence_params: CorrespondenceParams<T>,
    descriptor_metric: Box<dyn Metric<T>>,
    sorter: Box<dyn CorrespondenceSorter<T> + Send + Sync>,
    coarse: Box<dyn CoarseRegistration<T> + Send + Sync>,
    fine: Box<dyn FineRegistration<T> + Send + Sync>,
    record_history: bool,
}

impl<T: Scalar + 'static> AlignmentPipeline<T> {
    /// Starts building a pipeline; every stage must be set before
    /// [`AlignmentPipelineBuilder::build`] succeeds.
    pub fn builder() -> AlignmentPipelineBuilder<T> {
        AlignmentPipelineBuilder::default()
    }

    /// Runs the full pipeline on `source` and `target`: filter, detect
    /// keypoints on both clouds, estimate
    /// normals, extract descriptors at the keypoints, generate and rank
    /// correspondences, run coarse registration, then seed fine
    /// registration with its transform.
    #[cfg_attr(feature = "tracing", tracing::instrument("Alignment Pipeline", skip_all, level = "debug"))]
    pub fn align(&self, source: &PointCloud<T>, target: &PointCloud<T>) -> SuiteResult<AlignmentOutcome<T>> {
        if source.is_empty() || target.is_empty() {
            return Err(SuiteError::Algorithm(CloudError::InvalidArgument("source and target clouds must be non-empty".into())));
        }
        log::debug!("aligning clouds of {} and {} points", source.len(), target.len());

        let source = self.filter(source)?;
        let target = self.filter(target)?;

        let source_index = build_index(&source.points, mapping_algorithms::metric::L2);
        let target_index = build_index(&target.points, mapping_algorithms::metric::L2);

        let source_keypoints = self.keypoint_detector.detect(&source.points, source.normals.as_deref(), source_index.as_ref());
        let target_keypoints = self.keypoint_detector.detect(&target.points, target.normals.as_deref(), target_index.as_ref());

        let source_normals = match &source.normals {
            Some(normals) => normals.clone(),
            None => estimate_normals(&source.points, source_index.as_ref(), self.normal_neighbors, None),
        };
        let target_normals = match &target.normals {
            Some(normals) => normals.clone(),
            None => estimate_normals(&target.points, target_index.as_ref(), self.normal_neighbors, None),
        };

        let source_signatures = self.descriptor_extractor.extract(&source.points, &source_normals, source_index.as_ref(), &source_keypoints);
        let target_signatures = self.descriptor_extractor.extract(&target.points, &target_normals, target_index.as_ref(), &target_keypoints);

        let (correspondences, stats) = self.correspondence_generator.generate(&source_signatures, &target_signatures, self.descriptor_metric.as_ref(), &self.correspondence_params);
        if correspondences.is_empty() {
            return Err(SuiteError::Algorithm(CloudError::InsufficientData("no correspondences survived generation and filtering".into())));
        }

        let order = self.sorter.rank(&correspondences);
        let ranked: Vec<_> = order.into_iter().map(|i| correspondences[i]).collect();

        let source_keypoint_points: Vec<Point3<T>> = source_keypoints.iter().map(|&i| source.points[i]).collect();
        let target_keypoint_points: Vec<Point3<T>> = target_keypoints.iter().map(|&i| target.points[i]).collect();

        let coarse = self.coarse.register(&source_keypoint_points, &target_keypoint_points, &ranked);

        let target_for_fine = PointCloud {
            points: target.points.clone(),
            normals: Some(target_normals),
            colors: target.colors.clone(),
            intensity: target.intensity.clone(),
        };
        let fine = self.fine.align(&source, &target_for_fine, coarse.transform, self.record_history);

        Ok(AlignmentOutcome {
            source_keypoints,
            target_keypoints,
            stats,
            coarse,
            fine,
        })
    }

    fn filter(&self, cloud: &PointCloud<T>) -> SuiteResult<PointCloud<T>> {
        match self.voxel_cell_size {
            Some(cell_size) => Ok(mapping_algorithms::filters::voxel_grid_downsample(cloud, cell_size)?),
            None => Ok(cloud.clone()),
        }
    }
}

/// Builder for [`AlignmentPipeline`]; every stage is mandatory except the
/// voxel pre-filter and history recording, which default to disabled.
pub struct AlignmentPipelineBuilder<T: Scalar> {
    voxel_cell_size: Option<T>,
    keypoint_detector: Option<Box<dyn KeypointDetector<T> + Send + Sync>>,
    normal_neighbors: usize,
    descriptor_extractor: Option<Box<dyn DescriptorExtractor<T> + Send + Sync>>,
    correspondence_generator: Option<Box<dyn CorrespondenceGenerator<T> + Send + Sync>>,
    correspondence_params: Option<CorrespondenceParams<T>>,
    descriptor_metric: Option<Box<dyn Metric<T>>>,
    sorter: Option<Box<dyn CorrespondenceSorter<T> + Send + Sync>>,
    coarse: Option<Box<dyn CoarseRegistration<T> + Send + Sync>>,
    fine: Option<Box<dyn FineRegistration<T> + Send + Sync>>,
    record_history: bool,
}

impl<T: Scalar> Default for AlignmentPipelineBuilder<T> {
    fn default() -> Self {
        Self {
            voxel_cell_size: None,
            keypoint_detector: None,
            normal_neighbors: 20,
            descriptor_extractor: None,
            correspondence_generator: None,
            correspondence_params: None,
            descriptor_metric: None,
            sorter: None,
            coarse: None,
            fine: None,
            record_history: false,
        }
    }
}

impl<T: Scalar + 'static> AlignmentPipelineBuilder<T> {
    /// Pre-filters both clouds with a voxel grid of the given cell size
    /// before keypoint detection.
    pub fn with_voxel_filter(mut self, cell_size: T) -> Self {
        self.voxel_cell_size = Some(cell_size);
        self
    }

    /// Sets the keypoint detector.
    pub fn with_keypoint_detector(mut self, detector: impl KeypointDetector<T> + Send + Sync + 'static) -> Self {
        self.keypoint_detector = Some(Box::new(detector));
        self
    }

    /// Sets the neighbour count used when normals are not already attached
    /// to a loaded cloud.
    pub fn with_normal_neighbors(mut self, k: usize) -> Self {
        self.normal_neighbors = k;
        self
    }

    /// Sets the descriptor extractor.
    pub fn with_descriptor_extractor(mut self, extractor: impl DescriptorExtractor<T> + Send + Sync + 'static) -> Self {
        self.descriptor_extractor = Some(Box::new(extractor));
        self
    }

    /// Sets the correspondence generator and its parameters.
    pub fn with_correspondence_generator(mut self, generator: impl CorrespondenceGenerator<T> + Send + Sync + 'static, params: CorrespondenceParams<T>) -> Self {
        self.correspondence_generator = Some(Box::new(generator));
        self.correspondence_params = Some(params);
        self
    }

    /// Sets the descriptor-space metric correspondences are generated under.
    pub fn with_descriptor_metric(mut self, metric: impl Metric<T> + 'static) -> Self {
        self.descriptor_metric = Some(Box::new(metric));
        self
    }

    /// Sets the correspondence ranking sorter.
    pub fn with_sorter(mut self, sorter: impl CorrespondenceSorter<T> + Send + Sync + 'static) -> Self {
        self.sorter = Some(Box::new(sorter));
        self
    }

    /// Sets the coarse registration algorithm.
    pub fn with_coarse_registration(mut self, coarse: impl CoarseRegistration<T> + Send + Sync + 'static) -> Self {
        self.coarse = Some(Box::new(coarse));
        self
    }

    /// Sets the fine registration algorithm.
    pub fn with_fine_registration(mut self, fine: impl FineRegistration<T> + Send + Sync + 'static) -> Self {
        self.fine = Some(Box::new(fine));
        self
    }

    /// Whether fine registration should keep a per-iteration history.
    pub fn with_history_recording(mut self, record_history: bool) -> Self {
        self.record_history = record_history;
        self
    }

    /// Builds the pipeline, failing if any mandatory stage was not set.
    pub fn build(self) -> SuiteResult<AlignmentPipeline<T>> {
        let missing = |name: &str| SuiteError::Algorithm(CloudError::NotConfigured(format!("pipeline stage '{name}' was not set")));
        Ok(AlignmentPipeline {
            voxel_cell_size: self.voxel_cell_size,
            keypoint_detector: self.keypoint_detector.ok_or_else(|| missing("keypoint_detector"))?,
            normal_neighbors: self.normal_neighbors,
            descriptor_extractor: self.descriptor_extractor.ok_or_else(|| missing("descriptor_extractor"))?,
            correspondence_generator: self.correspondence_generator.ok_or_else(|| missing("correspondence_generator"))?,
            correspondence_params: self.correspondence_params.ok_or_else(|| missing("correspondence_generator"))?,
            descriptor_metric: self.descriptor_metric.unwrap_or_else(|| Box::new(mapping_algorithms::metric::L2)),
            sorter: self.sorter.ok_or_else(|| missing("sorter"))?,
            coarse: self.coarse.ok_or_else(|| missing("coarse_registration"))?,
            fine: self.fine.ok_or_else(|| missing("fine_registration"))?,
            record_history: self.record_history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapping_algorithms::correspondence::KnnCorrespondenceGenerator;
    use mapping_algorithms::correspondence::ranking::DescriptorDistanceSorter;
    use mapping_algorithms::descriptors::Fpfh;
    use mapping_algorithms::keypoints::Curvature;
    use mapping_algorithms::registration::coarse::{RansacConfiguration, RansacRegistration};
    use mapping_algorithms::registration::fine::{PointToPointIcp, PointToPointIcpConfiguration};
    use nalgebra::Point3;

    fn cube_cloud() -> PointCloud<f64> {
        PointCloud::from_points(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
        ])
    }

    #[test]
    fn build_fails_when_a_stage_is_missing() {
        let result = AlignmentPipeline::<f64>::builder().with_keypoint_detector(Curvature { num_neighbors: 5, threshold: 0.0, nms_radius: 0.01 }).build();
        assert!(result.is_err());
    }

    #[test]
    fn identity_alignment_recovers_the_identity_transform() {
        let cloud = cube_cloud();
        let pipeline = AlignmentPipeline::builder()
            .with_keypoint_detector(Curvature { num_neighbors: 5, threshold: -1.0, nms_radius: 1e-6 })
            .with_descriptor_extractor(Fpfh { search_radius: 1.5, num_neighbors: 5 })
            .with_correspondence_generator(
                KnnCorrespondenceGenerator,
                CorrespondenceParams { ratio: 1.0, mutual_verification: false, distance_threshold: None },
            )
            .with_sorter(DescriptorDistanceSorter)
            .with_coarse_registration(RansacRegistration::new(RansacConfiguration {
                max_iterations: 50,
                inlier_threshold: 0.2,
                confidence: 0.99,
                sample_size: 3,
                refine_result: true,
                early_stop_ratio: 0.99,
                seed: 42,
            }))
            .with_fine_registration(PointToPointIcp::new(PointToPointIcpConfiguration {
                max_iterations: 10,
                max_correspondence_distance: 1.0,
                min_correspondences: 3,
                outlier_rejection_ratio: 0.0,
                transformation_epsilon: 1e-8,
                euclidean_fitness_epsilon: 1e-8,
            }))
            .build()
            .unwrap();

        let outcome = pipeline.align(&cloud, &cloud).unwrap();
        assert!(outcome.fine.success);
        assert!(outcome.fine.fitness_score < 1e-3);
    }

    #[test]
    fn rejects_empty_clouds() {
        let pipeline = AlignmentPipeline::builder()
            .with_keypoint_detector(Curvature { num_neighbors: 5, threshold: -1.0, nms_radius: 1e-6 })
            .with_descriptor_extractor(Fpfh { search_radius: 1.5, num_neighbors: 5 })
            .with_correspondence_generator(
                KnnCorrespondenceGenerator,
                CorrespondenceParams { ratio: 1.0, mutual_verification: false, distance_threshold: None },
            )
            .with_sorter(DescriptorDistanceSorter)
            .with_coarse_registration(RansacRegistration::new(RansacConfiguration {
                max_iterations: 10,
                inlier_threshold: 0.2,
                confidence: 0.9,
                sample_size: 3,
                refine_result: false,
                early_stop_ratio: 0.99,
                seed: 1,
            }))
            .with_fine_registration(PointToPointIcp::new(PointToPointIcpConfiguration {
                max_iterations: 5,
                max_correspondence_distance: 1.0,
                min_correspondences: 3,
                outlier_rejection_ratio: 0.0,
                transformation_epsilon: 1e-6,
                euclidean_fitness_epsilon: 1e-6,
            }))
            .build()
            .unwrap();

        let empty = PointCloud::from_points(vec![]);
        assert!(pipeline.align(&empty, &empty).is_err());
    }
}
