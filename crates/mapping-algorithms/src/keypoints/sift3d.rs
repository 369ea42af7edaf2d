use super::{non_max_suppress, pca_eigenvalues, KeypointDetector};
use crate::neighbor_search::NeighborSearch;
use crate::point_cloud::Scalar;
use nalgebra::{Point3, Vector3};

/// SIFT 3D: builds a discrete scale space of a smoothed curvature-like
/// response, finds points that are simultaneous extrema across scale and
/// space, and discards low-contrast or edge-like extrema via a
/// principal-curvature ratio test.
///
/// Sub-voxel refinement (fitting a local parabola across scale to interpolate
/// the extremum) is approximated by reporting the discrete scale level's
/// point directly; no continuous re-sampling of the cloud is performed.
pub struct Sift3d<T: Scalar> {
    /// Number of discrete scale levels sampled (`>= 3` needed to find extrema).
    pub num_scales: usize,
    /// Neighbourhood radius at the coarsest scale level.
    pub base_radius: T,
    /// Multiplicative radius growth between consecutive scale levels.
    pub scale_factor: T,
    /// Minimum `|DoG|` response to keep a candidate (rejects low contrast).
    pub contrast_threshold: T,
    /// Maximum ratio between the two largest PCA eigenvalues; extrema whose
    /// neighbourhood is edge-like (a high ratio) are discarded.
    pub edge_ratio_threshold: T,
    /// Non-maximum-suppression radius applied to the surviving candidates.
    pub nms_radius: T,
}

fn response_at_scale<T: Scalar>(points: &[Point3<T>], index: &dyn NeighborSearch<T>, i: usize, radius: T) -> Option<f64> {
    let neighbors = index.radius(&points[i], radius);
    if neighbors.len() < 3 {
        return None;
    }
    let neighborhood: Vec<usize> = neighbors.into_iter().map(|(idx, _)| idx).collect();
    let [l0, l1, l2] = pca_eigenvalues(points, &neighborhood)?;
    let sum = l0 + l1 + l2;
    if sum <= 0.0 {
        return None;
    }
    Some(l0 / sum)
}

impl<T: Scalar> KeypointDetector<T> for Sift3d<T> {
    fn detect(&self, points: &[Point3<T>], _normals: Option<&[Vector3<T>]>, index: &dyn NeighborSearch<T>) -> Vec<usize> {
        let num_scales = self.num_scales.max(3);
        let radii: Vec<T> = (0..num_scales)
            .map(|s| self.base_radius * self.scale_factor.powi(s as i32))
            .collect();

        // responses[s][i] = smoothed response of point i at scale s.
        let responses: Vec<Vec<Option<f64>>> = radii
            .iter()
            .map(|&radius| (0..points.len()).map(|i| response_at_scale(points, index, i, radius)).collect())
            .collect();

        // dog[s][i] = difference-of-response between consecutive scales.
        let dog: Vec<Vec<Option<f64>>> = (0..num_scales - 1)
            .map(|s| {
                (0..points.len())
                    .map(|i| match (responses[s][i], responses[s + 1][i]) {
                        (Some(a), Some(b)) => Some(a - b),
                        _ => None,
                    })
                    .collect()
            })
            .collect();

        let contrast_threshold: f64 = self.contrast_threshold.to_f64().unwrap();
        let edge_ratio_threshold: f64 = self.edge_ratio_threshold.to_f64().unwrap();

        let mut candidates = Vec::new();
        for s in 1..dog.len() - 1 {
            for i in 0..points.len() {
                let Some(value) = dog[s][i] else { continue };
                if value.abs() <= contrast_threshold {
                    continue;
                }

                let spatial_neighbors: Vec<usize> = index.radius(&points[i], radii[s]).into_iter().map(|(idx, _)| idx).collect();
                let is_extremum = |scale_offset: usize| -> bool {
                    spatial_neighbors.iter().all(|&n| match dog[scale_offset][n] {
                        Some(other) => {
                            if value > 0.0 {
                                other <= value
                            } else {
                                other >= value
                            }
                        }
                        None => true,
                    })
                };
                if !(is_extremum(s - 1) && is_extremum(s) && is_extremum(s + 1)) {
                    continue;
                }

                let neighborhood: Vec<usize> = index.radius(&points[i], radii[s]).into_iter().map(|(idx, _)| idx).collect();
                let Some([l0, l1, l2]) = pca_eigenvalues(points, &neighborhood) else {
                    continue;
                };
                if l1 <= 1e-15 {
                    continue;
                }
                let _ = l0;
                let ratio = l2 / l1;
                if ratio > edge_ratio_threshold {
                    continue;
                }

                candidates.push((i, num_traits::cast(value.abs()).unwrap()));
            }
        }
        non_max_suppress(points, candidates, self.nms_radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::L2;
    use crate::neighbor_search::BruteForceSearch;

    #[test]
    fn flat_plane_yields_no_scale_space_extrema() {
        let plane: Vec<Point3<f64>> = (0..8)
            .flat_map(|x| (0..8).map(move |y| Point3::new(x as f64 * 0.1, y as f64 * 0.1, 0.0)))
            .collect();
        let index = BruteForceSearch::new(&plane, L2);
        let detector = Sift3d {
            num_scales: 4,
            base_radius: 0.1,
            scale_factor: 1.6,
            contrast_threshold: 0.01,
            edge_ratio_threshold: 10.0,
            nms_radius: 0.05,
        };
        assert!(detector.detect(&plane, None, &index).is_empty());
    }
}
