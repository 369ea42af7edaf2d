use super::KeypointDetector;
use crate::neighbor_search::NeighborSearch;
use crate::point_cloud::Scalar;
use nalgebra::{Point3, Vector3};

/// The three classes LOAM assigns every scan point to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPointLabel {
    /// Sharp scan-line curvature: a likely edge/corner feature.
    Edge,
    /// Low scan-line curvature: a likely planar surface point.
    Planar,
    /// Neither threshold was met.
    None,
}

/// Classifies every point into edge/planar/none by scan-line curvature.
/// Points are assumed ordered along their originating scan line (the
/// cloud's storage order), with curvature computed from a symmetric window
/// of `window_half_size` neighbours on either side — the flattened,
/// single-ring simplification of the original multi-ring LOAM, which this
/// crate's [`crate::PointCloud`] does not model.
pub struct Loam<T: Scalar> {
    /// Half-width (in points) of the scan-line curvature window.
    pub window_half_size: usize,
    /// Curvature at or above this value labels a point `Edge`.
    pub edge_threshold: T,
    /// Curvature at or below this value labels a point `Planar`.
    pub planar_threshold: T,
}

impl<T: Scalar> Loam<T> {
    /// Computes a scan-line curvature label for every point, in order.
    pub fn classify(&self, points: &[Point3<T>]) -> Vec<ScanPointLabel> {
        let n = points.len();
        let w = self.window_half_size;
        let edge_threshold: f64 = self.edge_threshold.to_f64().unwrap();
        let planar_threshold: f64 = self.planar_threshold.to_f64().unwrap();

        (0..n)
            .map(|i| {
                if i < w || i + w >= n {
                    return ScanPointLabel::None;
                }
                let mut sum = Vector3::<f64>::zeros();
                for offset in 1..=w {
                    let lhs = points[i - offset] - points[i];
                    let rhs = points[i + offset] - points[i];
                    sum += Vector3::new(
                        lhs.x.to_f64().unwrap() + rhs.x.to_f64().unwrap(),
                        lhs.y.to_f64().unwrap() + rhs.y.to_f64().unwrap(),
                        lhs.z.to_f64().unwrap() + rhs.z.to_f64().unwrap(),
                    );
                }
                let range = points[i].coords.norm().to_f64().unwrap().max(1e-9);
                let curvature = sum.norm() / ((2 * w) as f64 * range);
                if curvature >= edge_threshold {
                    ScanPointLabel::Edge
                } else if curvature <= planar_threshold {
                    ScanPointLabel::Planar
                } else {
                    ScanPointLabel::None
                }
            })
            .collect()
    }

    /// Indices labelled [`ScanPointLabel::Edge`].
    pub fn edge_indices(&self, points: &[Point3<T>]) -> Vec<usize> {
        self.classify(points)
            .into_iter()
            .enumerate()
            .filter(|(_, l)| *l == ScanPointLabel::Edge)
            .map(|(i, _)| i)
            .collect()
    }

    /// Indices labelled [`ScanPointLabel::Planar`].
    pub fn planar_indices(&self, points: &[Point3<T>]) -> Vec<usize> {
        self.classify(points)
            .into_iter()
            .enumerate()
            .filter(|(_, l)| *l == ScanPointLabel::Planar)
            .map(|(i, _)| i)
            .collect()
    }
}

impl<T: Scalar> KeypointDetector<T> for Loam<T> {
    fn detect(&self, points: &[Point3<T>], _normals: Option<&[Vector3<T>]>, _index: &dyn NeighborSearch<T>) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .classify(points)
            .into_iter()
            .enumerate()
            .filter(|(_, l)| *l != ScanPointLabel::None)
            .map(|(i, _)| i)
            .collect();
        indices.sort_unstable();
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::L2;
    use crate::neighbor_search::BruteForceSearch;

    #[test]
    fn flat_scan_line_is_classified_planar() {
        let points: Vec<Point3<f64>> = (0..20).map(|i| Point3::new(i as f64 * 0.1, 1.0, 0.0)).collect();
        let loam = Loam {
            window_half_size: 3,
            edge_threshold: 0.5,
            planar_threshold: 1e-6,
        };
        let labels = loam.classify(&points);
        assert!(labels[10] == ScanPointLabel::Planar || labels[10] == ScanPointLabel::None);
    }

    #[test]
    fn a_sharp_kink_is_classified_edge() {
        let mut points: Vec<Point3<f64>> = (0..20).map(|i| Point3::new(i as f64 * 0.1, 1.0, 0.0)).collect();
        points[10].y = 5.0;
        let loam = Loam {
            window_half_size: 3,
            edge_threshold: 0.01,
            planar_threshold: 0.0,
        };
        let labels = loam.classify(&points);
        assert_eq!(labels[10], ScanPointLabel::Edge);
    }

    #[test]
    fn detect_ignores_the_unused_index_argument() {
        let points: Vec<Point3<f64>> = (0..10).map(|i| Point3::new(i as f64 * 0.1, 0.0, 0.0)).collect();
        let index = BruteForceSearch::new(&points, L2);
        let loam = Loam {
            window_half_size: 2,
            edge_threshold: 0.01,
            planar_threshold: 0.0,
        };
        let _ = loam.detect(&points, None, &index);
    }
}
