use super::{non_max_suppress, KeypointDetector};
use crate::neighbor_search::NeighborSearch;
use crate::point_cloud::Scalar;
use nalgebra::{DMatrix, DVector, Point3, Vector3};

/// The degree of the local polynomial [`Mls`] fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolynomialOrder {
    /// No fit: response is the residual against the local PCA plane alone.
    None,
    /// Fits `z' = d*x' + e*y' + f`.
    Linear,
    /// Fits `z' = a*x'^2 + b*y'^2 + c*x'y' + d*x' + e*y' + f`.
    Quadratic,
}

/// Moving Least Squares: fits a local polynomial surface in the tangent
/// plane of each point's neighbourhood and flags points whose surface
/// variation (mean squared residual, plus fitted curvature at order 2)
/// exceeds a threshold.
pub struct Mls<T: Scalar> {
    /// Number of neighbours (including self) the local frame and fit use.
    pub num_neighbors: usize,
    /// Polynomial order of the local fit.
    pub order: PolynomialOrder,
    /// Minimum response to accept a point as a candidate.
    pub threshold: T,
    /// Non-maximum-suppression radius.
    pub nms_radius: T,
}

fn local_frame(points: &[Point3<f64>], neighborhood: &[usize]) -> Option<(Point3<f64>, Vector3<f64>, Vector3<f64>, Vector3<f64>)> {
    if neighborhood.len() < 3 {
        return None;
    }
    let n = neighborhood.len() as f64;
    let mut centroid = Point3::origin();
    for &idx in neighborhood {
        centroid.coords += points[idx].coords;
    }
    centroid.coords /= n;

    let mut cov = nalgebra::Matrix3::<f64>::zeros();
    for &idx in neighborhood {
        let d = points[idx] - centroid;
        cov += d * d.transpose();
    }
    cov /= n;

    let eigen = cov.symmetric_eigen();
    let mut order: Vec<usize> = (0..3).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[a].partial_cmp(&eigen.eigenvalues[b]).unwrap());
    let normal = eigen.eigenvectors.column(order[0]).into_owned();
    let u = eigen.eigenvectors.column(order[1]).into_owned();
    let v = eigen.eigenvectors.column(order[2]).into_owned();
    Some((centroid, normal, u, v))
}

fn fit_residual(order: PolynomialOrder, locals: &[(f64, f64, f64)]) -> f64 {
    match order {
        PolynomialOrder::None => {
            let variance: f64 = locals.iter().map(|&(_, _, h)| h * h).sum::<f64>() / locals.len() as f64;
            variance
        }
        PolynomialOrder::Linear | PolynomialOrder::Quadratic => {
            let cols = if order == PolynomialOrder::Linear { 3 } else { 6 };
            let mut a = DMatrix::<f64>::zeros(locals.len(), cols);
            let mut b = DVector::<f64>::zeros(locals.len());
            for (row, &(x, y, h)) in locals.iter().enumerate() {
                if order == PolynomialOrder::Linear {
                    a.set_row(row, &DMatrix::from_row_slice(1, 3, &[x, y, 1.0]).row(0));
                } else {
                    a.set_row(row, &DMatrix::from_row_slice(1, 6, &[x * x, y * y, x * y, x, y, 1.0]).row(0));
                }
                b[row] = h;
            }
            let svd = a.clone().svd(true, true);
            match svd.solve(&b, 1e-9) {
                Ok(coeffs) => {
                    let residuals = &a * &coeffs - &b;
                    residuals.dot(&residuals) / locals.len() as f64
                }
                Err(_) => locals.iter().map(|&(_, _, h)| h * h).sum::<f64>() / locals.len() as f64,
            }
        }
    }
}

impl<T: Scalar> KeypointDetector<T> for Mls<T> {
    fn detect(&self, points: &[Point3<T>], _normals: Option<&[Vector3<T>]>, index: &dyn NeighborSearch<T>) -> Vec<usize> {
        let points_f64: Vec<Point3<f64>> = points
            .iter()
            .map(|p| Point3::new(p.x.to_f64().unwrap(), p.y.to_f64().unwrap(), p.z.to_f64().unwrap()))
            .collect();
        let threshold: f64 = self.threshold.to_f64().unwrap();

        let mut candidates = Vec::new();
        for (i, p) in points.iter().enumerate() {
            let neighborhood: Vec<usize> = index.k_nearest(p, self.num_neighbors).into_iter().map(|(idx, _)| idx).collect();
            let Some((centroid, normal, u, v)) = local_frame(&points_f64, &neighborhood) else {
                continue;
            };
            let locals: Vec<(f64, f64, f64)> = neighborhood
                .iter()
                .map(|&idx| {
                    let d = points_f64[idx] - centroid;
                    (d.dot(&u), d.dot(&v), d.dot(&normal))
                })
                .collect();
            let response = fit_residual(self.order, &locals);
            if response > threshold {
                candidates.push((i, num_traits::cast(response).unwrap()));
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
    fn flat_plane_has_near_zero_surface_variation() {
        let plane: Vec<Point3<f64>> = (0..6)
            .flat_map(|x| (0..6).map(move |y| Point3::new(x as f64 * 0.1, y as f64 * 0.1, 0.0)))
            .collect();
        let index = BruteForceSearch::new(&plane, L2);
        let detector = Mls {
            num_neighbors: 9,
            order: PolynomialOrder::Quadratic,
            threshold: 1e-4,
            nms_radius: 0.05,
        };
        assert!(detector.detect(&plane, None, &index).is_empty());
    }

    #[test]
    fn a_bump_raises_surface_variation_above_threshold() {
        let mut plane: Vec<Point3<f64>> = (0..6)
            .flat_map(|x| (0..6).map(move |y| Point3::new(x as f64 * 0.1, y as f64 * 0.1, 0.0)))
            .collect();
        plane[18].z = 0.5;
        let index = BruteForceSearch::new(&plane, L2);
        let detector = Mls {
            num_neighbors: 9,
            order: PolynomialOrder::None,
            threshold: 1e-4,
            nms_radius: 0.01,
        };
        assert!(!detector.detect(&plane, None, &index).is_empty());
    }
}
