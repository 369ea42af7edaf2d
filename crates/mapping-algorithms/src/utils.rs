use crate::point_cloud::Scalar;
use nalgebra::Point3;

/// Squared Euclidean distance between two 3D points, avoiding the `sqrt` the
/// full distance would need. Used by every nearest-neighbour path, since
/// ordering by squared distance is equivalent to ordering by distance.
#[inline]
pub(crate) fn distance_squared<T: Scalar>(a: &Point3<T>, b: &Point3<T>) -> T {
    (a - b).norm_squared()
}

/// Centroid of a point slice; `Point3::origin()` for an empty slice.
#[inline]
pub(crate) fn centroid<T: Scalar>(points: &[Point3<T>]) -> Point3<T> {
    if points.is_empty() {
        return Point3::origin();
    }
    let sum = points
        .iter()
        .fold(Point3::origin().coords, |acc, p| acc + p.coords);
    let count: T = num_traits::cast(points.len()).unwrap();
    Point3::from(sum / count)
}
