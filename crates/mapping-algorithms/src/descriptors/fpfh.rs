use super::{bin_index, darboux_features, DescriptorExtractor, Signature};
use crate::neighbor_search::NeighborSearch;
use crate::point_cloud::Scalar;
use nalgebra::{Point3, Vector3};
use std::collections::{HashMap, HashSet};
use std::f64::consts::PI;

const SUBDIVISIONS: usize = 11;
const NUM_BINS: usize = SUBDIVISIONS * 3;

/// Computes one point's SPFH directly into `out` (length [`NUM_BINS`]),
/// so the parallel cache-building pass in [`Fpfh::extract`] can write into
/// a pooled buffer instead of allocating a fresh `Vec` per point.
fn spfh_into<T: Scalar>(points: &[Point3<T>], normals: &[Vector3<T>], p: usize, neighborhood: &[usize], out: &mut [T]) {
    debug_assert_eq!(out.len(), NUM_BINS);
    let alpha_lo = -T::one();
    let alpha_hi = T::one();
    let phi_lo = -T::one();
    let phi_hi = T::one();
    let theta_lo: T = num_traits::cast(-PI).unwrap();
    let theta_hi: T = num_traits::cast(PI).unwrap();

    for v in out.iter_mut() {
        *v = T::zero();
    }
    let (alpha_hist, rest) = out.split_at_mut(SUBDIVISIONS);
    let (phi_hist, theta_hist) = rest.split_at_mut(SUBDIVISIONS);
    let mut count = 0usize;

    for &q in neighborhood {
        if q == p {
            continue;
        }
        let Some((alpha, phi, theta)) = darboux_features(&points[p], &normals[p], &points[q], &normals[q]) else {
            continue;
        };
        let a_bin = bin_index(alpha, alpha_lo, alpha_hi, SUBDIVISIONS);
        let p_bin = bin_index(phi, phi_lo, phi_hi, SUBDIVISIONS);
        let t_bin = bin_index(theta, theta_lo, theta_hi, SUBDIVISIONS);
        alpha_hist[a_bin] = alpha_hist[a_bin] + T::one();
        phi_hist[p_bin] = phi_hist[p_bin] + T::one();
        theta_hist[t_bin] = theta_hist[t_bin] + T::one();
        count += 1;
    }

    if count > 0 {
        let n: T = num_traits::cast(count).unwrap();
        for v in out.iter_mut() {
            *v = *v / n;
        }
    }
}

fn spfh<T: Scalar>(points: &[Point3<T>], normals: &[Vector3<T>], p: usize, neighborhood: &[usize]) -> Vec<T> {
    let mut bins = vec![T::zero(); NUM_BINS];
    spfh_into(points, normals, p, neighborhood, &mut bins);
    bins
}

/// Parallel SPFH cache build: one pooled [`NUM_BINS`]-length scratch buffer
/// per rayon work item, checked out of a shared [`crate::pool::Pool`]
/// rather than allocated fresh, per the worker-pool model.
/// Every neighbourhood must already be present in `full_neighborhoods` so
/// the parallel closures never have to touch the (possibly non-`Sync`)
/// search index themselves.
#[cfg(feature = "parallel")]
fn spfh_cache_parallel<T: Scalar + Send + Sync>(
    points: &[Point3<T>],
    normals: &[Vector3<T>],
    needed: &HashSet<usize>,
    full_neighborhoods: &HashMap<usize, Vec<usize>>,
) -> HashMap<usize, Vec<T>> {
    use crate::pool::Pool;
    use rayon::prelude::*;

    let pool: Pool<T> = Pool::new(NUM_BINS, 0, 8, needed.len().max(1));
    needed
        .par_iter()
        .map(|&p| {
            let neighborhood = &full_neighborhoods[&p];
            let mut block = pool.checkout();
            spfh_into(points, normals, p, neighborhood, &mut block);
            (p, block.clone())
        })
        .collect()
}

/// Fast Point Feature Histogram: a two-pass 33-bin descriptor. The first
/// pass computes an SPFH (three 11-bin angle
/// histograms) for every keypoint and the union of their neighbours; the
/// second pass combines each keypoint's own SPFH with its neighbours',
/// inverse-distance weighted, and L1-normalises. This crate pins down the
/// published self-term weighting (`SPFH(p)` counted once, unscaled) rather
/// than the inconsistent `1/(1+weight)` variant noted in some sources.
pub struct Fpfh<T: Scalar> {
    /// Radius defining each point's neighbourhood, used in both passes.
    pub search_radius: T,
    /// Cap on neighbours considered per point.
    pub num_neighbors: usize,
}

impl<T: Scalar + Send + Sync> DescriptorExtractor<T> for Fpfh<T> {
    fn extract(
        &self,
        points: &[Point3<T>],
        normals: &[Vector3<T>],
        index: &dyn NeighborSearch<T>,
        keypoint_indices: &[usize],
    ) -> Vec<Signature<T>> {
        let neighborhoods: HashMap<usize, Vec<usize>> = keypoint_indices
            .iter()
            .map(|&kp| {
                let mut n: Vec<usize> = index.radius(&points[kp], self.search_radius).into_iter().map(|(idx, _)| idx).collect();
                n.truncate(self.num_neighbors.max(1));
                (kp, n)
            })
            .collect();

        let mut needed: HashSet<usize> = HashSet::new();
        for (&kp, neighbors) in &neighborhoods {
            needed.insert(kp);
            needed.extend(neighbors.iter().copied());
        }

        // Every member of `needed` gets its own neighbourhood resolved up
        // front so the parallel accumulation pass below never has to touch
        // `index` itself (search indices aren't guaranteed `Sync`).
        let full_neighborhoods: HashMap<usize, Vec<usize>> = needed
            .iter()
            .map(|&p| {
                let neighborhood = neighborhoods.get(&p).cloned().unwrap_or_else(|| {
                    index.radius(&points[p], self.search_radius).into_iter().map(|(idx, _)| idx).collect()
                });
                (p, neighborhood)
            })
            .collect();

        #[cfg(feature = "parallel")]
        let spfh_cache: HashMap<usize, Vec<T>> = if needed.len() >= crate::neighbor_search::PARALLEL_THRESHOLD {
            spfh_cache_parallel(points, normals, &needed, &full_neighborhoods)
        } else {
            needed.iter().map(|&p| (p, spfh(points, normals, p, &full_neighborhoods[&p]))).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let spfh_cache: HashMap<usize, Vec<T>> =
            needed.iter().map(|&p| (p, spfh(points, normals, p, &full_neighborhoods[&p]))).collect();

        keypoint_indices
            .iter()
            .map(|&kp| {
                let neighborhood = &neighborhoods[&kp];
                let own = &spfh_cache[&kp];
                if neighborhood.is_empty() {
                    let mut sig = Signature { bins: own.clone() };
                    sig.l1_normalize();
                    return sig;
                }

                let mut combined = own.clone();
                let k: T = num_traits::cast(neighborhood.len()).unwrap();
                for &q in neighborhood {
                    if q == kp {
                        continue;
                    }
                    let d = (points[q] - points[kp]).norm();
                    if d <= T::zero() {
                        continue;
                    }
                    let weight = T::one() / (k * d);
                    let neighbor_spfh = &spfh_cache[&q];
                    for (c, &v) in combined.iter_mut().zip(neighbor_spfh.iter()) {
                        *c = *c + v * weight;
                    }
                }

                let mut sig = Signature { bins: combined };
                sig.l1_normalize();
                sig
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::L2;
    use crate::neighbor_search::BruteForceSearch;

    fn grid() -> (Vec<Point3<f64>>, Vec<Vector3<f64>>) {
        let points: Vec<Point3<f64>> = (0..10)
            .flat_map(|x| (0..10).map(move |y| Point3::new(x as f64 * 0.1, y as f64 * 0.1, 0.0)))
            .collect();
        let normals = points.iter().map(|_| Vector3::new(0.0, 0.0, 1.0)).collect();
        (points, normals)
    }

    #[test]
    fn signature_length_is_33_and_sums_to_one() {
        let (points, normals) = grid();
        let index = BruteForceSearch::new(&points, L2);
        let fpfh = Fpfh {
            search_radius: 0.25,
            num_neighbors: 16,
        };
        let signatures = fpfh.extract(&points, &normals, &index, &[44]);
        assert_eq!(signatures[0].bins.len(), NUM_BINS);
        let sum: f64 = signatures[0].bins.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9 || sum == 0.0);
    }

    #[test]
    fn interior_points_on_a_flat_grid_have_nearby_signatures() {
        let (points, normals) = grid();
        let index = BruteForceSearch::new(&points, L2);
        let fpfh = Fpfh {
            search_radius: 0.25,
            num_neighbors: 16,
        };
        let signatures = fpfh.extract(&points, &normals, &index, &[44, 45]);
        let distance = signatures[0].distance(&signatures[1]);
        assert!(distance < 0.1, "distance was {distance}");
    }
}
