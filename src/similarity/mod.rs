use ndarray::{ArrayView1, ArrayView2};

/// Euclidean distance between two points of equal dimension.
pub fn euclidean_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    let mut squared_dist = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        let diff = x - y;
        squared_dist += diff * diff;
    }
    squared_dist.sqrt()
}

/// Distances between all row pairs `(i, j)` with `i < j`, ordered by `i`
/// then `j`.
pub fn pairwise_distances(points: ArrayView2<f64>) -> Vec<f64> {
    let n = points.nrows();
    let mut distances = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            distances.push(euclidean_distance(points.row(i), points.row(j)));
        }
    }
    distances
}

/// Sum of all pairwise row distances; zero for fewer than two rows.
pub fn pairwise_distance_sum(points: ArrayView2<f64>) -> f64 {
    pairwise_distances(points).iter().sum()
}
