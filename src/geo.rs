//! Great-circle distances between compartments.

/// Earth radius used by [`haversine_km`].
pub const EARTH_RADIUS_KM: f64 = 6367.0;

/// Great-circle distance in kilometres between two `(lat, long)` points
/// given in decimal degrees.
#[must_use]
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Symmetric distance matrix with a zero diagonal.
#[must_use]
pub fn distance_matrix(points: &[(f64, f64)]) -> Vec<Vec<f64>> {
    let n = points.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = haversine_km(points[i], points[j]);
            matrix[i][j] = d;
            matrix[j][i] = d;
        }
    }
    matrix
}
