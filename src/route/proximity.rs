use crate::route::types::{Coordinate, TracePoint};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}

/// On equal distances the earliest vertex wins.
pub fn nearest_index(points: &[TracePoint], target: &Coordinate) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;

    for (idx, point) in points.iter().enumerate() {
        let dist = point.coordinate().distance_to(target);
        match best {
            Some((_, best_dist)) if dist >= best_dist => {}
            _ => best = Some((idx, dist)),
        }
    }

    best.map(|(idx, _)| idx)
}

pub fn segment_length(points: &[TracePoint], idx: usize) -> f64 {
    match (points.get(idx), points.get(idx + 1)) {
        (Some(a), Some(b)) => a.coordinate().distance_to(&b.coordinate()),
        _ => 0.0,
    }
}

pub fn arc_length(points: &[TracePoint], from: usize, to: usize) -> f64 {
    (from..to).map(|idx| segment_length(points, idx)).sum()
}

/// Walk `distance` meters forward from vertex `start`, clamping to the last vertex.
pub fn walk_forward(points: &[TracePoint], start: usize, distance: f64) -> Option<Coordinate> {
    let last = points.len().checked_sub(1)?;
    let start = start.min(last);

    if distance.is_nan() || distance <= 0.0 {
        return Some(points[start].coordinate());
    }

    let mut travelled = 0.0;
    for idx in start..last {
        let a = points[idx].coordinate();
        let b = points[idx + 1].coordinate();
        let segment = a.distance_to(&b);

        if travelled + segment >= distance {
            let fraction = if segment > 0.0 {
                (distance - travelled) / segment
            } else {
                0.0
            };
            return Some(a.lerp(&b, fraction));
        }

        travelled += segment;
    }

    Some(points[last].coordinate())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn polyline(coords: &[(f64, f64)]) -> Vec<TracePoint> {
        coords
            .iter()
            .map(|&(lat, lon)| TracePoint::new(Coordinate::new(lat, lon), None, None))
            .collect()
    }

    #[test]
    fn test_haversine_identical_points() {
        assert_eq!(haversine_distance(48.2, 16.3, 48.2, 16.3), 0.0);
    }

    #[test]
    fn test_haversine_one_millidegree_at_equator() {
        let d = haversine_distance(0.0, 0.0, 0.0, 0.001);
        assert_relative_eq!(d, 111.19, epsilon = 0.01);
    }

    #[test]
    fn test_haversine_is_symmetric() {
        let ab = haversine_distance(51.5074, -0.1278, 48.8566, 2.3522);
        let ba = haversine_distance(48.8566, 2.3522, 51.5074, -0.1278);
        assert_relative_eq!(ab, ba);
        assert_relative_eq!(ab, 343_556.0, max_relative = 0.001);
    }

    #[test]
    fn test_nearest_index_prefers_lowest_on_tie() {
        let points = polyline(&[(0.0, 0.0), (0.0, 0.001), (0.0, 0.0), (0.0, 0.002)]);
        let target = Coordinate::new(0.0, 0.0);
        assert_eq!(nearest_index(&points, &target), Some(0));

        // Equidistant from vertices 0 and 1
        let midway = Coordinate::new(0.0, 0.0005);
        assert_eq!(nearest_index(&points, &midway), Some(0));
    }

    #[test]
    fn test_nearest_index_is_deterministic() {
        let points = polyline(&[(0.0, 0.0), (0.0, 0.001), (0.001, 0.001), (0.001, 0.002)]);
        let target = Coordinate::new(0.0008, 0.0011);
        let first = nearest_index(&points, &target);
        for _ in 0..10 {
            assert_eq!(nearest_index(&points, &target), first);
        }
        assert_eq!(first, Some(2));
    }

    #[test]
    fn test_nearest_index_empty() {
        assert_eq!(nearest_index(&[], &Coordinate::new(0.0, 0.0)), None);
    }

    #[test]
    fn test_walk_forward_interpolates_on_second_segment() {
        let points = polyline(&[(0.0, 0.0), (0.0, 0.001), (0.0, 0.002)]);
        let seg = segment_length(&points, 0);
        let result = walk_forward(&points, 0, 150.0).unwrap();

        let fraction = (150.0 - seg) / seg;
        assert_relative_eq!(fraction, 0.35, epsilon = 0.01);
        assert_relative_eq!(result.longitude, 0.001 + 0.001 * fraction, epsilon = 1e-12);
        assert_relative_eq!(result.latitude, 0.0);
    }

    #[test]
    fn test_walk_forward_clamps_to_last_vertex() {
        let points = polyline(&[(0.0, 0.0), (0.0, 0.001), (0.0, 0.002)]);
        let result = walk_forward(&points, 1, 10_000.0).unwrap();
        assert_eq!(result, Coordinate::new(0.0, 0.002));
    }

    #[test]
    fn test_walk_forward_zero_distance_stays_on_anchor() {
        let points = polyline(&[(0.0, 0.0), (0.0, 0.001)]);
        assert_eq!(
            walk_forward(&points, 1, 0.0),
            Some(Coordinate::new(0.0, 0.001))
        );
        assert_eq!(walk_forward(&points, 0, -5.0), Some(Coordinate::new(0.0, 0.0)));
    }

    #[test]
    fn test_walk_forward_exact_vertex() {
        let points = polyline(&[(0.0, 0.0), (0.0, 0.001), (0.0, 0.002)]);
        let seg = segment_length(&points, 0);
        let result = walk_forward(&points, 0, seg).unwrap();
        assert_relative_eq!(result.longitude, 0.001, epsilon = 1e-12);
    }

    #[test]
    fn test_walk_forward_empty_polyline() {
        assert_eq!(walk_forward(&[], 0, 10.0), None);
    }

    #[test]
    fn test_arc_length() {
        let points = polyline(&[(0.0, 0.0), (0.0, 0.001), (0.0, 0.002)]);
        assert_relative_eq!(arc_length(&points, 0, 2), 2.0 * segment_length(&points, 0));
        assert_eq!(arc_length(&points, 1, 1), 0.0);
    }
}
