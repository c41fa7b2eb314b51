// Vertices are unit vectors, so chord order matches Haversine order. Near-ties
// are re-ranked by Haversine distance, then by vertex index.

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::route::types::{Coordinate, TracePoint};

const CHORD_TIE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone)]
struct VertexNode {
    index: usize,
    point: [f64; 3],
}

impl RTreeObject for VertexNode {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

impl PointDistance for VertexNode {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        let dx = self.point[0] - point[0];
        let dy = self.point[1] - point[1];
        let dz = self.point[2] - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

fn unit_vector(position: &Coordinate) -> [f64; 3] {
    let lat = position.latitude.to_radians();
    let lon = position.longitude.to_radians();
    [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
}

#[derive(Debug)]
pub struct PolylineIndex {
    tree: RTree<VertexNode>,
    vertices: Vec<Coordinate>,
}

impl PolylineIndex {
    pub fn build(points: &[TracePoint]) -> Self {
        let vertices: Vec<Coordinate> = points.iter().map(TracePoint::coordinate).collect();
        let nodes = vertices
            .iter()
            .enumerate()
            .map(|(index, position)| VertexNode {
                index,
                point: unit_vector(position),
            })
            .collect();

        Self {
            tree: RTree::bulk_load(nodes),
            vertices,
        }
    }

    pub fn nearest(&self, target: &Coordinate) -> Option<usize> {
        let query = unit_vector(target);
        let mut cutoff: Option<f64> = None;
        let mut best: Option<(usize, f64)> = None;

        for (node, chord_2) in self.tree.nearest_neighbor_iter_with_distance_2(&query) {
            match cutoff {
                Some(limit) if chord_2 > limit => break,
                Some(_) => {}
                None => cutoff = Some(chord_2 * (1.0 + CHORD_TIE_TOLERANCE) + f64::EPSILON),
            }

            let dist = self.vertices[node.index].distance_to(target);
            let better = match best {
                None => true,
                Some((best_idx, best_dist)) => {
                    dist < best_dist || (dist == best_dist && node.index < best_idx)
                }
            };
            if better {
                best = Some((node.index, dist));
            }
        }

        best.map(|(idx, _)| idx)
    }
}
