//! Vectorise one labelled component into a GeoJSON polygon.
//!
//! Boundary edges run along pixel sides. Each edge is directed so the
//! component lies on its right when walking it in image coordinates (rows
//! grow downward), so traced rings run clockwise on the map. Rings are
//! reversed on output: exterior counter-clockwise, holes clockwise. Where
//! two diagonal pixels of the same component touch at a corner, the trace
//! turns left so 8-connected pixels stay in one ring.

use crate::types::{GeoTransform, Polygon};
use ndarray::Array2;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Dir {
    East,
    South,
    West,
    North,
}

impl Dir {
    fn left(self) -> Dir {
        match self {
            Dir::East => Dir::North,
            Dir::North => Dir::West,
            Dir::West => Dir::South,
            Dir::South => Dir::East,
        }
    }

    fn right(self) -> Dir {
        self.left().left().left()
    }

    /// End vertex of a unit edge starting at (row, col)
    fn step(self, (row, col): (usize, usize)) -> (usize, usize) {
        match self {
            Dir::East => (row, col + 1),
            Dir::South => (row + 1, col),
            Dir::West => (row, col - 1),
            Dir::North => (row - 1, col),
        }
    }
}

/// Grid-corner vertex as (row, col)
type Vertex = (usize, usize);

/// Outgoing unused boundary edges per vertex
struct EdgeSet {
    edges: BTreeMap<Vertex, Vec<Dir>>,
}

impl EdgeSet {
    fn insert(&mut self, from: Vertex, dir: Dir) {
        self.edges.entry(from).or_default().push(dir);
    }

    fn take(&mut self, from: Vertex, dir: Dir) -> bool {
        if let Some(dirs) = self.edges.get_mut(&from) {
            if let Some(pos) = dirs.iter().position(|d| *d == dir) {
                dirs.swap_remove(pos);
                if dirs.is_empty() {
                    self.edges.remove(&from);
                }
                return true;
            }
        }
        false
    }

    /// Next edge leaving `at` after arriving along `incoming`:
    /// left turn first, then straight, then right.
    fn take_next(&mut self, at: Vertex, incoming: Dir) -> Option<Dir> {
        [incoming.left(), incoming, incoming.right()]
            .into_iter()
            .find(|d| self.take(at, *d))
    }

    /// Deterministic start for the next ring, preferring unambiguous vertices
    fn next_start(&self) -> Option<(Vertex, Dir)> {
        self.edges
            .iter()
            .find(|(_, dirs)| dirs.len() == 1)
            .or_else(|| self.edges.iter().next())
            .and_then(|(v, dirs)| dirs.iter().min().map(|d| (*v, *d)))
    }
}

/// Polygon for the pixels of `labels` equal to `label`.
///
/// `seed` must be the first pixel of the component in row-major order.
pub fn polygonize_component(
    labels: &Array2<u32>,
    label: u32,
    pixels: &[(usize, usize)],
    seed: (usize, usize),
    transform: &GeoTransform,
) -> Polygon {
    let (height, width) = labels.dim();
    let inside = |r: isize, c: isize| -> bool {
        r >= 0 && c >= 0 && (r as usize) < height && (c as usize) < width && labels[[r as usize, c as usize]] == label
    };

    let mut set = EdgeSet { edges: BTreeMap::new() };
    for &(r, c) in pixels {
        let (ri, ci) = (r as isize, c as isize);
        if !inside(ri - 1, ci) {
            set.insert((r, c), Dir::East);
        }
        if !inside(ri, ci + 1) {
            set.insert((r, c + 1), Dir::South);
        }
        if !inside(ri + 1, ci) {
            set.insert((r + 1, c + 1), Dir::West);
        }
        if !inside(ri, ci - 1) {
            set.insert((r + 1, c), Dir::North);
        }
    }

    let mut rings = Vec::new();
    // The seed's top edge always lies on the exterior ring
    let mut start = Some((seed, Dir::East));
    while let Some((vertex, dir)) = start {
        if !set.take(vertex, dir) {
            break;
        }
        let ring = trace_ring(&mut set, vertex, dir);
        rings.push(
            ring.into_iter()
                .rev()
                .map(|(row, col)| {
                    let (lon, lat) = transform.pixel_to_geo(col as f64, row as f64);
                    [lon, lat]
                })
                .collect(),
        );
        start = set.next_start();
    }

    Polygon::new(rings)
}

/// Follow edges from `start` until the ring closes. Only corner vertices
/// are kept; the returned ring repeats its first vertex at the end.
fn trace_ring(set: &mut EdgeSet, start: Vertex, first_dir: Dir) -> Vec<Vertex> {
    let mut ring = vec![start];
    let mut dir = first_dir;
    let mut at = dir.step(start);

    while at != start {
        let Some(next) = set.take_next(at, dir) else {
            // Open chain; cannot happen for a well-formed edge set
            break;
        };
        if next != dir {
            ring.push(at);
        }
        dir = next;
        at = dir.step(at);
    }

    ring.push(start);
    ring
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    fn unit_transform(n: usize) -> GeoTransform {
        // One degree per pixel, top-left at (0, n)
        GeoTransform::from_bounds(&BoundingBox::new(0.0, 0.0, n as f64, n as f64).unwrap(), n, n)
    }

    fn component(labels: &Array2<u32>, label: u32) -> Vec<(usize, usize)> {
        labels.indexed_iter().filter(|(_, v)| **v == label).map(|(p, _)| p).collect()
    }

    #[test]
    fn test_single_pixel_square() {
        let mut labels = Array2::<u32>::zeros((3, 3));
        labels[[1, 1]] = 1;
        let pixels = component(&labels, 1);
        let poly = polygonize_component(&labels, 1, &pixels, (1, 1), &unit_transform(3));

        assert_eq!(poly.coordinates.len(), 1);
        let ring = poly.exterior().unwrap();
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.first(), ring.last());
        assert_eq!(ring[0], [1.0, 2.0]);
        assert_eq!(ring[1], [1.0, 1.0]);
        assert_eq!(ring[2], [2.0, 1.0]);
        assert_eq!(ring[3], [2.0, 2.0]);
    }

    #[test]
    fn test_diagonal_pixels_form_one_ring() {
        let mut labels = Array2::<u32>::zeros((2, 2));
        labels[[0, 0]] = 1;
        labels[[1, 1]] = 1;
        let pixels = component(&labels, 1);
        let poly = polygonize_component(&labels, 1, &pixels, (0, 0), &unit_transform(2));

        assert_eq!(poly.coordinates.len(), 1);
        // Two squares joined at the pinch vertex: 8 corners + closing vertex
        assert_eq!(poly.exterior().unwrap().len(), 9);
    }

    #[test]
    fn test_ring_with_hole() {
        let mut labels = Array2::<u32>::from_elem((3, 3), 1);
        labels[[1, 1]] = 0;
        let pixels = component(&labels, 1);
        let poly = polygonize_component(&labels, 1, &pixels, (0, 0), &unit_transform(3));

        assert_eq!(poly.coordinates.len(), 2);
        assert_eq!(poly.exterior().unwrap().len(), 5);
        assert_eq!(poly.holes().len(), 1);
        assert_eq!(poly.holes()[0].len(), 5);
    }

    #[test]
    fn test_exterior_is_counter_clockwise() {
        let mut labels = Array2::<u32>::zeros((4, 4));
        for r in 1..3 {
            for c in 0..3 {
                labels[[r, c]] = 1;
            }
        }
        let pixels = component(&labels, 1);
        let poly = polygonize_component(&labels, 1, &pixels, (1, 0), &unit_transform(4));
        let ring = poly.exterior().unwrap();

        let twice_area: f64 = ring.windows(2).map(|w| w[0][0] * w[1][1] - w[1][0] * w[0][1]).sum();
        assert!((twice_area - 12.0).abs() < 1e-9);
    }
}
