use approx::assert_relative_eq;
use hydrosat::core::water_bodies::label_components;
use hydrosat::core::WaterBodyExtractor;
use hydrosat::types::MaskGrid;
use hydrosat::{BoundingBox, GeoTransform, RasterSet};
use ndarray::Array2;

/// Deterministic pseudo-random mask with roughly `percent` water
fn noisy_mask(rows: usize, cols: usize, seed: u64, percent: u64) -> MaskGrid {
    let mut state = seed;
    Array2::from_shape_fn((rows, cols), |_| {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        u8::from((state >> 33) % 100 < percent)
    })
}

fn raster_set(mask: MaskGrid) -> RasterSet {
    let dim = mask.dim();
    let bbox = BoundingBox::new(36.0, -1.0, 37.0, 0.0).unwrap();
    RasterSet {
        tile_id: 1,
        turbidity: Array2::from_elem(dim, 0.1),
        chlorophyll: Array2::from_elem(dim, 8.0),
        water_mask: mask,
        transform: GeoTransform::from_bounds(&bbox, dim.1, dim.0),
    }
}

fn signed_area(ring: &[[f64; 2]]) -> f64 {
    ring.windows(2).map(|w| w[0][0] * w[1][1] - w[1][0] * w[0][1]).sum::<f64>() / 2.0
}

#[test]
fn test_total_area_matches_water_pixels() {
    for seed in 1..6 {
        let mask = noisy_mask(48, 48, seed, 35);
        let water_pixels = mask.iter().filter(|v| **v == 1).count();

        let extraction = WaterBodyExtractor::new().extract(&raster_set(mask)).expect("Extraction failed");
        let total: f64 = extraction.bodies.iter().map(|b| b.area_m2).sum();
        assert_relative_eq!(total, water_pixels as f64 * 100.0);
    }
}

#[test]
fn test_components_are_not_eight_adjacent() {
    let mask = noisy_mask(40, 40, 7, 30);
    let labelled = label_components(&mask);
    let (height, width) = mask.dim();

    for r in 0..height {
        for c in 0..width {
            let label = labelled.labels[[r, c]];
            assert_eq!(label == 0, mask[[r, c]] == 0);
            if label == 0 {
                continue;
            }
            for nr in r.saturating_sub(1)..=(r + 1).min(height - 1) {
                for nc in c.saturating_sub(1)..=(c + 1).min(width - 1) {
                    let other = labelled.labels[[nr, nc]];
                    assert!(other == 0 || other == label, "pixels ({},{}) and ({},{}) touch", r, c, nr, nc);
                }
            }
        }
    }
    let labelled_pixels: usize = labelled.components.iter().map(|p| p.len()).sum();
    assert_eq!(labelled_pixels, mask.iter().filter(|v| **v == 1).count());
}

#[test]
fn test_separate_blobs_counted_independently() {
    let mut mask = MaskGrid::zeros((30, 30));
    let corners = [(1, 1), (1, 20), (20, 1), (20, 20), (10, 10)];
    for (r0, c0) in corners {
        for r in r0..r0 + 5 {
            for c in c0..c0 + 5 {
                mask[[r, c]] = 1;
            }
        }
    }

    let extraction = WaterBodyExtractor::new().extract(&raster_set(mask)).expect("Extraction failed");
    assert_eq!(extraction.count(), 5);
    assert!(extraction.bodies.iter().all(|b| b.area_m2 == 2_500.0));
}

#[test]
fn test_polygon_rings_enclose_component_area() {
    let mask = noisy_mask(32, 32, 11, 55);
    let set = raster_set(mask);
    let (dx, dy) = (set.transform.pixel_width, set.transform.pixel_height.abs());
    let extraction = WaterBodyExtractor::new().extract(&set).expect("Extraction failed");

    for body in &extraction.bodies {
        let exterior = body.geometry.exterior().expect("Missing exterior ring");
        assert_eq!(exterior.first(), exterior.last());
        assert!(signed_area(exterior) > 0.0, "exterior of {} is not counter-clockwise", body.id);
        for hole in body.geometry.holes() {
            assert_eq!(hole.first(), hole.last());
            assert!(signed_area(hole) < 0.0, "hole of {} is not clockwise", body.id);
        }

        let enclosed: f64 = body.geometry.coordinates.iter().map(|ring| signed_area(ring)).sum();
        let pixels = body.area_m2 / 100.0;
        assert_relative_eq!(enclosed, pixels * dx * dy, max_relative = 1e-9);
    }
}

/// Union-find component count, independent of the BFS labeller
fn union_find_count(mask: &MaskGrid) -> usize {
    let (height, width) = mask.dim();
    let mut parent: Vec<usize> = (0..height * width).collect();
    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for r in 0..height {
        for c in 0..width {
            if mask[[r, c]] != 1 {
                continue;
            }
            // Already-visited neighbours: W, NW, N, NE
            let neighbours = [(0isize, -1isize), (-1, -1), (-1, 0), (-1, 1)];
            for (dr, dc) in neighbours {
                let (nr, nc) = (r as isize + dr, c as isize + dc);
                if nr < 0 || nc < 0 || nc >= width as isize {
                    continue;
                }
                let (nr, nc) = (nr as usize, nc as usize);
                if mask[[nr, nc]] == 1 {
                    let a = find(&mut parent, r * width + c);
                    let b = find(&mut parent, nr * width + nc);
                    parent[a] = b;
                }
            }
        }
    }

    (0..height * width)
        .filter(|&i| mask[[i / width, i % width]] == 1 && find(&mut parent, i) == i)
        .count()
}

#[test]
fn test_component_count_matches_union_find() {
    for seed in 20..30 {
        let mask = noisy_mask(36, 44, seed, 40);
        let extraction = WaterBodyExtractor::new().extract(&raster_set(mask.clone())).expect("Extraction failed");
        assert_eq!(extraction.count(), union_find_count(&mask), "seed {}", seed);
    }
}
