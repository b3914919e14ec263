//! Color-distance graph over the pixel grid.
//!
//! Every pair of horizontally, vertically or diagonally adjacent pixels
//! is joined by exactly one [`Edge`] weighted by the Euclidean distance
//! of their Lab colors.
//!
//! # Enumeration order
//!
//! Downstream merging sorts edges with a *stable* sort, so ties are
//! broken by the order produced here:
//!
//! 1. horizontal edges `(r, c) – (r, c+1)`,
//! 2. vertical edges `(r, c) – (r+1, c)`,
//! 3. falling diagonals `(r, c) – (r+1, c+1)`,
//! 4. rising diagonals `(r+1, c) – (r, c+1)`,
//!
//! each block scanned row-major over its anchor `(r, c)`.

use crate::color::LabImage;
use crate::types::Dimensions;

/// An undirected, weighted edge between two flat pixel indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    /// Flat index of one endpoint.
    pub a: usize,
    /// Flat index of the other endpoint.
    pub b: usize,
    /// Perceptual color distance between the endpoints (non-negative).
    pub weight: f32,
}

/// Number of edges [`build_edges`] produces for an image of the given
/// size.
#[must_use]
pub const fn edge_count(dimensions: Dimensions) -> usize {
    let (w, h) = (dimensions.cols(), dimensions.rows());
    if w == 0 || h == 0 {
        return 0;
    }
    h * (w - 1) + (h - 1) * w + 2 * (h - 1) * (w - 1)
}

/// Build the complete 8-neighbor color-distance edge list.
#[must_use]
pub fn build_edges(lab: &LabImage) -> Vec<Edge> {
    let dims = lab.dimensions();
    let (w, h) = (dims.cols(), dims.rows());
    let mut edges = Vec::with_capacity(edge_count(dims));
    if w == 0 || h == 0 {
        return edges;
    }

    let mut push = |a: usize, b: usize| {
        edges.push(Edge {
            a,
            b,
            weight: lab.distance(a, b),
        });
    };

    for r in 0..h {
        for c in 0..w - 1 {
            push(dims.index(r, c), dims.index(r, c + 1));
        }
    }
    for r in 0..h - 1 {
        for c in 0..w {
            push(dims.index(r, c), dims.index(r + 1, c));
        }
    }
    for r in 0..h - 1 {
        for c in 0..w - 1 {
            push(dims.index(r, c), dims.index(r + 1, c + 1));
        }
    }
    for r in 0..h - 1 {
        for c in 0..w - 1 {
            push(dims.index(r + 1, c), dims.index(r, c + 1));
        }
    }

    edges
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn lab_from_values(width: u32, height: u32, values: &[f32]) -> LabImage {
        let pixels = values.iter().map(|&l| [l, 0.0, 0.0]).collect();
        LabImage::from_raw(Dimensions::new(width, height), pixels).unwrap()
    }

    #[test]
    fn uniform_two_by_two_has_six_zero_edges() {
        let lab = lab_from_values(2, 2, &[50.0; 4]);
        let edges = build_edges(&lab);
        assert_eq!(edges.len(), 6);
        assert!(edges.iter().all(|e| e.weight == 0.0));
    }

    #[test]
    fn enumeration_order_is_horizontal_vertical_diagonals() {
        let lab = lab_from_values(2, 2, &[0.0, 1.0, 2.0, 3.0]);
        let pairs: Vec<(usize, usize)> = build_edges(&lab).iter().map(|e| (e.a, e.b)).collect();
        assert_eq!(
            pairs,
            vec![(0, 1), (2, 3), (0, 2), (1, 3), (0, 3), (2, 1)],
        );
    }

    #[test]
    fn every_adjacent_pair_appears_exactly_once() {
        let dims = Dimensions::new(5, 4);
        let lab = lab_from_values(5, 4, &[0.0; 20]);
        let edges = build_edges(&lab);
        assert_eq!(edges.len(), edge_count(dims));

        let mut seen = HashSet::new();
        for e in &edges {
            let key = (e.a.min(e.b), e.a.max(e.b));
            assert!(seen.insert(key), "duplicate edge {key:?}");
            let (ra, ca) = (e.a / 5, e.a % 5);
            let (rb, cb) = (e.b / 5, e.b % 5);
            assert!(ra.abs_diff(rb) <= 1 && ca.abs_diff(cb) <= 1 && e.a != e.b);
        }
        // 4*4 + 3*5 + 2*3*4 = 55
        assert_eq!(seen.len(), 55);
    }

    #[test]
    fn weights_are_lab_distances() {
        let pixels = vec![[0.0, 0.0, 0.0], [3.0, 4.0, 0.0]];
        let lab = LabImage::from_raw(Dimensions::new(2, 1), pixels).unwrap();
        let edges = build_edges(&lab);
        assert_eq!(edges.len(), 1);
        assert!((edges[0].weight - 5.0).abs() < 1e-6);
    }

    #[test]
    fn single_row_and_single_pixel() {
        assert_eq!(build_edges(&lab_from_values(4, 1, &[0.0; 4])).len(), 3);
        assert!(build_edges(&lab_from_values(1, 1, &[0.0])).is_empty());
        assert_eq!(edge_count(Dimensions::new(0, 3)), 0);
    }
}
