//! Region merging: greedy minimum-spanning-forest clustering of the
//! color-distance graph down to a target number of regions.
//!
//! Edges are processed in ascending weight order. A stable sort keeps
//! equal-weight edges in [`build_edges`] enumeration order, which makes
//! the final partition (and the dense region ids derived from it) a
//! pure function of the input image and target count.

use serde::{Deserialize, Serialize};

use crate::color::LabImage;
use crate::forest::DisjointForest;
use crate::graph::{Edge, build_edges};
use crate::types::{Dimensions, PipelineError};

/// Check that `target` is a usable region count for `pixel_count` pixels.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] for zero pixels and
/// [`PipelineError::InvalidRegionCount`] when `target` is outside
/// `1..=pixel_count`.
pub fn validate_region_count(target: usize, pixel_count: usize) -> Result<(), PipelineError> {
    if pixel_count == 0 {
        return Err(PipelineError::EmptyInput);
    }
    if target == 0 || target > pixel_count {
        return Err(PipelineError::InvalidRegionCount {
            requested: target,
            pixel_count,
        });
    }
    Ok(())
}

/// Merge pixels along `edges` until at most `target` components remain.
///
/// `edges` is sorted in place. The returned forest is flattened: every
/// parent pointer refers directly to its root.
///
/// # Errors
///
/// See [`validate_region_count`].
pub fn merge_regions(
    edges: &mut [Edge],
    pixel_count: usize,
    target: usize,
) -> Result<DisjointForest, PipelineError> {
    validate_region_count(target, pixel_count)?;

    edges.sort_by(|a, b| a.weight.total_cmp(&b.weight));

    let mut forest = DisjointForest::new(pixel_count);
    for edge in edges.iter() {
        if forest.components() <= target {
            break;
        }
        forest.union(edge.a, edge.b);
    }
    forest.flatten();
    Ok(forest)
}

/// A dense partition of the pixel grid into regions.
///
/// Region ids run `0..region_count()` and are assigned in row-major
/// order of each region's first pixel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SegmentationData")]
pub struct Segmentation {
    dimensions: Dimensions,
    labels: Vec<u32>,
    region_sizes: Vec<usize>,
}

/// Unchecked wire form of [`Segmentation`].
#[derive(Deserialize)]
struct SegmentationData {
    dimensions: Dimensions,
    labels: Vec<u32>,
    region_sizes: Vec<usize>,
}

impl TryFrom<SegmentationData> for Segmentation {
    type Error = PipelineError;

    fn try_from(data: SegmentationData) -> Result<Self, Self::Error> {
        if data.labels.len() != data.dimensions.pixel_count() {
            return Err(PipelineError::InvalidSegmentation(format!(
                "{} labels for {} pixels",
                data.labels.len(),
                data.dimensions.pixel_count()
            )));
        }
        let mut counted = vec![0_usize; data.region_sizes.len()];
        for &label in &data.labels {
            let Some(slot) = counted.get_mut(label as usize) else {
                return Err(PipelineError::InvalidSegmentation(format!(
                    "label {label} outside 0..{}",
                    data.region_sizes.len()
                )));
            };
            *slot += 1;
        }
        if counted != data.region_sizes {
            return Err(PipelineError::InvalidSegmentation(
                "region sizes do not match labels".to_string(),
            ));
        }
        Ok(Self {
            dimensions: data.dimensions,
            labels: data.labels,
            region_sizes: data.region_sizes,
        })
    }
}

impl Segmentation {
    /// Assign dense ids to the roots of a flattened forest.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DimensionMismatch`] when the forest does
    /// not cover exactly `dimensions.pixel_count()` elements.
    pub fn from_forest(
        dimensions: Dimensions,
        forest: &DisjointForest,
    ) -> Result<Self, PipelineError> {
        if forest.len() != dimensions.pixel_count() {
            return Err(PipelineError::DimensionMismatch {
                expected: dimensions,
                actual: Dimensions::new(u32::try_from(forest.len()).unwrap_or(u32::MAX), 1),
            });
        }

        // Root index -> dense id, filled on first sight.
        let mut id_of_root: Vec<Option<u32>> = vec![None; forest.len()];
        let mut region_sizes: Vec<usize> = Vec::new();
        let mut labels = Vec::with_capacity(forest.len());

        for i in 0..forest.len() {
            let root = forest.find_root(i);
            let id = if let Some(id) = id_of_root[root] {
                id
            } else {
                let id = u32::try_from(region_sizes.len()).unwrap_or(u32::MAX);
                id_of_root[root] = Some(id);
                region_sizes.push(0);
                id
            };
            region_sizes[id as usize] += 1;
            labels.push(id);
        }

        Ok(Self {
            dimensions,
            labels,
            region_sizes,
        })
    }

    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Number of regions.
    #[must_use]
    pub fn region_count(&self) -> usize {
        self.region_sizes.len()
    }

    /// Region id of every pixel, row-major.
    #[must_use]
    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    /// Region id of the pixel at `(row, col)`.
    #[must_use]
    pub fn label(&self, row: usize, col: usize) -> u32 {
        self.labels[self.dimensions.index(row, col)]
    }

    /// Pixel count of every region, indexed by region id.
    #[must_use]
    pub fn region_sizes(&self) -> &[usize] {
        &self.region_sizes
    }
}

/// Partition a Lab image into at most `target` regions.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] for an empty image and
/// [`PipelineError::InvalidRegionCount`] when `target` is outside
/// `1..=pixel_count`.
pub fn segment(lab: &LabImage, target: usize) -> Result<Segmentation, PipelineError> {
    let dimensions = lab.dimensions();
    let pixel_count = dimensions.pixel_count();
    validate_region_count(target, pixel_count)?;

    let mut edges = build_edges(lab);
    let forest = merge_regions(&mut edges, pixel_count, target)?;
    let segmentation = Segmentation::from_forest(dimensions, &forest)?;

    log::debug!(
        "segment: {}x{} px, {} edges, target {target}, {} regions",
        dimensions.width,
        dimensions.height,
        edges.len(),
        segmentation.region_count(),
    );

    Ok(segmentation)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn lab_from_values(width: u32, height: u32, values: &[f32]) -> LabImage {
        let pixels = values.iter().map(|&l| [l, 0.0, 0.0]).collect();
        LabImage::from_raw(Dimensions::new(width, height), pixels).unwrap()
    }

    // --- validation tests ---

    #[test]
    fn zero_target_rejected() {
        let lab = lab_from_values(2, 2, &[0.0; 4]);
        assert_eq!(
            segment(&lab, 0),
            Err(PipelineError::InvalidRegionCount {
                requested: 0,
                pixel_count: 4
            }),
        );
    }

    #[test]
    fn target_above_pixel_count_rejected() {
        let lab = lab_from_values(2, 2, &[0.0; 4]);
        assert!(matches!(
            segment(&lab, 5),
            Err(PipelineError::InvalidRegionCount { requested: 5, .. })
        ));
    }

    #[test]
    fn empty_image_rejected() {
        let lab = lab_from_values(0, 0, &[]);
        assert_eq!(segment(&lab, 1), Err(PipelineError::EmptyInput));
    }

    // --- merge tests ---

    #[test]
    fn uniform_two_by_two_merges_to_one_region() {
        let lab = lab_from_values(2, 2, &[40.0; 4]);
        let seg = segment(&lab, 1).unwrap();
        assert_eq!(seg.region_count(), 1);
        assert_eq!(seg.labels(), &[0, 0, 0, 0]);
        assert_eq!(seg.region_sizes(), &[4]);
    }

    #[test]
    fn target_equal_to_pixel_count_keeps_singletons() {
        let lab = lab_from_values(3, 2, &[0.0; 6]);
        let seg = segment(&lab, 6).unwrap();
        assert_eq!(seg.region_count(), 6);
        assert_eq!(seg.labels(), &[0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn two_color_halves_split_at_two_regions() {
        // Left column dark, right columns bright.
        let lab = lab_from_values(3, 3, &[0.0, 90.0, 90.0, 0.0, 90.0, 90.0, 0.0, 90.0, 90.0]);
        let seg = segment(&lab, 2).unwrap();
        assert_eq!(seg.region_count(), 2);
        assert_eq!(seg.labels(), &[0, 1, 1, 0, 1, 1, 0, 1, 1]);
        assert_eq!(seg.region_sizes(), &[3, 6]);
    }

    #[test]
    fn zero_weight_ties_follow_enumeration_order() {
        // 1x3, all equal: horizontal edge (0,1) comes first, so with
        // target 2 pixels 0 and 1 merge and pixel 2 stays alone.
        let lab = lab_from_values(3, 1, &[5.0; 3]);
        let seg = segment(&lab, 2).unwrap();
        assert_eq!(seg.labels(), &[0, 0, 1]);
    }

    #[test]
    fn ids_are_first_seen_row_major() {
        let lab = lab_from_values(2, 2, &[80.0, 0.0, 80.0, 0.0]);
        let seg = segment(&lab, 2).unwrap();
        assert_eq!(seg.labels(), &[0, 1, 0, 1]);
        assert_eq!(seg.label(1, 1), 1);
    }

    #[test]
    fn merge_stops_at_target_and_flattens() {
        let mut edges = build_edges(&lab_from_values(4, 4, &[1.0; 16]));
        let forest = merge_regions(&mut edges, 16, 3).unwrap();
        assert_eq!(forest.components(), 3);
        for i in 0..16 {
            let root = forest.parent(i);
            assert_eq!(forest.parent(root), root);
        }
    }

    #[test]
    fn sorted_edges_are_ascending_and_stable() {
        let lab = lab_from_values(3, 1, &[0.0, 10.0, 10.0]);
        let mut edges = build_edges(&lab);
        merge_regions(&mut edges, 3, 1).unwrap();
        assert_eq!((edges[0].a, edges[0].b), (1, 2));
        assert_eq!((edges[1].a, edges[1].b), (0, 1));
    }

    #[test]
    fn from_forest_rejects_wrong_size() {
        let forest = DisjointForest::new(3);
        assert!(matches!(
            Segmentation::from_forest(Dimensions::new(2, 2), &forest),
            Err(PipelineError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn segmentation_serde_round_trip() {
        let seg = segment(&lab_from_values(2, 2, &[0.0, 0.0, 50.0, 50.0]), 2).unwrap();
        let json = serde_json::to_string(&seg).unwrap();
        let back: Segmentation = serde_json::from_str(&json).unwrap();
        assert_eq!(seg, back);
    }

    #[test]
    fn deserialize_rejects_label_outside_regions() {
        let json = r#"{"dimensions":{"width":2,"height":1},"labels":[0,5],"region_sizes":[1,1]}"#;
        let err = serde_json::from_str::<Segmentation>(json).unwrap_err();
        assert!(err.to_string().contains("label 5 outside 0..2"), "{err}");
    }

    #[test]
    fn deserialize_rejects_inconsistent_sizes() {
        let json = r#"{"dimensions":{"width":2,"height":1},"labels":[0,0],"region_sizes":[1,1]}"#;
        assert!(serde_json::from_str::<Segmentation>(json).is_err());
    }

    #[test]
    fn deserialize_rejects_wrong_label_count() {
        let json = r#"{"dimensions":{"width":2,"height":2},"labels":[0,0],"region_sizes":[2]}"#;
        assert!(serde_json::from_str::<Segmentation>(json).is_err());
    }
}
