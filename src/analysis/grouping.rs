//! Geometric grouping of fragments into lines or columns
//!
//! Fragments are sorted along the grouping axis (top edge for lines,
//! horizontal center for columns) and walked in order. A fragment joins the
//! current group while its coordinate stays within `threshold` of the
//! group's reference; otherwise it opens a new group.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::vision::TextFragment;

/// Grouping direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    /// Top-to-bottom lines, members ordered left to right
    #[default]
    Line,
    /// Left-to-right columns, members ordered top to bottom
    Column,
}

/// How the reference coordinate of an open group evolves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePolicy {
    /// Mean coordinate of the members seen so far
    #[default]
    RunningAverage,
    /// Coordinate of the group's first member
    Fixed,
}

/// Fragments presumed to share one visual line or column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FragmentGroup {
    members: Vec<TextFragment>,
}

impl FragmentGroup {
    pub fn members(&self) -> &[TextFragment] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Smallest y over all member boxes
    pub fn top(&self) -> f32 {
        self.members.iter().map(|f| f.bbox().min_y()).fold(f32::INFINITY, f32::min)
    }

    /// Largest y over all member boxes
    pub fn bottom(&self) -> f32 {
        self.members.iter().map(|f| f.bbox().max_y()).fold(f32::NEG_INFINITY, f32::max)
    }

    /// Horizontal midpoint of the group's extent
    pub fn center_x(&self) -> f32 {
        let left = self.members.iter().map(|f| f.bbox().min_x()).fold(f32::INFINITY, f32::min);
        let right = self.members.iter().map(|f| f.bbox().max_x()).fold(f32::NEG_INFINITY, f32::max);
        (left + right) / 2.0
    }

    /// Member texts joined by single spaces, in group order
    pub fn text(&self) -> String {
        self.members
            .iter()
            .map(|f| f.text().trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Lowest member confidence, if the group has members
    pub fn min_confidence(&self) -> Option<f32> {
        self.members.iter().map(TextFragment::confidence).reduce(f32::min)
    }
}

/// Configured grouper
#[derive(Debug, Clone, Copy)]
pub struct Grouper {
    axis: Axis,
    threshold: f32,
    reference: ReferencePolicy,
}

impl Grouper {
    /// Fails with `InvalidParameter` unless `threshold` is a positive number
    pub fn new(axis: Axis, threshold: f32, reference: ReferencePolicy) -> Result<Self> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(PipelineError::invalid(
                "threshold",
                format!("grouping threshold must be > 0, got {}", threshold),
            ));
        }
        Ok(Self {
            axis,
            threshold,
            reference,
        })
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    /// Partition `fragments` into ordered groups
    pub fn group(&self, fragments: &[TextFragment]) -> Vec<FragmentGroup> {
        let key = |f: &TextFragment| match self.axis {
            Axis::Line => f.top(),
            Axis::Column => f.center_x(),
        };

        let mut sorted: Vec<&TextFragment> = fragments.iter().collect();
        // Stable: equal coordinates keep recognizer order
        sorted.sort_by(|a, b| key(a).partial_cmp(&key(b)).unwrap_or(Ordering::Equal));

        let mut groups: Vec<Vec<TextFragment>> = Vec::new();
        let mut reference = 0.0f32;
        let mut key_sum = 0.0f32;

        for fragment in sorted {
            let k = key(fragment);
            match groups.last_mut() {
                Some(current) if (k - reference).abs() <= self.threshold => {
                    current.push(fragment.clone());
                    if self.reference == ReferencePolicy::RunningAverage {
                        key_sum += k;
                        reference = key_sum / current.len() as f32;
                    }
                }
                _ => {
                    groups.push(vec![fragment.clone()]);
                    reference = k;
                    key_sum = k;
                }
            }
        }

        let groups: Vec<FragmentGroup> = groups
            .into_iter()
            .map(|mut members| {
                let within = |f: &TextFragment| match self.axis {
                    Axis::Line => f.left(),
                    Axis::Column => f.top(),
                };
                members.sort_by(|a, b| within(a).partial_cmp(&within(b)).unwrap_or(Ordering::Equal));
                FragmentGroup { members }
            })
            .collect();

        debug!(
            "Grouped {} fragment(s) into {} {:?} group(s) (threshold {})",
            fragments.len(),
            groups.len(),
            self.axis,
            self.threshold
        );

        groups
    }
}

/// Group with the running-average reference policy
pub fn group(fragments: &[TextFragment], axis: Axis, threshold: f32) -> Result<Vec<FragmentGroup>> {
    Ok(Grouper::new(axis, threshold, ReferencePolicy::RunningAverage)?.group(fragments))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::vision::BoundingBox;
    use proptest::prelude::*;

    pub(crate) fn fragment(index: usize, text: &str, x: f32, y: f32) -> TextFragment {
        fragment_with(index, text, x, y, 0.9)
    }

    pub(crate) fn fragment_with(index: usize, text: &str, x: f32, y: f32, confidence: f32) -> TextFragment {
        TextFragment::new(index, text, BoundingBox::from_rect(x, y, 40.0, 10.0), confidence).unwrap()
    }

    fn texts(groups: &[FragmentGroup]) -> Vec<Vec<&str>> {
        groups
            .iter()
            .map(|g| g.members().iter().map(TextFragment::text).collect())
            .collect()
    }

    #[test]
    fn test_lines_split_by_gap() {
        let fragments = vec![
            fragment(0, "f1", 0.0, 10.0),
            fragment(1, "f2", 60.0, 12.0),
            fragment(2, "f3", 0.0, 200.0),
        ];
        let groups = group(&fragments, Axis::Line, 15.0).unwrap();
        assert_eq!(texts(&groups), vec![vec!["f1", "f2"], vec!["f3"]]);
    }

    #[test]
    fn test_line_members_ordered_left_to_right() {
        let fragments = vec![
            fragment(0, "right", 100.0, 11.0),
            fragment(1, "left", 0.0, 10.0),
            fragment(2, "mid", 50.0, 9.0),
        ];
        let groups = group(&fragments, Axis::Line, 5.0).unwrap();
        assert_eq!(texts(&groups), vec![vec!["left", "mid", "right"]]);
        assert_eq!(groups[0].text(), "left mid right");
    }

    #[test]
    fn test_columns_ordered_top_to_bottom() {
        let fragments = vec![
            fragment(0, "b-low", 200.0, 50.0),
            fragment(1, "a-low", 0.0, 50.0),
            fragment(2, "a-high", 5.0, 0.0),
            fragment(3, "b-high", 198.0, 0.0),
        ];
        let groups = group(&fragments, Axis::Column, 20.0).unwrap();
        assert_eq!(texts(&groups), vec![vec!["a-high", "a-low"], vec!["b-high", "b-low"]]);
    }

    #[test]
    fn test_empty_input() {
        assert!(group(&[], Axis::Line, 10.0).unwrap().is_empty());
    }

    #[test]
    fn test_single_fragment() {
        let groups = group(&[fragment(0, "solo", 3.0, 4.0)], Axis::Line, 10.0).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 1);
    }

    #[test]
    fn test_non_positive_threshold_rejected() {
        for threshold in [0.0, -1.0, f32::NAN] {
            let result = group(&[fragment(0, "x", 0.0, 0.0)], Axis::Line, threshold);
            assert!(matches!(result, Err(PipelineError::InvalidParameter { .. })));
        }
    }

    #[test]
    fn test_reference_policies_differ_on_drift() {
        // Each step is within threshold of the previous one, but the
        // last fragment is far from the first.
        let fragments = vec![
            fragment(0, "a", 0.0, 0.0),
            fragment(1, "b", 50.0, 8.0),
            fragment(2, "c", 100.0, 16.0),
        ];
        let running = Grouper::new(Axis::Line, 10.0, ReferencePolicy::RunningAverage)
            .unwrap()
            .group(&fragments);
        let fixed = Grouper::new(Axis::Line, 10.0, ReferencePolicy::Fixed)
            .unwrap()
            .group(&fragments);

        // running reference after a,b is 4.0; 16 - 4 = 12 > 10
        assert_eq!(texts(&running), vec![vec!["a", "b"], vec!["c"]]);
        // fixed reference stays 0.0; 16 > 10
        assert_eq!(texts(&fixed), vec![vec!["a", "b"], vec!["c"]]);

        let closer = vec![
            fragment(0, "a", 0.0, 0.0),
            fragment(1, "b", 50.0, 10.0),
            fragment(2, "c", 100.0, 14.0),
        ];
        let running = Grouper::new(Axis::Line, 10.0, ReferencePolicy::RunningAverage)
            .unwrap()
            .group(&closer);
        let fixed = Grouper::new(Axis::Line, 10.0, ReferencePolicy::Fixed)
            .unwrap()
            .group(&closer);
        // running reference after a,b is 5.0; 14 - 5 = 9 joins
        assert_eq!(texts(&running), vec![vec!["a", "b", "c"]]);
        assert_eq!(texts(&fixed), vec![vec!["a", "b"], vec!["c"]]);
    }

    #[test]
    fn test_equal_coordinates_share_group() {
        let fragments = vec![
            fragment(0, "x", 0.0, 30.0),
            fragment(1, "y", 50.0, 30.0),
            fragment(2, "z", 0.0, 0.0),
        ];
        let groups = group(&fragments, Axis::Line, 1.0).unwrap();
        assert_eq!(texts(&groups), vec![vec!["z"], vec!["x", "y"]]);
    }

    #[test]
    fn test_groups_partition_input() {
        let mut fragments = Vec::new();
        for i in 0..40 {
            let y = ((i * 37) % 200) as f32;
            let x = ((i * 53) % 300) as f32;
            fragments.push(fragment(i, &format!("t{}", i), x, y));
        }
        for (axis, threshold) in [(Axis::Line, 7.0), (Axis::Column, 12.0), (Axis::Line, 500.0)] {
            let groups = group(&fragments, axis, threshold).unwrap();
            let mut seen: Vec<usize> = groups
                .iter()
                .flat_map(|g| g.members().iter().map(TextFragment::index))
                .collect();
            seen.sort_unstable();
            assert_eq!(seen, (0..40).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_group_geometry() {
        let groups = group(
            &[fragment(0, "a", 0.0, 10.0), fragment(1, "b", 60.0, 12.0)],
            Axis::Line,
            5.0,
        )
        .unwrap();
        let g = &groups[0];
        assert_eq!(g.top(), 10.0);
        assert_eq!(g.bottom(), 22.0);
        assert_eq!(g.center_x(), 50.0);
    }

    fn arb_axis() -> impl Strategy<Value = Axis> {
        prop_oneof![Just(Axis::Line), Just(Axis::Column)]
    }

    fn arb_reference() -> impl Strategy<Value = ReferencePolicy> {
        prop_oneof![Just(ReferencePolicy::RunningAverage), Just(ReferencePolicy::Fixed)]
    }

    proptest! {
        #[test]
        fn prop_groups_partition_fragments(
            coords in prop::collection::vec((-500.0f32..2000.0, -500.0f32..2000.0), 0..60),
            axis in arb_axis(),
            reference in arb_reference(),
            threshold in 0.5f32..300.0,
        ) {
            let fragments: Vec<TextFragment> = coords
                .iter()
                .enumerate()
                .map(|(i, &(x, y))| fragment(i, &format!("t{}", i), x, y))
                .collect();
            let grouper = Grouper::new(axis, threshold, reference).unwrap();
            let groups = grouper.group(&fragments);

            prop_assert!(groups.iter().all(|g| !g.is_empty()));
            let mut seen: Vec<usize> = groups
                .iter()
                .flat_map(|g| g.members().iter().map(TextFragment::index))
                .collect();
            seen.sort_unstable();
            prop_assert_eq!(seen, (0..fragments.len()).collect::<Vec<_>>());
        }
    }
}
