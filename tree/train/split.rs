use super::{TrainFeature, TrainState};
use crate::{BranchSplit, BranchSplitContinuous, BranchSplitDiscrete, LeafNode, Node, SplitDirection};
use std::{num::NonZeroUsize, ops::Range};

/// This is a candidate split of a leaf, waiting to be applied.
#[derive(Clone, Debug)]
pub struct ChooseBestSplitOutput {
	/// The index of the leaf to split.
	pub node_index: usize,
	/// The range of the examples index holding the examples that reach the leaf.
	pub examples_index_range: Range<usize>,
	pub split: BranchSplit,
	/// The reduction in impurity achieved by the split. It is always positive.
	pub score: f64,
}

/// Find the split of the leaf at `node_index` with the highest score, if a valid one exists. A split is valid if it sends a weighted count of at least `node_size` examples to each child and has a positive score. When several splits have the same score, the one found first wins.
pub fn choose_best_split(
	state: &mut TrainState,
	node_index: usize,
	examples_index_range: Range<usize>,
) -> Option<ChooseBestSplitOutput> {
	let split_rule = state.options.split_rule;
	let (size, impurity) = match &state.nodes[node_index] {
		Node::Leaf(leaf) => (leaf.size, leaf.impurity(split_rule)),
		Node::Branch(_) => return None,
	};
	// A node that is too small to have two children of at least `node_size`, or that is already pure, is not split.
	if size / 2 < state.options.node_size || impurity == 0.0 {
		return None;
	}
	let feature_indexes = choose_features(state);
	let state = &*state;
	let leaf = state.nodes[node_index].as_leaf()?;
	let mut best: Option<(BranchSplit, f64)> = None;
	for feature_index in feature_indexes {
		let candidate = match state.features[feature_index] {
			TrainFeature::Number(data) => {
				let order = match &state.orders[feature_index] {
					Some(order) => &order[examples_index_range.clone()],
					None => continue,
				};
				find_best_continuous_split_for_feature(
					state,
					feature_index,
					data,
					order,
					leaf,
					impurity,
				)
			}
			TrainFeature::Enum { data, n_options } => find_best_discrete_split_for_feature(
				state,
				feature_index,
				data,
				n_options,
				&state.examples_index[examples_index_range.clone()],
				leaf,
				impurity,
			),
		};
		if let Some((split, score)) = candidate {
			let is_better = best
				.as_ref()
				.map(|(_, best_score)| score > *best_score)
				.unwrap_or(true);
			if is_better {
				best = Some((split, score));
			}
		}
	}
	best.map(|(split, score)| ChooseBestSplitOutput {
		node_index,
		examples_index_range,
		split,
		score,
	})
}

/// Choose the features to consider for a split. If `mtry` is set and smaller than the number of features, this is a random sample of `mtry` features drawn without replacement.
fn choose_features(state: &mut TrainState) -> Vec<usize> {
	let n_features = state.features.len();
	match state.options.mtry {
		Some(mtry) if mtry < n_features => {
			rand::seq::index::sample(&mut state.rng, n_features, mtry).into_vec()
		}
		_ => (0..n_features).collect(),
	}
}

/// Scan the examples in ascending order of the feature's value. Every boundary between two distinct consecutive values is a candidate split whose threshold is the midpoint between them.
fn find_best_continuous_split_for_feature(
	state: &TrainState,
	feature_index: usize,
	data: &[f32],
	order: &[usize],
	leaf: &LeafNode,
	impurity: f64,
) -> Option<(BranchSplit, f64)> {
	let node_size = state.options.node_size;
	let split_rule = state.options.split_rule;
	let mut left_counts = vec![0; state.n_classes];
	let mut right_counts = vec![0; state.n_classes];
	let mut left_size = 0;
	let mut best: Option<(f32, f64)> = None;
	for (position, example_index) in order.iter().enumerate() {
		let value = data[*example_index];
		if position > 0 {
			let previous_value = data[order[position - 1]];
			let right_size = leaf.size - left_size;
			if value > previous_value && left_size >= node_size && right_size >= node_size {
				subtract_counts(&leaf.counts, &left_counts, &mut right_counts);
				let score = split_rule.score(
					impurity,
					&left_counts,
					left_size,
					&right_counts,
					right_size,
				);
				if score > best.map(|(_, best_score)| best_score).unwrap_or(0.0) {
					best = Some((split_value(previous_value, value), score));
				}
			}
		}
		let weight = state.weights[*example_index];
		left_counts[state.labels[*example_index]] += weight;
		left_size += weight;
	}
	best.map(|(split_value, score)| {
		(
			BranchSplit::Continuous(BranchSplitContinuous {
				feature_index,
				split_value,
			}),
			score,
		)
	})
}

/// The threshold between two consecutive distinct values is their midpoint, unless rounding puts the midpoint at the larger value, in which case the smaller value is used so that `smaller <= threshold < larger` still holds.
fn split_value(smaller: f32, larger: f32) -> f32 {
	let midpoint = smaller + (larger - smaller) / 2.0;
	if midpoint < larger {
		midpoint
	} else {
		smaller
	}
}

/// For an enum feature, each option is a candidate split that sends the examples with that option left and all others, including those with invalid values, right.
fn find_best_discrete_split_for_feature(
	state: &TrainState,
	feature_index: usize,
	data: &[Option<NonZeroUsize>],
	n_options: usize,
	examples_index: &[usize],
	leaf: &LeafNode,
	impurity: f64,
) -> Option<(BranchSplit, f64)> {
	let node_size = state.options.node_size;
	let split_rule = state.options.split_rule;
	// Bin 0 holds the examples with invalid values.
	let n_bins = n_options + 1;
	let mut bin_counts = vec![vec![0; state.n_classes]; n_bins];
	let mut bin_sizes = vec![0; n_bins];
	for example_index in examples_index {
		let bin_index = data[*example_index]
			.map(|value| value.get())
			.filter(|bin_index| *bin_index < n_bins)
			.unwrap_or(0);
		let weight = state.weights[*example_index];
		bin_counts[bin_index][state.labels[*example_index]] += weight;
		bin_sizes[bin_index] += weight;
	}
	let mut right_counts = vec![0; state.n_classes];
	let mut best: Option<(usize, f64)> = None;
	for bin_index in 1..n_bins {
		let left_size = bin_sizes[bin_index];
		let right_size = leaf.size - left_size;
		if left_size < node_size || right_size < node_size {
			continue;
		}
		let left_counts = &bin_counts[bin_index];
		subtract_counts(&leaf.counts, left_counts, &mut right_counts);
		let score = split_rule.score(impurity, left_counts, left_size, &right_counts, right_size);
		if score > best.map(|(_, best_score)| best_score).unwrap_or(0.0) {
			best = Some((bin_index, score));
		}
	}
	best.map(|(bin_index, score)| {
		let mut directions = vec![SplitDirection::Right; n_bins];
		directions[bin_index] = SplitDirection::Left;
		(
			BranchSplit::Discrete(BranchSplitDiscrete {
				feature_index,
				directions,
			}),
			score,
		)
	})
}

fn subtract_counts(counts: &[usize], left_counts: &[usize], right_counts: &mut [usize]) {
	for (right_count, (count, left_count)) in right_counts
		.iter_mut()
		.zip(counts.iter().zip(left_counts.iter()))
	{
		*right_count = count - left_count;
	}
}

#[test]
fn test_split_value() {
	assert_eq!(split_value(3.0, 8.0), 5.5);
	assert_eq!(split_value(-1.0, 1.0), 0.0);
	let smaller = 1.0f32;
	let larger = f32::from_bits(smaller.to_bits() + 1);
	let threshold = split_value(smaller, larger);
	assert!(smaller <= threshold && threshold < larger);
}
