use self::{
	examples_index::{rearrange_examples_index, rearrange_order},
	split::{choose_best_split, ChooseBestSplitOutput},
};
use crate::{BranchNode, LeafNode, Node, SplitDirection, TrainOptions, Tree};
use cart_dataframe::{ColumnView, DataFrameView};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use std::{cmp::Ordering, collections::BinaryHeap, num::NonZeroUsize, ops::Range};

mod examples_index;
mod split;

/// These are optional inputs that ensembles such as random forests pass to avoid recomputing them for every tree.
#[derive(Clone, Copy, Debug, Default)]
pub struct TrainInputs<'a> {
	/// `samples[i]` is the number of times example `i` was sampled, for example when bootstrapping. Examples with a count of zero are left out of training. If this is `None`, every example is used once.
	pub samples: Option<&'a [usize]>,
	/// `order[j]`, if present, holds the indexes of all examples sorted in ascending order of the value of number feature `j`. See `compute_order`.
	pub order: Option<&'a [Option<Vec<usize>>]>,
}

/// Compute, for each number feature, the indexes of the examples sorted in ascending order of that feature's value. Enum features get `None`.
pub fn compute_order(features: &DataFrameView) -> Vec<Option<Vec<usize>>> {
	features
		.columns
		.iter()
		.map(|column| match column {
			ColumnView::Number(column) => {
				let mut order: Vec<usize> = (0..column.data.len()).collect();
				order.sort_by(|a, b| compare_values(column.data[*a], column.data[*b]));
				Some(order)
			}
			ColumnView::Enum(_) => None,
		})
		.collect()
}

/// Order number feature values ascending with every NaN last, whatever its sign, because splits send NaN right.
fn compare_values(a: f32, b: f32) -> Ordering {
	a.is_nan().cmp(&b.is_nan()).then_with(|| a.total_cmp(&b))
}

/// This is the output of `train`.
#[derive(Debug)]
pub struct TrainOutput {
	pub tree: Tree,
	/// The sum of the scores of the splits that use each feature.
	pub feature_importances: Vec<f64>,
}

/// Train a tree. The labels must already have been validated to be in `0..n_classes`, and `inputs` to match the number of examples.
pub fn train(
	features: &DataFrameView,
	labels: &[usize],
	n_classes: usize,
	options: &TrainOptions,
	inputs: TrainInputs,
) -> TrainOutput {
	let mut state = TrainState::new(features, labels, n_classes, options, inputs);
	log::debug!(
		"training tree: {} examples, {} features, {} classes",
		state.examples_index.len(),
		state.features.len(),
		n_classes,
	);
	let n_examples = state.examples_index.len();
	let root_split = state.choose_best_split(0, 0..n_examples);
	match options.max_nodes {
		// Grow the tree depth first until no leaf has a valid split.
		None => {
			let mut stack: Vec<ChooseBestSplitOutput> = root_split.into_iter().collect();
			while let Some(split) = stack.pop() {
				let (left_split, right_split) = state.split(split);
				// Push the right child first so that the left child is split first.
				stack.extend(right_split);
				stack.extend(left_split);
			}
		}
		// Grow the tree best first, always splitting the leaf whose split has the highest score, until the tree has `max_nodes` leaves.
		Some(max_nodes) => {
			let mut queue: BinaryHeap<QueueItem> = BinaryHeap::new();
			let mut n_queued = 0;
			let mut push = |queue: &mut BinaryHeap<QueueItem>, split: ChooseBestSplitOutput| {
				queue.push(QueueItem {
					split,
					sequence: n_queued,
				});
				n_queued += 1;
			};
			if let Some(root_split) = root_split {
				push(&mut queue, root_split);
			}
			let mut n_leaves = 1;
			while n_leaves < max_nodes {
				let item = match queue.pop() {
					Some(item) => item,
					None => break,
				};
				let (left_split, right_split) = state.split(item.split);
				n_leaves += 1;
				for split in left_split.into_iter().chain(right_split) {
					push(&mut queue, split);
				}
			}
		}
	}
	let tree = Tree { nodes: state.nodes };
	log::debug!(
		"trained tree: {} leaves, depth {}",
		tree.n_leaves(),
		tree.depth()
	);
	TrainOutput {
		tree,
		feature_importances: state.feature_importances,
	}
}

/// A feature column as seen by training.
#[derive(Clone, Copy, Debug)]
pub enum TrainFeature<'a> {
	Number(&'a [f32]),
	Enum {
		data: &'a [Option<NonZeroUsize>],
		n_options: usize,
	},
}

/// This is the scratch state used while training a single tree. It is dropped when training finishes, leaving only the tree.
pub struct TrainState<'a> {
	pub features: Vec<TrainFeature<'a>>,
	pub labels: &'a [usize],
	/// The weight of each example. Examples with a weight of zero are not in `examples_index`.
	pub weights: Vec<usize>,
	pub n_classes: usize,
	pub options: &'a TrainOptions,
	/// Each node owns a contiguous range of `examples_index` holding the indexes of the examples that reach it.
	pub examples_index: Vec<usize>,
	/// For each number feature, the indexes in `examples_index`, where each node's range is sorted by the feature's value.
	pub orders: Vec<Option<Vec<usize>>>,
	/// The direction each example was sent by the split being applied.
	pub directions: Vec<SplitDirection>,
	pub order_left_buffer: Vec<usize>,
	pub order_right_buffer: Vec<usize>,
	pub nodes: Vec<Node>,
	pub feature_importances: Vec<f64>,
	pub rng: Xoshiro256Plus,
}

impl<'a> TrainState<'a> {
	fn new(
		features: &DataFrameView<'a>,
		labels: &'a [usize],
		n_classes: usize,
		options: &'a TrainOptions,
		inputs: TrainInputs,
	) -> Self {
		let n_rows = labels.len();
		let features: Vec<TrainFeature<'a>> = features
			.columns
			.iter()
			.map(|column| match column {
				ColumnView::Number(column) => TrainFeature::Number(column.data),
				ColumnView::Enum(column) => TrainFeature::Enum {
					data: column.data,
					n_options: column.options.len(),
				},
			})
			.collect();
		let weights = match inputs.samples {
			Some(samples) => samples.to_owned(),
			None => vec![1; n_rows],
		};
		let examples_index: Vec<usize> = (0..n_rows).filter(|i| weights[*i] > 0).collect();
		let orders = features
			.iter()
			.enumerate()
			.map(|(feature_index, feature)| match feature {
				TrainFeature::Number(data) => {
					let order = match inputs.order.and_then(|order| order[feature_index].as_ref()) {
						Some(order) => order.iter().copied().filter(|i| weights[*i] > 0).collect(),
						None => {
							let mut order = examples_index.clone();
							order.sort_by(|a, b| compare_values(data[*a], data[*b]));
							order
						}
					};
					Some(order)
				}
				TrainFeature::Enum { .. } => None,
			})
			.collect();
		// The root starts with every example.
		let mut root = LeafNode::new(n_classes);
		for example_index in examples_index.iter() {
			root.add(labels[*example_index], weights[*example_index]);
		}
		root.compute_output();
		let n_examples = examples_index.len();
		Self {
			feature_importances: vec![0.0; features.len()],
			features,
			labels,
			weights,
			n_classes,
			options,
			examples_index,
			orders,
			directions: vec![SplitDirection::Left; n_rows],
			order_left_buffer: vec![0; n_examples],
			order_right_buffer: vec![0; n_examples],
			nodes: vec![Node::Leaf(root)],
			rng: Xoshiro256Plus::seed_from_u64(options.seed),
		}
	}

	fn choose_best_split(
		&mut self,
		node_index: usize,
		examples_index_range: Range<usize>,
	) -> Option<ChooseBestSplitOutput> {
		choose_best_split(self, node_index, examples_index_range)
	}

	/// Replace the leaf at `split.node_index` with a branch and two new leaves, then find the best splits for the new leaves.
	fn split(
		&mut self,
		split: ChooseBestSplitOutput,
	) -> (
		Option<ChooseBestSplitOutput>,
		Option<ChooseBestSplitOutput>,
	) {
		let range = split.examples_index_range.clone();
		let (left_range, right_range) = rearrange_examples_index(
			&self.features,
			&split.split,
			&mut self.examples_index[range.clone()],
			&mut self.directions,
		);
		let left_range = range.start + left_range.start..range.start + left_range.end;
		let right_range = range.start + right_range.start..range.start + right_range.end;
		for order in self.orders.iter_mut().flatten() {
			rearrange_order(
				&mut order[range.clone()],
				&self.directions,
				&mut self.order_left_buffer,
				&mut self.order_right_buffer,
			);
		}

		// Build the leaves from the examples sent to each side. Their outputs are computed now so the tree can make predictions at any point during training.
		let left_leaf = self.compute_leaf(left_range.clone());
		let right_leaf = self.compute_leaf(right_range.clone());
		let left_child_index = self.nodes.len();
		let right_child_index = left_child_index + 1;
		self.nodes.push(Node::Leaf(left_leaf));
		self.nodes.push(Node::Leaf(right_leaf));
		let feature_index = split.split.feature_index();
		self.feature_importances[feature_index] += split.score;
		log::trace!(
			"split node {} on feature {} with score {}: {} left, {} right",
			split.node_index,
			feature_index,
			split.score,
			left_range.len(),
			right_range.len(),
		);
		self.nodes[split.node_index] = Node::Branch(BranchNode {
			left_child_index,
			right_child_index,
			split: split.split,
			score: split.score,
		});

		let left_split = self.choose_best_split(left_child_index, left_range);
		let right_split = self.choose_best_split(right_child_index, right_range);
		(left_split, right_split)
	}

	fn compute_leaf(&self, examples_index_range: Range<usize>) -> LeafNode {
		let mut leaf = LeafNode::new(self.n_classes);
		for example_index in self.examples_index[examples_index_range].iter() {
			leaf.add(self.labels[*example_index], self.weights[*example_index]);
		}
		leaf.compute_output();
		leaf
	}
}

/// An entry in the best first priority queue. Items are ordered by the score of their split, and items with equal scores by the order they were queued in, earliest first.
struct QueueItem {
	split: ChooseBestSplitOutput,
	sequence: usize,
}

impl PartialEq for QueueItem {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}

impl Eq for QueueItem {}

impl PartialOrd for QueueItem {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for QueueItem {
	fn cmp(&self, other: &Self) -> Ordering {
		self.split
			.score
			.total_cmp(&other.split.score)
			.then_with(|| other.sequence.cmp(&self.sequence))
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{BranchSplit, SplitRule};
	use cart_dataframe::NumberColumnView;

	fn number_features<'a>(data: &'a [&'a [f32]]) -> DataFrameView<'a> {
		DataFrameView {
			columns: data
				.iter()
				.map(|data| {
					ColumnView::Number(NumberColumnView {
						name: "x",
						data: *data,
					})
				})
				.collect(),
		}
	}

	fn leaves(tree: &Tree) -> Vec<&LeafNode> {
		tree.nodes.iter().filter_map(|node| node.as_leaf()).collect()
	}

	#[test]
	fn test_single_split() {
		let x = [1.0, 2.0, 3.0, 8.0, 9.0, 10.0];
		let labels = [0, 0, 0, 1, 1, 1];
		let options = TrainOptions {
			node_size: 1,
			max_nodes: None,
			..Default::default()
		};
		let output = train(
			&number_features(&[&x]),
			&labels,
			2,
			&options,
			TrainInputs::default(),
		);
		insta::assert_debug_snapshot!(output.tree, @r###"
  Tree {
      nodes: [
          Branch(
              BranchNode {
                  left_child_index: 1,
                  right_child_index: 2,
                  split: Continuous(
                      BranchSplitContinuous {
                          feature_index: 0,
                          split_value: 5.5,
                      },
                  ),
                  score: 0.5,
              },
          ),
          Leaf(
              LeafNode {
                  counts: [
                      3,
                      0,
                  ],
                  size: 3,
                  output: 0,
              },
          ),
          Leaf(
              LeafNode {
                  counts: [
                      0,
                      3,
                  ],
                  size: 3,
                  output: 1,
              },
          ),
      ],
  }
  "###);
		assert_eq!(output.feature_importances, vec![0.5]);
	}

	#[test]
	fn test_depth_first_leaves_are_pure() {
		// With distinct values and a node size of one, every impure node has a split that improves it.
		let x: Vec<f32> = (0..40).map(|i| i as f32).collect();
		let labels: Vec<usize> = (0..40).map(|i| (i / 3 + i / 7) % 3).collect();
		let options = TrainOptions {
			node_size: 1,
			max_nodes: None,
			..Default::default()
		};
		let output = train(
			&number_features(&[&x]),
			&labels,
			3,
			&options,
			TrainInputs::default(),
		);
		let leaves = leaves(&output.tree);
		assert!(leaves.iter().all(|leaf| leaf.impurity(SplitRule::Gini) == 0.0));
		assert_eq!(leaves.iter().map(|leaf| leaf.size).sum::<usize>(), 40);
		for (i, label) in labels.iter().enumerate() {
			let features = [cart_dataframe::Value::Number(x[i])];
			assert_eq!(output.tree.predict(&features), *label);
		}
	}

	#[test]
	fn test_node_size_is_respected() {
		let x: Vec<f32> = (0..30).map(|i| i as f32).collect();
		let labels: Vec<usize> = (0..30).map(|i| i % 2).collect();
		let options = TrainOptions {
			node_size: 4,
			max_nodes: None,
			..Default::default()
		};
		let output = train(
			&number_features(&[&x]),
			&labels,
			2,
			&options,
			TrainInputs::default(),
		);
		assert!(leaves(&output.tree).iter().all(|leaf| leaf.size >= 4));
	}

	#[test]
	fn test_best_first_leaf_budget() {
		let x: Vec<f32> = (0..64).map(|i| i as f32).collect();
		let labels: Vec<usize> = (0..64).map(|i| (i / 4) % 2).collect();
		let depth_first = train(
			&number_features(&[&x]),
			&labels,
			2,
			&TrainOptions {
				node_size: 1,
				max_nodes: None,
				..Default::default()
			},
			TrainInputs::default(),
		);
		let n_reachable = depth_first.tree.n_leaves();
		assert_eq!(n_reachable, 16);
		for max_nodes in &[1, 2, 3, 6, 16, 100] {
			let output = train(
				&number_features(&[&x]),
				&labels,
				2,
				&TrainOptions {
					node_size: 1,
					max_nodes: Some(*max_nodes),
					..Default::default()
				},
				TrainInputs::default(),
			);
			assert_eq!(output.tree.n_leaves(), usize::min(*max_nodes, n_reachable));
		}
	}

	#[test]
	fn test_best_first_splits_highest_score_first() {
		// Feature 0 separates the classes perfectly and feature 1 only partially, so the single allowed split uses feature 0.
		let x0 = [0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
		let x1 = [0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
		let labels = [0, 0, 0, 0, 1, 1, 1, 1];
		let output = train(
			&number_features(&[&x0, &x1]),
			&labels,
			2,
			&TrainOptions {
				node_size: 1,
				max_nodes: Some(2),
				..Default::default()
			},
			TrainInputs::default(),
		);
		let branch = output.tree.nodes[0].as_branch().unwrap();
		assert_eq!(branch.split.feature_index(), 0);
		assert_eq!(output.tree.n_leaves(), 2);
		assert_eq!(output.feature_importances[1], 0.0);
	}

	#[test]
	fn test_samples_and_order() {
		let x = [5.0, 1.0, 4.0, 2.0, 3.0, 6.0];
		let labels = [1, 0, 1, 0, 1, 0];
		let samples = [1, 2, 1, 1, 1, 0];
		let columns = [&x[..]];
		let features = number_features(&columns);
		let order = compute_order(&features);
		assert_eq!(order, vec![Some(vec![1, 3, 4, 2, 0, 5])]);
		let options = TrainOptions {
			node_size: 1,
			max_nodes: None,
			..Default::default()
		};
		let inputs = TrainInputs {
			samples: Some(&samples),
			order: Some(&order),
		};
		let output = train(&features, &labels, 2, &options, inputs);
		// The last example is out of bag, so the classes separate at 2.5.
		let branch = output.tree.nodes[0].as_branch().unwrap();
		match &branch.split {
			BranchSplit::Continuous(split) => assert_eq!(split.split_value, 2.5),
			_ => panic!("expected a continuous split"),
		}
		let root_size: usize = leaves(&output.tree).iter().map(|leaf| leaf.size).sum();
		assert_eq!(root_size, 6);
		// The result must not depend on whether the order was passed in.
		let without_order = train(
			&features,
			&labels,
			2,
			&options,
			TrainInputs {
				samples: Some(&samples),
				order: None,
			},
		);
		assert_eq!(output.tree, without_order.tree);
	}

	#[test]
	fn test_nan_is_ordered_last() {
		let x = [3.0, -std::f32::NAN, 1.0, std::f32::NAN, 2.0];
		let order = compute_order(&number_features(&[&x]));
		assert_eq!(order, vec![Some(vec![2, 4, 0, 1, 3])]);
	}

	#[test]
	fn test_nan_goes_right() {
		// Both NaNs are scored on the right, where the split sends them, so the children are pure.
		let x = [-std::f32::NAN, std::f32::NAN, 1.0, 2.0, 8.0, 9.0];
		let labels = [1, 1, 0, 0, 1, 1];
		let output = train(
			&number_features(&[&x]),
			&labels,
			2,
			&TrainOptions {
				node_size: 1,
				max_nodes: None,
				..Default::default()
			},
			TrainInputs::default(),
		);
		let counts: Vec<&[usize]> = leaves(&output.tree)
			.into_iter()
			.map(|leaf| leaf.counts.as_slice())
			.collect();
		assert_eq!(counts, vec![&[2, 0][..], &[0, 4][..]]);
		let features = [cart_dataframe::Value::Number(-std::f32::NAN)];
		assert_eq!(output.tree.predict(&features), 1);
	}

	#[test]
	fn test_mtry_is_deterministic() {
		let columns: Vec<Vec<f32>> = (0..5)
			.map(|j| (0..50).map(|i| ((i * (j + 3)) % 17) as f32).collect())
			.collect();
		let column_refs: Vec<&[f32]> = columns.iter().map(|c| c.as_slice()).collect();
		let labels: Vec<usize> = (0..50).map(|i| (i * 7 % 11) % 2).collect();
		let options = TrainOptions {
			node_size: 2,
			max_nodes: Some(8),
			mtry: Some(2),
			seed: 42,
			..Default::default()
		};
		let features = number_features(&column_refs);
		let a = train(&features, &labels, 2, &options, TrainInputs::default());
		let b = train(&features, &labels, 2, &options, TrainInputs::default());
		assert_eq!(a.tree, b.tree);
	}

	#[test]
	fn test_queue_item_order() {
		let item = |score: f64, sequence: usize| QueueItem {
			split: ChooseBestSplitOutput {
				node_index: 0,
				examples_index_range: 0..0,
				split: BranchSplit::Continuous(crate::BranchSplitContinuous {
					feature_index: 0,
					split_value: 0.0,
				}),
				score,
			},
			sequence,
		};
		let mut queue = BinaryHeap::new();
		queue.push(item(0.1, 0));
		queue.push(item(0.3, 1));
		queue.push(item(0.3, 2));
		queue.push(item(0.2, 3));
		let sequences: Vec<usize> = std::iter::from_fn(|| queue.pop())
			.map(|item| item.sequence)
			.collect();
		assert_eq!(sequences, vec![1, 2, 3, 0]);
	}
}
