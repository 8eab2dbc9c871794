/*!
This crate implements decision trees for classification in the style of CART. A tree is grown by recursively partitioning the training examples into axis aligned regions, choosing at each step the split that most reduces the impurity of the class labels. Each region ends in a leaf that holds the number of training examples of each class that reached it.

Trees are grown either depth first, splitting every node until no split improves the impurity, or best first, always splitting the node whose best split reduces impurity the most until the tree has `max_nodes` leaves. See `TrainOptions`.

For an example, see the tests in `classifier.rs`.
*/

#![allow(clippy::tabs_in_doc_comments)]

use cart_dataframe::Value;
use serde::{Deserialize, Serialize};

mod classifier;
mod error;
mod impurity;
mod options;
mod train;

pub use self::classifier::Classifier;
pub use self::error::{OptionsError, TrainError};
pub use self::impurity::{ParseSplitRuleError, SplitRule};
pub use self::options::TrainOptions;
pub use self::train::{compute_order, TrainInputs};

/// Trees are stored as a `Vec` of `Node`s. The root is the first node. Each branch in the tree has two indexes into the `Vec`, one for each of its children, and every node other than the root is the child of exactly one branch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tree {
	pub nodes: Vec<Node>,
}

impl Tree {
	/// Find the leaf an example is sent to. `direction` decides which way the example goes at each branch.
	pub fn leaf(&self, direction: impl Fn(&BranchSplit) -> SplitDirection) -> &LeafNode {
		// Start at the root node.
		let mut node_index = 0;
		// Traverse the tree until we get to a leaf.
		loop {
			match &self.nodes[node_index] {
				Node::Branch(BranchNode {
					left_child_index,
					right_child_index,
					split,
					..
				}) => {
					node_index = match direction(split) {
						SplitDirection::Left => *left_child_index,
						SplitDirection::Right => *right_child_index,
					};
				}
				Node::Leaf(leaf) => return leaf,
			}
		}
	}

	/// Predict the class of an example.
	pub fn predict(&self, features: &[Value]) -> usize {
		self.leaf(|split| split.direction(&features[split.feature_index()]))
			.output
	}

	/// Predict the class of an example and write the probability of each class to `posteriors`, which must have one entry per class or it is left unchanged. The probabilities are the class counts in the leaf with add-one smoothing, so no class ever has a probability of zero.
	pub fn predict_with_posteriors(&self, features: &[Value], posteriors: &mut [f32]) -> usize {
		let leaf = self.leaf(|split| split.direction(&features[split.feature_index()]));
		leaf.posteriors(posteriors);
		leaf.output
	}

	pub fn n_leaves(&self) -> usize {
		self.nodes
			.iter()
			.filter(|node| matches!(node, Node::Leaf(_)))
			.count()
	}

	/// The depth of the deepest leaf. A tree with a single leaf has depth 0.
	pub fn depth(&self) -> usize {
		let mut max_depth = 0;
		let mut stack = vec![(0, 0)];
		while let Some((node_index, depth)) = stack.pop() {
			match &self.nodes[node_index] {
				Node::Branch(branch) => {
					stack.push((branch.left_child_index, depth + 1));
					stack.push((branch.right_child_index, depth + 1));
				}
				Node::Leaf(_) => max_depth = max_depth.max(depth),
			}
		}
		max_depth
	}
}

/// A node is either a branch or a leaf.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Node {
	Branch(BranchNode),
	Leaf(LeafNode),
}

impl Node {
	pub fn as_leaf(&self) -> Option<&LeafNode> {
		match self {
			Node::Leaf(leaf) => Some(leaf),
			_ => None,
		}
	}

	pub fn as_branch(&self) -> Option<&BranchNode> {
		match self {
			Node::Branch(branch) => Some(branch),
			_ => None,
		}
	}
}

/// A `BranchNode` is a branch in a tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BranchNode {
	/// This is the index in the tree's node vector for this node's left child.
	pub left_child_index: usize,
	/// This is the index in the tree's node vector for this node's right child.
	pub right_child_index: usize,
	/// When making predictions, an example will be sent either to the right or left child. The `split` contains the information necessary to determine which way it will go.
	pub split: BranchSplit,
	/// The reduction in impurity achieved by the split.
	pub score: f64,
}

/// A `BranchSplit` describes how examples are sent to the left or right child given their feature values. A `Continuous` split is used for number features, and `Discrete` is used for enum features.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BranchSplit {
	Continuous(BranchSplitContinuous),
	Discrete(BranchSplitDiscrete),
}

/// A continuous branch split takes the value of a single number feature, compares it with a `split_value`, and if the value is <= `split_value`, the example is sent left, and if it is > `split_value`, it is sent right.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BranchSplitContinuous {
	/// This is the index of the feature to get the value for.
	pub feature_index: usize,
	/// This is the threshold value of the split.
	pub split_value: f32,
}

/// A discrete branch split takes the value of a single enum feature and looks up which way the example should be sent. `directions[0]` is used for invalid values and `directions[i]` for the enum option `i`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BranchSplitDiscrete {
	/// This is the index of the feature to get the value for.
	pub feature_index: usize,
	/// This specifies which direction, left or right, an example should be sent, based on the value of the chosen feature.
	pub directions: Vec<SplitDirection>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitDirection {
	Left,
	Right,
}

impl BranchSplit {
	pub fn feature_index(&self) -> usize {
		match self {
			Self::Continuous(b) => b.feature_index,
			Self::Discrete(b) => b.feature_index,
		}
	}

	/// Decide which way to send an example with the given value for this split's feature. Values of the wrong type for the split, and NaN, are sent right.
	pub fn direction(&self, value: &Value) -> SplitDirection {
		match (self, value) {
			(
				BranchSplit::Continuous(BranchSplitContinuous { split_value, .. }),
				Value::Number(value),
			) => {
				if value <= split_value {
					SplitDirection::Left
				} else {
					SplitDirection::Right
				}
			}
			(BranchSplit::Discrete(BranchSplitDiscrete { directions, .. }), Value::Enum(value)) => {
				let bin_index = value.map(|value| value.get()).unwrap_or(0);
				directions
					.get(bin_index)
					.copied()
					.unwrap_or(SplitDirection::Right)
			}
			_ => SplitDirection::Right,
		}
	}
}

/// The leaves in a tree hold the number of training examples of each class that were sent to them, along with the class they predict.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeafNode {
	/// The weighted number of training examples of each class.
	pub counts: Vec<usize>,
	/// The sum of `counts`.
	pub size: usize,
	/// The class with the largest count. Ties go to the lowest class.
	pub output: usize,
}

impl LeafNode {
	pub fn new(n_classes: usize) -> Self {
		Self {
			counts: vec![0; n_classes],
			size: 0,
			output: 0,
		}
	}

	/// Add `weight` examples of class `label`.
	pub fn add(&mut self, label: usize, weight: usize) {
		self.counts[label] += weight;
		self.size += weight;
	}

	/// Recompute `output` from the counts.
	pub fn compute_output(&mut self) {
		let mut output = 0;
		for (class_index, count) in self.counts.iter().enumerate() {
			if *count > self.counts[output] {
				output = class_index;
			}
		}
		self.output = output;
	}

	pub fn impurity(&self, split_rule: SplitRule) -> f64 {
		split_rule.impurity(&self.counts, self.size)
	}

	/// Write the add-one smoothed class probabilities to `posteriors`. A buffer without exactly one entry per class is left unchanged.
	pub fn posteriors(&self, posteriors: &mut [f32]) {
		if posteriors.len() != self.counts.len() {
			return;
		}
		let denominator = (self.size + self.counts.len()) as f32;
		for (posterior, count) in posteriors.iter_mut().zip(self.counts.iter()) {
			*posterior = (*count + 1) as f32 / denominator;
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::num::NonZeroUsize;

	fn stump() -> Tree {
		Tree {
			nodes: vec![
				Node::Branch(BranchNode {
					left_child_index: 1,
					right_child_index: 2,
					split: BranchSplit::Continuous(BranchSplitContinuous {
						feature_index: 1,
						split_value: 5.5,
					}),
					score: 0.5,
				}),
				Node::Leaf(LeafNode {
					counts: vec![3, 0],
					size: 3,
					output: 0,
				}),
				Node::Branch(BranchNode {
					left_child_index: 3,
					right_child_index: 4,
					split: BranchSplit::Discrete(BranchSplitDiscrete {
						feature_index: 0,
						directions: vec![
							SplitDirection::Right,
							SplitDirection::Left,
							SplitDirection::Right,
						],
					}),
					score: 0.1,
				}),
				Node::Leaf(LeafNode {
					counts: vec![1, 1],
					size: 2,
					output: 0,
				}),
				Node::Leaf(LeafNode {
					counts: vec![0, 4],
					size: 4,
					output: 1,
				}),
			],
		}
	}

	#[test]
	fn test_predict() {
		let tree = stump();
		let one = Value::Enum(NonZeroUsize::new(1));
		let two = Value::Enum(NonZeroUsize::new(2));
		assert_eq!(tree.predict(&[two, Value::Number(1.0)]), 0);
		assert_eq!(tree.predict(&[two, Value::Number(5.5)]), 0);
		assert_eq!(tree.predict(&[two, Value::Number(6.0)]), 1);
		assert_eq!(tree.predict(&[one, Value::Number(6.0)]), 0);
		assert_eq!(tree.predict(&[Value::Enum(None), Value::Number(6.0)]), 1);
		assert_eq!(tree.predict(&[two, Value::Number(std::f32::NAN)]), 1);
	}

	#[test]
	fn test_posteriors() {
		let tree = stump();
		let mut posteriors = [0.0; 2];
		let output = tree.predict_with_posteriors(
			&[Value::Enum(NonZeroUsize::new(2)), Value::Number(9.0)],
			&mut posteriors,
		);
		assert_eq!(output, 1);
		assert!((posteriors[0] - 1.0 / 6.0).abs() < 1e-6);
		assert!((posteriors[1] - 5.0 / 6.0).abs() < 1e-6);
		let mut posteriors = [0.0; 2];
		tree.predict_with_posteriors(&[Value::Enum(None), Value::Number(0.0)], &mut posteriors);
		assert!((posteriors.iter().sum::<f32>() - 1.0).abs() < 1e-6);
		assert!(posteriors.iter().all(|p| *p > 0.0));
		let mut short = [-1.0; 1];
		let output = tree.predict_with_posteriors(
			&[Value::Enum(NonZeroUsize::new(2)), Value::Number(9.0)],
			&mut short,
		);
		assert_eq!(output, 1);
		assert_eq!(short, [-1.0]);
	}

	#[test]
	fn test_shape() {
		let tree = stump();
		assert_eq!(tree.n_leaves(), 3);
		assert_eq!(tree.depth(), 2);
	}

	#[test]
	fn test_leaf_output_ties() {
		let mut leaf = LeafNode::new(3);
		leaf.add(2, 2);
		leaf.add(1, 2);
		leaf.add(0, 1);
		leaf.compute_output();
		assert_eq!(leaf.output, 1);
		assert_eq!(leaf.size, 5);
	}
}
