use crate::{
	train::{self, TrainInputs},
	BranchSplit, TrainError, TrainOptions, Tree,
};
use cart_dataframe::{ColumnView, DataFrameView, Formula, Value};
use cart_util::SparseArray;
use itertools::izip;
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, num::NonZeroUsize};

/// This struct represents a decision tree classifier. The classes are the integers `0..n_classes`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Classifier {
	pub tree: Tree,
	/// The number of classes.
	pub n_classes: usize,
	/// The names of the feature columns the tree was trained on, in order.
	pub feature_names: Vec<String>,
	/// The importance of each feature, measured as the sum of the scores of the splits that use it.
	pub feature_importances: Vec<f64>,
}

impl Classifier {
	/// Train a classifier. The labels must be exactly the integers `0..k` for some `k >= 2`.
	pub fn train(
		features: DataFrameView,
		labels: &[i64],
		options: &TrainOptions,
	) -> Result<Self, TrainError> {
		Self::train_with(features, labels, options, TrainInputs::default())
	}

	/// Train a classifier with sample counts or precomputed feature orders, as passed by ensembles.
	pub fn train_with(
		features: DataFrameView,
		labels: &[i64],
		options: &TrainOptions,
		inputs: TrainInputs,
	) -> Result<Self, TrainError> {
		let n_rows = labels.len();
		if n_rows == 0 {
			return Err(TrainError::EmptyDataset);
		}
		options.validate()?;
		if features.ncols() > 0 && features.nrows() != n_rows {
			return Err(TrainError::LengthMismatch {
				what: "labels",
				expected: features.nrows(),
				actual: n_rows,
			});
		}
		for column in features.columns.iter() {
			if column.len() != n_rows {
				return Err(TrainError::LengthMismatch {
					what: "feature column",
					expected: n_rows,
					actual: column.len(),
				});
			}
		}
		if let Some(samples) = inputs.samples {
			if samples.len() != n_rows {
				return Err(TrainError::LengthMismatch {
					what: "samples",
					expected: n_rows,
					actual: samples.len(),
				});
			}
			if samples.iter().all(|sample| *sample == 0) {
				return Err(TrainError::EmptyDataset);
			}
		}
		if let Some(order) = inputs.order {
			if order.len() != features.ncols() {
				return Err(TrainError::LengthMismatch {
					what: "order",
					expected: features.ncols(),
					actual: order.len(),
				});
			}
			let mut seen = vec![false; n_rows];
			for (feature_index, order) in order.iter().enumerate() {
				let order = match order {
					Some(order) => order,
					None => continue,
				};
				if order.len() != n_rows {
					return Err(TrainError::LengthMismatch {
						what: "feature order",
						expected: n_rows,
						actual: order.len(),
					});
				}
				seen.iter_mut().for_each(|seen| *seen = false);
				for example_index in order.iter() {
					match seen.get_mut(*example_index) {
						Some(seen) if !*seen => *seen = true,
						_ => return Err(TrainError::InvalidOrder(feature_index)),
					}
				}
			}
		}
		let (labels, n_classes) = validate_labels(labels)?;
		let output = train::train(&features, &labels, n_classes, options, inputs);
		Ok(Self {
			tree: output.tree,
			n_classes,
			feature_names: features
				.columns
				.iter()
				.map(|column| column.name().to_owned())
				.collect(),
			feature_importances: output.feature_importances,
		})
	}

	/// Train a classifier on the columns of a dataframe selected by a formula.
	pub fn fit(
		dataframe: &DataFrameView,
		formula: &Formula,
		options: &TrainOptions,
	) -> anyhow::Result<Self> {
		let (features, response) = formula.apply(dataframe)?;
		let labels = labels_from_column(&response)?;
		let model = Self::train(features, &labels, options)?;
		Ok(model)
	}

	/// Predict the class of an example.
	pub fn predict(&self, features: &[Value]) -> usize {
		self.tree.predict(features)
	}

	/// Predict the class of an example and write the probability of each class to `posteriors`, which must have length `n_classes` or it is left unchanged. The probabilities come from the class counts in a single leaf, which is usually small, so they are smoothed by adding one to each count. They are mostly useful when averaged over the trees of an ensemble.
	pub fn predict_with_posteriors(&self, features: &[Value], posteriors: &mut [f32]) -> usize {
		self.tree.predict_with_posteriors(features, posteriors)
	}

	/// Predict the class of an example whose features are given as a sparse array. Features with no entry are zero. For enum features, the value is the 1-based option index and zero means invalid.
	pub fn predict_sparse(&self, features: &SparseArray) -> usize {
		self.tree
			.leaf(|split| {
				let value = features.get(split.feature_index());
				let value = match split {
					BranchSplit::Continuous(_) => Value::Number(value as f32),
					BranchSplit::Discrete(_) => {
						Value::Enum(value.to_usize().and_then(NonZeroUsize::new))
					}
				};
				split.direction(&value)
			})
			.output
	}

	/// Write the smoothed class probabilities for each row of `features` to the matching row of `probabilities`, which has shape (n_examples, n_classes).
	pub fn predict_batch(&self, features: ArrayView2<Value>, mut probabilities: ArrayViewMut2<f32>) {
		let mut row = vec![Value::Number(0.0); features.ncols()];
		let mut posteriors = vec![0.0; self.n_classes];
		for (features, mut probabilities) in izip!(
			features.axis_iter(Axis(0)),
			probabilities.axis_iter_mut(Axis(0))
		) {
			for (v, feature) in row.iter_mut().zip(features) {
				*v = *feature;
			}
			self.tree.predict_with_posteriors(&row, &mut posteriors);
			for (probability, posterior) in probabilities.iter_mut().zip(posteriors.iter()) {
				*probability = *posterior;
			}
		}
	}

	pub fn n_leaves(&self) -> usize {
		self.tree.n_leaves()
	}

	pub fn depth(&self) -> usize {
		self.tree.depth()
	}

	/// Return the name of each feature used by at least one split along with its importance, most important first.
	pub fn ranked_features(&self) -> Vec<(&str, f64)> {
		let mut ranked: Vec<(&str, f64)> = self
			.feature_names
			.iter()
			.map(|name| name.as_str())
			.zip(self.feature_importances.iter().copied())
			.filter(|(_, importance)| *importance > 0.0)
			.collect();
		ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
		ranked
	}
}

/// Check that the labels are exactly the integers `0..k` for some `k >= 2` and convert them to `usize`.
pub fn validate_labels(labels: &[i64]) -> Result<(Vec<usize>, usize), TrainError> {
	let unique: BTreeSet<i64> = labels.iter().copied().collect();
	for (class_index, label) in unique.iter().enumerate() {
		if *label < 0 {
			return Err(TrainError::NegativeLabel(*label));
		}
		if label.to_usize() != Some(class_index) {
			return Err(TrainError::MissingClass(class_index));
		}
	}
	let n_classes = unique.len();
	if n_classes < 2 {
		return Err(TrainError::OnlyOneClass);
	}
	let labels = labels
		.iter()
		.map(|label| label.to_usize().ok_or(TrainError::NegativeLabel(*label)))
		.collect::<Result<_, _>>()?;
	Ok((labels, n_classes))
}

/// Read integer class labels from a response column. Number columns must hold integers. Enum columns use the 0-based index of each option, and may not have invalid values.
pub fn labels_from_column(column: &ColumnView) -> Result<Vec<i64>, TrainError> {
	match column {
		ColumnView::Number(column) => column
			.data
			.iter()
			.enumerate()
			.map(|(row, value)| {
				if value.is_finite() && value.fract() == 0.0 {
					value.to_i64().ok_or_else(|| {
						TrainError::UnsupportedResponse(format!(
							"value {} in row {} is out of range",
							value, row
						))
					})
				} else {
					Err(TrainError::UnsupportedResponse(format!(
						"value {} in row {} of column \"{}\" is not an integer",
						value, row, column.name
					)))
				}
			})
			.collect(),
		ColumnView::Enum(column) => column
			.data
			.iter()
			.enumerate()
			.map(|(row, value)| match value {
				Some(value) => Ok((value.get() - 1).to_i64().unwrap_or(i64::MAX)),
				None => Err(TrainError::UnsupportedResponse(format!(
					"row {} of column \"{}\" has an invalid value",
					row, column.name
				))),
			})
			.collect(),
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::SplitDirection;
	use cart_dataframe::{Column, DataFrame, EnumColumn, NumberColumn, NumberColumnView};

	fn single_feature(data: &[f32]) -> DataFrameView {
		DataFrameView {
			columns: vec![ColumnView::Number(NumberColumnView { name: "x", data })],
		}
	}

	fn unbounded(node_size: usize) -> TrainOptions {
		TrainOptions {
			node_size,
			max_nodes: None,
			..Default::default()
		}
	}

	#[test]
	fn test_two_pure_leaves() {
		let x = [1.0, 2.0, 3.0, 8.0, 9.0, 10.0];
		let labels = [0, 0, 0, 1, 1, 1];
		let model = Classifier::train(single_feature(&x), &labels, &unbounded(1)).unwrap();
		assert_eq!(model.n_classes, 2);
		assert_eq!(model.n_leaves(), 2);
		assert_eq!(model.depth(), 1);
		assert_eq!(model.predict(&[Value::Number(3.0)]), 0);
		assert_eq!(model.predict(&[Value::Number(5.4)]), 0);
		assert_eq!(model.predict(&[Value::Number(5.6)]), 1);
		assert_eq!(model.predict(&[Value::Number(8.0)]), 1);
		let branch = model.tree.nodes[0].as_branch().unwrap();
		assert_eq!(
			branch.split.direction(&Value::Number(2.0)),
			SplitDirection::Left
		);
	}

	#[test]
	fn test_invalid_labels() {
		let x = [1.0, 2.0, 3.0];
		let options = unbounded(1);
		assert_eq!(
			Classifier::train(single_feature(&x), &[-1, 0, 1], &options),
			Err(TrainError::NegativeLabel(-1))
		);
		assert_eq!(
			Classifier::train(single_feature(&x), &[0, 2, 0], &options),
			Err(TrainError::MissingClass(1))
		);
		assert_eq!(
			Classifier::train(single_feature(&x), &[0, 0, 0], &options),
			Err(TrainError::OnlyOneClass)
		);
		assert_eq!(
			Classifier::train(single_feature(&[]), &[], &options),
			Err(TrainError::EmptyDataset)
		);
		assert_eq!(
			Classifier::train(single_feature(&x), &[0, 1], &options),
			Err(TrainError::LengthMismatch {
				what: "labels",
				expected: 3,
				actual: 2,
			})
		);
	}

	#[test]
	fn test_invalid_options() {
		let x = [1.0, 2.0, 3.0];
		let options = TrainOptions {
			max_nodes: Some(0),
			..Default::default()
		};
		assert!(matches!(
			Classifier::train(single_feature(&x), &[0, 1, 0], &options),
			Err(TrainError::InvalidOptions(_))
		));
	}

	#[test]
	fn test_huge_node_size() {
		let x = [1.0, 2.0, 3.0, 8.0, 9.0, 10.0];
		let labels = [0, 0, 0, 1, 1, 1];
		for max_nodes in &[None, Some(6)] {
			let options = TrainOptions {
				node_size: usize::MAX,
				max_nodes: *max_nodes,
				..Default::default()
			};
			let model = Classifier::train(single_feature(&x), &labels, &options).unwrap();
			assert_eq!(model.n_leaves(), 1);
			assert_eq!(model.tree.nodes[0].as_leaf().unwrap().size, 6);
		}
	}

	#[test]
	fn test_invalid_order() {
		let x = [5.0, 1.0, 4.0, 2.0, 3.0, 6.0];
		let labels = [1, 0, 1, 0, 1, 0];
		let options = unbounded(1);
		let train_with_order = |order: Vec<usize>| {
			let order = vec![Some(order)];
			Classifier::train_with(
				single_feature(&x),
				&labels,
				&options,
				TrainInputs {
					samples: None,
					order: Some(&order),
				},
			)
		};
		assert_eq!(
			train_with_order(vec![0, 1, 2, 3, 4, 99]),
			Err(TrainError::InvalidOrder(0))
		);
		assert_eq!(
			train_with_order(vec![1, 3, 4, 2, 0, 0]),
			Err(TrainError::InvalidOrder(0))
		);
		assert!(train_with_order(vec![1, 3, 4, 2, 0, 5]).is_ok());
	}

	#[test]
	fn test_every_example_reaches_one_leaf() {
		let x: Vec<f32> = (0..100).map(|i| ((i * 37) % 100) as f32 / 10.0).collect();
		let labels: Vec<i64> = x.iter().map(|x| (*x as i64) % 3).collect();
		let options = TrainOptions {
			node_size: 3,
			max_nodes: Some(10),
			..Default::default()
		};
		let model = Classifier::train(single_feature(&x), &labels, &options).unwrap();
		assert!(model.tree.n_leaves() <= 10);
		// The leaf sizes add up to the number of examples, so each example was counted in exactly one leaf.
		let total: usize = model
			.tree
			.nodes
			.iter()
			.filter_map(|node| node.as_leaf())
			.map(|leaf| leaf.size)
			.sum();
		assert_eq!(total, 100);
		let mut posteriors = vec![0.0; 3];
		for x in x.iter() {
			let output = model.predict_with_posteriors(&[Value::Number(*x)], &mut posteriors);
			assert!(output < 3);
			assert!((posteriors.iter().sum::<f32>() - 1.0).abs() < 1e-5);
			assert!(posteriors.iter().all(|p| *p > 0.0));
		}
	}

	#[test]
	fn test_enum_feature() {
		// The color alone determines the class, and the number feature is noise.
		let dataframe = DataFrame {
			columns: vec![
				Column::Enum(EnumColumn {
					name: "color".to_owned(),
					options: vec!["red".to_owned(), "green".to_owned(), "blue".to_owned()],
					data: [1, 2, 3, 1, 2, 3, 1, 2, 3, 2, 2, 2]
						.iter()
						.map(|v| NonZeroUsize::new(*v))
						.collect(),
				}),
				Column::Number(NumberColumn {
					name: "noise".to_owned(),
					data: vec![
						5.0, 3.0, 1.0, 4.0, 6.0, 2.0, 0.0, 7.0, 8.0, 9.0, 11.0, 10.0,
					],
				}),
				Column::Number(NumberColumn {
					name: "label".to_owned(),
					data: vec![0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0],
				}),
			],
		};
		let model =
			Classifier::fit(&dataframe.view(), &Formula::lhs("label"), &unbounded(1)).unwrap();
		assert_eq!(model.feature_names, vec!["color", "noise"]);
		let green = Value::Enum(NonZeroUsize::new(2));
		let blue = Value::Enum(NonZeroUsize::new(3));
		assert_eq!(model.predict(&[green, Value::Number(0.0)]), 1);
		assert_eq!(model.predict(&[blue, Value::Number(0.0)]), 0);
		assert_eq!(model.tree.n_leaves(), 2);
		assert_eq!(model.ranked_features()[0].0, "color");
		// The same examples as sparse arrays, where the enum value is the option index.
		let mut sparse = SparseArray::new();
		sparse.set(0, 2.0);
		assert_eq!(model.predict_sparse(&sparse), 1);
		sparse.set(0, 1.0);
		sparse.set(1, 7.0);
		assert_eq!(model.predict_sparse(&sparse), 0);
	}

	#[test]
	fn test_predict_batch() {
		let x = [1.0, 2.0, 3.0, 8.0, 9.0, 10.0];
		let labels = [0, 0, 0, 1, 1, 1];
		let model = Classifier::train(single_feature(&x), &labels, &unbounded(1)).unwrap();
		let features = single_feature(&x).to_rows();
		let mut probabilities = Array2::zeros((6, 2));
		model.predict_batch(features.view(), probabilities.view_mut());
		insta::assert_debug_snapshot!(probabilities.row(0).to_vec(), @r###"
  [
      0.8,
      0.2,
  ]
  "###);
		assert_eq!(probabilities.row(5).to_vec(), vec![0.2, 0.8]);
	}

	#[test]
	fn test_labels_from_column() {
		let data = [0.0, 1.0, 2.0];
		let column = ColumnView::Number(NumberColumnView {
			name: "y",
			data: &data,
		});
		assert_eq!(labels_from_column(&column), Ok(vec![0, 1, 2]));
		let data = [0.0, 1.5];
		let column = ColumnView::Number(NumberColumnView {
			name: "y",
			data: &data,
		});
		assert!(labels_from_column(&column).is_err());
	}

	#[test]
	fn test_serialize() {
		let x = [1.0, 2.0, 3.0, 8.0, 9.0, 10.0];
		let labels = [0, 0, 0, 1, 1, 1];
		let model = Classifier::train(single_feature(&x), &labels, &unbounded(1)).unwrap();
		let json = serde_json::to_string(&model).unwrap();
		let deserialized: Classifier = serde_json::from_str(&json).unwrap();
		assert_eq!(model, deserialized);
	}
}
