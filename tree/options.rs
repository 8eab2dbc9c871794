use crate::{OptionsError, SplitRule, TrainError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// These are the options passed to `Classifier::train`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainOptions {
	/// This is the rule used to measure the impurity of a node.
	pub split_rule: SplitRule,
	/// A split will only be considered valid if the weighted number of training examples sent to each of the resulting children is at least this value.
	pub node_size: usize,
	/// The number of leaf nodes in the tree will never exceed this value. If it is `Some`, the tree is grown best first, always splitting the leaf whose split reduces impurity the most. If it is `None`, the tree is grown depth first until no leaf can be split.
	pub max_nodes: Option<usize>,
	/// This is the number of features chosen at random to consider when splitting each node. If it is `None`, every feature is considered. Random forests usually set it to the square root of the number of features.
	pub mtry: Option<usize>,
	/// This is the seed for choosing the features to consider when `mtry` is set.
	pub seed: u64,
}

impl Default for TrainOptions {
	fn default() -> Self {
		Self {
			split_rule: SplitRule::Gini,
			node_size: 5,
			max_nodes: Some(6),
			mtry: None,
			seed: 0,
		}
	}
}

pub const SPLIT_RULE_PROPERTY: &str = "cart.split.rule";
pub const NODE_SIZE_PROPERTY: &str = "cart.node.size";
pub const MAX_NODES_PROPERTY: &str = "cart.max.nodes";
pub const MTRY_PROPERTY: &str = "cart.mtry";
pub const SEED_PROPERTY: &str = "cart.seed";

impl TrainOptions {
	/// Read options from string properties. Missing properties keep their default values and unknown properties are ignored. `cart.max.nodes` may be `unbounded`, and `cart.mtry` may be `-1` to consider every feature.
	pub fn from_properties(properties: &BTreeMap<String, String>) -> Result<Self, OptionsError> {
		let mut options = TrainOptions::default();
		for (key, value) in properties.iter() {
			let invalid = || OptionsError::InvalidValue {
				key: key.clone(),
				value: value.clone(),
			};
			match key.as_str() {
				SPLIT_RULE_PROPERTY => {
					options.split_rule = value.trim().parse().map_err(|_| invalid())?;
				}
				NODE_SIZE_PROPERTY => {
					options.node_size = value.trim().parse().map_err(|_| invalid())?;
				}
				MAX_NODES_PROPERTY => {
					options.max_nodes = match value.trim() {
						"unbounded" => None,
						value => Some(value.parse().map_err(|_| invalid())?),
					};
				}
				MTRY_PROPERTY => {
					options.mtry = match value.trim() {
						"-1" => None,
						value => Some(value.parse().map_err(|_| invalid())?),
					};
				}
				SEED_PROPERTY => {
					options.seed = value.trim().parse().map_err(|_| invalid())?;
				}
				_ => {}
			}
		}
		Ok(options)
	}

	/// Check the options before training.
	pub(crate) fn validate(&self) -> Result<(), TrainError> {
		if self.node_size == 0 {
			return Err(TrainError::InvalidOptions(
				"node_size must be at least 1".to_owned(),
			));
		}
		if self.max_nodes == Some(0) {
			return Err(TrainError::InvalidOptions(
				"max_nodes must be at least 1".to_owned(),
			));
		}
		if self.mtry == Some(0) {
			return Err(TrainError::InvalidOptions(
				"mtry must be at least 1".to_owned(),
			));
		}
		Ok(())
	}
}

#[test]
fn test_from_properties() {
	let mut properties = BTreeMap::new();
	properties.insert(SPLIT_RULE_PROPERTY.to_owned(), "ENTROPY".to_owned());
	properties.insert(NODE_SIZE_PROPERTY.to_owned(), "2".to_owned());
	properties.insert(MAX_NODES_PROPERTY.to_owned(), "unbounded".to_owned());
	properties.insert(MTRY_PROPERTY.to_owned(), "3".to_owned());
	properties.insert("something.else".to_owned(), "ignored".to_owned());
	let options = TrainOptions::from_properties(&properties).unwrap();
	insta::assert_debug_snapshot!(options, @r###"
 TrainOptions {
     split_rule: Entropy,
     node_size: 2,
     max_nodes: None,
     mtry: Some(
         3,
     ),
     seed: 0,
 }
 "###);
	let options = TrainOptions::from_properties(&BTreeMap::new()).unwrap();
	assert_eq!(options, TrainOptions::default());
}

#[test]
fn test_from_properties_invalid() {
	let mut properties = BTreeMap::new();
	properties.insert(NODE_SIZE_PROPERTY.to_owned(), "five".to_owned());
	assert_eq!(
		TrainOptions::from_properties(&properties),
		Err(OptionsError::InvalidValue {
			key: NODE_SIZE_PROPERTY.to_owned(),
			value: "five".to_owned(),
		})
	);
	let mut properties = BTreeMap::new();
	properties.insert(SPLIT_RULE_PROPERTY.to_owned(), "VARIANCE".to_owned());
	assert!(TrainOptions::from_properties(&properties).is_err());
}

#[test]
fn test_deserialize() {
	let options: TrainOptions =
		serde_json::from_str(r#"{ "split_rule": "gain_ratio", "max_nodes": null }"#).unwrap();
	assert_eq!(options.split_rule, SplitRule::GainRatio);
	assert_eq!(options.max_nodes, None);
	assert_eq!(options.node_size, 5);
}

#[test]
fn test_validate() {
	let options = TrainOptions {
		node_size: 0,
		..Default::default()
	};
	assert!(options.validate().is_err());
	assert!(TrainOptions::default().validate().is_ok());
}
