use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The splitting rule determines how the impurity of a node is measured from the counts of each class in it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitRule {
	/// Gini impurity, `1 - Σ p²`, as used by CART.
	#[serde(rename = "gini")]
	Gini,
	/// Entropy, `-Σ p log₂ p`. Splits are scored by information gain.
	#[serde(rename = "entropy")]
	Entropy,
	/// Classification error, `1 - max p`.
	#[serde(rename = "classification_error")]
	ClassificationError,
	/// Entropy, but splits are scored by information gain ratio, which is the information gain divided by the entropy of the split itself. This counteracts the preference of information gain for splits with a very uneven number of examples on each side.
	#[serde(rename = "gain_ratio")]
	GainRatio,
}

impl Default for SplitRule {
	fn default() -> Self {
		SplitRule::Gini
	}
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown split rule \"{0}\"")]
pub struct ParseSplitRuleError(pub String);

impl std::str::FromStr for SplitRule {
	type Err = ParseSplitRuleError;
	fn from_str(value: &str) -> Result<Self, Self::Err> {
		match value {
			"GINI" => Ok(SplitRule::Gini),
			"ENTROPY" => Ok(SplitRule::Entropy),
			"CLASSIFICATION_ERROR" => Ok(SplitRule::ClassificationError),
			"GAIN_RATIO" => Ok(SplitRule::GainRatio),
			_ => Err(ParseSplitRuleError(value.to_owned())),
		}
	}
}

impl SplitRule {
	/// Compute the impurity of a node with `n` examples whose class counts are `counts`. An empty node has zero impurity.
	pub fn impurity(self, counts: &[usize], n: usize) -> f64 {
		if n == 0 {
			return 0.0;
		}
		let n = n.to_f64().unwrap();
		let probabilities = counts.iter().map(|count| count.to_f64().unwrap() / n);
		match self {
			SplitRule::Gini => 1.0 - probabilities.map(|p| p * p).sum::<f64>(),
			SplitRule::Entropy | SplitRule::GainRatio => entropy(probabilities),
			SplitRule::ClassificationError => {
				1.0 - probabilities.fold(0.0, |max: f64, p| max.max(p))
			}
		}
	}

	/// Score a split of a node with impurity `impurity` into a left and right child. The score is the reduction in impurity, weighting each child's impurity by its fraction of the examples. For `GainRatio` the reduction is then divided by the entropy of the split.
	pub fn score(
		self,
		impurity: f64,
		left_counts: &[usize],
		left_n: usize,
		right_counts: &[usize],
		right_n: usize,
	) -> f64 {
		let n = (left_n + right_n).to_f64().unwrap();
		let left_fraction = left_n.to_f64().unwrap() / n;
		let right_fraction = right_n.to_f64().unwrap() / n;
		let reduction = impurity
			- left_fraction * self.impurity(left_counts, left_n)
			- right_fraction * self.impurity(right_counts, right_n);
		match self {
			SplitRule::GainRatio => {
				let split_information = entropy([left_fraction, right_fraction].iter().copied());
				if split_information > 0.0 {
					reduction / split_information
				} else {
					0.0
				}
			}
			_ => reduction,
		}
	}
}

fn entropy(probabilities: impl Iterator<Item = f64>) -> f64 {
	-probabilities
		.filter(|p| *p > 0.0)
		.map(|p| p * p.log2())
		.sum::<f64>()
}

#[test]
fn test_impurity() {
	let counts = [3, 1];
	assert!((SplitRule::Gini.impurity(&counts, 4) - 0.375).abs() < 1e-12);
	assert!((SplitRule::Entropy.impurity(&counts, 4) - 0.811_278_124_459_132_8).abs() < 1e-12);
	assert!((SplitRule::ClassificationError.impurity(&counts, 4) - 0.25).abs() < 1e-12);
	assert_eq!(SplitRule::Gini.impurity(&[4, 0], 4), 0.0);
	assert_eq!(SplitRule::Entropy.impurity(&[0, 4], 4), 0.0);
	assert_eq!(SplitRule::Gini.impurity(&[0, 0], 0), 0.0);
}

#[test]
fn test_score() {
	// A perfect split of a balanced node removes all of its impurity.
	let gini = SplitRule::Gini.impurity(&[2, 2], 4);
	let score = SplitRule::Gini.score(gini, &[2, 0], 2, &[0, 2], 2);
	assert!((score - 0.5).abs() < 1e-12);
	let entropy = SplitRule::Entropy.impurity(&[2, 2], 4);
	let score = SplitRule::Entropy.score(entropy, &[2, 0], 2, &[0, 2], 2);
	assert!((score - 1.0).abs() < 1e-12);
	// An even split has one bit of split information, so the gain ratio equals the information gain.
	let score = SplitRule::GainRatio.score(entropy, &[2, 0], 2, &[0, 2], 2);
	assert!((score - 1.0).abs() < 1e-12);
	// A split that leaves the class proportions unchanged gains nothing.
	let score = SplitRule::Gini.score(gini, &[1, 1], 2, &[1, 1], 2);
	assert!(score.abs() < 1e-12);
}

#[test]
fn test_parse() {
	assert_eq!("ENTROPY".parse::<SplitRule>(), Ok(SplitRule::Entropy));
	assert_eq!(
		"gini".parse::<SplitRule>(),
		Err(ParseSplitRuleError("gini".to_owned()))
	);
}
