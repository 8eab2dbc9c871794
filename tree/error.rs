use thiserror::Error;

/// These are the reasons training can be rejected. Training checks its inputs before creating any part of the tree, so an error never leaves a partially built tree behind.
#[derive(Debug, Error, PartialEq)]
pub enum TrainError {
	#[error("the dataset has no examples")]
	EmptyDataset,
	#[error("negative class label: {0}")]
	NegativeLabel(i64),
	#[error("missing class: {0}")]
	MissingClass(usize),
	#[error("only one class")]
	OnlyOneClass,
	#[error("{what} has length {actual}, but the dataset has {expected} rows")]
	LengthMismatch {
		what: &'static str,
		expected: usize,
		actual: usize,
	},
	#[error("the order of feature {0} is not a permutation of the rows")]
	InvalidOrder(usize),
	#[error("invalid options: {0}")]
	InvalidOptions(String),
	#[error("unsupported response column: {0}")]
	UnsupportedResponse(String),
}

/// An error reading `TrainOptions` from properties.
#[derive(Debug, Error, PartialEq)]
pub enum OptionsError {
	#[error("invalid value \"{value}\" for property \"{key}\"")]
	InvalidValue { key: String, value: String },
}
