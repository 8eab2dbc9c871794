use super::*;
use anyhow::{bail, format_err, Result};

/// A `Formula` selects the response column and the predictor columns of a dataframe. If `predictors` is `None`, every column other than the response is a predictor.
#[derive(Clone, Debug, PartialEq)]
pub struct Formula {
	pub response: String,
	pub predictors: Option<Vec<String>>,
}

impl Formula {
	/// Create a formula that uses every column other than `response` as a predictor.
	pub fn lhs(response: impl Into<String>) -> Self {
		Self {
			response: response.into(),
			predictors: None,
		}
	}

	pub fn new(response: impl Into<String>, predictors: Vec<String>) -> Self {
		Self {
			response: response.into(),
			predictors: Some(predictors),
		}
	}

	/// Split a dataframe into its predictor columns and its response column.
	pub fn apply<'a>(
		&self,
		dataframe: &DataFrameView<'a>,
	) -> Result<(DataFrameView<'a>, ColumnView<'a>)> {
		let response = dataframe
			.column(&self.response)
			.cloned()
			.ok_or_else(|| format_err!("response column \"{}\" not found", self.response))?;
		let columns = match &self.predictors {
			None => dataframe
				.columns
				.iter()
				.filter(|column| column.name() != self.response)
				.cloned()
				.collect(),
			Some(predictors) => {
				let mut columns = Vec::with_capacity(predictors.len());
				for predictor in predictors {
					if *predictor == self.response {
						bail!("column \"{}\" is both the response and a predictor", predictor);
					}
					let column = dataframe
						.column(predictor)
						.cloned()
						.ok_or_else(|| format_err!("predictor column \"{}\" not found", predictor))?;
					columns.push(column);
				}
				columns
			}
		};
		Ok((DataFrameView { columns }, response))
	}
}

#[test]
fn test_formula() {
	let dataframe = DataFrame {
		columns: vec![
			Column::Number(NumberColumn {
				name: "a".to_owned(),
				data: vec![1.0, 2.0],
			}),
			Column::Number(NumberColumn {
				name: "y".to_owned(),
				data: vec![0.0, 1.0],
			}),
			Column::Number(NumberColumn {
				name: "b".to_owned(),
				data: vec![3.0, 4.0],
			}),
		],
	};
	let view = dataframe.view();
	let (features, response) = Formula::lhs("y").apply(&view).unwrap();
	let names: Vec<&str> = features.columns.iter().map(|c| c.name()).collect();
	assert_eq!(names, vec!["a", "b"]);
	assert_eq!(response.name(), "y");
	let (features, _) = Formula::new("y", vec!["b".to_owned()])
		.apply(&view)
		.unwrap();
	assert_eq!(features.ncols(), 1);
	assert!(Formula::lhs("z").apply(&view).is_err());
	assert!(Formula::new("y", vec!["y".to_owned()]).apply(&view).is_err());
	assert!(Formula::new("y", vec!["c".to_owned()]).apply(&view).is_err());
}
