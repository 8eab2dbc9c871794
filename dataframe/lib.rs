/*!
This crate provides a basic implementation of dataframes, which are two dimensional arrays of data where each column can have a different data type, like a spreadsheet. It only implements what is needed to train and evaluate decision trees: number columns, enum columns, loading from csv, and a `Formula` that separates the response column from the predictors.
*/

use itertools::izip;
use ndarray::prelude::*;
use std::num::NonZeroUsize;

pub mod formula;
pub mod load;

pub use self::formula::Formula;
pub use self::load::*;

#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
	pub columns: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataFrameView<'a> {
	pub columns: Vec<ColumnView<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
	Number(NumberColumn),
	Enum(EnumColumn),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberColumn {
	pub name: String,
	pub data: Vec<f32>,
}

/// The values of an enum column are 1-based indexes into `options`. `None` means the value was invalid.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumColumn {
	pub name: String,
	pub options: Vec<String>,
	pub data: Vec<Option<NonZeroUsize>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnView<'a> {
	Number(NumberColumnView<'a>),
	Enum(EnumColumnView<'a>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberColumnView<'a> {
	pub name: &'a str,
	pub data: &'a [f32],
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumColumnView<'a> {
	pub name: &'a str,
	pub options: &'a [String],
	pub data: &'a [Option<NonZeroUsize>],
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
	Number,
	Enum { options: Vec<String> },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
	Number(f32),
	Enum(Option<NonZeroUsize>),
}

impl DataFrame {
	pub fn new(column_names: Vec<String>, column_types: Vec<ColumnType>) -> Self {
		let columns = column_names
			.into_iter()
			.zip(column_types.into_iter())
			.map(|(column_name, column_type)| match column_type {
				ColumnType::Number => Column::Number(NumberColumn::new(column_name)),
				ColumnType::Enum { options } => Column::Enum(EnumColumn::new(column_name, options)),
			})
			.collect();
		Self { columns }
	}

	pub fn ncols(&self) -> usize {
		self.columns.len()
	}

	pub fn nrows(&self) -> usize {
		self.columns.first().map(|column| column.len()).unwrap_or(0)
	}

	pub fn view(&self) -> DataFrameView {
		let columns = self.columns.iter().map(|column| column.view()).collect();
		DataFrameView { columns }
	}
}

impl Column {
	pub fn len(&self) -> usize {
		match self {
			Self::Number(s) => s.data.len(),
			Self::Enum(s) => s.data.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn name(&self) -> &str {
		match self {
			Self::Number(s) => s.name.as_str(),
			Self::Enum(s) => s.name.as_str(),
		}
	}

	pub fn as_number(&self) -> Option<&NumberColumn> {
		match self {
			Self::Number(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_enum(&self) -> Option<&EnumColumn> {
		match self {
			Self::Enum(s) => Some(s),
			_ => None,
		}
	}

	pub fn view(&self) -> ColumnView {
		match self {
			Self::Number(column) => ColumnView::Number(column.view()),
			Self::Enum(column) => ColumnView::Enum(column.view()),
		}
	}
}

impl NumberColumn {
	pub fn new(name: String) -> Self {
		Self {
			name,
			data: Vec::new(),
		}
	}

	pub fn view(&self) -> NumberColumnView {
		NumberColumnView {
			name: &self.name,
			data: &self.data,
		}
	}
}

impl EnumColumn {
	pub fn new(name: String, options: Vec<String>) -> Self {
		Self {
			name,
			options,
			data: Vec::new(),
		}
	}

	pub fn view(&self) -> EnumColumnView {
		EnumColumnView {
			name: &self.name,
			data: &self.data,
			options: &self.options,
		}
	}
}

impl<'a> DataFrameView<'a> {
	pub fn ncols(&self) -> usize {
		self.columns.len()
	}

	pub fn nrows(&self) -> usize {
		self.columns.first().map(|column| column.len()).unwrap_or(0)
	}

	pub fn view(&self) -> Self {
		self.clone()
	}

	/// Find a column by name.
	pub fn column(&self, name: &str) -> Option<&ColumnView<'a>> {
		self.columns.iter().find(|column| column.name() == name)
	}

	pub fn read_row(&self, index: usize, row: &mut [Value]) {
		for (value, column) in row.iter_mut().zip(self.columns.iter()) {
			*value = column.get(index);
		}
	}

	pub fn split_at_row(&self, index: usize) -> (Self, Self) {
		let iter = self.columns.iter().map(|column| column.split_at_row(index));
		let mut columns_a = Vec::with_capacity(self.columns.len());
		let mut columns_b = Vec::with_capacity(self.columns.len());
		for (column_a, column_b) in iter {
			columns_a.push(column_a);
			columns_b.push(column_b);
		}
		(Self { columns: columns_a }, Self { columns: columns_b })
	}

	/// Copy the values into a row major array with shape (n_rows, n_columns).
	pub fn to_rows(&self) -> Array2<Value> {
		let mut rows = Array2::from_elem((self.nrows(), self.ncols()), Value::Number(0.0));
		for (mut ndarray_column, dataframe_column) in
			izip!(rows.gencolumns_mut(), self.columns.iter())
		{
			match dataframe_column {
				ColumnView::Number(column) => {
					for (a, b) in izip!(ndarray_column.iter_mut(), column.data) {
						*a = Value::Number(*b);
					}
				}
				ColumnView::Enum(column) => {
					for (a, b) in izip!(ndarray_column.iter_mut(), column.data) {
						*a = Value::Enum(*b);
					}
				}
			}
		}
		rows
	}
}

impl<'a> ColumnView<'a> {
	pub fn len(&self) -> usize {
		match self {
			Self::Number(s) => s.data.len(),
			Self::Enum(s) => s.data.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn name(&self) -> &'a str {
		match self {
			Self::Number(s) => s.name,
			Self::Enum(s) => s.name,
		}
	}

	pub fn get(&self, index: usize) -> Value {
		match self {
			Self::Number(column) => Value::Number(column.data[index]),
			Self::Enum(column) => Value::Enum(column.data[index]),
		}
	}

	pub fn split_at_row(&self, index: usize) -> (Self, Self) {
		match self {
			ColumnView::Number(column) => {
				let (data_a, data_b) = column.data.split_at(index);
				(
					ColumnView::Number(NumberColumnView {
						name: column.name,
						data: data_a,
					}),
					ColumnView::Number(NumberColumnView {
						name: column.name,
						data: data_b,
					}),
				)
			}
			ColumnView::Enum(column) => {
				let (data_a, data_b) = column.data.split_at(index);
				(
					ColumnView::Enum(EnumColumnView {
						name: column.name,
						options: column.options,
						data: data_a,
					}),
					ColumnView::Enum(EnumColumnView {
						name: column.name,
						options: column.options,
						data: data_b,
					}),
				)
			}
		}
	}
}

#[test]
fn test_split_at_row() {
	let dataframe = DataFrame {
		columns: vec![
			Column::Number(NumberColumn {
				name: "x".to_owned(),
				data: vec![1.0, 2.0, 3.0],
			}),
			Column::Enum(EnumColumn {
				name: "color".to_owned(),
				options: vec!["red".to_owned(), "blue".to_owned()],
				data: vec![NonZeroUsize::new(1), NonZeroUsize::new(2), None],
			}),
		],
	};
	let view = dataframe.view();
	let (a, b) = view.split_at_row(2);
	assert_eq!(a.nrows(), 2);
	assert_eq!(b.nrows(), 1);
	let mut row = vec![Value::Number(0.0); 2];
	b.read_row(0, &mut row);
	assert_eq!(row, vec![Value::Number(3.0), Value::Enum(None)]);
	let rows = a.to_rows();
	assert_eq!(rows[(1, 0)], Value::Number(2.0));
	assert_eq!(rows[(1, 1)], Value::Enum(NonZeroUsize::new(2)));
}
