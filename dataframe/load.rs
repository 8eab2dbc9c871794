use super::*;
use anyhow::{format_err, Result};
use fnv::FnvHashMap;
use std::{
	collections::{BTreeMap, BTreeSet},
	path::Path,
};

#[derive(Clone)]
pub struct FromCsvOptions<'a> {
	pub column_types: Option<BTreeMap<String, ColumnType>>,
	pub infer_options: InferOptions,
	pub invalid_values: &'a [&'a str],
}

impl<'a> Default for FromCsvOptions<'a> {
	fn default() -> Self {
		Self {
			column_types: None,
			infer_options: InferOptions::default(),
			invalid_values: DEFAULT_INVALID_VALUES,
		}
	}
}

#[derive(Clone, Debug)]
pub struct InferOptions {
	pub enum_max_unique_values: usize,
}

impl Default for InferOptions {
	fn default() -> Self {
		Self {
			enum_max_unique_values: 100,
		}
	}
}

/// These values are the default values that are considered invalid.
const DEFAULT_INVALID_VALUES: &[&str] = &[
	"", "null", "NULL", "n/a", "N/A", "nan", "-nan", "NaN", "-NaN", "?",
];

impl DataFrame {
	pub fn from_path(path: &Path, options: FromCsvOptions, progress: impl Fn(u64)) -> Result<Self> {
		Self::from_csv(&mut csv::Reader::from_path(path)?, options, progress)
	}

	pub fn from_csv<R>(
		reader: &mut csv::Reader<R>,
		options: FromCsvOptions,
		progress: impl Fn(u64),
	) -> Result<Self>
	where
		R: std::io::Read + std::io::Seek,
	{
		let column_names: Vec<String> = reader
			.headers()?
			.into_iter()
			.map(|column_name| column_name.to_owned())
			.collect();
		let start_position = reader.position().clone();
		let invalid_values = options.invalid_values;
		let mut n_rows = None;

		// Retrieve any column types present in the options. The remaining columns will have their types inferred.
		let mut column_types: Vec<Option<ColumnType>> = column_names
			.iter()
			.map(|column_name| {
				options
					.column_types
					.as_ref()
					.and_then(|column_types| column_types.get(column_name))
					.cloned()
			})
			.collect();

		// Passing over the csv to infer column types is only necessary if one or more columns did not have its type specified.
		if column_types.iter().any(|column_type| column_type.is_none()) {
			let mut infer_stats: Vec<(usize, InferStats)> = column_types
				.iter()
				.enumerate()
				.filter(|(_, column_type)| column_type.is_none())
				.map(|(index, _)| (index, InferStats::new(&options.infer_options, invalid_values)))
				.collect();
			let mut record = csv::StringRecord::new();
			let mut n_rows_computed = 0;
			while reader.read_record(&mut record)? {
				n_rows_computed += 1;
				for (index, infer_stats) in infer_stats.iter_mut() {
					let value = record
						.get(*index)
						.ok_or_else(|| format_err!("row {} is missing a value", n_rows_computed))?;
					infer_stats.update(value);
				}
			}
			n_rows = Some(n_rows_computed);
			for (index, infer_stats) in infer_stats {
				column_types[index] = Some(infer_stats.finalize(&column_names[index])?);
			}
			// After inference, return back to the beginning of the csv to load the values.
			reader.seek(start_position)?;
		}
		let column_types: Vec<ColumnType> = column_types.into_iter().flatten().collect();

		// Create the dataframe.
		let mut dataframe = Self::new(column_names, column_types);
		// If an inference pass was done, reserve storage for the values because we know how many rows are in the csv.
		if let Some(n_rows) = n_rows {
			for column in dataframe.columns.iter_mut() {
				match column {
					Column::Number(column) => column.data.reserve_exact(n_rows),
					Column::Enum(column) => column.data.reserve_exact(n_rows),
				}
			}
		}
		let mut enum_option_positions: Vec<Option<FnvHashMap<String, usize>>> = dataframe
			.columns
			.iter()
			.map(|column| match column {
				Column::Number(_) => None,
				Column::Enum(column) => Some(
					column
						.options
						.iter()
						.enumerate()
						.map(|(position, option)| (option.clone(), position))
						.collect(),
				),
			})
			.collect();
		// Read each csv record and insert the values into the columns of the dataframe.
		let mut record = csv::ByteRecord::new();
		while reader.read_byte_record(&mut record)? {
			if let Some(position) = record.position() {
				progress(position.byte());
			}
			for (column, option_positions, value) in izip!(
				dataframe.columns.iter_mut(),
				enum_option_positions.iter_mut(),
				record.iter()
			) {
				match column {
					Column::Number(column) => {
						let value = match lexical::parse::<f32, &[u8]>(value) {
							Ok(value) if value.is_finite() => value,
							_ => std::f32::NAN,
						};
						column.data.push(value);
					}
					Column::Enum(column) => {
						let value = std::str::from_utf8(value)
							.ok()
							.and_then(|value| option_positions.as_ref()?.get(value))
							.and_then(|position| NonZeroUsize::new(*position + 1));
						column.data.push(value);
					}
				}
			}
		}
		Ok(dataframe)
	}
}

#[derive(Clone, Debug)]
struct InferStats<'a> {
	infer_options: &'a InferOptions,
	invalid_values: &'a [&'a str],
	column_type: InferColumnType,
	unique_values: Option<BTreeSet<String>>,
}

#[derive(PartialEq, Clone, Copy, Debug)]
enum InferColumnType {
	Unknown,
	Number,
	Enum,
}

impl<'a> InferStats<'a> {
	fn new(infer_options: &'a InferOptions, invalid_values: &'a [&'a str]) -> Self {
		Self {
			infer_options,
			invalid_values,
			column_type: InferColumnType::Unknown,
			unique_values: Some(BTreeSet::new()),
		}
	}

	fn update(&mut self, value: &str) {
		if self.invalid_values.contains(&value) {
			return;
		}
		if let Some(unique_values) = self.unique_values.as_mut() {
			if !unique_values.contains(value) {
				unique_values.insert(value.to_owned());
			}
			if unique_values.len() > self.infer_options.enum_max_unique_values {
				self.unique_values = None;
			}
		}
		if self.column_type != InferColumnType::Enum {
			let is_number = lexical::parse::<f32, &str>(value)
				.map(|v| v.is_finite())
				.unwrap_or(false);
			self.column_type = if is_number {
				InferColumnType::Number
			} else {
				InferColumnType::Enum
			};
		}
	}

	fn finalize(self, column_name: &str) -> Result<ColumnType> {
		match self.column_type {
			// A column with only invalid values cannot be used for anything, so it is loaded as numbers that are all NaN.
			InferColumnType::Unknown | InferColumnType::Number => Ok(ColumnType::Number),
			InferColumnType::Enum => match self.unique_values {
				Some(unique_values) => Ok(ColumnType::Enum {
					options: unique_values.into_iter().collect(),
				}),
				None => Err(format_err!(
					"column \"{}\" has more than {} unique values and is not a number column",
					column_name,
					self.infer_options.enum_max_unique_values,
				)),
			},
		}
	}
}

#[test]
fn test_infer() {
	let csv = r#"number,enum
1,test
2,test
"#;
	let df = DataFrame::from_csv(
		&mut csv::Reader::from_reader(std::io::Cursor::new(csv)),
		FromCsvOptions {
			column_types: None,
			infer_options: InferOptions {
				enum_max_unique_values: 1,
			},
			..Default::default()
		},
		|_| {},
	)
	.unwrap();
	insta::assert_debug_snapshot!(df, @r###"
 DataFrame {
     columns: [
         Number(
             NumberColumn {
                 name: "number",
                 data: [
                     1.0,
                     2.0,
                 ],
             },
         ),
         Enum(
             EnumColumn {
                 name: "enum",
                 options: [
                     "test",
                 ],
                 data: [
                     Some(
                         1,
                     ),
                     Some(
                         1,
                     ),
                 ],
             },
         ),
     ],
 }
 "###);
}

#[test]
fn test_column_types() {
	let csv = r#"number,enum
1,hello
2,world
3,?
"#;
	let mut column_types = BTreeMap::new();
	column_types.insert(
		"enum".to_owned(),
		ColumnType::Enum {
			options: vec!["world".to_owned(), "hello".to_owned()],
		},
	);
	let df = DataFrame::from_csv(
		&mut csv::Reader::from_reader(std::io::Cursor::new(csv)),
		FromCsvOptions {
			column_types: Some(column_types),
			..Default::default()
		},
		|_| {},
	)
	.unwrap();
	let column = df.columns[1].as_enum().unwrap();
	assert_eq!(
		column.data,
		vec![NonZeroUsize::new(2), NonZeroUsize::new(1), None]
	);
	assert!(df.columns[0].as_number().is_some());
}

#[test]
fn test_too_many_unique_values() {
	let csv = r#"name
a
b
c
"#;
	let result = DataFrame::from_csv(
		&mut csv::Reader::from_reader(std::io::Cursor::new(csv)),
		FromCsvOptions {
			infer_options: InferOptions {
				enum_max_unique_values: 2,
			},
			..Default::default()
		},
		|_| {},
	);
	assert!(result.is_err());
}
