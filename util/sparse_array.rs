/*!
This module provides `SparseArray`, a list of `(index, value)` pairs for numeric data where most values are zero. Lookups scan the list, so it is meant for short arrays or for iteration, not for random access into long ones.
*/

use serde::{Deserialize, Serialize};
use std::iter::FromIterator;

/// A single nonzero entry in a `SparseArray`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Entry {
	pub index: usize,
	pub value: f64,
}

/// The indexes and values are stored in two parallel `Vec`s rather than one `Vec<Entry>`. The entries are in insertion order until `sort` is called.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseArray {
	index: Vec<usize>,
	value: Vec<f64>,
}

impl SparseArray {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_capacity(capacity: usize) -> Self {
		Self {
			index: Vec::with_capacity(capacity),
			value: Vec::with_capacity(capacity),
		}
	}

	/// Return the number of nonzero entries.
	pub fn len(&self) -> usize {
		self.index.len()
	}

	pub fn is_empty(&self) -> bool {
		self.index.is_empty()
	}

	/// Iterate over the entries in their current order. Each call starts again from the first entry.
	pub fn iter(&self) -> Iter {
		Iter {
			array: self,
			position: 0,
		}
	}

	/// Return the value at `index`, or 0.0 if there is no entry for it.
	pub fn get(&self, index: usize) -> f64 {
		self.position(index)
			.map(|position| self.value[position])
			.unwrap_or(0.0)
	}

	/// Set the value at `index`. Setting a value of 0.0 removes the entry. This returns true only if a new entry was added, and false if an existing entry was updated or removed.
	pub fn set(&mut self, index: usize, value: f64) -> bool {
		if value == 0.0 {
			self.remove(index);
			return false;
		}
		match self.position(index) {
			Some(position) => {
				self.value[position] = value;
				false
			}
			None => {
				self.index.push(index);
				self.value.push(value);
				true
			}
		}
	}

	/// Append an entry without checking whether `index` is already present. The caller must make sure it is not, usually because indexes are appended in increasing order.
	pub fn append(&mut self, index: usize, value: f64) {
		if value != 0.0 {
			self.index.push(index);
			self.value.push(value);
		}
	}

	/// Remove the entry at `index`, keeping the order of the remaining entries.
	pub fn remove(&mut self, index: usize) {
		if let Some(position) = self.position(index) {
			self.index.remove(position);
			self.value.remove(position);
		}
	}

	/// Sort the entries so that their indexes are ascending.
	pub fn sort(&mut self) {
		let mut entries: Vec<(usize, f64)> = self
			.index
			.iter()
			.copied()
			.zip(self.value.iter().copied())
			.collect();
		entries.sort_unstable_by_key(|(index, _)| *index);
		let (index, value) = entries.into_iter().unzip();
		self.index = index;
		self.value = value;
	}

	fn position(&self, index: usize) -> Option<usize> {
		self.index.iter().position(|i| *i == index)
	}
}

pub struct Iter<'a> {
	array: &'a SparseArray,
	position: usize,
}

impl<'a> Iterator for Iter<'a> {
	type Item = Entry;
	fn next(&mut self) -> Option<Entry> {
		let index = *self.array.index.get(self.position)?;
		let value = self.array.value[self.position];
		self.position += 1;
		Some(Entry { index, value })
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		let remaining = self.array.len() - self.position;
		(remaining, Some(remaining))
	}
}

impl<'a> ExactSizeIterator for Iter<'a> {}

impl<'a> IntoIterator for &'a SparseArray {
	type Item = Entry;
	type IntoIter = Iter<'a>;
	fn into_iter(self) -> Self::IntoIter {
		self.iter()
	}
}

impl FromIterator<Entry> for SparseArray {
	fn from_iter<I: IntoIterator<Item = Entry>>(iter: I) -> Self {
		let mut array = SparseArray::new();
		for entry in iter {
			array.index.push(entry.index);
			array.value.push(entry.value);
		}
		array
	}
}

impl From<Vec<Entry>> for SparseArray {
	fn from(entries: Vec<Entry>) -> Self {
		entries.into_iter().collect()
	}
}

/// Format a value with at most six digits after the decimal point, dropping trailing zeros.
pub fn format_value(value: f64) -> String {
	let formatted = format!("{:.6}", value);
	let formatted = formatted.trim_end_matches('0').trim_end_matches('.');
	if formatted == "-0" {
		"0".to_owned()
	} else {
		formatted.to_owned()
	}
}

impl std::fmt::Display for Entry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}:{}", self.index, format_value(self.value))
	}
}

impl std::fmt::Display for SparseArray {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "[")?;
		for (i, entry) in self.iter().enumerate() {
			if i > 0 {
				write!(f, ", ")?;
			}
			write!(f, "{}", entry)?;
		}
		write!(f, "]")
	}
}

#[test]
fn test_set_and_get() {
	let mut array = SparseArray::new();
	assert!(array.set(3, 1.5));
	assert!(array.set(1, -2.0));
	assert!(!array.set(3, 4.0));
	assert_eq!(array.get(3), 4.0);
	assert_eq!(array.get(1), -2.0);
	assert_eq!(array.get(2), 0.0);
	assert_eq!(array.len(), 2);
}

#[test]
fn test_set_zero_removes() {
	let mut array = SparseArray::new();
	array.set(7, 2.0);
	assert!(!array.set(7, 0.0));
	assert_eq!(array.get(7), 0.0);
	assert!(array.is_empty());
	// Setting zero on an absent index does nothing.
	assert!(!array.set(8, 0.0));
	assert!(array.is_empty());
}

#[test]
fn test_append_skips_zero() {
	let mut array = SparseArray::new();
	array.append(0, 1.0);
	array.append(1, 0.0);
	array.append(2, 3.0);
	assert_eq!(array.len(), 2);
	assert_eq!(array.get(1), 0.0);
	assert_eq!(array.get(2), 3.0);
}

#[test]
fn test_remove_keeps_order() {
	let mut array: SparseArray = vec![
		Entry {
			index: 5,
			value: 1.0,
		},
		Entry {
			index: 2,
			value: 2.0,
		},
		Entry {
			index: 9,
			value: 3.0,
		},
	]
	.into();
	array.remove(2);
	array.remove(4);
	let indexes: Vec<usize> = array.iter().map(|entry| entry.index).collect();
	assert_eq!(indexes, vec![5, 9]);
}

#[test]
fn test_sort() {
	let mut array = SparseArray::new();
	for (index, value) in &[(9, 0.9), (1, 0.1), (4, 0.4), (0, 1.0), (7, 0.7)] {
		array.set(*index, *value);
	}
	array.sort();
	let entries: Vec<Entry> = array.iter().collect();
	assert!(entries.windows(2).all(|w| w[0].index <= w[1].index));
	// The values must move with their indexes.
	for entry in entries {
		assert_eq!(array.get(entry.index), entry.value);
	}
	assert_eq!(array.get(4), 0.4);
}

#[test]
fn test_iter_restarts() {
	let mut array = SparseArray::new();
	array.append(1, 1.0);
	array.append(2, 2.0);
	assert_eq!(array.iter().count(), 2);
	assert_eq!(array.iter().count(), 2);
	assert_eq!((&array).into_iter().len(), 2);
}

#[test]
fn test_display() {
	let mut array = SparseArray::new();
	array.append(0, 1.0);
	array.append(3, 0.25);
	array.append(4, 1.0 / 3.0);
	array.append(8, -2.5);
	insta::assert_snapshot!(array.to_string(), @"[0:1, 3:0.25, 4:0.333333, 8:-2.5]");
	assert_eq!(SparseArray::new().to_string(), "[]");
}
