use super::TrainFeature;
use crate::{BranchSplit, SplitDirection};
use cart_dataframe::Value;
use std::ops::Range;

/// This function returns the ranges of `examples_index` for the left and right children and rearranges `examples_index` in place so that the examples sent left by the split come first. The direction of each example is also recorded in `directions` so that the feature orders can be rearranged to match.
pub fn rearrange_examples_index(
	features: &[TrainFeature],
	split: &BranchSplit,
	examples_index: &mut [usize],
	directions: &mut [SplitDirection],
) -> (Range<usize>, Range<usize>) {
	let feature = features[split.feature_index()];
	let start = 0;
	let end = examples_index.len();
	let mut left = start;
	let mut right = end;
	let mut n_left = 0;
	while left < right {
		let example_index = examples_index[left];
		let value = match feature {
			TrainFeature::Number(data) => Value::Number(data[example_index]),
			TrainFeature::Enum { data, .. } => Value::Enum(data[example_index]),
		};
		let direction = split.direction(&value);
		directions[example_index] = direction;
		match direction {
			SplitDirection::Left => {
				left += 1;
				n_left += 1;
			}
			SplitDirection::Right => {
				right -= 1;
				examples_index.swap(left, right);
			}
		};
	}
	(start..n_left, n_left..end)
}

/// Rearrange a feature's order so that the examples sent left come first, keeping each side sorted. The examples are copied to the left and right buffers and then back.
pub fn rearrange_order(
	order: &mut [usize],
	directions: &[SplitDirection],
	left_buffer: &mut [usize],
	right_buffer: &mut [usize],
) {
	let mut n_left = 0;
	let mut n_right = 0;
	for example_index in order.iter() {
		match directions[*example_index] {
			SplitDirection::Left => {
				left_buffer[n_left] = *example_index;
				n_left += 1;
			}
			SplitDirection::Right => {
				right_buffer[n_right] = *example_index;
				n_right += 1;
			}
		}
	}
	order[..n_left].copy_from_slice(&left_buffer[..n_left]);
	order[n_left..].copy_from_slice(&right_buffer[..n_right]);
}
