/*!
This crate holds small data structures shared by the other crates in this workspace.
*/

pub mod sparse_array;

pub use self::sparse_array::{format_value, Entry, SparseArray};
