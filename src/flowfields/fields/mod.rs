//! The kinds of fields used by the dense algorithm. Each field is a row-major
//! array of `columns x rows` values addressed by a [FieldCell]:
//!
//! ```text
//!          column 0   column 1   column 2
//!        ________________________________
//! row 2 |  (0, 2)  |  (1, 2)  |  (2, 2)  |   index = row * columns + column
//!       |__________|__________|__________|
//! row 1 |  (0, 1)  |  (1, 1)  |  (2, 1)  |
//!       |__________|__________|__________|
//! row 0 |  (0, 0)  |  (1, 0)  |  (2, 0)  |
//!       |__________|__________|__________|
//! ```
//!
//! Reading outside of the array never panics, each field answers with its own
//! sentinel (blocked weight, unreached cost or zero direction)
//!

pub mod flow_field;
pub mod integration_field;
pub mod weight_field;

use bevy::prelude::*;

/// Defines required access to field arrays
pub trait Field<T> {
	/// Get a reference to the field array
	fn get(&self) -> &[T];
	/// Number of `(columns, rows)` in the field
	fn get_dimensions(&self) -> UVec2;
	/// Retrieve a field cell value, or the sentinel of the field when out of bounds
	fn get_field_cell_value(&self, field_cell: FieldCell) -> T;
	/// Set a field cell to a value, out of bounds cells are ignored
	fn set_field_cell_value(&mut self, value: T, field_cell: FieldCell);
}

/// ID of a cell within a field
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash, Reflect)]
pub struct FieldCell((i32, i32));

impl FieldCell {
	/// Sentinel returned when a position does not map onto the grid
	pub const INVALID: FieldCell = FieldCell((-1, -1));
	/// Create a new instance of [FieldCell]
	pub fn new(column: i32, row: i32) -> Self {
		FieldCell((column, row))
	}
	/// Get the `(column, row)` tuple
	pub fn get_column_row(&self) -> (i32, i32) {
		self.0
	}
	/// Get the column
	pub fn get_column(&self) -> i32 {
		self.0 .0
	}
	/// Get the row
	pub fn get_row(&self) -> i32 {
		self.0 .1
	}
	/// The cell as a vector, `x` is the column
	pub fn as_ivec2(&self) -> IVec2 {
		IVec2::new(self.0 .0, self.0 .1)
	}
	/// The cell found by stepping `offset` away from this one
	pub fn offset(&self, offset: IVec2) -> FieldCell {
		FieldCell::new(self.get_column() + offset.x, self.get_row() + offset.y)
	}
	/// Whether the cell sits inside a grid of `dimensions`
	pub fn is_within(&self, dimensions: UVec2) -> bool {
		self.get_column() >= 0
			&& self.get_row() >= 0
			&& (self.get_column() as u32) < dimensions.x
			&& (self.get_row() as u32) < dimensions.y
	}
}

impl From<IVec2> for FieldCell {
	fn from(value: IVec2) -> Self {
		FieldCell::new(value.x, value.y)
	}
}

/// Position of `field_cell` within a row-major array of `dimensions`
pub fn linear_index(dimensions: UVec2, field_cell: FieldCell) -> Option<usize> {
	if field_cell.is_within(dimensions) {
		Some(field_cell.get_row() as usize * dimensions.x as usize + field_cell.get_column() as usize)
	} else {
		None
	}
}

/// Number of cells in a grid of `dimensions`
pub fn cell_count(dimensions: UVec2) -> usize {
	dimensions.x as usize * dimensions.y as usize
}

/// Iterate every [FieldCell] of a grid row by row
pub fn iter_field_cells(dimensions: UVec2) -> impl Iterator<Item = FieldCell> {
	(0..dimensions.y as i32)
		.flat_map(move |row| (0..dimensions.x as i32).map(move |column| FieldCell::new(column, row)))
}

#[cfg(test)]
mod tests {
	use super::*;
	#[test]
	fn index_is_row_major() {
		let dimensions = UVec2::new(5, 3);
		assert_eq!(Some(0), linear_index(dimensions, FieldCell::new(0, 0)));
		assert_eq!(Some(7), linear_index(dimensions, FieldCell::new(2, 1)));
		assert_eq!(Some(14), linear_index(dimensions, FieldCell::new(4, 2)));
	}
	#[test]
	fn out_of_bounds_has_no_index() {
		let dimensions = UVec2::new(5, 3);
		assert_eq!(None, linear_index(dimensions, FieldCell::new(5, 0)));
		assert_eq!(None, linear_index(dimensions, FieldCell::new(0, 3)));
		assert_eq!(None, linear_index(dimensions, FieldCell::INVALID));
	}
	#[test]
	fn iterate_in_index_order() {
		let dimensions = UVec2::new(3, 2);
		let cells: Vec<FieldCell> = iter_field_cells(dimensions).collect();
		assert_eq!(6, cells.len());
		for (i, cell) in cells.iter().enumerate() {
			assert_eq!(Some(i), linear_index(dimensions, *cell));
		}
	}
}
