//! The WeightField contains a 2D array of 8-bit traversal weights. A weight
//! of `255` is the default and describes open ground that is the quickest to
//! cross, a weight of `0` is a special case that marks the cell as strictly
//! forbidden from being used in a pathing calculation (a wall or cliff). Any
//! other value slows movement through the cell proportionally, a weight of
//! `51` is a fifth of the speed of open ground and so costs five times as much
//! to step into:
//!
//! ```text
//!  _____________________________________
//! |     |     |     |     |     |     |
//! | 255 | 255 | 255 |  0  | 255 | 255 |
//! |_____|_____|_____|_____|_____|_____|
//! |     |     |     |     |     |     |
//! | 255 |  51 | 255 |  0  | 255 | 255 |
//! |_____|_____|_____|_____|_____|_____|
//! |     |     |     |     |     |     |
//! | 255 |  51 | 255 | 255 | 255 | 255 |
//! |_____|_____|_____|_____|_____|_____|
//! ```
//!

use crate::prelude::*;
use bevy::prelude::*;

/// Traversal weights of every cell of a dense grid
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, Debug, PartialEq, Reflect)]
pub struct WeightField {
	/// Number of `(columns, rows)`
	dimensions: UVec2,
	/// Row-major weights
	weights: Vec<u8>,
}

impl Default for WeightField {
	fn default() -> Self {
		WeightField::new(UVec2::ONE, DEFAULT_TRAVERSAL_WEIGHT)
	}
}

impl Field<u8> for WeightField {
	/// Get a reference to the field array
	fn get(&self) -> &[u8] {
		&self.weights
	}
	/// Number of `(columns, rows)` in the field
	fn get_dimensions(&self) -> UVec2 {
		self.dimensions
	}
	/// Retrieve a field cell value, out of bounds cells are blocked
	fn get_field_cell_value(&self, field_cell: FieldCell) -> u8 {
		match linear_index(self.dimensions, field_cell) {
			Some(i) => self.weights[i],
			None => BLOCKED_WEIGHT,
		}
	}
	/// Set a field cell to a value
	fn set_field_cell_value(&mut self, value: u8, field_cell: FieldCell) {
		if let Some(i) = linear_index(self.dimensions, field_cell) {
			self.weights[i] = value;
		}
	}
}

impl WeightField {
	/// Create a new instance of [WeightField] where every cell has `weight`
	pub fn new(dimensions: UVec2, weight: u8) -> Self {
		WeightField {
			dimensions,
			weights: vec![weight; cell_count(dimensions)],
		}
	}
	/// Replace every weight at once. The length of `weights` must exactly
	/// match the number of cells, otherwise the existing weights are kept
	pub fn set_traversal_weights(&mut self, weights: &[u8]) -> Result<(), FlowFieldError> {
		let expected = cell_count(self.dimensions);
		if weights.len() != expected {
			return Err(FlowFieldError::invalid_argument(format!(
				"expected {} traversal weights for a {}x{} grid, found {}",
				expected,
				self.dimensions.x,
				self.dimensions.y,
				weights.len()
			)));
		}
		self.weights.copy_from_slice(weights);
		Ok(())
	}
	/// A cell is walkable when it sits inside the grid and has a non-zero weight
	pub fn is_walkable(&self, field_cell: FieldCell) -> bool {
		self.get_field_cell_value(field_cell) != BLOCKED_WEIGHT
	}
	/// Assign `weight` to the inclusive rectangle of cells spanning `min` to
	/// `max`, clipped to the grid. Returns how many cells changed value
	pub fn fill_region(&mut self, min: IVec2, max: IVec2, weight: u8) -> usize {
		let upper = self.dimensions.as_ivec2() - IVec2::ONE;
		let start = min.max(IVec2::ZERO);
		let end = max.min(upper);
		let mut changed = 0;
		for row in start.y..=end.y {
			for column in start.x..=end.x {
				let cell = FieldCell::new(column, row);
				if self.get_field_cell_value(cell) != weight {
					self.set_field_cell_value(weight, cell);
					changed += 1;
				}
			}
		}
		changed
	}
	/// From a `ron` file generate the [WeightField]
	#[cfg(feature = "ron")]
	pub fn from_ron(path: &str) -> Result<Self, FlowFieldError> {
		let file = std::fs::File::open(path)?;
		let field: WeightField = ron::de::from_reader(file)?;
		if field.weights.len() != cell_count(field.dimensions) {
			return Err(FlowFieldError::invalid_argument(format!(
				"weight file {} holds {} weights for dimensions {}",
				path,
				field.weights.len(),
				field.dimensions
			)));
		}
		Ok(field)
	}
	/// From a headerless `csv` file generate the [WeightField]. Each record is
	/// a row of the grid, the first record being row `0`
	#[cfg(feature = "csv")]
	pub fn from_csv(path: &str) -> Result<Self, FlowFieldError> {
		let data = std::fs::File::open(path)?;
		let mut rdr = csv::ReaderBuilder::new()
			.has_headers(false)
			.from_reader(data);
		let mut rows: Vec<Vec<u8>> = Vec::new();
		for record in rdr.records() {
			let record = record?;
			let mut row = Vec::with_capacity(record.len());
			for value in record.iter() {
				let weight: u8 = value.trim().parse().map_err(|_| {
					FlowFieldError::invalid_argument(format!(
						"csv weights must be in the range 0-255, found '{}'",
						value
					))
				})?;
				row.push(weight);
			}
			rows.push(row);
		}
		let columns = rows.first().map(|r| r.len()).unwrap_or(0);
		if columns == 0 || rows.iter().any(|r| r.len() != columns) {
			return Err(FlowFieldError::invalid_argument(format!(
				"csv {} must contain rows of equal, non-zero length",
				path
			)));
		}
		let dimensions = UVec2::new(columns as u32, rows.len() as u32);
		let mut field = WeightField::new(dimensions, DEFAULT_TRAVERSAL_WEIGHT);
		field.set_traversal_weights(&rows.concat())?;
		Ok(field)
	}
	/// Create a [WeightField] from a greyscale image where each pixel
	/// represents the weight of a [FieldCell]. White is open ground, black is
	/// impassable. The top row of pixels becomes the highest row of the grid
	#[cfg(feature = "heightmap")]
	pub fn from_heightmap(path: &str) -> Result<Self, FlowFieldError> {
		use photon_rs::native::open_image;
		let img = open_image(path).map_err(|e| FlowFieldError::Image(format!("{:?}", e)))?;
		let img_width = img.get_width();
		let img_height = img.get_height();
		let raw_pixels = img.get_raw_pixels();
		// raw pixels are arranged from the top left of the image and come in
		// sets of either 3 or 4 (if alpha channel is included)
		let channels = if (img_width * img_height * 4) as usize == raw_pixels.len() {
			4
		} else {
			3
		};
		let dimensions = UVec2::new(img_width, img_height);
		let mut field = WeightField::new(dimensions, DEFAULT_TRAVERSAL_WEIGHT);
		for (i, px) in raw_pixels.chunks(channels).enumerate() {
			let column = (i as u32 % img_width) as i32;
			let line_number = i as u32 / img_width;
			let row = (img_height - 1 - line_number) as i32;
			// careful of u8 overflow
			let colour_avg = (px[0] as f32 + px[1] as f32 + px[2] as f32) / 3.0;
			field.set_field_cell_value(colour_avg.round() as u8, FieldCell::new(column, row));
		}
		Ok(field)
	}
}
