use serde::{Deserialize, Serialize};

use crate::model::random::RandomSource;

/// Dense row-major matrix stored in one contiguous buffer.
///
/// Serialized as a list of rows; deserialization rejects ragged input.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct Matrix {
	rows: usize,
	cols: usize,
	data: Vec<f64>,
}

impl Matrix {
	/// Creates a `rows × cols` matrix filled with `value`.
	pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
		Self { rows, cols, data: vec![value; rows * cols] }
	}

	pub fn zeros(rows: usize, cols: usize) -> Self {
		Self::filled(rows, cols, 0.0)
	}

	/// Creates a matrix of independent uniform draws.
	pub fn random(rows: usize, cols: usize, rng: &mut dyn RandomSource) -> Self {
		let data = (0..rows * cols).map(|_| rng.next_f64()).collect();
		Self { rows, cols, data }
	}

	pub fn rows(&self) -> usize {
		self.rows
	}

	pub fn cols(&self) -> usize {
		self.cols
	}

	pub fn get(&self, row: usize, col: usize) -> f64 {
		self.data[row * self.cols + col]
	}

	pub fn set(&mut self, row: usize, col: usize, value: f64) {
		self.data[row * self.cols + col] = value;
	}

	pub fn add(&mut self, row: usize, col: usize, value: f64) {
		self.data[row * self.cols + col] += value;
	}

	pub fn row(&self, row: usize) -> &[f64] {
		&self.data[row * self.cols..(row + 1) * self.cols]
	}

	pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
		&mut self.data[row * self.cols..(row + 1) * self.cols]
	}

	/// Makes every row sum to 1 (see [`normalize`]).
	pub fn normalize_rows(&mut self) {
		for row in 0..self.rows {
			normalize(self.row_mut(row));
		}
	}
}

/// Scales `values` so they sum to 1.
///
/// A vector that sums to zero (or contains NaN / infinite / negative
/// values) is replaced by the uniform distribution.
pub fn normalize(values: &mut [f64]) {
	if values.is_empty() {
		return;
	}
	let sum: f64 = values.iter().sum();
	let valid = sum.is_finite() && sum > 0.0 && values.iter().all(|v| v.is_finite() && *v >= 0.0);
	if valid {
		values.iter_mut().for_each(|v| *v /= sum);
	} else {
		let uniform = 1.0 / values.len() as f64;
		values.iter_mut().for_each(|v| *v = uniform);
	}
}

impl TryFrom<Vec<Vec<f64>>> for Matrix {
	type Error = String;

	fn try_from(rows: Vec<Vec<f64>>) -> Result<Self, Self::Error> {
		let cols = rows.first().map_or(0, Vec::len);
		if rows.iter().any(|row| row.len() != cols) {
			return Err("matrix rows must all have the same length".to_owned());
		}
		Ok(Self { rows: rows.len(), cols, data: rows.into_iter().flatten().collect() })
	}
}

impl From<Matrix> for Vec<Vec<f64>> {
	fn from(matrix: Matrix) -> Self {
		if matrix.cols == 0 {
			return vec![Vec::new(); matrix.rows];
		}
		matrix.data.chunks(matrix.cols).map(<[f64]>::to_vec).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::random::SequenceSource;

	#[test]
	fn rows_are_normalized() {
		let mut m = Matrix::random(3, 4, &mut SequenceSource::new(vec![0.2, 0.5, 0.9, 0.1, 0.3]));
		m.normalize_rows();
		for row in 0..3 {
			let sum: f64 = m.row(row).iter().sum();
			assert!((sum - 1.0).abs() < 1e-12);
		}
	}

	#[test]
	fn zero_rows_become_uniform() {
		let mut m = Matrix::zeros(2, 4);
		m.set(1, 2, 3.0);
		m.normalize_rows();
		assert_eq!(m.row(0), &[0.25, 0.25, 0.25, 0.25]);
		assert_eq!(m.row(1), &[0.0, 0.0, 1.0, 0.0]);

		let mut nan = vec![f64::NAN, 1.0];
		normalize(&mut nan);
		assert_eq!(nan, vec![0.5, 0.5]);
	}

	#[test]
	fn ragged_rows_are_rejected() {
		assert!(Matrix::try_from(vec![vec![1.0, 2.0], vec![3.0]]).is_err());
		let m = Matrix::try_from(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
		assert_eq!((m.rows(), m.cols()), (2, 2));
		assert_eq!(m.get(1, 0), 3.0);
		assert_eq!(Vec::<Vec<f64>>::from(m), vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
	}
}
