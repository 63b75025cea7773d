//! Dense row-major matrices

/// Dense row-major matrix of `f64` values.
///
/// Both the cached artifact (the decoder matrix) and the numeric inputs to a
/// solver use this representation. The raw little-endian byte view from
/// [`Matrix::to_le_bytes`] is what gets hashed and what lands in blob files,
/// so it is part of the on-disk contract.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Create a matrix filled with zeros
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Matrix {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Create a matrix from row-major data
    ///
    /// # Arguments
    /// * `rows` - Number of rows
    /// * `cols` - Number of columns
    /// * `data` - Row-major values; length must equal `rows * cols`
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "matrix data length must match its shape"
        );
        Matrix { rows, cols, data }
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Shape as `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the matrix holds no values
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Value at `(row, col)`; panics when out of bounds
    pub fn get(&self, row: usize, col: usize) -> f64 {
        assert!(row < self.rows && col < self.cols, "index out of bounds");
        self.data[row * self.cols + col]
    }

    /// Set the value at `(row, col)`; panics when out of bounds
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        assert!(row < self.rows && col < self.cols, "index out of bounds");
        self.data[row * self.cols + col] = value;
    }

    /// Row-major view of the values
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Raw little-endian bytes of the values, row-major
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() * 8);
        for value in &self.data {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }
}
