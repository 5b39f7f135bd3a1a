///
/// A dense 2-D buffer of samples with time on axis 0 and channel on axis 1,
/// stored row-major so per-instant scans (one grid row) are contiguous.
///
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self { rows, cols, data: vec![value; rows * cols] }
    }

    ///
    /// Assemble from per-channel columns, each of length `rows`.
    ///
    pub fn from_columns(rows: usize, columns: &[Vec<f64>]) -> Self {
        let cols = columns.len();
        let mut matrix = Self::filled(rows, cols, f64::NAN);

        for (c, column) in columns.iter().enumerate() {
            debug_assert_eq!(column.len(), rows, "channel length must match the grid");
            for (t, &value) in column.iter().enumerate() {
                matrix.data[t * cols + c] = value;
            }
        }

        matrix
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, t: usize, c: usize) -> f64 {
        self.data[t * self.cols + c]
    }

    pub fn row(&self, t: usize) -> &[f64] {
        &self.data[t * self.cols..(t + 1) * self.cols]
    }

    pub fn row_iter(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.cols.max(1))
    }

    pub fn column_iter(&self, c: usize) -> impl Iterator<Item = f64> + '_ {
        (0..self.rows).map(move |t| self.get(t, c))
    }

    pub fn set(&mut self, t: usize, c: usize, value: f64) {
        self.data[t * self.cols + c] = value;
    }
}
