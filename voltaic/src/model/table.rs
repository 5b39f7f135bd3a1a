use crate::model::Timestamp;

///
/// A set of named numeric series sharing a single time vector.
///
/// This is the in-memory shape every CSV member parses into: one row per retained
/// CSV row, one column per retained header. Missing or unparseable cells hold NaN.
///
/// Invariant: after `finish` (and after any `append`) the time vector is strictly
/// increasing - rows are stable-sorted by time and duplicate timestamps keep the
/// first occurrence.
///
#[derive(Clone, Debug, Default)]
pub struct ColumnTable {
    times: Vec<Timestamp>,
    columns: Vec<(String, Vec<f64>)>,
    dropped_rows: usize, // Rows whose time failed to parse.
}

impl ColumnTable {
    pub fn new<S: Into<String>>(column_names: Vec<S>) -> Self {
        Self {
            times: Vec::new(),
            columns: column_names.into_iter().map(|name| (name.into(), Vec::new())).collect(),
            dropped_rows: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[Timestamp] {
        &self.times
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.columns.iter().map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, values)| values.as_slice())
    }

    pub fn dropped_rows(&self) -> usize {
        self.dropped_rows
    }

    pub fn count_dropped_row(&mut self) {
        self.dropped_rows += 1;
    }

    ///
    /// The inclusive time span of the table, None when no rows were retained.
    ///
    pub fn time_bounds(&self) -> Option<(Timestamp, Timestamp)> {
        match (self.times.first(), self.times.last()) {
            (Some(&first), Some(&last)) => Some((first, last)),
            _ => None,
        }
    }

    ///
    /// Append one row. Values must be in column registration order; short rows are
    /// padded with NaN so every column keeps the shared length.
    ///
    pub fn push_row(&mut self, time: Timestamp, values: &[f64]) {
        self.times.push(time);
        for (idx, (_, column)) in self.columns.iter_mut().enumerate() {
            column.push(values.get(idx).copied().unwrap_or(f64::NAN));
        }
    }

    ///
    /// Restore the Series invariant: stable-sort rows by time, then drop rows whose
    /// timestamp duplicates the previous kept row (keep-first).
    ///
    pub fn finish(&mut self) {
        if self.times.windows(2).all(|pair| pair[0] < pair[1]) {
            return
        }

        let mut order: Vec<usize> = (0..self.times.len()).collect();
        order.sort_by_key(|&row| self.times[row]);

        let mut kept = Vec::with_capacity(order.len());
        let mut last: Option<Timestamp> = None;
        for row in order {
            if last != Some(self.times[row]) {
                last = Some(self.times[row]);
                kept.push(row);
            }
        }

        let times: Vec<Timestamp> = kept.iter().map(|&row| self.times[row]).collect();
        self.times = times;

        for (_, column) in self.columns.iter_mut() {
            let reordered: Vec<f64> = kept.iter().map(|&row| column[row]).collect();
            *column = reordered;
        }
    }

    ///
    /// Row-concatenate another table into this one - used when a later archive in the
    /// same job carries more rows for a slot already populated. The column set becomes
    /// the union (rows missing a column hold NaN) and the Series invariant is restored.
    ///
    pub fn append(&mut self, other: ColumnTable) {
        let existing_rows = self.times.len();
        self.times.extend(other.times.iter());
        self.dropped_rows += other.dropped_rows;

        for (name, values) in other.columns {
            match self.columns.iter_mut().find(|(candidate, _)| *candidate == name) {
                Some((_, column)) => column.extend(values),
                None => {
                    let mut column = vec![f64::NAN; existing_rows];
                    column.extend(values);
                    self.columns.push((name, column));
                },
            }
        }

        // Columns absent from the appended table need padding to the shared length.
        let total_rows = self.times.len();
        for (_, column) in self.columns.iter_mut() {
            column.resize(total_rows, f64::NAN);
        }

        self.finish();
    }
}
