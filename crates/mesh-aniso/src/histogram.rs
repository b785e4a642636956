//! Fixed-bin histogram used for edge-length and shape-quality summaries.

/// Histogram with `B` bins separated by `B + 1` sorted boundaries.
///
/// Values below the lowest boundary or above the highest one are counted
/// separately and never hit a bin, but they still contribute to the running
/// min/max/mean.
#[derive(Debug, Clone, Default)]
pub struct Histogram {
    bounds: Vec<f64>,
    hits: Vec<u32>,
    larger: u32,
    smaller: u32,
    min: f64,
    max: f64,
    sum: f64,
    count: u32,
}

impl Histogram {
    /// Empty histogram with no bins and no hits.
    pub fn new() -> Self {
        Histogram {
            bounds: Vec::new(),
            hits: Vec::new(),
            larger: 0,
            smaller: 0,
            min: f64::MAX,
            max: -f64::MAX,
            sum: 0.0,
            count: 0,
        }
    }

    /// Histogram with the given bin boundaries (sorted internally).
    /// Needs at least two boundaries to have a bin.
    pub fn with_bounds(mut bounds: Vec<f64>) -> Self {
        bounds.sort_by(f64::total_cmp);
        let bins = bounds.len().saturating_sub(1);
        Histogram {
            hits: vec![0; bins],
            bounds,
            ..Histogram::new()
        }
    }

    /// Histogram with `n` equal bins spanning the range of `values`, with the
    /// values processed in.
    pub fn spanning(n: usize, values: &[f64]) -> Self {
        let mut lo = f64::MAX;
        let mut hi = -f64::MAX;
        for &v in values {
            lo = lo.min(v);
            hi = hi.max(v);
        }
        if values.is_empty() || n == 0 || !(hi > lo) {
            let mut h = Histogram::new();
            h.process_all(values);
            return h;
        }
        let step = (hi - lo) / n as f64;
        let bounds = (0..=n).map(|i| lo + step * i as f64).collect();
        let mut h = Histogram::with_bounds(bounds);
        h.process_all(values);
        h
    }

    /// Number of bins.
    pub fn bins(&self) -> usize {
        self.hits.len()
    }

    /// Bin boundaries, ascending (`bins() + 1` values).
    pub fn bin_boundaries(&self) -> &[f64] {
        &self.bounds
    }

    /// Hits in bin `i`.
    pub fn hits(&self, i: usize) -> u32 {
        self.hits[i]
    }

    /// Hits in all bins.
    pub fn all_hits(&self) -> &[u32] {
        &self.hits
    }

    /// Total number of processed values, out-of-range ones included.
    pub fn total_hits(&self) -> u32 {
        self.count
    }

    /// Hits above the highest boundary.
    pub fn larger(&self) -> u32 {
        self.larger
    }

    /// Hits below the lowest boundary.
    pub fn smaller(&self) -> u32 {
        self.smaller
    }

    /// Smallest processed value, `None` before any hit.
    pub fn min_value(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    /// Largest processed value, `None` before any hit.
    pub fn max_value(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    /// Mean of all processed values, `None` before any hit.
    pub fn mean_value(&self) -> Option<f64> {
        (self.count > 0).then_some(self.sum / self.count as f64)
    }

    /// Resets all hits, keeping the bin boundaries.
    pub fn clear_hits(&mut self) {
        self.hits.iter_mut().for_each(|h| *h = 0);
        self.larger = 0;
        self.smaller = 0;
        self.min = f64::MAX;
        self.max = -f64::MAX;
        self.sum = 0.0;
        self.count = 0;
    }

    /// Processes one value.
    pub fn process(&mut self, val: f64) {
        self.min = self.min.min(val);
        self.max = self.max.max(val);
        self.sum += val;
        self.count += 1;
        if self.bounds.is_empty() {
            return;
        }
        if val < self.bounds[0] {
            self.smaller += 1;
        } else if val > *self.bounds.last().unwrap() {
            self.larger += 1;
        } else {
            // partition_point gives the first boundary above val.
            let i = self.bounds.partition_point(|&b| b <= val);
            let bin = i.saturating_sub(1).min(self.hits.len() - 1);
            self.hits[bin] += 1;
        }
    }

    /// Processes a batch of values.
    pub fn process_all(&mut self, vals: &[f64]) {
        for &v in vals {
            self.process(v);
        }
    }
}

impl std::fmt::Display for Histogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Total number of bins     : {:12}", self.bins())?;
        writeln!(f, "Total number of counts   : {:12}", self.total_hits())?;
        writeln!(f, "Number of larger values  : {:12}", self.larger())?;
        writeln!(f, "Number of smaller values : {:12}", self.smaller())?;
        if let (Some(max), Some(mean), Some(min)) =
            (self.max_value(), self.mean_value(), self.min_value())
        {
            writeln!(f, "V max                    : {:E}", max)?;
            writeln!(f, "V mean                   : {:E}", mean)?;
            writeln!(f, "V min                    : {:E}", min)?;
        }
        writeln!(f)?;
        writeln!(f, "Bin number       -- Bin boundaries --          Hits")?;
        for i in (0..self.bins()).rev() {
            writeln!(
                f,
                "{:5} {:15.2} {:15.2} {:13}",
                i,
                self.bounds[i],
                self.bounds[i + 1],
                self.hits[i]
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_histogram() {
        let h = Histogram::new();
        assert_eq!(h.bins(), 0);
        assert_eq!(h.total_hits(), 0);
        assert_eq!(h.min_value(), None);
        assert_eq!(h.mean_value(), None);
    }

    #[test]
    fn test_binning_and_overflow() {
        let mut h = Histogram::with_bounds(vec![0.0, 1.0, 2.0]);
        h.process_all(&[-0.5, 0.5, 1.5, 1.0, 2.5]);
        assert_eq!(h.bins(), 2);
        assert_eq!(h.smaller(), 1);
        assert_eq!(h.larger(), 1);
        assert_eq!(h.hits(0), 1);
        assert_eq!(h.hits(1), 2, "a value on an inner boundary goes up");
        assert_eq!(h.total_hits(), 5);
        assert_eq!(h.min_value(), Some(-0.5));
        assert_eq!(h.max_value(), Some(2.5));
    }

    #[test]
    fn test_upper_boundary_hits_last_bin() {
        let mut h = Histogram::with_bounds(vec![0.0, 1.0, 2.0]);
        h.process(2.0);
        assert_eq!(h.hits(1), 1);
        assert_eq!(h.larger(), 0);
    }

    #[test]
    fn test_unsorted_bounds_are_sorted() {
        let h = Histogram::with_bounds(vec![2.0, 0.0, 1.0]);
        assert_eq!(h.bin_boundaries(), &[0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_clear_hits_keeps_bounds() {
        let mut h = Histogram::with_bounds(vec![0.0, 1.0]);
        h.process(0.5);
        h.clear_hits();
        assert_eq!(h.total_hits(), 0);
        assert_eq!(h.bins(), 1);
    }

    #[test]
    fn test_spanning() {
        let h = Histogram::spanning(4, &[0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(h.bins(), 4);
        assert_eq!(h.total_hits(), 5);
        assert_eq!(h.smaller() + h.larger(), 0);
        assert_eq!(h.mean_value(), Some(2.0));
    }
}
