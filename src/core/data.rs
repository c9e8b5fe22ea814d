//! Series stores backing the two dashboard views.
//!
//! Both stores keep a label column plus one f64 column per tracked metric,
//! all parallel and always the same length:
//! - [`MetricSeries`]: the short real-time window, trimmed from the front to
//!   a capacity derived from the current window/interval settings.
//! - [`TrendSeries`]: the long-horizon aggregate series, append-only for the
//!   session lifetime unless an explicit cap is set.

use tracing::trace;

/// One decoded sample: a time-of-day label plus one value per metric column.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    pub label: String,
    pub values: Vec<f64>,
}

/// A named metric column of a series store.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricColumn {
    pub name: &'static str,
    pub values: Vec<f64>,
}

/// Fixed set of parallel columns trimmed to a rolling window.
///
/// Invariant: the label column and every metric column have identical length
/// at all times, and the length never exceeds the capacity passed to the most
/// recent [`push`](Self::push).
pub struct MetricSeries {
    labels: Vec<String>,
    columns: Vec<MetricColumn>,
}

impl MetricSeries {
    pub fn new(metrics: &[&'static str]) -> Self {
        Self {
            labels: Vec::new(),
            columns: metrics
                .iter()
                .map(|&name| MetricColumn {
                    name,
                    values: Vec::new(),
                })
                .collect(),
        }
    }

    /// Append one point, then evict from the front until `len <= capacity`.
    ///
    /// Normally evicts at most one entry, but capacity is recomputed by the
    /// caller on every insert and can shrink mid-session, so any number of
    /// entries may go in one call. Point values are matched to columns by
    /// position; missing values are stored as `0.0`.
    pub fn push(&mut self, point: &SeriesPoint, capacity: usize) {
        self.labels.push(point.label.clone());
        for (idx, col) in self.columns.iter_mut().enumerate() {
            col.values.push(point.values.get(idx).copied().unwrap_or(0.0));
        }

        let capacity = capacity.max(1);
        if self.labels.len() > capacity {
            let excess = self.labels.len() - capacity;
            self.labels.drain(..excess);
            for col in &mut self.columns {
                col.values.drain(..excess);
            }
            trace!(excess, capacity, "series window trimmed");
        }
    }

    /// Current projection for rendering. Read-only.
    pub fn snapshot(&self) -> (&[String], &[MetricColumn]) {
        (&self.labels, &self.columns)
    }

    /// Clear all columns. Used on session boundaries, not on reconfigure.
    pub fn reset(&mut self) {
        self.labels.clear();
        for col in &mut self.columns {
            col.values.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Long-horizon aggregate series.
///
/// `cap: None` preserves every point pushed during the session; `cap: Some(n)`
/// trims from the front like the rolling window once `n` is exceeded.
pub struct TrendSeries {
    series: MetricSeries,
    cap: Option<usize>,
}

impl TrendSeries {
    pub fn new(metrics: &[&'static str], cap: Option<usize>) -> Self {
        Self {
            series: MetricSeries::new(metrics),
            cap,
        }
    }

    pub fn push(&mut self, point: &SeriesPoint) {
        self.series.push(point, self.cap.unwrap_or(usize::MAX));
    }

    /// Apply an ordered batch, e.g. a historical backfill.
    pub fn extend<'a>(&mut self, points: impl IntoIterator<Item = &'a SeriesPoint>) {
        for point in points {
            self.push(point);
        }
    }

    pub fn snapshot(&self) -> (&[String], &[MetricColumn]) {
        self.series.snapshot()
    }

    pub fn reset(&mut self) {
        self.series.reset();
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}
