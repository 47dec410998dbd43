//! Client-side history aggregation, used wherever the backend cannot aggregate

use crate::models::{Granularity, HistoryBuckets, Metric, TelemetrySnapshot};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Anything that can be bucketed by time and averaged per metric
pub trait Sample {
    fn timestamp(&self) -> DateTime<Utc>;
    fn metric(&self, metric: Metric) -> f64;
}

impl Sample for TelemetrySnapshot {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn metric(&self, metric: Metric) -> f64 {
        self.metric_value(metric)
    }
}

/// Indices kept when reducing `len` ordered points to at most `max_points`.
///
/// Points are taken at a fixed stride of `ceil(len / max_points)` from the
/// start, then only the most recent `max_points` of those are kept.
pub fn sample_indices(len: usize, max_points: usize) -> Vec<usize> {
    if max_points == 0 {
        return Vec::new();
    }
    if len <= max_points {
        return (0..len).collect();
    }

    let stride = len.div_ceil(max_points);
    let strided: Vec<usize> = (0..len).step_by(stride).collect();
    let skip = strided.len().saturating_sub(max_points);
    strided.into_iter().skip(skip).collect()
}

/// Fixed-stride downsampling of an ordered series
pub fn downsample<T: Clone>(items: &[T], max_points: usize) -> Vec<T> {
    sample_indices(items.len(), max_points)
        .into_iter()
        .map(|i| items[i].clone())
        .collect()
}

/// Downsample labels and every series with the same index selection
pub fn downsample_buckets(buckets: &HistoryBuckets, max_points: usize) -> HistoryBuckets {
    let indices = sample_indices(buckets.len(), max_points);
    let pick = |values: &[f64]| -> Vec<f64> {
        indices
            .iter()
            .map(|i| values.get(*i).copied().unwrap_or(0.0))
            .collect()
    };

    HistoryBuckets {
        granularity: buckets.granularity,
        labels: indices.iter().map(|i| buckets.labels[*i].clone()).collect(),
        metric_series: buckets
            .metric_series
            .iter()
            .map(|(metric, values)| (*metric, pick(values)))
            .collect(),
    }
}

/// Group samples by period, average each metric per period, then downsample
pub fn aggregate_samples<S: Sample>(
    samples: &[S],
    granularity: Granularity,
    metrics: &[Metric],
    max_points: usize,
) -> HistoryBuckets {
    let mut groups: BTreeMap<String, Vec<&S>> = BTreeMap::new();
    for sample in samples {
        groups
            .entry(granularity.bucket_key(sample.timestamp()))
            .or_default()
            .push(sample);
    }

    let grouped: Vec<(String, Vec<&S>)> = groups.into_iter().collect();
    let selected = sample_indices(grouped.len(), max_points);

    let mut buckets = HistoryBuckets::empty(granularity);
    for metric in metrics {
        buckets.metric_series.insert(*metric, Vec::with_capacity(selected.len()));
    }

    for index in selected {
        let (label, members) = &grouped[index];
        buckets.labels.push(label.clone());

        for metric in metrics {
            let sum: f64 = members.iter().map(|s| s.metric(*metric)).sum();
            let mean = sum / members.len() as f64;
            if let Some(series) = buckets.metric_series.get_mut(metric) {
                series.push(mean);
            }
        }
    }

    buckets
}
