//! Per-channel daily metric records and the derived views the models read.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One day of observed metrics for one marketing channel.
///
/// Wire shape for metric ingestion; count fields default to zero so sparse
/// upstream exports stay accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricPoint {
    pub date: NaiveDate,
    pub channel: String,
    pub spend: f64,
    pub revenue: f64,
    #[serde(default)]
    pub impressions: i64,
    #[serde(default)]
    pub clicks: i64,
    #[serde(default)]
    pub conversions: i64,
    #[serde(default)]
    pub new_customers: i64,
    #[serde(default)]
    pub returning_customers: i64,
}

/// The historical window fetched for one account.
///
/// At most one point per (channel, date); the store enforces this and the
/// models treat the series as immutable input.
#[derive(Debug, Clone)]
pub struct MetricSeries {
    pub account_id: String,
    pub points: Vec<MetricPoint>,
}

impl MetricSeries {
    pub fn new(account_id: impl Into<String>, points: Vec<MetricPoint>) -> Self {
        Self {
            account_id: account_id.into(),
            points,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of unique calendar dates across all channels.
    pub fn distinct_days(&self) -> usize {
        self.points
            .iter()
            .map(|p| p.date)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Sorted unique channel names.
    pub fn channels(&self) -> Vec<String> {
        self.points
            .iter()
            .map(|p| p.channel.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Most recent observed spend per channel, used as the default
    /// future-spend assumption when forecasting.
    pub fn last_spend_by_channel(&self) -> BTreeMap<String, f64> {
        let mut latest: BTreeMap<String, (NaiveDate, f64)> = BTreeMap::new();
        for p in &self.points {
            match latest.get(&p.channel) {
                Some((date, _)) if *date >= p.date => {}
                _ => {
                    latest.insert(p.channel.clone(), (p.date, p.spend));
                }
            }
        }
        latest.into_iter().map(|(c, (_, s))| (c, s)).collect()
    }

    pub fn total_spend_by_channel(&self) -> BTreeMap<String, f64> {
        let mut totals: BTreeMap<String, f64> = BTreeMap::new();
        for p in &self.points {
            *totals.entry(p.channel.clone()).or_insert(0.0) += p.spend;
        }
        totals
    }

    /// Mean daily spend per channel over the window's distinct days.
    ///
    /// This is the operating point the optimizer's saturation curves anchor
    /// to, so it divides by days in the window rather than days the channel
    /// was active.
    pub fn mean_daily_spend_by_channel(&self) -> BTreeMap<String, f64> {
        let days = self.distinct_days();
        if days == 0 {
            return BTreeMap::new();
        }
        self.total_spend_by_channel()
            .into_iter()
            .map(|(c, total)| (c, total / days as f64))
            .collect()
    }

    /// Pivot the flat point list into date-aligned vectors.
    pub fn daily_pivot(&self) -> DailyPivot {
        let dates: Vec<NaiveDate> = self
            .points
            .iter()
            .map(|p| p.date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let date_index: HashMap<NaiveDate, usize> =
            dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        let channels = self.channels();
        let channel_index: HashMap<&str, usize> = channels
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();

        let mut revenue = vec![0.0; dates.len()];
        let mut spend = vec![vec![0.0; dates.len()]; channels.len()];
        for p in &self.points {
            let di = date_index[&p.date];
            let ci = channel_index[p.channel.as_str()];
            revenue[di] += p.revenue;
            spend[ci][di] += p.spend;
        }

        DailyPivot {
            dates,
            date_index,
            channels,
            revenue,
            spend,
        }
    }
}

/// Date-aligned view of a [`MetricSeries`].
///
/// `revenue[i]` is total revenue across channels on `dates[i]`;
/// `spend[c][i]` is channel `channels[c]`'s spend on `dates[i]`.
/// Dates absent from the underlying series contribute zero.
#[derive(Debug, Clone)]
pub struct DailyPivot {
    pub dates: Vec<NaiveDate>,
    date_index: HashMap<NaiveDate, usize>,
    pub channels: Vec<String>,
    pub revenue: Vec<f64>,
    pub spend: Vec<Vec<f64>>,
}

impl DailyPivot {
    pub fn n_days(&self) -> usize {
        self.dates.len()
    }

    /// Spend for channel index `channel` on an arbitrary calendar date.
    ///
    /// Dates outside the observed axis (including lag lookups before the
    /// series start) return 0.0.
    pub fn spend_on(&self, channel: usize, date: NaiveDate) -> f64 {
        match self.date_index.get(&date) {
            Some(&i) => self.spend[channel][i],
            None => 0.0,
        }
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }
}

/// Mean of a sample, `None` when empty.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation, `None` when empty.
pub fn stddev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}
