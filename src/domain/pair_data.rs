//! Traded/reference bar alignment and the combined indicator view.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};

use crate::domain::bar::{validate_bars, Bar};
use crate::domain::error::PairtraderError;
use crate::domain::indicator_helpers::{
    compute_indicator_set, IndicatorParams, IndicatorSet, IndicatorSnapshot,
};

#[derive(Debug, Clone)]
pub struct InstrumentData {
    pub instrument: String,
    pub bars: Vec<Bar>,
    pub timestamp_index: HashMap<DateTime<Utc>, usize>,
}

impl InstrumentData {
    pub fn new(instrument: String, bars: Vec<Bar>) -> Self {
        let timestamp_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.timestamp, i))
            .collect();
        Self {
            instrument,
            bars,
            timestamp_index,
        }
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn get_bar(&self, timestamp: DateTime<Utc>) -> Option<&Bar> {
        self.timestamp_index
            .get(&timestamp)
            .map(|&i| &self.bars[i])
    }
}

/// Timestamps present in both instruments, ascending.
pub fn build_common_timeline(traded: &InstrumentData, reference: &InstrumentData) -> Vec<DateTime<Utc>> {
    let traded_ts: BTreeSet<DateTime<Utc>> = traded.timestamp_index.keys().copied().collect();
    let reference_ts: BTreeSet<DateTime<Utc>> =
        reference.timestamp_index.keys().copied().collect();
    traded_ts.intersection(&reference_ts).copied().collect()
}

/// Inner-join two validated bar sequences on timestamp.
pub fn align_bars(
    traded: &[Bar],
    reference: &[Bar],
) -> Result<(Vec<Bar>, Vec<Bar>), PairtraderError> {
    let traded_name = traded.first().map(|b| b.instrument.as_str()).unwrap_or("traded");
    let reference_name = reference
        .first()
        .map(|b| b.instrument.as_str())
        .unwrap_or("reference");
    validate_bars(traded_name, traded)?;
    validate_bars(reference_name, reference)?;

    let traded = InstrumentData::new(traded_name.to_string(), traded.to_vec());
    let reference = InstrumentData::new(reference_name.to_string(), reference.to_vec());

    let mut aligned_traded = Vec::new();
    let mut aligned_reference = Vec::new();
    for ts in build_common_timeline(&traded, &reference) {
        if let (Some(t), Some(r)) = (traded.get_bar(ts), reference.get_bar(ts)) {
            aligned_traded.push(t.clone());
            aligned_reference.push(r.clone());
        }
    }
    Ok((aligned_traded, aligned_reference))
}

/// Both instruments' indicators over a shared timeline.
#[derive(Debug, Clone)]
pub struct PairData {
    pub traded: IndicatorSet,
    pub reference: IndicatorSet,
}

impl PairData {
    pub fn build(
        traded: &[Bar],
        reference: &[Bar],
        params: &IndicatorParams,
    ) -> Result<Self, PairtraderError> {
        let (traded, reference) = align_bars(traded, reference)?;
        Ok(Self {
            traded: compute_indicator_set(&traded, params),
            reference: compute_indicator_set(&reference, params),
        })
    }

    pub fn len(&self) -> usize {
        self.traded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traded.is_empty()
    }

    pub fn bar(&self, index: usize) -> Option<&Bar> {
        self.traded.bars.get(index)
    }

    pub fn snapshots(&self, index: usize) -> Option<(IndicatorSnapshot, IndicatorSnapshot)> {
        Some((self.traded.snapshot(index)?, self.reference.snapshot(index)?))
    }
}
