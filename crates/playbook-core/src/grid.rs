use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::metrics::Counters;
use crate::types::{Channel, Segment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    pub segment: Segment,
    pub channel: Channel,
}

impl CellKey {
    pub fn new(segment: Segment, channel: Channel) -> Self {
        Self { segment, channel }
    }

    /// Every segment×channel key in row-major order.
    pub fn all() -> Vec<CellKey> {
        Segment::all()
            .iter()
            .flat_map(|s| Channel::all().iter().map(move |c| CellKey::new(*s, *c)))
            .collect()
    }
}

/// Segment×channel counter grid. Always holds every key.
#[derive(Debug, Clone, PartialEq)]
pub struct CellGrid {
    cells: BTreeMap<CellKey, Counters>,
}

impl Default for CellGrid {
    fn default() -> Self {
        Self {
            cells: CellKey::all()
                .into_iter()
                .map(|k| (k, Counters::default()))
                .collect(),
        }
    }
}

impl CellGrid {
    pub fn get(&self, key: CellKey) -> Counters {
        self.cells.get(&key).copied().unwrap_or_default()
    }

    pub fn set(&mut self, key: CellKey, counters: Counters) {
        self.cells.insert(key, counters);
    }

    pub fn add_scaled(&mut self, key: CellKey, counters: &Counters, factor: f64) {
        self.cells
            .entry(key)
            .or_default()
            .add_scaled(counters, factor);
    }

    pub fn iter(&self) -> impl Iterator<Item = (CellKey, &Counters)> {
        self.cells.iter().map(|(k, c)| (*k, c))
    }

    pub fn total(&self) -> Counters {
        let mut total = Counters::default();
        for c in self.cells.values() {
            total.add(c);
        }
        total
    }

    pub fn segment_total(&self, segment: Segment) -> Counters {
        let mut total = Counters::default();
        for (_, c) in self.iter().filter(|(k, _)| k.segment == segment) {
            total.add(c);
        }
        total
    }

    pub fn channel_total(&self, channel: Channel) -> Counters {
        let mut total = Counters::default();
        for (_, c) in self.iter().filter(|(k, _)| k.channel == channel) {
            total.add(c);
        }
        total
    }

    pub fn is_empty(&self) -> bool {
        self.cells.values().all(Counters::is_empty)
    }
}
