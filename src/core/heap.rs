use std::cmp::Ordering;

use keyed_priority_queue::KeyedPriorityQueue;

use super::state::{PrioKey, UnitId};

// Inverted for the max-heap: lowest linked priority on top, idle units above
// all linked ones, lower id first among idle units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitRank {
    pub linked: Option<PrioKey>,
    pub unit: UnitId,
}

impl Ord for UnitRank {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.linked, &other.linked) {
            (None, None) => other.unit.cmp(&self.unit),
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(b).then_with(|| other.unit.cmp(&self.unit)),
        }
    }
}

impl PartialOrd for UnitRank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
pub struct UnitHeap {
    units: KeyedPriorityQueue<UnitId, UnitRank>,
}

impl UnitHeap {
    pub fn new() -> Self {
        Self {
            units: KeyedPriorityQueue::new(),
        }
    }

    pub fn update(&mut self, unit: UnitId, linked: Option<PrioKey>) {
        self.units.remove(&unit);
        self.units.push(unit, UnitRank { linked, unit });
    }

    pub fn remove(&mut self, unit: UnitId) -> bool {
        self.units.remove(&unit).is_some()
    }

    pub fn lowest(&self) -> Option<UnitId> {
        self.units.peek().map(|(unit, _)| *unit)
    }

    pub fn contains(&self, unit: UnitId) -> bool {
        self.units.get_priority(&unit).is_some()
    }

    pub fn rank(&self, unit: UnitId) -> Option<UnitRank> {
        self.units.get_priority(&unit).copied()
    }

    pub fn ranks(&self) -> impl Iterator<Item = UnitRank> + '_ {
        self.units.iter().map(|(_, rank)| *rank)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn clear(&mut self) {
        self.units = KeyedPriorityQueue::new();
    }
}

impl Default for UnitHeap {
    fn default() -> Self {
        Self::new()
    }
}
