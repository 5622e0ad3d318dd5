//! Recent shot history.

use std::collections::VecDeque;

/// Shots kept when no capacity is given.
pub const DEFAULT_CAPACITY: usize = 100;

/// One scored shot, after calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShotRecord {
    /// Shot number, counting from 1 since power-up.
    pub shot: u32,
    pub x: f64,
    pub y: f64,
}

/// Bounded ring of recent shots. The oldest record is evicted first.
///
/// Clearing empties the ring but never rewinds the shot counter, so shot
/// numbers stay unique for the life of the target.
#[derive(Debug, Clone)]
pub struct ShotHistory {
    records: VecDeque<ShotRecord>,
    capacity: usize,
    next_shot: u32,
}

impl ShotHistory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            next_shot: 1,
        }
    }

    /// Append a shot, numbering it.
    pub fn push(&mut self, x: f64, y: f64) -> ShotRecord {
        let record = ShotRecord {
            shot: self.next_shot,
            x,
            y,
        };
        self.next_shot = self.next_shot.wrapping_add(1);
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
        record
    }

    /// Take the next shot number without recording a position (misses).
    pub fn skip(&mut self) -> u32 {
        let shot = self.next_shot;
        self.next_shot = self.next_shot.wrapping_add(1);
        shot
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &ShotRecord> {
        self.records.iter()
    }

    pub fn last(&self) -> Option<&ShotRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number the next shot will get.
    pub fn next_shot(&self) -> u32 {
        self.next_shot
    }
}

impl Default for ShotHistory {
    fn default() -> Self {
        Self::new()
    }
}
