//! Accounting records produced for the external statistics sink.
//!
//! The core produces [`Coze`] totals and preserves the sequence numbers
//! that let the reporting pipeline derive [`Gap`] records; it never
//! consumes either.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Running totals for one scan or merge pass.
///
/// Counters only ever increase; two values combine with [`Coze::update`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coze {
    /// Stream id the totals belong to, zero when aggregated.
    pub id: u32,
    /// Total frame bytes seen.
    #[serde(rename = "bytes")]
    pub size: u64,
    /// Frames accepted.
    pub count: u64,
    /// Sequence numbers known missing.
    pub missing: u64,
    /// Frames rejected with an error.
    pub error: u64,
    /// First sequence number observed.
    pub first: u32,
    /// Last sequence number observed.
    pub last: u32,
    /// Timestamp of the earliest frame observed.
    #[serde(rename = "dtstart")]
    pub starts: Option<DateTime<Utc>>,
    /// Timestamp of the latest frame observed.
    #[serde(rename = "dtend")]
    pub ends: Option<DateTime<Utc>>,
}

impl Coze {
    /// Records one accepted frame.
    pub fn observe(&mut self, bytes: u64, sequence: u32, when: DateTime<Utc>) {
        if self.count == 0 {
            self.first = sequence;
        }
        self.last = sequence;
        self.count += 1;
        self.size += bytes;
        self.starts = Some(self.starts.map_or(when, |s| s.min(when)));
        self.ends = Some(self.ends.map_or(when, |e| e.max(when)));
    }

    /// Combines another record into this one.
    ///
    /// Counters add field-wise; the time window widens, carrying the
    /// sequence endpoint that travels with each bound.
    pub fn update(&mut self, other: &Coze) {
        self.size += other.size;
        self.count += other.count;
        self.error += other.error;
        self.missing += other.missing;
        if let Some(starts) = other.starts {
            if self.starts.map_or(true, |s| starts < s) {
                self.starts = Some(starts);
                self.first = other.first;
            }
        }
        if let Some(ends) = other.ends {
            if self.ends.map_or(true, |e| ends > e) {
                self.ends = Some(ends);
                self.last = other.last;
            }
        }
    }
}

/// A detected break in a per-id sequence-number series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    /// Stream id the gap belongs to.
    pub id: u32,
    /// Timestamp of the last packet before the gap.
    #[serde(rename = "dtstart")]
    pub starts: DateTime<Utc>,
    /// Timestamp of the first packet after the gap.
    #[serde(rename = "dtend")]
    pub ends: DateTime<Utc>,
    /// Last sequence number seen before the gap.
    pub last: u32,
    /// First sequence number seen after the gap.
    pub first: u32,
}

impl Gap {
    /// Count of sequence numbers strictly between the two bounding
    /// packets. Order-independent; adjacent or equal numbers yield 0.
    pub fn missing(&self) -> u32 {
        self.first.abs_diff(self.last).saturating_sub(1)
    }

    /// Wall-clock span of the gap.
    pub fn duration(&self) -> chrono::Duration {
        self.ends - self.starts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_gap_missing_is_order_independent() {
        let mut gap = Gap {
            id: 42,
            starts: at(0),
            ends: at(60),
            last: 10,
            first: 15,
        };
        assert_eq!(gap.missing(), 4);
        gap.last = 15;
        gap.first = 10;
        assert_eq!(gap.missing(), 4);
    }

    #[test]
    fn test_gap_missing_saturates() {
        let gap = Gap {
            id: 1,
            starts: at(0),
            ends: at(1),
            last: 7,
            first: 7,
        };
        assert_eq!(gap.missing(), 0);
    }

    #[test]
    fn test_coze_observe_tracks_window() {
        let mut coze = Coze::default();
        coze.observe(10, 5, at(100));
        coze.observe(20, 6, at(50));
        assert_eq!(coze.count, 2);
        assert_eq!(coze.size, 30);
        assert_eq!(coze.first, 5);
        assert_eq!(coze.last, 6);
        assert_eq!(coze.starts, Some(at(50)));
        assert_eq!(coze.ends, Some(at(100)));
    }

    #[test]
    fn test_coze_update_widens_window() {
        let mut a = Coze::default();
        a.observe(10, 3, at(100));
        let mut b = Coze::default();
        b.observe(5, 1, at(10));
        b.observe(5, 9, at(500));
        b.error = 2;

        a.update(&b);
        assert_eq!(a.count, 3);
        assert_eq!(a.size, 20);
        assert_eq!(a.error, 2);
        assert_eq!(a.first, 1);
        assert_eq!(a.last, 9);
        assert_eq!(a.starts, Some(at(10)));
        assert_eq!(a.ends, Some(at(500)));
    }

    #[test]
    fn test_coze_serializes_wire_field_names() {
        let mut coze = Coze::default();
        coze.observe(128, 1, at(0));
        let json = serde_json::to_value(coze).unwrap();
        assert_eq!(json["bytes"], 128);
        assert_eq!(json["count"], 1);
        assert!(json.get("dtstart").is_some());
    }
}
