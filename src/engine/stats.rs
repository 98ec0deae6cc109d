//! Counters kept across scan cycles.

use chrono::NaiveDate;
use std::time::Duration;

/// Items found on the current local calendar day.
///
/// The count resets lazily: whoever reads or adds on a new date sees it
/// start from zero.
#[derive(Debug, Clone)]
pub struct DailyCounter {
    date: NaiveDate,
    count: u64,
}

impl DailyCounter {
    pub fn new(today: NaiveDate) -> Self {
        Self { date: today, count: 0 }
    }

    fn roll(&mut self, today: NaiveDate) {
        if self.date != today {
            self.date = today;
            self.count = 0;
        }
    }

    pub fn add(&mut self, n: u64, today: NaiveDate) {
        self.roll(today);
        self.count += n;
    }

    pub fn get(&mut self, today: NaiveDate) -> u64 {
        self.roll(today);
        self.count
    }
}

/// What one cycle did, for the completion log line.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleSummary {
    pub agents_scanned: usize,
    pub listings_fetched: usize,
    pub new_items: u64,
    pub deals: u64,
    pub elapsed: Duration,
}
