//! Core engine: the scan, dedup, enrich and publish loop.

pub mod clock;
pub mod enricher;
pub mod favorites;
pub mod recent;
pub mod scanner;
pub mod scheduler;
pub mod stats;
