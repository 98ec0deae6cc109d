//! Integration tests: the scanner end to end, without touching the real
//! marketplaces.

mod http_adapters;
mod mock_marketplace;
mod scan_cycle;
