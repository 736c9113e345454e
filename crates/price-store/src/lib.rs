//! Durable watch-list, price history and config key/value store (SQLite).

mod store;

pub use store::PriceStore;
