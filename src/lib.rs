//! Tender Watch Library
//!
//! Fetches tender listings, keeps the ones matching configured keywords,
//! drops anything already reported and sends the rest in one notification.

pub mod config;
pub mod error;
pub mod filter;
pub mod keywords;
pub mod normalize;
pub mod notify;
pub mod pipeline;
pub mod scrapers;
pub mod storage;
pub mod types;

pub use types::*;
