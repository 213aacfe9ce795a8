pub mod client;
pub mod error;
pub mod normalize;
pub mod pagination;
pub mod retry;
pub mod token;

pub use client::{ClientConfig, MarketplaceClient, Method, SupplyStats};
pub use error::MarketplaceError;
pub use normalize::{normalize_entry, normalize_page};
pub use pagination::{PageStats, ScanOptions, Termination};
pub use retry::{Backoff, RetryPolicy};
pub use token::Credentials;
