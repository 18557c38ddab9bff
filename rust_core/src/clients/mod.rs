pub mod dexscreener;
pub mod http;
pub mod jupiter;
pub mod token_source;

// Re-export commonly used types
pub use dexscreener::DexScreenerClient;
pub use http::{FetchError, RetryPolicy, RetryingHttpClient};
pub use jupiter::JupiterClient;
pub use token_source::TokenSource;
