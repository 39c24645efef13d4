//! HTTP support for partner client implementations

pub mod token_cache;

pub use token_cache::{AccessToken, TokenCache, TokenSource};
