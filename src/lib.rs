pub mod config;
pub mod data;
pub mod error;
pub mod forecast;
pub mod market;
pub mod monitoring;
pub mod view;

pub use error::{CoreError, StoreError};
