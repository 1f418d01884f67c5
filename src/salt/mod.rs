pub mod client;
pub mod error;
pub mod types;

pub use client::{SaltApi, SaltClient};
pub use error::SaltError;
pub use types::{EAuth, StateJob};
