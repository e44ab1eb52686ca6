//! Types shared across the Xero client workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
