//! Contracts shared by file-backed stores.

mod error;
mod mapping;

pub use error::StoreError;
pub use mapping::{Mapping, Object};
