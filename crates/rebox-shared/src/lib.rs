//! # rebox-shared
//!
//! Types shared by every ReBox crate: item categories, the unordered user
//! pair, backend selection, the id generator, input validation and password
//! hashing.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod id;
pub mod types;
pub mod validation;

pub use error::ValidationError;
pub use id::generate_id;
pub use types::{Backend, ItemCategory, UserPair};
