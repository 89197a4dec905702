//! # rebox-store
//!
//! Persistence for the ReBox client behind one async [`Store`] contract.
//!
//! Two backends implement it: [`LocalStore`], a JSON document of named
//! collections kept in memory and optionally mirrored to a file, and
//! [`Database`], a SQLite database that also pushes every insert through a
//! [`RealtimeHub`]. Records describe their own collection and column layout
//! through the [`Record`] trait, so services stay generic over the backend.

pub mod database;
pub mod local;
pub mod migrations;
pub mod models;
pub mod query;
pub mod realtime;
pub mod record;
pub mod store;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use local::LocalStore;
pub use models::*;
pub use query::{Condition, Filter, Patch};
pub use realtime::{RealtimeHub, RowInsert};
pub use record::{Field, FieldKind, Record};
pub use store::{MutualLikes, Store};
