//! Domain services. Each one is generic over the [`Store`] backend and
//! shares the same `Arc<S>`.

pub mod auth;
pub mod items;
pub mod matches;

use chrono::{DateTime, SecondsFormat, Utc};
use rebox_store::{Store, StoreError};
use serde_json::Value;

use crate::error::Result;

pub use auth::{AuthService, LoginCredentials, ProfileUpdate, RegisterData};
pub use items::{ItemService, ItemUpdate, NewItem};
pub use matches::MatchService;

/// JSON form of a timestamp for use in a [`rebox_store::Patch`].
pub(crate) fn timestamp_value(dt: &DateTime<Utc>) -> Value {
    Value::String(dt.to_rfc3339_opts(SecondsFormat::Nanos, true))
}

/// Treat "record not found" on update/delete as a logged no-op.
///
/// The local store already ignores missing ids while the relational store
/// reports them, so this gives both backends the same observable behavior.
pub(crate) fn tolerate_missing(
    result: std::result::Result<(), StoreError>,
    collection: &'static str,
    id: &str,
) -> Result<()> {
    match result {
        Err(e) if e.is_not_found() => {
            tracing::warn!(collection, id, "record vanished before it could be changed");
            Ok(())
        }
        other => Ok(other?),
    }
}

/// Treat a uniqueness conflict on insert as "already there".
///
/// Returns `true` when the record was inserted.
pub(crate) async fn append_once<S, R>(store: &S, record: &R) -> Result<bool>
where
    S: Store,
    R: rebox_store::Record,
{
    match store.append(record).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_conflict() => {
            tracing::debug!(
                collection = R::COLLECTION,
                id = record.id(),
                "duplicate insert ignored"
            );
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}
