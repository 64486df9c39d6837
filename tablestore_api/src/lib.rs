//! Minimal typed client for a PostgREST-style table store.
//!
//! Supports filtered selects, inserts, upserts keyed by a conflict target,
//! and filtered deletes against `{base_url}/rest/v1/{table}`.

mod client;
mod errors;
mod query;
pub use self::client::Client;
pub use self::errors::Error;
pub use self::query::{DeleteQuery, Filter, Operator, Query, SelectQuery, SortDirection};
