//! mpl-fixtures
//!
//! Fixture feed boundary: the season fixture record, the provider trait the
//! reconciliation engine consumes, and the API-Sports backed implementation.
//! Nothing here touches local rounds or the database.

pub mod apisports;
pub mod provider;

pub use apisports::ApiSportsProvider;
pub use provider::{Fixture, FixtureProvider, ProviderError};
