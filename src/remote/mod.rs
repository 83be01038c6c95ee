//! Remote reading-journal service (Hardcover GraphQL API)
//!
//! Two operations are consumed: a catalog search by ISBN and a journal-entry
//! insert. Both go through [`RemoteJournal`] so the reconciliation passes can
//! run against a fake in tests.

pub mod client;
pub mod graphql;

pub use client::HardcoverClient;
pub use graphql::{CatalogMatch, GraphqlRequest, JournalEntry};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::isbn::Isbn;

/// Visibility of a posted journal entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyLevel {
    #[default]
    Public,
    Followers,
    Private,
}

impl PrivacyLevel {
    /// `privacy_setting_id` understood by the service
    pub fn setting_id(&self) -> u8 {
        match self {
            PrivacyLevel::Public => 1,
            PrivacyLevel::Followers => 2,
            PrivacyLevel::Private => 3,
        }
    }
}

#[async_trait]
pub trait RemoteJournal: Send + Sync {
    /// First work whose editions match the ISBN, with its first matching
    /// edition. `Ok(None)` when the catalog has no such work.
    async fn find_edition(&self, isbn: &Isbn) -> Result<Option<CatalogMatch>>;

    /// Insert one journal entry. `Ok(())` only when the service confirmed it.
    async fn post_entry(&self, entry: &JournalEntry) -> Result<()>;
}
