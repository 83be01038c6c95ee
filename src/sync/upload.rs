//! Posts single quotes to the remote journal and records confirmed uploads

use tracing::{debug, info};

use crate::error::Result;
use crate::remote::{JournalEntry, PrivacyLevel, RemoteJournal};
use crate::store::{BookRecord, MirrorStore, QuoteKind, QuoteRecord, UploadMark};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded,
    /// Notes are not sent; the service cannot format multi-line entries yet
    SkippedNote,
    AlreadyUploaded,
}

pub struct UploadGateway<'a, J: RemoteJournal> {
    store: &'a MirrorStore,
    journal: &'a J,
    spoiler: bool,
    privacy: PrivacyLevel,
}

impl<'a, J: RemoteJournal> UploadGateway<'a, J> {
    pub fn new(
        store: &'a MirrorStore,
        journal: &'a J,
        spoiler: bool,
        privacy: PrivacyLevel,
    ) -> Self {
        Self {
            store,
            journal,
            spoiler,
            privacy,
        }
    }

    /// Either the quote is confirmed remotely and flagged, or nothing is written.
    pub async fn upload(&self, book: &BookRecord, quote: &QuoteRecord) -> Result<UploadOutcome> {
        if quote.uploaded {
            return Ok(UploadOutcome::AlreadyUploaded);
        }
        if quote.kind == QuoteKind::Note {
            debug!(bookmark_id = %quote.bookmark_id, "note entries are not posted");
            return Ok(UploadOutcome::SkippedNote);
        }

        let entry = JournalEntry::new(
            &book.book_id,
            book.remote,
            quote.kind,
            &quote.text,
            self.spoiler,
            self.privacy,
        )?;

        self.journal.post_entry(&entry).await?;
        self.store
            .mark_quote_uploaded(&quote.bookmark_id, UploadMark::Posted)?;
        info!(
            book_id = %book.book_id,
            bookmark_id = %quote.bookmark_id,
            "uploaded quote"
        );
        Ok(UploadOutcome::Uploaded)
    }
}
