//! Reconciliation passes: device → mirror → remote journal
//!
//! One run executes, strictly in order:
//! 1. mirror population (insert-or-ignore from the device database)
//! 2. ISBN backfill for books without a usable ISBN (`kscrib:` directives)
//! 3. catalog resolution for books with an ISBN but no remote ids
//! 4. upload of pending quotes for books with remote ids
//!
//! Every remote call is awaited before the next one starts. Per-item failures
//! are logged and skipped; a later run picks them up again. Errors that
//! [`Error::is_fatal`](crate::error::Error::is_fatal) flags end the run.

mod upload;

pub use upload::{UploadGateway, UploadOutcome};

use std::fmt;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::isbn::{candidate_from_quote, Isbn};
use crate::remote::{PrivacyLevel, RemoteJournal};
use crate::source::KoboSource;
use crate::store::{BookRecord, MirrorStore, PopulateStats, UploadMark};

/// Per-book reconciliation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookState {
    NeedsIsbn,
    HasIsbn,
    CatalogResolved,
    UploadEligible,
}

impl BookState {
    pub fn of(book: &BookRecord, pending_quotes: i64) -> Self {
        if book.remote.is_some() {
            if pending_quotes > 0 {
                BookState::UploadEligible
            } else {
                BookState::CatalogResolved
            }
        } else if usable_isbn(book).is_some() {
            BookState::HasIsbn
        } else {
            BookState::NeedsIsbn
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookState::NeedsIsbn => "needs-isbn",
            BookState::HasIsbn => "has-isbn",
            BookState::CatalogResolved => "resolved",
            BookState::UploadEligible => "eligible",
        }
    }
}

/// The book's stored ISBN, if it passes checksum validation
pub fn usable_isbn(book: &BookRecord) -> Option<Isbn> {
    book.isbn.as_deref().and_then(|raw| Isbn::parse(raw).ok())
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub spoiler: bool,
    pub privacy: PrivacyLevel,
    pub write_back_isbn: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            spoiler: false,
            privacy: PrivacyLevel::Public,
            write_back_isbn: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stop after resolution, before any upload
    pub init_only: bool,
    /// Only upload quotes of the book most recently opened on the device
    pub current_book_only: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackfillStats {
    pub resolved: usize,
    pub stuck: usize,
    pub invalid_candidates: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CatalogStats {
    pub resolved: usize,
    pub not_found: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadStats {
    pub uploaded: usize,
    pub skipped_notes: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub no_highlights: bool,
    pub books: PopulateStats,
    pub quotes: PopulateStats,
    pub backfill: BackfillStats,
    pub catalog: CatalogStats,
    pub upload: Option<UploadStats>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.no_highlights {
            return writeln!(f, "No highlights found.");
        }
        writeln!(
            f,
            "Mirror:  {} new books, {} new quotes",
            self.books.inserted, self.quotes.inserted
        )?;
        writeln!(
            f,
            "ISBNs:   {} found from directives, {} books still need one",
            self.backfill.resolved, self.backfill.stuck
        )?;
        writeln!(
            f,
            "Catalog: {} matched, {} not found, {} failed",
            self.catalog.resolved, self.catalog.not_found, self.catalog.failed
        )?;
        match &self.upload {
            Some(upload) => writeln!(
                f,
                "Upload:  {} uploaded, {} notes skipped, {} failed",
                upload.uploaded, upload.skipped_notes, upload.failed
            ),
            None => writeln!(f, "Upload:  skipped (init only)"),
        }
    }
}

pub struct Reconciler<'a, J: RemoteJournal> {
    store: &'a MirrorStore,
    source: &'a KoboSource,
    journal: &'a J,
    options: SyncOptions,
}

impl<'a, J: RemoteJournal> Reconciler<'a, J> {
    pub fn new(
        store: &'a MirrorStore,
        source: &'a KoboSource,
        journal: &'a J,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            source,
            journal,
            options,
        }
    }

    pub async fn run(&self, run: &RunOptions) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        if self.source.count_highlights()? == 0 {
            info!("No highlights found");
            summary.no_highlights = true;
            return Ok(summary);
        }

        summary.books = self.store.populate_books_from_source(self.source)?;
        summary.quotes = self.store.populate_quotes_from_source(self.source)?;
        summary.backfill = self.backfill_isbns()?;
        summary.catalog = self.resolve_catalog().await?;

        if run.init_only {
            info!("init only, skipping upload");
            return Ok(summary);
        }

        let current = if run.current_book_only {
            let current = self.source.last_opened_book()?;
            if current.is_none() {
                warn!("no recently opened book on the device, nothing to upload");
                summary.upload = Some(UploadStats::default());
                return Ok(summary);
            }
            current
        } else {
            None
        };

        summary.upload = Some(self.upload(current.as_deref()).await?);
        Ok(summary)
    }

    /// Find ISBNs for unresolved books lacking a usable one, via directives
    pub fn backfill_isbns(&self) -> Result<BackfillStats> {
        let mut stats = BackfillStats::default();

        for book in self.store.unresolved_books()? {
            if usable_isbn(&book).is_some() {
                continue;
            }
            if let Some(raw) = &book.isbn {
                debug!(book_id = %book.book_id, isbn = %raw, "stored ISBN fails validation");
            }

            let quotes = match self.store.quotes_for_book(&book.book_id) {
                Ok(quotes) => quotes,
                Err(e) => {
                    warn!(book_id = %book.book_id, error = %e, "failed to load quotes");
                    continue;
                }
            };

            // the first quote carrying an ISBN-looking candidate decides
            let Some((candidate, bookmark_id)) = quotes.iter().find_map(|quote| {
                candidate_from_quote(quote.kind, &quote.text, quote.annotation.as_deref())
                    .map(|candidate| (candidate, quote.bookmark_id.clone()))
            }) else {
                warn!(
                    book_id = %book.book_id,
                    title = %book.display_title(),
                    "no ISBN for book; add a note containing `kscrib: <ISBN>`"
                );
                stats.stuck += 1;
                continue;
            };

            let isbn = match Isbn::parse(&candidate) {
                Ok(isbn) => isbn,
                Err(e) => {
                    warn!(
                        book_id = %book.book_id,
                        bookmark_id = %bookmark_id,
                        candidate = %candidate,
                        error = %e,
                        "directive ISBN rejected; fix or remove the note"
                    );
                    stats.invalid_candidates += 1;
                    stats.stuck += 1;
                    continue;
                }
            };

            if let Err(e) = self.store.set_book_isbn(&book.book_id, isbn.isbn13()) {
                warn!(book_id = %book.book_id, error = %e, "failed to store ISBN");
                stats.stuck += 1;
                continue;
            }
            if let Err(e) = self
                .store
                .mark_quote_uploaded(&bookmark_id, UploadMark::Directive)
            {
                warn!(bookmark_id = %bookmark_id, error = %e, "failed to withdraw directive quote");
            }
            if self.options.write_back_isbn {
                if let Err(e) = self.source.write_back_isbn(&book.book_id, isbn.isbn13()) {
                    warn!(book_id = %book.book_id, error = %e, "failed to write ISBN back to device");
                }
            }

            info!(book_id = %book.book_id, isbn = %isbn, "ISBN set from directive");
            stats.resolved += 1;
        }

        info!(
            resolved = stats.resolved,
            stuck = stats.stuck,
            "ISBN backfill finished"
        );
        Ok(stats)
    }

    /// Look up remote ids for every book that has an ISBN but no match yet
    pub async fn resolve_catalog(&self) -> Result<CatalogStats> {
        let mut stats = CatalogStats::default();

        for book in self.store.unresolved_books()? {
            let Some(isbn) = usable_isbn(&book) else {
                continue;
            };

            match self.journal.find_edition(&isbn).await {
                Ok(Some(found)) => {
                    if let Err(e) = self.store.set_remote_ids(&book.book_id, found.ids()) {
                        warn!(book_id = %book.book_id, error = %e, "failed to store remote ids");
                        stats.failed += 1;
                        continue;
                    }
                    info!(
                        book_id = %book.book_id,
                        work_id = found.work_id,
                        edition_id = found.edition_id,
                        "matched book in remote catalog"
                    );
                    stats.resolved += 1;
                }
                Ok(None) => {
                    warn!(
                        book_id = %book.book_id,
                        isbn13 = %isbn.isbn13(),
                        isbn10 = isbn.isbn10().unwrap_or("-"),
                        "no remote catalog match"
                    );
                    stats.not_found += 1;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(book_id = %book.book_id, error = %e, "catalog lookup failed");
                    stats.failed += 1;
                }
            }
        }

        info!(
            resolved = stats.resolved,
            not_found = stats.not_found,
            failed = stats.failed,
            "catalog resolution finished"
        );
        Ok(stats)
    }

    /// Post pending quotes of every eligible book, optionally just one book
    pub async fn upload(&self, only_book: Option<&str>) -> Result<UploadStats> {
        let mut stats = UploadStats::default();
        let gateway = UploadGateway::new(
            self.store,
            self.journal,
            self.options.spoiler,
            self.options.privacy,
        );

        for book in self.store.load_books_with_pending_quotes()? {
            if only_book.is_some_and(|id| id != book.book_id) {
                continue;
            }

            let quotes = match self.store.load_pending_quotes_for_book(&book.book_id) {
                Ok(quotes) => quotes,
                Err(e) => {
                    warn!(book_id = %book.book_id, error = %e, "failed to load pending quotes");
                    continue;
                }
            };

            for quote in &quotes {
                match gateway.upload(&book, quote).await {
                    Ok(UploadOutcome::Uploaded) => stats.uploaded += 1,
                    Ok(UploadOutcome::SkippedNote) => stats.skipped_notes += 1,
                    Ok(UploadOutcome::AlreadyUploaded) => {}
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(
                            book_id = %book.book_id,
                            bookmark_id = %quote.bookmark_id,
                            error = %e,
                            "upload failed"
                        );
                        stats.failed += 1;
                    }
                }
            }
        }

        info!(
            uploaded = stats.uploaded,
            skipped_notes = stats.skipped_notes,
            failed = stats.failed,
            "upload finished"
        );
        Ok(stats)
    }
}
