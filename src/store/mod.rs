//! Mirror storage with SQLite
//!
//! The mirror is kscribbler's own cache of the device database. Population
//! passes are insert-or-ignore, so re-running against an unchanged device
//! leaves the mirror untouched. `quote.uploaded` is the single source of
//! truth for what has already reached the remote journal.

mod schema;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::source::{KoboSource, SourceBook, SourceBookmark};

pub use schema::SCHEMA;

/// Sentinel for remote ids that have not been resolved yet
pub const UNRESOLVED_ID: i64 = -1;

/// Substring that marks annotations written by (or for) kscribbler itself
pub const UPLOAD_SIGNATURE: &str = "kscrib";

pub struct MirrorStore {
    conn: Connection,
}

impl MirrorStore {
    /// Open the mirror, creating the file if absent. Tables are ensured on
    /// every open so a file left empty by an earlier failure recovers.
    pub fn open(path: &Path) -> Result<Self> {
        let created = match std::fs::metadata(path) {
            Ok(_) => false,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };

        if created {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).map_err(|e| Error::Schema(e.to_string()))?;
        let store = Self { conn };
        if created {
            info!(path = %path.display(), "creating mirror store");
        }
        store.ensure_schema()?;
        Ok(store)
    }

    /// Idempotent table creation. Failure here is fatal.
    pub fn ensure_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .map_err(|e| Error::Schema(e.to_string()))
    }

    // ============================================
    // POPULATION
    // ============================================

    pub fn insert_book(&self, book: &SourceBook) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO book (book_id, book_title, isbn) VALUES (?, ?, ?)",
            params![
                book.content_id,
                book.title,
                book.isbn.as_deref().map(str::trim).filter(|s| !s.is_empty())
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Returns Ok(false) for rows that were ignored, including unsupported
    /// bookmark types and text already mirrored under another bookmark id.
    pub fn insert_quote(&self, bookmark: &SourceBookmark) -> Result<bool> {
        let Some(kind) = QuoteKind::from_source_tag(&bookmark.type_tag) else {
            debug!(
                bookmark_id = %bookmark.bookmark_id,
                type_tag = %bookmark.type_tag,
                "ignoring bookmark type"
            );
            return Ok(false);
        };

        let text = bookmark.text.trim();
        if text.is_empty() {
            return Ok(false);
        }

        let pre_uploaded = bookmark
            .annotation
            .as_deref()
            .map(|a| a.to_lowercase().contains(UPLOAD_SIGNATURE))
            .unwrap_or(false);

        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO quote (bookmark_id, book_id, quote, annotation, type, uploaded)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                bookmark.bookmark_id,
                bookmark.volume_id,
                text,
                bookmark.annotation,
                kind.as_str(),
                pre_uploaded,
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn populate_books_from_source(&self, source: &KoboSource) -> Result<PopulateStats> {
        let mut stats = PopulateStats::default();
        for book in source.book_rows()? {
            match self.insert_book(&book) {
                Ok(true) => stats.inserted += 1,
                Ok(false) => stats.ignored += 1,
                Err(e) => {
                    warn!(book_id = %book.content_id, error = %e, "failed to mirror book");
                    stats.failed += 1;
                }
            }
        }
        info!(
            inserted = stats.inserted,
            ignored = stats.ignored,
            failed = stats.failed,
            "populated book table"
        );
        Ok(stats)
    }

    pub fn populate_quotes_from_source(&self, source: &KoboSource) -> Result<PopulateStats> {
        let mut stats = PopulateStats::default();
        for bookmark in source.bookmark_rows()? {
            match self.insert_quote(&bookmark) {
                Ok(true) => stats.inserted += 1,
                Ok(false) => stats.ignored += 1,
                Err(e) => {
                    warn!(bookmark_id = %bookmark.bookmark_id, error = %e, "failed to mirror quote");
                    stats.failed += 1;
                }
            }
        }
        info!(
            inserted = stats.inserted,
            ignored = stats.ignored,
            failed = stats.failed,
            "populated quote table"
        );
        Ok(stats)
    }

    // ============================================
    // BOOKS
    // ============================================

    pub fn get_book(&self, book_id: &str) -> Result<Option<BookRecord>> {
        let book = self
            .conn
            .query_row(
                &format!("{} WHERE book_id = ?", BOOK_SELECT),
                params![book_id],
                map_book,
            )
            .optional()?;
        Ok(book)
    }

    /// Books still missing a remote work or edition id
    pub fn unresolved_books(&self) -> Result<Vec<BookRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"{}
               WHERE remote_work_id IS NULL OR remote_work_id = ?1
                  OR remote_edition_id IS NULL OR remote_edition_id = ?1
               ORDER BY book_id"#,
            BOOK_SELECT
        ))?;
        let rows = stmt.query_map(params![UNRESOLVED_ID], map_book)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn set_book_isbn(&self, book_id: &str, isbn13: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE book SET isbn = ? WHERE book_id = ?",
            params![isbn13, book_id],
        )?;
        Ok(())
    }

    pub fn set_remote_ids(&self, book_id: &str, ids: RemoteIds) -> Result<()> {
        self.conn.execute(
            "UPDATE book SET remote_work_id = ?, remote_edition_id = ? WHERE book_id = ?",
            params![ids.work_id, ids.edition_id, book_id],
        )?;
        Ok(())
    }

    /// Books with at least one pending quote and resolved remote ids
    pub fn load_books_with_pending_quotes(&self) -> Result<Vec<BookRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"{}
               WHERE EXISTS (SELECT 1 FROM quote q WHERE q.book_id = book.book_id AND q.uploaded = 0)
                 AND remote_work_id IS NOT NULL AND remote_work_id != ?1
                 AND remote_edition_id IS NOT NULL AND remote_edition_id != ?1
               ORDER BY book_id"#,
            BOOK_SELECT
        ))?;
        let rows = stmt.query_map(params![UNRESOLVED_ID], map_book)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Every mirrored book with quote counts, for reporting
    pub fn book_summaries(&self) -> Result<Vec<BookSummary>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT b.book_id, b.book_title, b.isbn, b.remote_work_id, b.remote_edition_id,
                      (SELECT COUNT(*) FROM quote q WHERE q.book_id = b.book_id) AS total_quotes,
                      (SELECT COUNT(*) FROM quote q
                        WHERE q.book_id = b.book_id AND q.uploaded = 0) AS pending_quotes
               FROM book b
               ORDER BY b.book_title, b.book_id"#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(BookSummary {
                book: map_book(row)?,
                total_quotes: row.get(5)?,
                pending_quotes: row.get(6)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    // ============================================
    // QUOTES
    // ============================================

    /// All quotes of a book regardless of upload state, in import order
    pub fn quotes_for_book(&self, book_id: &str) -> Result<Vec<QuoteRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE book_id = ? ORDER BY rowid",
            QUOTE_SELECT
        ))?;
        let rows = stmt.query_map(params![book_id], map_quote)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn load_pending_quotes_for_book(&self, book_id: &str) -> Result<Vec<QuoteRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE book_id = ? AND uploaded = 0 ORDER BY rowid",
            QUOTE_SELECT
        ))?;
        let rows = stmt.query_map(params![book_id], map_quote)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// The only writer of `quote.uploaded` after population.
    ///
    /// `Posted` must follow a confirmed remote insert and stamps
    /// `uploaded_at`. `Directive` withdraws a quote that carried an ISBN
    /// directive; it was never sent, so no timestamp is recorded.
    pub fn mark_quote_uploaded(&self, bookmark_id: &str, mark: UploadMark) -> Result<()> {
        let uploaded_at = match mark {
            UploadMark::Posted => Some(Utc::now().to_rfc3339()),
            UploadMark::Directive => None,
        };
        self.conn.execute(
            "UPDATE quote SET uploaded = 1, uploaded_at = COALESCE(?, uploaded_at)
             WHERE bookmark_id = ?",
            params![uploaded_at, bookmark_id],
        )?;
        Ok(())
    }
}

const BOOK_SELECT: &str =
    "SELECT book_id, book_title, isbn, remote_work_id, remote_edition_id FROM book";

const QUOTE_SELECT: &str =
    "SELECT bookmark_id, book_id, quote, annotation, type, uploaded FROM quote";

fn map_book(row: &rusqlite::Row) -> rusqlite::Result<BookRecord> {
    let work_id: Option<i64> = row.get(3)?;
    let edition_id: Option<i64> = row.get(4)?;
    Ok(BookRecord {
        book_id: row.get(0)?,
        title: row.get(1)?,
        isbn: row.get(2)?,
        remote: RemoteIds::from_columns(work_id, edition_id),
    })
}

fn map_quote(row: &rusqlite::Row) -> rusqlite::Result<QuoteRecord> {
    let tag: String = row.get(4)?;
    Ok(QuoteRecord {
        bookmark_id: row.get(0)?,
        book_id: row.get(1)?,
        text: row.get(2)?,
        annotation: row.get(3)?,
        kind: QuoteKind::from_source_tag(&tag).unwrap_or(QuoteKind::Highlight),
        uploaded: row.get(5)?,
    })
}

// ============================================
// ROW TYPES
// ============================================

/// Why a quote leaves the upload set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMark {
    Posted,
    Directive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteKind {
    Highlight,
    Note,
}

impl QuoteKind {
    /// Canonical kind for a device `Bookmark.Type` tag. Dogears, markups and
    /// anything else without quotable text map to None.
    pub fn from_source_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "highlight" | "quote" => Some(QuoteKind::Highlight),
            "note" | "annotation" => Some(QuoteKind::Note),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteKind::Highlight => "highlight",
            QuoteKind::Note => "note",
        }
    }
}

/// Remote catalog identifiers, both present and non-sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteIds {
    pub work_id: i64,
    pub edition_id: i64,
}

impl RemoteIds {
    pub fn from_columns(work_id: Option<i64>, edition_id: Option<i64>) -> Option<Self> {
        match (work_id, edition_id) {
            (Some(w), Some(e)) if w != UNRESOLVED_ID && e != UNRESOLVED_ID => Some(Self {
                work_id: w,
                edition_id: e,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookRecord {
    pub book_id: String,
    pub title: Option<String>,
    pub isbn: Option<String>,
    pub remote: Option<RemoteIds>,
}

impl BookRecord {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.book_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRecord {
    pub bookmark_id: String,
    pub book_id: String,
    pub text: String,
    pub annotation: Option<String>,
    pub kind: QuoteKind,
    pub uploaded: bool,
}

#[derive(Debug, Clone)]
pub struct BookSummary {
    pub book: BookRecord,
    pub total_quotes: i64,
    pub pending_quotes: i64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PopulateStats {
    pub inserted: usize,
    pub ignored: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fixtures::*;

    fn bookmark(id: &str, book: &str, text: &str, annotation: Option<&str>, tag: &str) -> SourceBookmark {
        SourceBookmark {
            bookmark_id: id.to_string(),
            volume_id: book.to_string(),
            text: text.to_string(),
            annotation: annotation.map(str::to_string),
            type_tag: tag.to_string(),
        }
    }

    fn book(id: &str, isbn: Option<&str>) -> SourceBook {
        SourceBook {
            content_id: id.to_string(),
            title: Some(format!("Title {}", id)),
            isbn: isbn.map(str::to_string),
        }
    }

    fn open_temp() -> (tempfile::TempDir, MirrorStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MirrorStore::open(&dir.path().join("nested/kscribbler.sqlite")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_open_creates_schema_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kscribbler.sqlite");

        let store = MirrorStore::open(&path).unwrap();
        store.insert_book(&book("a", None)).unwrap();
        drop(store);

        // existing file is reopened, never recreated
        let store = MirrorStore::open(&path).unwrap();
        assert!(store.get_book("a").unwrap().is_some());
        store.ensure_schema().unwrap();
        assert!(store.get_book("a").unwrap().is_some());
    }

    #[test]
    fn test_open_recovers_empty_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kscribbler.sqlite");
        std::fs::write(&path, b"").unwrap();

        let store = MirrorStore::open(&path).unwrap();
        assert!(store.unresolved_books().unwrap().is_empty());
        store.insert_book(&book("a", None)).unwrap();
        assert!(store.get_book("a").unwrap().is_some());
    }

    #[test]
    fn test_upload_marks() {
        let (_dir, store) = open_temp();
        store.insert_book(&book("a", None)).unwrap();
        store
            .insert_quote(&bookmark("bm-1", "a", "posted", None, "highlight"))
            .unwrap();
        store
            .insert_quote(&bookmark("bm-2", "a", "isbn page", None, "highlight"))
            .unwrap();

        store.mark_quote_uploaded("bm-1", UploadMark::Posted).unwrap();
        store.mark_quote_uploaded("bm-2", UploadMark::Directive).unwrap();
        assert!(store.load_pending_quotes_for_book("a").unwrap().is_empty());

        let mut stmt = store
            .conn
            .prepare("SELECT uploaded_at FROM quote ORDER BY rowid")
            .unwrap();
        let stamped: Vec<Option<String>> = stmt
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert!(stamped[0].is_some());
        assert_eq!(stamped[1], None);
    }

    #[test]
    fn test_book_insert_or_ignore_never_overwrites() {
        let (_dir, store) = open_temp();
        assert!(store.insert_book(&book("a", None)).unwrap());
        store.set_book_isbn("a", "9780812575583").unwrap();

        assert!(!store.insert_book(&book("a", Some("1111111111"))).unwrap());
        let record = store.get_book("a").unwrap().unwrap();
        assert_eq!(record.isbn.as_deref(), Some("9780812575583"));
        assert_eq!(record.remote, None);
    }

    #[test]
    fn test_blank_source_isbn_stored_as_null() {
        let (_dir, store) = open_temp();
        store.insert_book(&book("a", Some("  "))).unwrap();
        assert_eq!(store.get_book("a").unwrap().unwrap().isbn, None);
    }

    #[test]
    fn test_quote_text_is_unique() {
        let (_dir, store) = open_temp();
        store.insert_book(&book("a", None)).unwrap();
        assert!(store
            .insert_quote(&bookmark("bm-1", "a", "same words", None, "highlight"))
            .unwrap());
        // device re-emitted the highlight under a new id
        assert!(!store
            .insert_quote(&bookmark("bm-2", "a", "same words", None, "highlight"))
            .unwrap());
        assert_eq!(store.quotes_for_book("a").unwrap().len(), 1);
    }

    #[test]
    fn test_quote_kind_and_signature_preseed() {
        let (_dir, store) = open_temp();
        store.insert_book(&book("a", None)).unwrap();
        store
            .insert_quote(&bookmark("bm-1", "a", "plain", None, "highlight"))
            .unwrap();
        store
            .insert_quote(&bookmark("bm-2", "a", "noted", Some("my thought"), "note"))
            .unwrap();
        store
            .insert_quote(&bookmark("bm-3", "a", "isbn page", Some("KScrib: 978"), "highlight"))
            .unwrap();
        assert!(!store
            .insert_quote(&bookmark("bm-4", "a", "folded", None, "dogear"))
            .unwrap());

        let quotes = store.quotes_for_book("a").unwrap();
        assert_eq!(quotes.len(), 3);
        assert_eq!(quotes[0].kind, QuoteKind::Highlight);
        assert_eq!(quotes[1].kind, QuoteKind::Note);
        assert!(!quotes[1].uploaded);
        assert!(quotes[2].uploaded);

        let pending = store.load_pending_quotes_for_book("a").unwrap();
        let ids: Vec<_> = pending.iter().map(|q| q.bookmark_id.as_str()).collect();
        assert_eq!(ids, vec!["bm-1", "bm-2"]);
    }

    #[test]
    fn test_pending_books_require_resolved_ids() {
        let (_dir, store) = open_temp();
        store.insert_book(&book("a", Some("9780812575583"))).unwrap();
        store.insert_book(&book("b", None)).unwrap();
        store
            .insert_quote(&bookmark("bm-1", "a", "one", None, "highlight"))
            .unwrap();
        store
            .insert_quote(&bookmark("bm-2", "b", "two", None, "highlight"))
            .unwrap();

        assert!(store.load_books_with_pending_quotes().unwrap().is_empty());
        assert_eq!(store.unresolved_books().unwrap().len(), 2);

        store
            .set_remote_ids("a", RemoteIds { work_id: 42, edition_id: 7 })
            .unwrap();
        let pending = store.load_books_with_pending_quotes().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].book_id, "a");
        assert_eq!(
            pending[0].remote,
            Some(RemoteIds { work_id: 42, edition_id: 7 })
        );

        store.mark_quote_uploaded("bm-1", UploadMark::Posted).unwrap();
        assert!(store.load_books_with_pending_quotes().unwrap().is_empty());
        assert!(store.load_pending_quotes_for_book("a").unwrap().is_empty());
    }

    #[test]
    fn test_population_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let kobo_path = dir.path().join("KoboReader.sqlite");
        let conn = create_kobo_db(&kobo_path);
        add_book(&conn, "book-a", "A", Some("9780812575583"), None);
        add_bookmark(&conn, "bm-1", "book-a", Some("one"), None, "highlight");
        add_bookmark(&conn, "bm-2", "book-a", Some("two"), Some("why"), "note");
        add_bookmark(&conn, "bm-3", "book-a", Some("one"), None, "highlight");
        drop(conn);

        let source = KoboSource::open(&kobo_path, false).unwrap();
        let store = MirrorStore::open(&dir.path().join("mirror.sqlite")).unwrap();

        let books = store.populate_books_from_source(&source).unwrap();
        let quotes = store.populate_quotes_from_source(&source).unwrap();
        assert_eq!(books.inserted, 1);
        assert_eq!(quotes.inserted, 2);
        assert_eq!(quotes.ignored, 1);

        let books = store.populate_books_from_source(&source).unwrap();
        let quotes = store.populate_quotes_from_source(&source).unwrap();
        assert_eq!(books.inserted, 0);
        assert_eq!(quotes.inserted, 0);

        let summaries = store.book_summaries().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].total_quotes, 2);
        assert_eq!(summaries[0].pending_quotes, 2);
    }

    #[test]
    fn test_remote_ids_sentinel() {
        assert_eq!(RemoteIds::from_columns(Some(-1), Some(5)), None);
        assert_eq!(RemoteIds::from_columns(Some(5), None), None);
        assert_eq!(
            RemoteIds::from_columns(Some(5), Some(6)),
            Some(RemoteIds { work_id: 5, edition_id: 6 })
        );
    }
}
