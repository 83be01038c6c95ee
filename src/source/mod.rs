//! Kobo e-reader database access
//!
//! Data format: SQLite database at /mnt/onboard/.kobo/KoboReader.sqlite
//!   - content: one row per book (ContentType = 6) and per chapter
//!   - Bookmark: highlights, notes, dogears; VolumeID is the book's ContentID
//!
//! Opened read-only unless ISBN write-back is enabled.

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Book-level row reachable through at least one bookmark
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBook {
    pub content_id: String,
    pub title: Option<String>,
    pub isbn: Option<String>,
}

/// Bookmark row with non-empty text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBookmark {
    pub bookmark_id: String,
    pub volume_id: String,
    pub text: String,
    pub annotation: Option<String>,
    /// Raw `Bookmark.Type` tag
    pub type_tag: String,
}

pub struct KoboSource {
    conn: Connection,
    path: PathBuf,
    writable: bool,
}

impl KoboSource {
    /// Open an existing e-reader database. Never creates one.
    pub fn open(path: &Path, writable: bool) -> Result<Self> {
        if !path.exists() {
            return Err(Error::SourceUnavailable {
                path: path.display().to_string(),
                reason: "file not found".to_string(),
            });
        }

        let flags = if writable {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        } else {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        };
        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            Error::SourceUnavailable {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
            writable,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Distinct (isbn, title, content id) triples joined through Bookmark.
    /// Rows that fail to decode are logged and skipped.
    pub fn book_rows(&self) -> Result<Vec<SourceBook>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT DISTINCT b.VolumeID, c.Title, c.ISBN
               FROM content c
               JOIN Bookmark b ON c.ContentID = b.VolumeID"#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(SourceBook {
                content_id: row.get(0)?,
                title: row.get(1)?,
                isbn: row.get(2)?,
            })
        })?;

        let mut books = vec![];
        for row in rows {
            match row {
                Ok(book) => books.push(book),
                Err(e) => warn!(error = %e, "skipping unreadable content row"),
            }
        }
        Ok(books)
    }

    /// Bookmarks whose trimmed text is non-empty, text already trimmed
    pub fn bookmark_rows(&self) -> Result<Vec<SourceBookmark>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT BookmarkID, VolumeID, Text, Annotation, Type
               FROM Bookmark
               WHERE Text IS NOT NULL AND TRIM(Text) != ''
               ORDER BY rowid"#,
        )?;

        let rows = stmt.query_map([], |row| {
            let text: String = row.get(2)?;
            Ok(SourceBookmark {
                bookmark_id: row.get(0)?,
                volume_id: row.get(1)?,
                text: text.trim().to_string(),
                annotation: row.get(3)?,
                type_tag: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            })
        })?;

        let mut bookmarks = vec![];
        for row in rows {
            match row {
                Ok(bm) => bookmarks.push(bm),
                Err(e) => warn!(error = %e, "skipping unreadable bookmark row"),
            }
        }
        Ok(bookmarks)
    }

    pub fn count_highlights(&self) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM Bookmark WHERE Text IS NOT NULL AND TRIM(Text) != ''",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// ContentID of the book opened most recently on the device
    pub fn last_opened_book(&self) -> Result<Option<String>> {
        let content_id = self
            .conn
            .query_row(
                r#"SELECT ContentID
                   FROM content
                   WHERE ContentType = 6 AND DateLastRead IS NOT NULL
                   ORDER BY DateLastRead DESC
                   LIMIT 1"#,
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(content_id)
    }

    /// Store a resolved ISBN-13 on the device's own content row
    pub fn write_back_isbn(&self, content_id: &str, isbn13: &str) -> Result<()> {
        if !self.writable {
            return Err(Error::Config(
                "source database was opened read-only".to_string(),
            ));
        }
        let updated = self.conn.execute(
            "UPDATE content SET ISBN = ? WHERE ContentID = ?",
            params![isbn13, content_id],
        )?;
        debug!(content_id, isbn13, updated, "wrote ISBN back to source");
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_missing_source_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = KoboSource::open(&dir.path().join("nope.sqlite"), false)
            .err()
            .unwrap();
        assert!(matches!(err, Error::SourceUnavailable { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_book_rows_join_through_bookmarks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("KoboReader.sqlite");
        let conn = create_kobo_db(&path);
        add_book(&conn, "book-a", "Ender's Game", Some("9780812550702"), None);
        add_book(&conn, "book-b", "Unread", None, None);
        add_bookmark(&conn, "bm-1", "book-a", Some("first"), None, "highlight");
        add_bookmark(&conn, "bm-2", "book-a", Some("second"), None, "highlight");
        drop(conn);

        let source = KoboSource::open(&path, false).unwrap();
        let books = source.book_rows().unwrap();
        assert_eq!(
            books,
            vec![SourceBook {
                content_id: "book-a".to_string(),
                title: Some("Ender's Game".to_string()),
                isbn: Some("9780812550702".to_string()),
            }]
        );
    }

    #[test]
    fn test_bookmark_rows_skip_blank_text_and_trim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("KoboReader.sqlite");
        let conn = create_kobo_db(&path);
        add_book(&conn, "book-a", "A", None, None);
        add_bookmark(&conn, "bm-1", "book-a", Some("  padded  "), None, "highlight");
        add_bookmark(&conn, "bm-2", "book-a", Some("   "), None, "highlight");
        add_bookmark(&conn, "bm-3", "book-a", None, None, "dogear");
        drop(conn);

        let source = KoboSource::open(&path, false).unwrap();
        let bookmarks = source.bookmark_rows().unwrap();
        assert_eq!(bookmarks.len(), 1);
        assert_eq!(bookmarks[0].text, "padded");
        assert_eq!(source.count_highlights().unwrap(), 1);
    }

    #[test]
    fn test_last_opened_book() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("KoboReader.sqlite");
        let conn = create_kobo_db(&path);
        add_book(&conn, "old", "Old", None, Some("2024-01-01T10:00:00Z"));
        add_book(&conn, "new", "New", None, Some("2025-03-01T10:00:00Z"));
        add_book(&conn, "never", "Never", None, None);
        drop(conn);

        let source = KoboSource::open(&path, false).unwrap();
        assert_eq!(source.last_opened_book().unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn test_write_back_requires_writable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("KoboReader.sqlite");
        let conn = create_kobo_db(&path);
        add_book(&conn, "book-a", "A", None, None);
        drop(conn);

        let read_only = KoboSource::open(&path, false).unwrap();
        assert!(read_only.write_back_isbn("book-a", "9780812575583").is_err());
        drop(read_only);

        let writable = KoboSource::open(&path, true).unwrap();
        writable.write_back_isbn("book-a", "9780812575583").unwrap();
        drop(writable);

        let conn = Connection::open(&path).unwrap();
        let isbn: String = conn
            .query_row("SELECT ISBN FROM content WHERE ContentID = 'book-a'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(isbn, "9780812575583");
    }
}
