//! SQLite schema for the kscribbler mirror database
//!
//! `book` mirrors the e-reader's content rows that carry bookmarks, `quote`
//! mirrors the bookmarks themselves. Remote ids default to -1 (unresolved).

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS book (
    book_id TEXT PRIMARY KEY NOT NULL,     -- content id on the device
    book_title TEXT,
    isbn TEXT,                             -- canonical ISBN-13 once resolved
    remote_work_id INTEGER DEFAULT -1,
    remote_edition_id INTEGER DEFAULT -1
);

CREATE TABLE IF NOT EXISTS quote (
    bookmark_id TEXT PRIMARY KEY NOT NULL,
    book_id TEXT NOT NULL,
    quote TEXT NOT NULL,                   -- trimmed highlighted passage
    annotation TEXT,
    type TEXT NOT NULL,                    -- 'highlight' | 'note'
    uploaded INTEGER DEFAULT 0,
    uploaded_at TEXT,
    FOREIGN KEY(book_id) REFERENCES book(book_id),
    CONSTRAINT unique_trimmed_quote UNIQUE (quote)
);

CREATE INDEX IF NOT EXISTS idx_quote_book ON quote(book_id);
CREATE INDEX IF NOT EXISTS idx_quote_pending ON quote(uploaded) WHERE uploaded = 0;
"#;
