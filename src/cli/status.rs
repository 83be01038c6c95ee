//! Status command implementation

use anyhow::Result;

use crate::store::MirrorStore;
use crate::sync::{usable_isbn, BookState};

pub fn run(store: &MirrorStore) -> Result<()> {
    let summaries = store.book_summaries()?;

    if summaries.is_empty() {
        println!("No books mirrored yet. Run 'kscribbler sync' first.");
        return Ok(());
    }

    println!(
        "{:<11} {:<14} {:<16} {:>7} {:>7}  {}",
        "State", "ISBN", "Work/Edition", "Pending", "Total", "Title"
    );
    println!("{}", "-".repeat(100));

    let mut needs_isbn = 0;
    for summary in &summaries {
        let book = &summary.book;
        let state = BookState::of(book, summary.pending_quotes);
        if state == BookState::NeedsIsbn {
            needs_isbn += 1;
        }

        let isbn = usable_isbn(book)
            .map(|isbn| isbn.isbn13().to_string())
            .unwrap_or_else(|| "-".to_string());

        let ids = book
            .remote
            .map(|ids| format!("{}/{}", ids.work_id, ids.edition_id))
            .unwrap_or_else(|| "-".to_string());

        let title = book.display_title();
        let title = if title.chars().count() > 40 {
            format!("{}...", title.chars().take(37).collect::<String>())
        } else {
            title.to_string()
        };

        println!(
            "{:<11} {:<14} {:<16} {:>7} {:>7}  {}",
            state.as_str(),
            isbn,
            ids,
            summary.pending_quotes,
            summary.total_quotes,
            title,
        );
    }

    if needs_isbn > 0 {
        println!(
            "\n{} book(s) need an ISBN. Add a note containing `kscrib: <ISBN>` and sync again.",
            needs_isbn
        );
    }

    Ok(())
}
