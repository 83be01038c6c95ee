//! Typed GraphQL request builders and response decoding
//!
//! Catalog lookups pass ISBNs as variables. The journal mutation embeds the
//! entry text as a block string, so `"""` inside it is escaped first.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{Error, Result};
use crate::isbn::Isbn;
use crate::remote::PrivacyLevel;
use crate::store::{QuoteKind, RemoteIds};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GraphqlRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub variables: Map<String, Value>,
}

/// Catalog search for works having an edition with either ISBN form
pub fn catalog_query(isbn: &Isbn) -> GraphqlRequest {
    let mut declarations = vec!["$isbn13: String!"];
    let mut filters = vec!["{isbn_13: {_eq: $isbn13}}"];
    let mut variables = Map::new();
    variables.insert("isbn13".to_string(), json!(isbn.isbn13()));

    if let Some(isbn10) = isbn.isbn10() {
        declarations.push("$isbn10: String!");
        filters.push("{isbn_10: {_eq: $isbn10}}");
        variables.insert("isbn10".to_string(), json!(isbn10));
    }

    let or_block = filters.join(", ");
    let query = format!(
        r#"query FindEdition({declarations}) {{
  books(where: {{editions: {{_or: [{or_block}]}}}}) {{
    id
    title
    editions(where: {{_or: [{or_block}]}}) {{
      id
    }}
  }}
}}"#,
        declarations = declarations.join(", "),
        or_block = or_block,
    );

    GraphqlRequest { query, variables }
}

/// Make text safe to place between `"""` delimiters
pub fn escape_block_string(text: &str) -> String {
    let mut escaped = text.replace(r#"""""#, r#"\""""#);
    // a trailing quote or backslash would merge with the closing delimiter;
    // the block string value drops the trailing blank line again
    if escaped.ends_with('"') || escaped.ends_with('\\') {
        escaped.push('\n');
    }
    escaped
}

/// One highlight ready to be posted to the journal
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub ids: RemoteIds,
    pub kind: QuoteKind,
    pub text: String,
    pub spoiler: bool,
    pub privacy: PrivacyLevel,
}

impl JournalEntry {
    /// Refuses to build an entry for a book that has no resolved remote ids
    pub fn new(
        book_id: &str,
        ids: Option<RemoteIds>,
        kind: QuoteKind,
        text: &str,
        spoiler: bool,
        privacy: PrivacyLevel,
    ) -> Result<Self> {
        let ids = ids
            .filter(|ids| ids.work_id > 0 && ids.edition_id > 0)
            .ok_or_else(|| Error::UnresolvedIdentifier(book_id.to_string()))?;

        Ok(Self {
            ids,
            kind,
            text: text.trim().to_string(),
            spoiler,
            privacy,
        })
    }

    /// Journal event / tag category for the entry kind
    pub fn event(&self) -> &'static str {
        match self.kind {
            QuoteKind::Highlight => "quote",
            QuoteKind::Note => "annotation",
        }
    }

    pub fn mutation(&self) -> GraphqlRequest {
        let query = format!(
            r#"mutation PostJournalEntry {{
  insert_reading_journal(
    object: {{book_id: {work_id}, edition_id: {edition_id}, event: "{event}", tags: {{spoiler: {spoiler}, category: "{event}", tag: ""}}, entry: """{entry}""", privacy_setting_id: {privacy}}}
  ) {{
    errors
  }}
}}"#,
            work_id = self.ids.work_id,
            edition_id = self.ids.edition_id,
            event = self.event(),
            spoiler = self.spoiler,
            entry = escape_block_string(&self.text),
            privacy = self.privacy.setting_id(),
        );

        GraphqlRequest {
            query,
            variables: Map::new(),
        }
    }
}

/// Catalog hit: the first returned work and its first edition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogMatch {
    pub work_id: i64,
    pub edition_id: i64,
    pub title: Option<String>,
}

impl CatalogMatch {
    pub fn ids(&self) -> RemoteIds {
        RemoteIds {
            work_id: self.work_id,
            edition_id: self.edition_id,
        }
    }
}

// Response shapes
#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct CatalogData {
    #[serde(default)]
    books: Vec<CatalogBook>,
}

#[derive(Debug, Deserialize)]
struct CatalogBook {
    id: i64,
    title: Option<String>,
    #[serde(default)]
    editions: Vec<EditionRef>,
}

#[derive(Debug, Deserialize)]
struct EditionRef {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct InsertJournalData {
    insert_reading_journal: Option<InsertJournalResult>,
}

#[derive(Debug, Deserialize)]
struct InsertJournalResult {
    errors: Option<Value>,
}

fn check_errors(errors: Option<Vec<GraphqlError>>) -> Result<()> {
    match errors {
        Some(errors) if !errors.is_empty() => Err(Error::Graphql(
            errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; "),
        )),
        _ => Ok(()),
    }
}

/// `Ok(None)` unless the first work lists at least one edition
pub fn parse_catalog_response(body: &str) -> Result<Option<CatalogMatch>> {
    let response: GraphqlResponse<CatalogData> = serde_json::from_str(body)?;
    check_errors(response.errors)?;

    let Some(book) = response.data.and_then(|d| d.books.into_iter().next()) else {
        return Ok(None);
    };
    Ok(book.editions.first().map(|edition| CatalogMatch {
        work_id: book.id,
        edition_id: edition.id,
        title: book.title,
    }))
}

pub fn parse_insert_response(body: &str) -> Result<()> {
    let response: GraphqlResponse<InsertJournalData> = serde_json::from_str(body)?;
    check_errors(response.errors)?;

    let result = response
        .data
        .and_then(|d| d.insert_reading_journal)
        .ok_or_else(|| Error::Graphql("missing insert_reading_journal payload".to_string()))?;

    match result.errors {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Array(items)) if items.is_empty() => Ok(()),
        Some(other) => Err(Error::Graphql(other.to_string())),
    }
}
