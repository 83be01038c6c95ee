//! ISBN value type
//!
//! Validates ISBN-10/13 checksums and derives the other form when it exists.
//! Only the 978 prefix has an ISBN-10 counterpart; 979 books are ISBN-13 only.

pub mod extract;

use std::fmt;

use crate::error::{Error, Result};

pub use extract::{candidate_from_quote, DIRECTIVE_MARKER, MAX_CANDIDATE_LEN};

/// A validated ISBN in canonical (digits only, uppercase X) form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Isbn {
    isbn13: String,
    isbn10: Option<String>,
}

impl Isbn {
    /// Resolve a raw candidate into both canonical forms.
    ///
    /// Hyphens and whitespace are ignored. Anything that is not 10 or 13
    /// characters afterwards, or whose check digit does not match, is
    /// rejected with [`Error::InvalidIsbn`].
    pub fn parse(raw: &str) -> Result<Self> {
        let cleaned: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        match cleaned.len() {
            10 => {
                if !is_valid_isbn10(&cleaned) {
                    return Err(Error::InvalidIsbn(raw.to_string()));
                }
                Ok(Self {
                    isbn13: isbn10_to_isbn13(&cleaned),
                    isbn10: Some(cleaned),
                })
            }
            13 => {
                if !is_valid_isbn13(&cleaned) {
                    return Err(Error::InvalidIsbn(raw.to_string()));
                }
                let isbn10 = isbn13_to_isbn10(&cleaned);
                Ok(Self {
                    isbn13: cleaned,
                    isbn10,
                })
            }
            _ => Err(Error::InvalidIsbn(raw.to_string())),
        }
    }

    pub fn isbn13(&self) -> &str {
        &self.isbn13
    }

    pub fn isbn10(&self) -> Option<&str> {
        self.isbn10.as_deref()
    }
}

impl fmt::Display for Isbn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.isbn13)
    }
}

fn is_valid_isbn10(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != 10 || !bytes[..9].iter().all(u8::is_ascii_digit) {
        return false;
    }
    match isbn10_check_digit(&s[..9]) {
        Some(check) => check == bytes[9] as char,
        None => false,
    }
}

fn is_valid_isbn13(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != 13 || !bytes.iter().all(u8::is_ascii_digit) {
        return false;
    }
    // other EAN-13 prefixes are not books
    if !(s.starts_with("978") || s.starts_with("979")) {
        return false;
    }
    isbn13_check_digit(&s[..12]) == Some(bytes[12] as char)
}

/// Check character for the first nine digits of an ISBN-10
fn isbn10_check_digit(body: &str) -> Option<char> {
    let mut sum = 0u32;
    for (i, c) in body.chars().enumerate() {
        sum += c.to_digit(10)? * (10 - i as u32);
    }
    match (11 - sum % 11) % 11 {
        10 => Some('X'),
        d => char::from_digit(d, 10),
    }
}

/// Check digit for the first twelve digits of an ISBN-13
fn isbn13_check_digit(body: &str) -> Option<char> {
    let mut sum = 0u32;
    for (i, c) in body.chars().enumerate() {
        let weight = if i % 2 == 0 { 1 } else { 3 };
        sum += c.to_digit(10)? * weight;
    }
    char::from_digit((10 - sum % 10) % 10, 10)
}

fn isbn10_to_isbn13(isbn10: &str) -> String {
    let body = format!("978{}", &isbn10[..9]);
    // body is all digits here, so the check digit always exists
    let check = isbn13_check_digit(&body).unwrap_or('0');
    format!("{}{}", body, check)
}

fn isbn13_to_isbn10(isbn13: &str) -> Option<String> {
    let body = isbn13.strip_prefix("978")?.get(..9)?;
    let check = isbn10_check_digit(body)?;
    Some(format!("{}{}", body, check))
}
