//! # Migration Checksums
//!
//! Tamper detection for applied migration files.
//!
//! ## Normalization
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Raw file                          Normalized                          │
//! │  ─────────────────────────────     ─────────────────────────────       │
//! │  -- 001: create items              (dropped: full-line comment)        │
//! │  CREATE TABLE items (          ──► CREATE TABLE items (                │
//! │                                    (dropped: blank line)               │
//! │      id INTEGER PRIMARY KEY,   ──►     id INTEGER PRIMARY KEY,         │
//! │      name TEXT -- label        ──►     name TEXT -- label              │
//! │  );                            ──► );                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Whole-line formatting edits (blank lines, full-line comments) keep the
//! checksum stable. Every other edit changes it, including trailing inline
//! comments and indentation on substantive lines.

use sha2::{Digest, Sha256};

use crate::LINE_COMMENT;

/// Returns true when a line is dropped by normalization.
fn is_ignorable_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with(LINE_COMMENT)
}

/// Removes blank lines and full-line `--` comments from migration text.
///
/// Remaining lines are kept byte-for-byte and joined with `\n`. CRLF line
/// endings normalize to LF.
pub fn normalize_migration_sql(content: &str) -> String {
    content
        .lines()
        .filter(|line| !is_ignorable_line(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Computes the ledger checksum of a migration file's content.
///
/// SHA-256 of [`normalize_migration_sql`], lowercase hex.
///
/// ## Example
/// ```rust
/// use sourcebook_core::migration_checksum;
///
/// let a = migration_checksum("CREATE TABLE t (id INTEGER);");
/// let b = migration_checksum("-- header\n\nCREATE TABLE t (id INTEGER);\n");
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 64);
/// ```
pub fn migration_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_migration_sql(content).as_bytes());
    let result = hasher.finalize();
    format!("{:x}", result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INIT: &str = "CREATE TABLE t (\n    id INTEGER PRIMARY KEY,\n    name TEXT\n);\n";

    #[test]
    fn test_normalize_drops_blank_and_comment_lines() {
        let raw = "-- header\n\nCREATE TABLE t (id INTEGER);\n   -- indented comment\n\t\nINSERT INTO t VALUES (1);\n";
        assert_eq!(
            normalize_migration_sql(raw),
            "CREATE TABLE t (id INTEGER);\nINSERT INTO t VALUES (1);"
        );
    }

    #[test]
    fn test_normalize_keeps_substantive_lines_verbatim() {
        let raw = "  SELECT 1; -- trailing\n";
        assert_eq!(normalize_migration_sql(raw), "  SELECT 1; -- trailing");
    }

    #[test]
    fn test_normalize_empty_file() {
        assert_eq!(normalize_migration_sql(""), "");
        assert_eq!(normalize_migration_sql("-- only a comment\n\n"), "");
    }

    #[test]
    fn test_checksum_ignores_blank_lines_and_full_line_comments() {
        let edited = "-- tweaked header\n\nCREATE TABLE t (\n\n    id INTEGER PRIMARY KEY,\n    -- the label\n    name TEXT\n);\n\n";
        assert_eq!(migration_checksum(INIT), migration_checksum(edited));
    }

    #[test]
    fn test_checksum_detects_column_rename() {
        let renamed = INIT.replace("name TEXT", "title TEXT");
        assert_ne!(migration_checksum(INIT), migration_checksum(&renamed));
    }

    // Inline comments are part of the line and therefore part of the checksum.
    #[test]
    fn test_checksum_is_strict_about_inline_comments() {
        let commented = INIT.replace("name TEXT", "name TEXT -- display label");
        assert_ne!(migration_checksum(INIT), migration_checksum(&commented));
    }

    #[test]
    fn test_checksum_treats_crlf_like_lf() {
        let crlf = INIT.replace('\n', "\r\n");
        assert_eq!(migration_checksum(INIT), migration_checksum(&crlf));
    }

    #[test]
    fn test_checksum_is_hex_sha256() {
        let sum = migration_checksum(INIT);
        assert_eq!(sum.len(), 64);
        assert!(sum.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
