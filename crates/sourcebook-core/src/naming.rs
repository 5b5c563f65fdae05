//! # Migration Naming
//!
//! Filename conventions for migration files.
//!
//! The migration manager applies files in plain lexical order. The
//! recommended `NNN_description.sql` convention (fixed-width numeric
//! prefix) is what makes lexical order match the author's intent; these
//! checks let callers detect when it does not.
//!
//! ## Convention
//! ```text
//! 001_create_items.sql
//! ├┘ │└──────────┘└─┘
//! │  │     │       └── extension: .sql
//! │  │     └────────── description: non-empty
//! │  └──────────────── separator: _
//! └─────────────────── number: ASCII digits
//! ```

use std::collections::HashMap;
use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::MIGRATION_EXTENSION;

/// Returns true when `filename` has the `.sql` extension.
pub fn is_migration_file(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .is_some_and(|ext| ext == MIGRATION_EXTENSION)
}

/// Validates one filename against `NNN_description.sql`.
///
/// ## Returns
/// The numeric prefix.
///
/// ## Example
/// ```rust
/// use sourcebook_core::naming::check_migration_name;
///
/// assert_eq!(check_migration_name("007_add_suppliers.sql").unwrap(), 7);
/// assert!(check_migration_name("add_suppliers.sql").is_err());
/// ```
pub fn check_migration_name(filename: &str) -> CoreResult<u64> {
    if !is_migration_file(filename) {
        return Err(CoreError::NotAMigration(filename.to_string()));
    }

    let stem = &filename[..filename.len() - MIGRATION_EXTENSION.len() - 1];

    let (number, description) = stem
        .split_once('_')
        .ok_or_else(|| CoreError::invalid_name(filename, "missing '_' separator"))?;

    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return Err(CoreError::invalid_name(
            filename,
            "prefix must be ASCII digits",
        ));
    }

    if description.trim().is_empty() {
        return Err(CoreError::invalid_name(filename, "empty description"));
    }

    number
        .parse::<u64>()
        .map_err(|_| CoreError::invalid_name(filename, "number out of range"))
}

/// Checks a set of migration filenames as a whole.
///
/// ## Rules
/// - Every name passes [`check_migration_name`]
/// - No two names share a number
/// - Sorting lexically gives the same order as sorting numerically
///
/// The input order does not matter.
pub fn check_migration_sequence<S: AsRef<str>>(filenames: &[S]) -> CoreResult<()> {
    let mut sorted: Vec<&str> = filenames.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();

    let mut seen: HashMap<u64, &str> = HashMap::new();
    let mut previous: Option<(u64, &str)> = None;

    for name in sorted {
        let number = check_migration_name(name)?;

        if let Some(first) = seen.insert(number, name) {
            return Err(CoreError::DuplicateMigrationNumber {
                number,
                first: first.to_string(),
                second: name.to_string(),
            });
        }

        if let Some((prev_number, prev_name)) = previous {
            if number < prev_number {
                return Err(CoreError::OutOfOrder {
                    earlier: prev_name.to_string(),
                    later: name.to_string(),
                });
            }
        }
        previous = Some((number, name));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_migration_file() {
        assert!(is_migration_file("001_init.sql"));
        assert!(!is_migration_file("001_init.sql.bak"));
        assert!(!is_migration_file("README.md"));
        assert!(!is_migration_file("sql"));
    }

    #[test]
    fn test_check_migration_name() {
        assert_eq!(check_migration_name("001_init.sql"), Ok(1));
        assert_eq!(check_migration_name("20240101_seed_items.sql"), Ok(20240101));

        assert!(matches!(
            check_migration_name("001_init.txt"),
            Err(CoreError::NotAMigration(_))
        ));
        assert!(check_migration_name("init.sql").is_err());
        assert!(check_migration_name("001init.sql").is_err());
        assert!(check_migration_name("01a_init.sql").is_err());
        assert!(check_migration_name("_init.sql").is_err());
        assert!(check_migration_name("001_.sql").is_err());
    }

    #[test]
    fn test_check_migration_sequence_accepts_padded_names() {
        let names = ["002_seed.sql", "001_init.sql", "010_orders.sql"];
        assert!(check_migration_sequence(&names).is_ok());
    }

    #[test]
    fn test_check_migration_sequence_rejects_duplicate_numbers() {
        let names = ["001_init.sql", "001_other.sql"];
        assert!(matches!(
            check_migration_sequence(&names),
            Err(CoreError::DuplicateMigrationNumber { number: 1, .. })
        ));
    }

    #[test]
    fn test_check_migration_sequence_rejects_mixed_widths() {
        // "10_b.sql" < "9_a.sql" lexically
        let names = ["9_a.sql", "10_b.sql"];
        assert_eq!(
            check_migration_sequence(&names),
            Err(CoreError::OutOfOrder {
                earlier: "10_b.sql".to_string(),
                later: "9_a.sql".to_string(),
            })
        );
    }

    #[test]
    fn test_check_migration_sequence_empty() {
        let names: [&str; 0] = [];
        assert!(check_migration_sequence(&names).is_ok());
    }
}
