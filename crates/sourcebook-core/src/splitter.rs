//! # SQL Statement Splitter
//!
//! Splits the raw text of a migration file into executable statement
//! blocks.
//!
//! ## Why Not Split on `;`?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CREATE TRIGGER items_touch AFTER UPDATE ON items                      │
//! │  BEGIN                                                                  │
//! │      UPDATE items SET updated_at = CURRENT_TIMESTAMP                   │
//! │          WHERE id = NEW.id;              ◄── NOT the end               │
//! │      INSERT INTO audit (item_id) VALUES (NEW.id);   ◄── NOT the end    │
//! │  END;                                    ◄── end of ONE block          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Trigger bodies embed terminators, so the scan tracks whether it is
//! inside a compound statement (`CREATE TRIGGER` / `CREATE VIEW`) and only
//! completes those on their own terminator rule.
//!
//! ## Completion Rules
//! | In progress        | Completes at                                      |
//! |--------------------|---------------------------------------------------|
//! | ordinary statement | line ending in `;` with paren depth 0             |
//! | `CREATE VIEW`      | first line ending in `;`                          |
//! | `CREATE TRIGGER`   | a line that is exactly `END;`                     |
//!
//! This is not a SQL parser. Terminators inside string literals or block
//! comments are not recognised.

use crate::types::{StatementBlock, StatementKind};

/// Scanner state for one pass over a migration file.
#[derive(Debug, Default)]
struct SplitState {
    buffer: String,
    compound: Option<StatementKind>,
    paren_depth: i64,
    blocks: Vec<StatementBlock>,
}

impl SplitState {
    /// Feeds one non-blank line to the scanner.
    fn push_line(&mut self, line: &str) {
        self.buffer.push_str(line);
        self.buffer.push('\n');

        let upper = line.trim().to_uppercase();

        if self.compound.is_none() {
            if upper.contains("CREATE TRIGGER") {
                self.compound = Some(StatementKind::Trigger);
            } else if upper.contains("CREATE VIEW") {
                self.compound = Some(StatementKind::View);
            }
        }

        self.paren_depth += paren_delta(line);

        let complete = match self.compound {
            Some(StatementKind::Trigger) => upper == "END;",
            Some(StatementKind::View) => upper.ends_with(';'),
            _ => upper.ends_with(';') && self.paren_depth == 0,
        };

        if complete {
            self.flush();
        }
    }

    /// Emits the buffered text as a block and resets the scanner.
    fn flush(&mut self) {
        let sql = self.buffer.trim();
        if !sql.is_empty() {
            let kind = self.compound.unwrap_or(StatementKind::Simple);
            self.blocks.push(StatementBlock::new(kind, sql));
        }
        self.buffer.clear();
        self.compound = None;
        self.paren_depth = 0;
    }
}

/// Count of `(` minus count of `)` on a line.
fn paren_delta(line: &str) -> i64 {
    line.chars().fold(0, |depth, c| match c {
        '(' => depth + 1,
        ')' => depth - 1,
        _ => depth,
    })
}

/// Splits migration SQL into statement blocks, in file order.
///
/// Blank lines are kept inside the block being accumulated but never
/// complete a statement. Text left over after the last terminator is
/// returned as a final block.
///
/// ## Example
/// ```rust
/// use sourcebook_core::{split_sql_statements, StatementKind};
///
/// let sql = "\
/// CREATE TABLE items (id INTEGER PRIMARY KEY, qty INTEGER);
/// CREATE TRIGGER qty_guard BEFORE UPDATE ON items
/// BEGIN
///     SELECT RAISE(ABORT, 'negative') WHERE NEW.qty < 0;
/// END;
/// ";
/// let blocks = split_sql_statements(sql);
/// assert_eq!(blocks.len(), 2);
/// assert_eq!(blocks[1].kind, StatementKind::Trigger);
/// ```
pub fn split_sql_statements(sql: &str) -> Vec<StatementBlock> {
    let mut state = SplitState::default();

    for line in sql.lines() {
        if line.trim().is_empty() {
            state.buffer.push('\n');
            continue;
        }
        state.push_line(line);
    }

    state.flush();
    state.blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqls(blocks: &[StatementBlock]) -> Vec<&str> {
        blocks.iter().map(|b| b.sql.as_str()).collect()
    }

    #[test]
    fn test_simple_statements() {
        let blocks = split_sql_statements("CREATE TABLE a (id INTEGER);\nCREATE TABLE b (id INTEGER);\n");
        assert_eq!(
            sqls(&blocks),
            vec!["CREATE TABLE a (id INTEGER);", "CREATE TABLE b (id INTEGER);"]
        );
        assert!(blocks.iter().all(|b| b.kind == StatementKind::Simple));
    }

    #[test]
    fn test_multiline_statement_waits_for_paren_depth_zero() {
        let sql = "CREATE TABLE t (\n    id INTEGER,\n    note TEXT DEFAULT 'x;'\n);\n";
        let blocks = split_sql_statements(sql);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].sql.starts_with("CREATE TABLE t ("));
        assert!(blocks[0].sql.ends_with(");"));
    }

    #[test]
    fn test_line_ending_in_semicolon_inside_parens_does_not_complete() {
        let sql = "INSERT INTO t (a, b) VALUES (1,\n  'semi;\n');\nSELECT 1;";
        let blocks = split_sql_statements(sql);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].sql, "SELECT 1;");
    }

    #[test]
    fn test_trigger_with_internal_semicolons_is_one_block() {
        let sql = "\
CREATE TRIGGER items_touch AFTER UPDATE ON items
BEGIN
    UPDATE items SET updated_at = CURRENT_TIMESTAMP WHERE id = NEW.id;
    INSERT INTO audit (item_id) VALUES (NEW.id);
END;
";
        let blocks = split_sql_statements(sql);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, StatementKind::Trigger);
        assert!(blocks[0].sql.ends_with("END;"));
    }

    #[test]
    fn test_trigger_end_is_case_and_whitespace_insensitive() {
        let sql = "create trigger t1 after insert on a\nbegin\n  delete from b;\n  end;  \nSELECT 1;";
        let blocks = split_sql_statements(sql);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].kind, StatementKind::Trigger);
        assert_eq!(blocks[1].kind, StatementKind::Simple);
    }

    #[test]
    fn test_two_views_on_separate_lines() {
        let sql = "CREATE VIEW v1 AS SELECT * FROM a;\nCREATE VIEW v2 AS SELECT * FROM b;\n";
        let blocks = split_sql_statements(sql);
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|b| b.kind == StatementKind::View));
    }

    #[test]
    fn test_multiline_view_ends_at_first_terminator() {
        let sql = "CREATE VIEW open_orders AS\n  SELECT id\n  FROM orders\n  WHERE (status = 'open');\nSELECT 2;";
        let blocks = split_sql_statements(sql);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].kind, StatementKind::View);
        assert!(blocks[0].sql.ends_with("WHERE (status = 'open');"));
    }

    // Compound rules take precedence over an unbalanced paren count.
    #[test]
    fn test_view_completion_ignores_paren_depth() {
        let sql = "CREATE VIEW v AS SELECT '(' AS p;\nSELECT 1;";
        let blocks = split_sql_statements(sql);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].sql, "SELECT 1;");
    }

    #[test]
    fn test_blank_lines_never_complete_a_statement() {
        let sql = "SELECT 1\n\n\nFROM t;\n";
        let blocks = split_sql_statements(sql);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].sql, "SELECT 1\n\n\nFROM t;");
    }

    #[test]
    fn test_leftover_without_terminator_is_flushed() {
        let blocks = split_sql_statements("SELECT 1;\nSELECT 2");
        assert_eq!(sqls(&blocks), vec!["SELECT 1;", "SELECT 2"]);
    }

    #[test]
    fn test_unterminated_trigger_is_flushed_as_trigger() {
        let blocks = split_sql_statements("CREATE TRIGGER t AFTER INSERT ON a\nBEGIN\n  SELECT 1;\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, StatementKind::Trigger);
    }

    #[test]
    fn test_empty_and_blank_input() {
        assert!(split_sql_statements("").is_empty());
        assert!(split_sql_statements("\n\n   \n").is_empty());
    }

    #[test]
    fn test_blocks_preserve_every_line_in_order() {
        let sql = "\
CREATE TABLE a (id INTEGER);
CREATE VIEW va AS SELECT id FROM a;
CREATE TRIGGER ta AFTER INSERT ON a
BEGIN
    INSERT INTO a VALUES (NEW.id + 1);
END;
INSERT INTO a VALUES (1);
";
        let joined = split_sql_statements(sql)
            .into_iter()
            .map(|b| b.sql)
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(joined, sql.trim_end());
    }
}
