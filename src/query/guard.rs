//! Statement Guard - read-only validation of caller-supplied SQL
//!
//! A lexical filter, not a parser: the statement must begin with SELECT and
//! must not contain any deny-listed keyword as a whole word, anywhere. False
//! positives (a column literally named `exec`) are an accepted tradeoff for
//! not carrying a SQL parser. Rejection is final; the guard never rewrites a
//! statement into something it would accept.

use regex::Regex;
use std::sync::OnceLock;

use crate::{Error, Result};

/// Default row ceiling appended to statements lacking a LIMIT clause.
pub const DEFAULT_ROW_CEILING: usize = 100;

fn select_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^select\b").unwrap())
}

fn deny_list() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(insert|update|delete|drop|create|alter|exec|execute)\b").unwrap()
    })
}

fn limit_clause() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\blimit\s+\d+").unwrap())
}

/// A statement that passed validation and is safe to execute.
#[derive(Debug, Clone)]
pub struct GuardedStatement {
    pub sql: String,
    /// True when the guard had to append the row ceiling itself.
    pub limit_appended: bool,
}

/// Validate a raw statement, returning it with a guaranteed row bound.
pub fn validate(raw: &str, ceiling: usize) -> Result<GuardedStatement> {
    let mut statement = raw.trim();
    if let Some(stripped) = statement.strip_suffix(';') {
        statement = stripped.trim_end();
    }

    if statement.is_empty() {
        return Err(Error::RejectedStatement("statement is empty".to_string()));
    }

    if !select_prefix().is_match(statement) {
        return Err(Error::RejectedStatement(
            "only SELECT statements are allowed".to_string(),
        ));
    }

    if let Some(found) = deny_list().find(statement) {
        return Err(Error::RejectedStatement(format!(
            "forbidden keyword `{}`",
            found.as_str().to_uppercase()
        )));
    }

    if limit_clause().is_match(statement) {
        Ok(GuardedStatement {
            sql: statement.to_string(),
            limit_appended: false,
        })
    } else {
        Ok(GuardedStatement {
            sql: format!("{} LIMIT {}", statement, ceiling),
            limit_appended: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reject_reason(raw: &str) -> String {
        match validate(raw, DEFAULT_ROW_CEILING) {
            Err(Error::RejectedStatement(reason)) => reason,
            other => panic!("expected rejection, got {:?}", other.map(|g| g.sql)),
        }
    }

    #[test]
    fn test_accepts_plain_select() {
        let guarded = validate("SELECT * FROM od_readings", 100).unwrap();
        assert_eq!(guarded.sql, "SELECT * FROM od_readings LIMIT 100");
        assert!(guarded.limit_appended);
    }

    #[test]
    fn test_accepts_lowercase_select() {
        let guarded = validate("select name from sqlite_master", 100).unwrap();
        assert!(guarded.sql.starts_with("select name"));
    }

    #[test]
    fn test_strips_one_trailing_semicolon() {
        let guarded = validate("SELECT 1;", 50).unwrap();
        assert_eq!(guarded.sql, "SELECT 1 LIMIT 50");
    }

    #[test]
    fn test_keeps_existing_limit() {
        let guarded = validate("SELECT * FROM logs LIMIT 5", 100).unwrap();
        assert_eq!(guarded.sql, "SELECT * FROM logs LIMIT 5");
        assert!(!guarded.limit_appended);
        // Exactly one limiting clause.
        assert_eq!(guarded.sql.to_lowercase().matches("limit").count(), 1);
    }

    #[test]
    fn test_rejects_non_select() {
        assert!(reject_reason("PRAGMA table_info(logs)").contains("SELECT"));
        assert!(reject_reason("  UPDATE logs SET x = 1").contains("SELECT"));
        assert!(reject_reason("").contains("empty"));
        assert!(reject_reason("selection FROM x").contains("SELECT"));
    }

    #[test]
    fn test_rejects_embedded_mutation() {
        let reason = reject_reason("SELECT 1; DROP TABLE od_readings");
        assert!(reason.contains("DROP"));
    }

    #[test]
    fn test_rejects_deny_list_case_insensitive() {
        for raw in [
            "SELECT * FROM t WHERE x IN (SELECT y FROM z); DELETE FROM t",
            "SELECT * FROM t; insert into t values (1)",
            "SELECT Exec('rm')",
        ] {
            assert!(validate(raw, 100).is_err(), "should reject: {raw}");
        }
    }

    #[test]
    fn test_word_boundary_matching() {
        // `created_at` contains "create" but not as a whole word.
        let guarded = validate("SELECT created_at FROM experiments", 100).unwrap();
        assert!(guarded.sql.contains("created_at"));

        // A bare column named `delete` does match; accepted tradeoff.
        assert!(validate("SELECT delete FROM t", 100).is_err());
    }
}
