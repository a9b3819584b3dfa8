//! Pre-parse gate (SPEC_FULL.md §4.1): coarse, string-level checks that run
//! before the query is handed to an AST parser at all. This mirrors the
//! host's own layered defense — a cheap string check ahead of the
//! AST-aware validation in `sqlite::executor` — so obviously hostile input
//! never reaches `sqlparser`.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Diagnostic, Location};
use crate::schema::SecuritySchema;

/// A token from the quote-aware scan used by the forbidden-keyword,
/// stacked-statement, and tautology checks below. Deliberately coarser than
/// a real SQL lexer: it only needs to tell a quoted literal apart from
/// everything else, and to recognize comparison operators and `;`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Word(String),
    /// A quoted string literal: the quote character used, and its
    /// contents with doubled-quote escapes collapsed.
    Str(char, String),
    Num(String),
    Op(String),
    Punct(char),
}

fn tokenize(query: &str) -> Vec<Tok> {
    let mut tokens = Vec::new();
    let mut chars = query.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '\'' || c == '"' {
            let quote = c;
            chars.next();
            let mut s = String::new();
            loop {
                match chars.next() {
                    None => break,
                    Some(c2) if c2 == quote => {
                        if chars.peek() == Some(&quote) {
                            s.push(quote);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    Some(c2) => s.push(c2),
                }
            }
            tokens.push(Tok::Str(quote, s));
            continue;
        }
        if c.is_ascii_digit() {
            let mut s = String::new();
            while let Some(&c2) = chars.peek() {
                if c2.is_ascii_digit() || c2 == '.' {
                    s.push(c2);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Tok::Num(s));
            continue;
        }
        if c.is_alphanumeric() || c == '_' {
            let mut s = String::new();
            while let Some(&c2) = chars.peek() {
                if c2.is_alphanumeric() || c2 == '_' {
                    s.push(c2);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Tok::Word(s));
            continue;
        }
        if "=<>!".contains(c) {
            let mut s = String::new();
            while let Some(&c2) = chars.peek() {
                if "=<>!".contains(c2) {
                    s.push(c2);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Tok::Op(s));
            continue;
        }
        tokens.push(Tok::Punct(c));
        chars.next();
    }

    tokens
}

/// Operators for which comparing an operand against itself is always true.
fn is_reflexive_true_op(op: &str) -> bool {
    matches!(op, "=" | "<=" | ">=")
}

fn has_trivial_equality(tokens: &[Tok]) -> bool {
    for w in tokens.windows(3) {
        let [left, op, right] = w else { continue };
        let Tok::Op(op) = op else { continue };
        if !is_reflexive_true_op(op) {
            continue;
        }
        let equal = match (left, right) {
            (Tok::Str(q1, s1), Tok::Str(q2, s2)) => q1 == q2 && s1 == s2,
            (Tok::Num(n1), Tok::Num(n2)) => n1 == n2,
            _ => false,
        };
        if equal {
            return true;
        }
    }
    false
}

fn comment_truncation_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"--|/\*").unwrap())
}

/// Runs the pre-parse gate. Returns the first violation found, since these
/// are structural rejections that make proceeding to the parser pointless.
pub fn run(schema: &SecuritySchema, query: &str) -> Result<(), Diagnostic> {
    if let Some(max_len) = schema.max_query_length {
        if query.len() > max_len {
            return Err(Diagnostic::QueryComplexityError {
                table: None,
                location: Location::unknown(),
                message: format!("query length {} exceeds the maximum of {max_len}", query.len()),
            });
        }
    }

    let tokens = tokenize(query);

    check_forbidden_keywords(schema, &tokens)?;

    if schema.sql_injection_protection {
        check_quote_balance(query)?;
        check_stacked_statements(&tokens)?;
        check_tautology(query, &tokens)?;
    }

    Ok(())
}

fn check_forbidden_keywords(schema: &SecuritySchema, tokens: &[Tok]) -> Result<(), Diagnostic> {
    if schema.forbidden_keywords.is_empty() {
        return Ok(());
    }
    for token in tokens {
        let Tok::Word(word) = token else { continue };
        let upper = word.to_uppercase();
        if schema.forbidden_keywords.contains(&upper) {
            return Err(Diagnostic::SQLInjectionError {
                location: Location::unknown(),
                message: format!("forbidden keyword '{upper}' present in query"),
            });
        }
    }
    Ok(())
}

fn check_quote_balance(query: &str) -> Result<(), Diagnostic> {
    let single = query.chars().filter(|&c| c == '\'').count();
    let double = query.chars().filter(|&c| c == '"').count();
    if single % 2 != 0 || double % 2 != 0 {
        return Err(Diagnostic::SQLInjectionError {
            location: Location::unknown(),
            message: "unbalanced quote characters in query".to_string(),
        });
    }
    Ok(())
}

/// Flags a `;` that is not simply a single trailing terminator, i.e. a
/// second statement stacked onto the first. A `;` inside a quoted string
/// literal never reaches this check: the tokenizer folded it into a
/// `Tok::Str`, not a `Tok::Punct`.
fn check_stacked_statements(tokens: &[Tok]) -> Result<(), Diagnostic> {
    let semicolons: Vec<usize> =
        tokens.iter().enumerate().filter(|(_, t)| matches!(t, Tok::Punct(';'))).map(|(i, _)| i).collect();

    let stacked = match semicolons.as_slice() {
        [] => false,
        [only] => *only != tokens.len() - 1,
        _ => true,
    };

    if stacked {
        return Err(Diagnostic::SQLInjectionError {
            location: Location::unknown(),
            message: "multiple statements are not permitted".to_string(),
        });
    }
    Ok(())
}

/// Flags a trivially-true comparison between two equal literals (`1=1`,
/// `'a'='a'`), with or without a preceding `OR` — a `WHERE` clause that
/// reduces to a constant is as much a bypass as a dropped `WHERE` entirely
/// (spec.md §4.1 item 4, §4.4 "not trivially constant").
fn check_tautology(query: &str, tokens: &[Tok]) -> Result<(), Diagnostic> {
    if comment_truncation_pattern().is_match(query) || has_trivial_equality(tokens) {
        return Err(Diagnostic::SQLInjectionError {
            location: Location::unknown(),
            message: "query matches a known SQL injection pattern".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SecuritySchemaBuilder;

    fn schema() -> SecuritySchema {
        SecuritySchemaBuilder::new()
            .forbidden_keyword("DROP")
            .max_query_length(200)
            .build()
            .unwrap()
    }

    #[test]
    fn allows_clean_query() {
        assert!(run(&schema(), "SELECT * FROM users WHERE id = 1").is_ok());
    }

    #[test]
    fn denies_forbidden_keyword() {
        assert!(run(&schema(), "DROP TABLE users").is_err());
    }

    #[test]
    fn denies_stacked_statements() {
        assert!(run(&schema(), "SELECT 1; DROP TABLE users").is_err());
    }

    #[test]
    fn denies_two_stacked_select_statements() {
        assert!(run(&schema(), "SELECT 1; SELECT 2").is_err());
    }

    #[test]
    fn denies_unbalanced_quotes() {
        assert!(run(&schema(), "SELECT * FROM users WHERE name = 'o''brien").is_err());
    }

    #[test]
    fn denies_comment_truncation() {
        assert!(run(&schema(), "SELECT * FROM users WHERE id = 1 -- AND password = ?").is_err());
    }

    #[test]
    fn denies_over_length_query() {
        let long = format!("SELECT * FROM users WHERE id IN ({})", "1,".repeat(200));
        assert!(run(&schema(), &long).is_err());
    }

    #[test]
    fn trailing_semicolon_alone_is_allowed() {
        assert!(run(&schema(), "SELECT * FROM users;").is_ok());
    }

    #[test]
    fn denies_integer_tautology_without_or() {
        assert!(run(&schema(), "DELETE FROM orders WHERE 1=1").is_err());
    }

    #[test]
    fn denies_string_tautology_without_or() {
        assert!(run(&schema(), "SELECT * FROM users WHERE 'a'='a'").is_err());
    }

    #[test]
    fn allows_non_tautological_or_condition() {
        assert!(run(&schema(), "SELECT * FROM users WHERE status = 'active' OR status = 'pending'").is_ok());
    }

    #[test]
    fn allows_distinct_operands_joined_by_or() {
        assert!(run(&schema(), "SELECT * FROM users WHERE a = 1 OR b = 2").is_ok());
    }

    #[test]
    fn allows_forbidden_keyword_inside_string_literal() {
        assert!(run(&schema(), "SELECT * FROM notes WHERE body = 'remember to DROP by later'").is_ok());
    }

    #[test]
    fn allows_semicolon_inside_string_literal() {
        assert!(run(&schema(), "INSERT INTO notes (body) VALUES ('Hi; bye')").is_ok());
    }
}
