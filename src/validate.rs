//! Read-only policy for candidate statements.
//!
//! A statement passes when it is a single `SELECT` that only reads from tables in the [Catalog] and only calls
//! functions from [ALLOWED_FUNCTIONS]. The check works on a flat token stream, so it understands quoting and
//! parentheses but not the full SQL grammar.

use snafu::Snafu;

use crate::catalog::Catalog;
use crate::sanitize::Candidate;

const WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "MERGE", "UPSERT", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT",
    "REVOKE", "COPY", "INTO", "LOCK", "VACUUM", "REINDEX", "CLUSTER", "COMMENT", "CALL", "EXECUTE",
    "PREPARE", "LISTEN", "NOTIFY",
];

/// Keywords that may follow a table reference and therefore are never an alias.
const CLAUSE_KEYWORDS: &[&str] = &[
    "WHERE", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "NATURAL", "ON", "USING", "GROUP",
    "ORDER", "HAVING", "LIMIT", "OFFSET", "FETCH", "UNION", "EXCEPT", "INTERSECT", "WINDOW", "FOR",
    "TABLESAMPLE",
];

/// Functions whose argument list uses `FROM` as a separator rather than a table clause.
const FROM_FUNCTIONS: &[&str] = &["EXTRACT", "SUBSTRING", "TRIM", "OVERLAY"];

/// Functions a statement may call. Anything else in front of a `(` is rejected.
pub const ALLOWED_FUNCTIONS: &[&str] = &[
    "COUNT", "SUM", "AVG", "MIN", "MAX", "COALESCE", "NULLIF", "GREATEST", "LEAST", "CAST", "DATE",
    "EXTRACT", "DATE_TRUNC", "DATE_PART", "AGE", "NOW", "TO_CHAR", "TIMEZONE", "TIMESTAMP", "SUBSTRING",
    "TRIM", "OVERLAY", "LOWER", "UPPER", "LENGTH", "ROUND", "ABS", "CEIL", "FLOOR",
];

/// Keywords and type names that may stand in front of a `(` without being a call.
const KEYWORDS_BEFORE_PAREN: &[&str] = &[
    "SELECT", "FROM", "JOIN", "WHERE", "AND", "OR", "NOT", "IN", "EXISTS", "ANY", "ALL", "SOME", "AS",
    "ON", "BY", "GROUP", "HAVING", "WHEN", "THEN", "ELSE", "CASE", "OVER", "FILTER", "BETWEEN", "IS",
    "LIKE", "ILIKE", "DISTINCT", "UNION", "EXCEPT", "INTERSECT", "USING", "ARRAY", "ROW", "NUMERIC",
    "DECIMAL", "VARCHAR", "CHAR", "VARYING",
];

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum Rejection {
    #[snafu(display("statement is empty"))]
    Empty,

    #[snafu(display("statement must begin with SELECT, found `{found}`"))]
    NotSelect { found: String },

    #[snafu(display("statement contains more than one top-level statement"))]
    MultipleStatements,

    #[snafu(display("statement contains the forbidden keyword `{keyword}`"))]
    WriteKeyword { keyword: String },

    #[snafu(display("statement contains an SQL comment"))]
    Comment,

    #[snafu(display("statement contains an unterminated quoted literal"))]
    UnterminatedQuote,

    #[snafu(display("statement contains a dollar-quoted string or parameter"))]
    DollarQuote,

    #[snafu(display("statement contains an escape string literal"))]
    EscapeString,

    #[snafu(display("statement references the unknown table `{table}`"))]
    UnknownTable { table: String },

    #[snafu(display("statement calls the function `{name}`, which is not allowed"))]
    Function { name: String },
}

impl Rejection {
    /// A stable, machine-readable reason code for logs.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::Empty => "empty",
            Rejection::NotSelect { .. } => "not_select",
            Rejection::MultipleStatements => "multiple_statements",
            Rejection::WriteKeyword { .. } => "write_keyword",
            Rejection::Comment => "comment",
            Rejection::UnterminatedQuote => "unterminated_quote",
            Rejection::DollarQuote => "dollar_quote",
            Rejection::EscapeString => "escape_string",
            Rejection::UnknownTable { .. } => "unknown_table",
            Rejection::Function { .. } => "function",
        }
    }
}

/// A statement that passed [validate] and may be sent to the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Validated(String);

impl Validated {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn unchecked(sql: &str) -> Self {
        Validated(sql.to_string())
    }
}

impl std::fmt::Display for Validated {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Validated {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub fn validate(candidate: &Candidate, catalog: &Catalog) -> Result<Validated, Rejection> {
    let tokens = tokenize(candidate.as_str())?;

    let Some(first) = tokens.first() else {
        return Err(Rejection::Empty);
    };

    if !first.is_keyword("SELECT") {
        return Err(Rejection::NotSelect {
            found: first.text().to_string(),
        });
    }

    if let Some(position) = tokens.iter().position(|token| *token == Token::Punct(';')) {
        if position + 1 != tokens.len() {
            return Err(Rejection::MultipleStatements);
        }
    }

    let forbidden = tokens.iter().find_map(|token| match token {
        Token::Word(word) => WRITE_KEYWORDS
            .iter()
            .find(|keyword| word.eq_ignore_ascii_case(keyword)),
        _ => None,
    });

    if let Some(keyword) = forbidden {
        return Err(Rejection::WriteKeyword {
            keyword: keyword.to_string(),
        });
    }

    check_references(&tokens, catalog)?;

    Ok(Validated(candidate.as_str().to_string()))
}

/// Check every table reference and every function call, in statement order.
fn check_references(tokens: &[Token<'_>], catalog: &Catalog) -> Result<(), Rejection> {
    // the name in front of every currently open parenthesis
    let mut parens: Vec<Option<&str>> = Vec::new();
    // positions of `(` that open a column alias list such as `AS v(a, b)`
    let mut alias_lists: Vec<usize> = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::Punct('(') => {
                let function = i.checked_sub(1).and_then(|prev| match tokens[prev] {
                    Token::Word(name) | Token::Quoted(name) => Some(name),
                    _ => None,
                });

                if let Some(name) = function.filter(|_| !alias_lists.contains(&i)) {
                    check_function(name)?;
                }

                parens.push(function);
            }
            Token::Punct(')') => {
                parens.pop();
            }
            Token::Word(word) if word.eq_ignore_ascii_case("JOIN") => {
                table_list(tokens, i + 1, catalog, &mut alias_lists)?;
            }
            Token::Word(word) if word.eq_ignore_ascii_case("FROM") => {
                let in_function = matches!(
                    parens.last(),
                    Some(Some(function)) if FROM_FUNCTIONS.iter().any(|f| function.eq_ignore_ascii_case(f))
                );
                let distinct_from = i > 0 && tokens[i - 1].is_keyword("DISTINCT");

                if !in_function && !distinct_from {
                    table_list(tokens, i + 1, catalog, &mut alias_lists)?;
                }
            }
            _ => {}
        }
    }

    Ok(())
}

fn check_function(name: &str) -> Result<(), Rejection> {
    let known = |list: &[&str]| list.iter().any(|entry| name.eq_ignore_ascii_case(entry));

    if known(ALLOWED_FUNCTIONS) || known(KEYWORDS_BEFORE_PAREN) {
        return Ok(());
    }

    Err(Rejection::Function { name: name.to_string() })
}

/// Check the comma separated table references that start at `tokens[start]`, right after a `FROM` or `JOIN`.
fn table_list(
    tokens: &[Token<'_>],
    start: usize,
    catalog: &Catalog,
    alias_lists: &mut Vec<usize>,
) -> Result<(), Rejection> {
    let mut i = start;

    loop {
        i = match &tokens[i..] {
            // derived table, its own FROM is checked when the scan reaches it
            [Token::Punct('('), ..] => match closing_paren(tokens, i) {
                Some(close) => close + 1,
                None => return Ok(()),
            },
            [schema, Token::Punct('.'), table, ..] if schema.is_name() && table.is_name() => {
                if !schema.text().eq_ignore_ascii_case("public") {
                    return Err(Rejection::UnknownTable {
                        table: format!("{}.{}", schema.text(), table.text()),
                    });
                }
                known_table(table.text(), catalog)?;
                i + 3
            }
            [table, ..] if table.is_name() => {
                known_table(table.text(), catalog)?;
                i + 1
            }
            [other, ..] => {
                return Err(Rejection::UnknownTable {
                    table: other.text().to_string(),
                })
            }
            [] => return Err(Rejection::UnknownTable { table: String::new() }),
        };

        i = skip_alias(tokens, i, alias_lists);

        match tokens.get(i) {
            Some(Token::Punct(',')) => i += 1,
            _ => return Ok(()),
        }
    }
}

fn known_table(name: &str, catalog: &Catalog) -> Result<(), Rejection> {
    if catalog.is_known_table(name) {
        return Ok(());
    }

    Err(Rejection::UnknownTable {
        table: name.to_string(),
    })
}

/// Step over an optional alias and its column list, returning the position after them.
fn skip_alias(tokens: &[Token<'_>], mut i: usize, alias_lists: &mut Vec<usize>) -> usize {
    if tokens.get(i).is_some_and(|token| token.is_keyword("AS")) {
        i += 1;
    }

    match tokens.get(i) {
        Some(Token::Quoted(_)) => i += 1,
        Some(Token::Word(word)) if !CLAUSE_KEYWORDS.iter().any(|keyword| word.eq_ignore_ascii_case(keyword)) => {
            i += 1
        }
        _ => return i,
    }

    if tokens.get(i) == Some(&Token::Punct('(')) {
        alias_lists.push(i);
        if let Some(close) = closing_paren(tokens, i) {
            return close + 1;
        }
    }

    i
}

/// Position of the `)` matching the `(` at `open`.
fn closing_paren(tokens: &[Token<'_>], open: usize) -> Option<usize> {
    let mut depth = 0_usize;

    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::Punct('(') => depth += 1,
            Token::Punct(')') => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    /// A bare word: keyword, identifier or function name.
    Word(&'a str),
    /// A double-quoted identifier, without the quotes.
    Quoted(&'a str),
    /// A single-quoted string literal, including the quotes.
    Literal(&'a str),
    Number(&'a str),
    Punct(char),
}

impl<'a> Token<'a> {
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(word) if word.eq_ignore_ascii_case(keyword))
    }

    fn is_name(&self) -> bool {
        matches!(self, Token::Word(_) | Token::Quoted(_))
    }

    fn text(&self) -> &'a str {
        match *self {
            Token::Word(text) | Token::Quoted(text) | Token::Literal(text) | Token::Number(text) => text,
            Token::Punct(c) => punct_str(c),
        }
    }
}

fn punct_str(c: char) -> &'static str {
    match c {
        ';' => ";",
        '(' => "(",
        ')' => ")",
        ',' => ",",
        '.' => ".",
        '*' => "*",
        '=' => "=",
        _ => "?",
    }
}

fn tokenize(sql: &str) -> Result<Vec<Token<'_>>, Rejection> {
    let mut tokens = Vec::new();
    let mut chars = sql.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '-' if matches!(chars.peek(), Some((_, '-'))) => return Err(Rejection::Comment),
            '/' if matches!(chars.peek(), Some((_, '*'))) => return Err(Rejection::Comment),
            // `$$...$$`, `$tag$...$tag$` and `$1` all start here; identifiers only carry `$` after their first char
            '$' => return Err(Rejection::DollarQuote),
            '\'' => {
                // E'...' treats a backslash as an escape, which the scan below does not follow
                let escape_prefix = matches!(tokens.last(), Some(Token::Word(word)) if word.eq_ignore_ascii_case("e"));
                if escape_prefix && sql[..start].ends_with(['e', 'E']) {
                    return Err(Rejection::EscapeString);
                }

                let end = closing_quote(sql, start, '\'')?;
                tokens.push(Token::Literal(&sql[start..=end]));
                while chars.next_if(|(offset, _)| *offset <= end).is_some() {}
            }
            '"' => {
                let end = closing_quote(sql, start, '"')?;
                tokens.push(Token::Quoted(&sql[start + 1..end]));
                while chars.next_if(|(offset, _)| *offset <= end).is_some() {}
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = start + c.len_utf8();
                while let Some((offset, next)) =
                    chars.next_if(|(_, next)| next.is_alphanumeric() || *next == '_' || *next == '$')
                {
                    end = offset + next.len_utf8();
                }
                tokens.push(Token::Word(&sql[start..end]));
            }
            c if c.is_ascii_digit() => {
                let mut end = start + 1;
                while let Some((offset, next)) = chars.next_if(|(_, next)| next.is_ascii_digit() || *next == '.') {
                    end = offset + next.len_utf8();
                }
                tokens.push(Token::Number(&sql[start..end]));
            }
            c => tokens.push(Token::Punct(c)),
        }
    }

    Ok(tokens)
}

/// Find the quote closing the one opened at `start`. A doubled quote is an escaped quote.
fn closing_quote(sql: &str, start: usize, quote: char) -> Result<usize, Rejection> {
    let mut chars = sql[start + 1..].char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        if c != quote {
            continue;
        }

        if chars.next_if(|(_, next)| *next == quote).is_some() {
            continue;
        }

        return Ok(start + 1 + offset);
    }

    Err(Rejection::UnterminatedQuote)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::catalog::VIDEO_STATS;
    use crate::sanitize::sanitize;

    fn check(sql: &str) -> Result<Validated, Rejection> {
        validate(&Candidate::from(sql), &VIDEO_STATS)
    }

    #[test]
    fn accepts_catalog_examples() {
        for example in VIDEO_STATS.examples {
            if let Err(rejection) = check(example.sql) {
                panic!("example `{}` was rejected: {rejection}", example.sql);
            }
        }
    }

    #[test]
    fn rejects_write_statements() {
        for sql in [
            "INSERT INTO videos (id) VALUES ('x');",
            "UPDATE videos SET views_count = 0;",
            "DELETE FROM video_snapshots;",
            "insert into videos select * from videos",
            "update videos set creator_id = 'x' where id = 'y'",
            "delete from videos where views_count < 10",
        ] {
            assert!(
                matches!(check(sql), Err(Rejection::NotSelect { .. })),
                "`{sql}` was not rejected as a write"
            );
        }
    }

    #[test]
    fn rejects_statement_injection() {
        assert_eq!(check("SELECT 1; DROP TABLE videos;"), Err(Rejection::MultipleStatements));
        assert_eq!(check("SELECT 1;;"), Err(Rejection::MultipleStatements));
        assert!(check("SELECT COUNT(*) FROM videos;").is_ok());
    }

    #[test]
    fn sanitized_injection_keeps_only_the_read() {
        let candidate = sanitize("SELECT COUNT(*) FROM videos; DROP TABLE videos;").unwrap();
        let validated = validate(&candidate, &VIDEO_STATS).unwrap();
        assert_eq!(validated.as_str(), "SELECT COUNT(*) FROM videos;");
    }

    #[test]
    fn rejects_write_keywords_inside_select() {
        assert_eq!(
            check("SELECT * INTO backup FROM videos"),
            Err(Rejection::WriteKeyword { keyword: "INTO".to_string() })
        );
        assert_eq!(
            check("SELECT COUNT(*) FROM videos FOR UPDATE"),
            Err(Rejection::WriteKeyword { keyword: "UPDATE".to_string() })
        );
    }

    #[test]
    fn keywords_inside_literals_and_identifiers_are_ignored() {
        assert!(check("SELECT COUNT(*) FROM videos WHERE creator_id = 'drop table; delete'").is_ok());
        assert!(check("SELECT MAX(updated_at) FROM videos").is_ok());
        assert!(check("SELECT COUNT(*) FROM videos WHERE creator_id = 'it''s'").is_ok());
    }

    #[test]
    fn rejects_comments() {
        assert_eq!(check("SELECT COUNT(*) FROM videos -- hidden"), Err(Rejection::Comment));
        assert_eq!(check("SELECT /* x */ COUNT(*) FROM videos"), Err(Rejection::Comment));
    }

    #[test]
    fn rejects_unterminated_literal() {
        assert_eq!(
            check("SELECT COUNT(*) FROM videos WHERE creator_id = 'abc"),
            Err(Rejection::UnterminatedQuote)
        );
    }

    #[test]
    fn rejects_unknown_tables() {
        assert_eq!(
            check("SELECT COUNT(*) FROM users"),
            Err(Rejection::UnknownTable { table: "users".to_string() })
        );
        assert_eq!(
            check("SELECT COUNT(*) FROM videos v JOIN pg_user u ON true"),
            Err(Rejection::UnknownTable { table: "pg_user".to_string() })
        );
        assert_eq!(
            check("SELECT COUNT(*) FROM videos, information_schema.tables"),
            Err(Rejection::UnknownTable { table: "information_schema.tables".to_string() })
        );
        assert_eq!(
            check("SELECT COUNT(*) FROM generate_series(1, 10)"),
            Err(Rejection::UnknownTable { table: "generate_series".to_string() })
        );
    }

    #[test]
    fn accepts_joins_aliases_and_subqueries() {
        for sql in [
            "SELECT COUNT(*) FROM public.videos",
            "SELECT COUNT(*) FROM videos AS v JOIN video_snapshots s ON s.video_id = v.id WHERE v.creator_id = 'abc123'",
            "SELECT COUNT(*) FROM videos v, video_snapshots s WHERE s.video_id = v.id",
            "SELECT COUNT(*) FROM (SELECT video_id FROM video_snapshots GROUP BY video_id) t",
            "SELECT COUNT(*) FROM \"videos\" WHERE views_count > 100000",
        ] {
            assert!(check(sql).is_ok(), "`{sql}` was rejected: {:?}", check(sql));
        }
    }

    #[test]
    fn tables_after_a_derived_table_are_checked() {
        assert_eq!(
            check("SELECT COUNT(*) FROM (SELECT id FROM videos) t, pg_shadow"),
            Err(Rejection::UnknownTable { table: "pg_shadow".to_string() })
        );
        assert_eq!(
            check("SELECT COUNT(*) FROM (SELECT id FROM videos) AS t(x) JOIN pg_authid a ON true"),
            Err(Rejection::UnknownTable { table: "pg_authid".to_string() })
        );
        assert!(check("SELECT COUNT(*) FROM (SELECT id FROM videos) t, video_snapshots s WHERE s.video_id = t.id").is_ok());
    }

    #[test]
    fn tables_after_a_column_alias_list_are_checked() {
        assert_eq!(
            check("SELECT COUNT(*) FROM videos AS v(a), pg_authid"),
            Err(Rejection::UnknownTable { table: "pg_authid".to_string() })
        );
        assert_eq!(
            check("SELECT COUNT(*) FROM videos v(a, b), public.pg_authid"),
            Err(Rejection::UnknownTable { table: "pg_authid".to_string() })
        );
        assert!(check("SELECT COUNT(*) FROM videos AS v(a)").is_ok());
    }

    #[test]
    fn rejects_dollar_quoting() {
        assert_eq!(check("SELECT $$'$$ FROM pg_shadow WHERE $$'$$ = ''"), Err(Rejection::DollarQuote));
        assert_eq!(check("SELECT $q$x$q$ FROM videos"), Err(Rejection::DollarQuote));
        assert_eq!(check("SELECT COUNT(*) FROM videos WHERE views_count > $1"), Err(Rejection::DollarQuote));
        assert!(check("SELECT COUNT(*) FROM videos WHERE creator_id = 'cost $$'").is_ok());
    }

    #[test]
    fn rejects_escape_strings() {
        assert_eq!(
            check(r"SELECT COUNT(*) FROM videos WHERE creator_id = E'\' FROM pg_shadow --'"),
            Err(Rejection::EscapeString)
        );
        assert_eq!(check(r"SELECT e'\x' FROM videos"), Err(Rejection::EscapeString));
        assert!(check("SELECT COUNT(*) FROM videos WHERE creator_id = 'e'").is_ok());
        assert!(check("SELECT COUNT(*) FROM videos WHERE type = 'x'").is_ok());
    }

    #[test]
    fn rejects_functions_outside_the_allowlist() {
        for (sql, name) in [
            ("SELECT length(query_to_xml('select * from pg_authid', true, true, '')::text)", "query_to_xml"),
            ("SELECT pg_read_file('/etc/passwd')", "pg_read_file"),
            ("SELECT COUNT(*) FROM videos WHERE creator_id = current_setting('is_superuser')", "current_setting"),
            ("SELECT pg_catalog.pg_sleep(10)", "pg_sleep"),
            ("SELECT \"dblink\"('host=x', 'select 1')", "dblink"),
        ] {
            assert_eq!(check(sql), Err(Rejection::Function { name: name.to_string() }), "`{sql}`");
        }
    }

    #[test]
    fn keywords_in_front_of_parentheses_are_not_calls() {
        for sql in [
            "SELECT COUNT(*) FROM videos WHERE creator_id IN ('a', 'b') AND (views_count > 10 OR likes_count > 1)",
            "SELECT COUNT(*) FROM videos v WHERE EXISTS (SELECT 1 FROM video_snapshots s WHERE s.video_id = v.id)",
            "SELECT COUNT(*) FILTER (WHERE views_count > 0) FROM videos",
            "SELECT ROUND(AVG(views_count)) FROM videos WHERE NOT (likes_count = 0)",
            "SELECT CAST(SUM(views_count) AS NUMERIC(20, 2)) FROM videos",
        ] {
            assert!(check(sql).is_ok(), "`{sql}` was rejected: {:?}", check(sql));
        }
    }

    #[test]
    fn from_inside_functions_is_not_a_table_clause() {
        for sql in [
            "SELECT COUNT(*) FROM videos WHERE EXTRACT(YEAR FROM video_created_at) = 2025",
            "SELECT COUNT(*) FROM videos WHERE SUBSTRING(creator_id FROM 1 FOR 3) = 'abc'",
            "SELECT COUNT(*) FROM videos WHERE creator_id IS DISTINCT FROM 'abc'",
        ] {
            assert!(check(sql).is_ok(), "`{sql}` was rejected: {:?}", check(sql));
        }
    }

    #[test]
    fn rejects_non_select_openers() {
        assert_eq!(
            check("WITH t AS (SELECT 1) SELECT * FROM t"),
            Err(Rejection::NotSelect { found: "WITH".to_string() })
        );
    }

    #[test]
    fn reason_codes_are_stable() {
        assert_eq!(Rejection::MultipleStatements.code(), "multiple_statements");
        assert_eq!(Rejection::UnknownTable { table: "x".into() }.code(), "unknown_table");
        assert_eq!(Rejection::Function { name: "x".into() }.code(), "function");
        assert_eq!(Rejection::DollarQuote.code(), "dollar_quote");
        assert_eq!(Rejection::EscapeString.code(), "escape_string");
    }
}
