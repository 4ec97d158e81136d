//! Search term parsing and matching.
//!
//! A term without operators is one case-insensitive substring, so
//! `Google Ireland` matches the phrase "google ireland". Upper-case `AND`,
//! `OR` and `NOT`, double quotes and parentheses build Boolean expressions:
//!
//! ```text
//! Google OR Microsoft
//! (Shell OR BP) AND NOT "Shell Foundation"
//! ```
//!
//! Malformed expressions fall back to matching the whole input literally.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Term(String),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    fn eval(&self, haystack: &str) -> bool {
        match self {
            Expr::Term(t) => !t.is_empty() && haystack.contains(t.as_str()),
            Expr::And(parts) => parts.iter().all(|p| p.eval(haystack)),
            Expr::Or(parts) => parts.iter().any(|p| p.eval(haystack)),
            Expr::Not(inner) => !inner.eval(haystack),
        }
    }

    fn positive_terms<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Term(t) => out.push(t),
            Expr::And(parts) | Expr::Or(parts) => {
                for p in parts {
                    p.positive_terms(out);
                }
            }
            Expr::Not(_) => {}
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Term(t) if t.contains(' ') => write!(f, "\"{t}\""),
            Expr::Term(t) => f.write_str(t),
            Expr::And(parts) => write_joined(f, parts, " AND "),
            Expr::Or(parts) => {
                f.write_str("(")?;
                write_joined(f, parts, " OR ")?;
                f.write_str(")")
            }
            Expr::Not(inner) => write!(f, "NOT {inner}"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, parts: &[Expr], sep: &str) -> fmt::Result {
    for (i, p) in parts.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{p}")?;
    }
    Ok(())
}

// ── Tokenizer ──

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Quoted(String),
    And,
    Or,
    Not,
    Open,
    Close,
}

fn tokenize(input: &str) -> Option<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '"' => {
                chars.next();
                let mut phrase = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some(ch) => phrase.push(ch),
                        None => return None,
                    }
                }
                tokens.push(Token::Quoted(phrase));
            }
            _ => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || ch == '(' || ch == ')' || ch == '"' {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                tokens.push(match word.as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    _ => Token::Word(word),
                });
            }
        }
    }
    Some(tokens)
}

// ── Parser ──

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn parse_or(&mut self) -> Option<Expr> {
        let mut parts = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.bump();
            parts.push(self.parse_and()?);
        }
        Some(flatten(parts, Expr::Or))
    }

    fn parse_and(&mut self) -> Option<Expr> {
        let mut parts = vec![self.parse_unary()?];
        loop {
            match self.peek() {
                Some(Token::And) => {
                    self.bump();
                    parts.push(self.parse_unary()?);
                }
                // Adjacent operands without an operator are conjoined.
                Some(Token::Word(_) | Token::Quoted(_) | Token::Open | Token::Not) => {
                    parts.push(self.parse_unary()?);
                }
                _ => break,
            }
        }
        Some(flatten(parts, Expr::And))
    }

    fn parse_unary(&mut self) -> Option<Expr> {
        if self.peek() == Some(&Token::Not) {
            self.bump();
            return Some(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        match self.bump()? {
            Token::Open => {
                let inner = self.parse_or()?;
                match self.bump()? {
                    Token::Close => Some(inner),
                    _ => None,
                }
            }
            Token::Quoted(phrase) => Some(Expr::Term(normalize(&phrase))),
            Token::Word(first) => {
                let mut words = vec![first];
                while let Some(Token::Word(w)) = self.peek() {
                    words.push(w.clone());
                    self.bump();
                }
                Some(Expr::Term(normalize(&words.join(" "))))
            }
            _ => None,
        }
    }
}

fn flatten(mut parts: Vec<Expr>, wrap: fn(Vec<Expr>) -> Expr) -> Expr {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        wrap(parts)
    }
}

fn parse_expr(input: &str) -> Option<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return None;
    }
    Some(expr)
}

/// Slices of `input` between `OR` operators outside quotes and parentheses.
fn top_level_or_spans(input: &str) -> Vec<&str> {
    let bytes = input.as_bytes();
    let is_delim = |b: u8| b.is_ascii_whitespace() || matches!(b, b'(' | b')' | b'"');
    let mut spans = Vec::new();
    let mut start = 0;
    let mut depth = 0i32;
    let mut quoted = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => quoted = !quoted,
            b'(' if !quoted => depth += 1,
            b')' if !quoted => depth -= 1,
            b'O' if !quoted
                && depth == 0
                && bytes.get(i + 1) == Some(&b'R')
                && (i == 0 || is_delim(bytes[i - 1]))
                && bytes.get(i + 2).map_or(true, |&b| is_delim(b)) =>
            {
                spans.push(input[start..i].trim());
                start = i + 2;
                i += 2;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    spans.push(input[start..].trim());
    spans
}

/// Lower-case and collapse whitespace. Used for matching and cache keys.
pub fn normalize(term: &str) -> String {
    term.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A parsed search term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    raw: String,
    expr: Expr,
}

impl SearchQuery {
    pub fn parse(input: &str) -> Self {
        let raw = input.trim().to_string();
        let expr = parse_expr(&raw).unwrap_or_else(|| {
            tracing::debug!(query = %raw, "malformed Boolean query, matching literally");
            Expr::Term(normalize(&raw))
        });
        Self { raw, expr }
    }

    /// The term as entered, trimmed.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Cache key form of the term: lower-cased terms, upper-case operators.
    ///
    /// `shell or bp` (one phrase) and `Shell OR BP` (two alternatives) get
    /// different keys.
    pub fn normalized(&self) -> String {
        match &self.expr {
            Expr::Term(t) => t.clone(),
            expr => expr.to_string(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.raw.is_empty()
    }

    /// True for a plain term without Boolean operators.
    pub fn is_simple(&self) -> bool {
        matches!(self.expr, Expr::Term(_))
    }

    /// Case-insensitive match against one text.
    pub fn matches(&self, text: &str) -> bool {
        self.expr.eval(&text.to_lowercase())
    }

    /// Match against several fields of one entity at once.
    ///
    /// `NOT` terms exclude the entity if any field contains them.
    pub fn matches_any<S: AsRef<str>>(&self, fields: &[S]) -> bool {
        let joined = fields
            .iter()
            .map(|f| f.as_ref().to_lowercase())
            .collect::<Vec<_>>()
            .join("\n");
        self.expr.eval(&joined)
    }

    /// Top-level `OR` branches as separate queries.
    ///
    /// Connectors that look up a single best entity per query run one
    /// lookup per alternative.
    pub fn alternatives(&self) -> Vec<SearchQuery> {
        match &self.expr {
            Expr::Or(parts) => {
                let spans = top_level_or_spans(&self.raw);
                parts
                    .iter()
                    .enumerate()
                    .map(|(i, p)| SearchQuery {
                        raw: match spans.get(i) {
                            Some(span) if spans.len() == parts.len() => span.to_string(),
                            _ => p.to_string(),
                        },
                        expr: p.clone(),
                    })
                    .collect()
            }
            _ => vec![self.clone()],
        }
    }

    /// The longest positive term, for sources that only support a plain
    /// text search. Results must still be filtered with [`Self::matches`].
    pub fn search_text(&self) -> String {
        let mut terms = Vec::new();
        self.expr.positive_terms(&mut terms);
        terms
            .into_iter()
            .max_by_key(|t| t.len())
            .map(String::from)
            .unwrap_or_else(|| self.normalized())
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_phrase() {
        let q = SearchQuery::parse("  Google   Ireland ");
        assert!(q.is_simple());
        assert_eq!(q.raw(), "Google   Ireland");
        assert_eq!(q.normalized(), "google ireland");
        assert!(q.matches("GOOGLE IRELAND LIMITED"));
        assert!(!q.matches("Google Germany"));
    }

    #[test]
    fn test_lowercase_operators_are_words() {
        let q = SearchQuery::parse("rock and roll");
        assert!(q.is_simple());
        assert!(q.matches("Rock and Roll Hall"));
    }

    #[test]
    fn test_or_and_not() {
        let q = SearchQuery::parse("(Shell OR BP) AND NOT \"Shell Foundation\"");
        assert!(q.matches("Shell plc"));
        assert!(q.matches("BP Europa SE"));
        assert!(!q.matches("The Shell Foundation"));
        assert!(!q.matches("TotalEnergies"));
    }

    #[test]
    fn test_implicit_and_between_groups() {
        let q = SearchQuery::parse("\"energy\" (gas OR oil)");
        assert!(q.matches("European gas energy forum"));
        assert!(!q.matches("energy efficiency"));
    }

    #[test]
    fn test_alternatives() {
        let q = SearchQuery::parse("Google OR Microsoft Corporation");
        let alts = q.alternatives();
        assert_eq!(alts.len(), 2);
        assert_eq!(alts[0].raw(), "Google");
        assert_eq!(alts[1].raw(), "Microsoft Corporation");
        assert!(alts[1].matches("Microsoft Corporation Ltd"));

        let single = SearchQuery::parse("Google AND Ireland");
        assert_eq!(single.alternatives().len(), 1);
    }

    #[test]
    fn test_alternatives_keep_typed_text() {
        let q = SearchQuery::parse("\"Shell OR BP\" OR (Total AND Energies) OR  BASF SE ");
        let raws: Vec<String> = q.alternatives().iter().map(|a| a.raw().to_string()).collect();
        assert_eq!(raws, vec!["\"Shell OR BP\"", "(Total AND Energies)", "BASF SE"]);

        // Fully parenthesised: no top-level split in the text, so the
        // rendered form is used.
        let wrapped = SearchQuery::parse("(Shell OR BP)");
        let alts = wrapped.alternatives();
        assert_eq!(alts.len(), 2);
        assert_eq!(alts[0].raw(), "shell");
    }

    #[test]
    fn test_cache_key_separates_phrase_from_boolean() {
        let phrase = SearchQuery::parse("shell or bp");
        let boolean = SearchQuery::parse("Shell  OR BP");
        assert_eq!(phrase.normalized(), "shell or bp");
        assert_eq!(boolean.normalized(), "(shell OR bp)");
        assert_eq!(
            boolean.normalized(),
            SearchQuery::parse("SHELL OR bp").normalized()
        );
    }

    #[test]
    fn test_search_text_picks_longest_positive() {
        let q = SearchQuery::parse("bayer AND NOT \"bayer foundation trust\" AND monsanto");
        assert_eq!(q.search_text(), "monsanto");
    }

    #[test]
    fn test_malformed_falls_back_to_literal() {
        let q = SearchQuery::parse("(Shell OR");
        assert!(q.is_simple());
        assert!(q.matches("the (shell or bp) question"));

        let unterminated = SearchQuery::parse("\"open quote");
        assert!(unterminated.is_simple());
    }

    #[test]
    fn test_matches_any_applies_not_across_fields() {
        let q = SearchQuery::parse("energy AND NOT nuclear");
        assert!(q.matches_any(&["Acme", "energy policy"]));
        assert!(!q.matches_any(&["Acme nuclear", "energy policy"]));
    }

    #[test]
    fn test_blank_matches_nothing() {
        let q = SearchQuery::parse("   ");
        assert!(q.is_blank());
        assert!(!q.matches("anything"));
    }
}
