//! Query classification and the glob pattern matcher.

/// The lookup mode a raw query string selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    /// Plain headword lookup.
    Simple,
    /// Leading `/`: fuzzy (edit-distance) lookup.
    Fuzzy,
    /// Unescaped `*` or `?` present: glob pattern lookup.
    Regexp,
    /// Leading `|`: full-text search over record bodies.
    Data,
}

/// Classify a raw query and strip its mode prefix and escape characters.
///
/// A leading `/` or `|` selects fuzzy or data mode and is removed.
/// Otherwise the string is scanned: `\X` contributes `X` verbatim, and any
/// unescaped `*` or `?` turns the query into a glob pattern. The returned
/// payload has the escape prefixes removed.
pub fn analyze_query(query: &str) -> (QueryType, String) {
    if query.is_empty() {
        return (QueryType::Simple, String::new());
    }
    if let Some(rest) = query.strip_prefix('/') {
        return (QueryType::Fuzzy, rest.to_string());
    }
    if let Some(rest) = query.strip_prefix('|') {
        return (QueryType::Data, rest.to_string());
    }

    let mut payload = String::with_capacity(query.len());
    let mut is_pattern = false;
    let mut chars = query.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some(escaped) => payload.push(escaped),
                None => break,
            }
            continue;
        }
        if ch == '*' || ch == '?' {
            is_pattern = true;
        }
        payload.push(ch);
    }

    if is_pattern {
        (QueryType::Regexp, payload)
    } else {
        (QueryType::Simple, payload)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    /// `*`: any run of characters, including none.
    AnyRun,
    /// `?`: exactly one character.
    AnyOne,
    Literal(char),
}

/// A compiled glob pattern: `*` matches any run, `?` matches one character,
/// `\` makes the next character literal.
///
/// Matching is anchored at the start of the headword only: once the whole
/// pattern has been consumed the headword may continue, so `*est` finds
/// `testing` as well as `rest`.
#[derive(Debug, Clone)]
pub struct Pattern {
    tokens: Vec<Token>,
}

impl Pattern {
    pub fn new(pattern: &str) -> Self {
        let mut tokens = Vec::with_capacity(pattern.len());
        let mut chars = pattern.chars();
        while let Some(ch) = chars.next() {
            match ch {
                '*' => {
                    // Collapse star runs; they are equivalent.
                    if tokens.last() != Some(&Token::AnyRun) {
                        tokens.push(Token::AnyRun);
                    }
                }
                '?' => tokens.push(Token::AnyOne),
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        tokens.push(Token::Literal(escaped));
                    }
                }
                other => tokens.push(Token::Literal(other)),
            }
        }
        Pattern { tokens }
    }

    /// Match against `text`, anchored at the start.
    pub fn matches(&self, text: &str) -> bool {
        let text: Vec<char> = text.chars().collect();

        // Two-pointer scan with backtracking to the most recent star.
        let mut t = 0usize;
        let mut p = 0usize;
        let mut star: Option<(usize, usize)> = None;

        while t < text.len() {
            if p == self.tokens.len() {
                // Pattern consumed; the rest of the headword is free.
                return true;
            }
            match self.tokens.get(p) {
                Some(Token::Literal(ch)) if *ch == text[t] => {
                    p += 1;
                    t += 1;
                }
                Some(Token::AnyOne) => {
                    p += 1;
                    t += 1;
                }
                Some(Token::AnyRun) => {
                    star = Some((p, t));
                    p += 1;
                }
                _ => match star {
                    Some((star_p, star_t)) => {
                        // Let the star swallow one more character and retry.
                        star = Some((star_p, star_t + 1));
                        p = star_p + 1;
                        t = star_t + 1;
                    }
                    None => return false,
                },
            }
        }
        self.tokens[p..].iter().all(|tok| *tok == Token::AnyRun)
    }
}
