//! Static pre-execution inspection of snippet source

use std::fmt;

use super::table::{PolicyTable, is_ident_char};

/// What kind of table entry caused a rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    Module,
    Operation,
}

/// Why a snippet was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: RejectionKind,
    /// The forbidden token as it appears in the policy table
    pub token: String,
}

impl Rejection {
    fn module(token: &str) -> Self {
        Self {
            kind: RejectionKind::Module,
            token: token.to_string(),
        }
    }

    fn operation(token: String) -> Self {
        Self {
            kind: RejectionKind::Operation,
            token,
        }
    }

    /// Human-readable reason, returned to the caller through stderr
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RejectionKind::Module => write!(
                f,
                "Security Error: Module '{}' is not allowed for security reasons.",
                self.token
            ),
            RejectionKind::Operation => write!(
                f,
                "Security Error: Operation '{}' is not allowed for security reasons.",
                self.token
            ),
        }
    }
}

/// Outcome of validating one snippet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationVerdict {
    Allowed,
    Rejected(Rejection),
}

impl ValidationVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ValidationVerdict::Allowed)
    }
}

/// Check `source` against `policy`.
///
/// Scanning is case-insensitive. Import statements are checked first, in
/// source order, then call patterns in table order; the first hit wins.
/// Empty or whitespace-only source is allowed.
pub fn validate(source: &str, policy: &PolicyTable) -> ValidationVerdict {
    if source.trim().is_empty() {
        return ValidationVerdict::Allowed;
    }

    let lowered = source.to_lowercase();

    if let Some(module) = first_forbidden_import(&lowered, policy) {
        return ValidationVerdict::Rejected(Rejection::module(module));
    }

    for pattern in policy.patterns() {
        if pattern.find_in(&lowered).is_some() {
            return ValidationVerdict::Rejected(Rejection::operation(pattern.token()));
        }
    }

    ValidationVerdict::Allowed
}

impl PolicyTable {
    /// Shorthand for [`validate`] against this table
    pub fn validate(&self, source: &str) -> ValidationVerdict {
        validate(source, self)
    }
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Word(&'a str),
    Punct(char),
}

fn tokenize(source: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut word_start: Option<usize> = None;

    for (idx, c) in source.char_indices() {
        if is_ident_char(c) {
            word_start.get_or_insert(idx);
            continue;
        }
        if let Some(start) = word_start.take() {
            tokens.push(Token::Word(&source[start..idx]));
        }
        if !c.is_whitespace() {
            tokens.push(Token::Punct(c));
        }
    }
    if let Some(start) = word_start {
        tokens.push(Token::Word(&source[start..]));
    }

    tokens
}

/// Reads a dotted name (`a.b.c`) starting at `pos`.
fn dotted_name(tokens: &[Token<'_>], mut pos: usize) -> Option<(String, usize)> {
    let Some(Token::Word(first)) = tokens.get(pos) else {
        return None;
    };
    let mut name = first.to_string();
    pos += 1;

    while let (Some(Token::Punct('.')), Some(Token::Word(part))) =
        (tokens.get(pos), tokens.get(pos + 1))
    {
        name.push('.');
        name.push_str(part);
        pos += 2;
    }

    Some((name, pos))
}

/// Finds the first `import m` / `import a, m` / `from m import x` naming a
/// forbidden module. Statement position is not checked, so imports nested in
/// blocks or after `;` are seen too.
fn first_forbidden_import<'p>(lowered: &str, policy: &'p PolicyTable) -> Option<&'p str> {
    let tokens = tokenize(lowered);
    let mut pos = 0;

    while pos < tokens.len() {
        match tokens[pos] {
            Token::Word("from") => {
                pos += 1;
                let Some((module, next)) = dotted_name(&tokens, pos) else {
                    continue;
                };
                if let Some(hit) = policy.forbidden_module(&module) {
                    return Some(hit);
                }
                pos = next;
                // Names after `from m import` are attributes of `m`, not modules
                if tokens.get(pos) == Some(&Token::Word("import")) {
                    pos += 1;
                }
            }
            Token::Word("import") => {
                pos += 1;
                while let Some((module, next)) = dotted_name(&tokens, pos) {
                    if let Some(hit) = policy.forbidden_module(&module) {
                        return Some(hit);
                    }
                    pos = next;
                    if tokens.get(pos) == Some(&Token::Word("as")) {
                        pos += 2;
                    }
                    if tokens.get(pos) == Some(&Token::Punct(',')) {
                        pos += 1;
                    } else {
                        break;
                    }
                }
            }
            _ => pos += 1,
        }
    }

    None
}
