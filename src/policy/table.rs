//! Forbidden-token tables used by the validator

use std::fmt;

/// Modules whose import is refused by the reference policy.
const REFERENCE_MODULES: &[&str] = &[
    // Filesystem and interpreter internals
    "os",
    "sys",
    "shutil",
    "pathlib",
    // Process spawning
    "subprocess",
    "multiprocessing",
    "pty",
    // Network
    "socket",
    "urllib",
    "requests",
    "http",
    // Escape hatches
    "ctypes",
    "importlib",
    "builtins",
];

/// How a forbidden name has to appear in the source to count as a use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// `name(` - a direct call, whitespace before the parenthesis allowed
    Call,
    /// `name.` - attribute access on a module-like name
    Attribute,
    /// `name` - any standalone occurrence
    Bare,
}

/// A forbidden call or attribute pattern, e.g. `open(` or `os.`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallPattern {
    name: String,
    kind: PatternKind,
}

impl CallPattern {
    pub fn new(name: &str, kind: PatternKind) -> Self {
        Self {
            name: name.trim().to_lowercase(),
            kind,
        }
    }

    pub fn call(name: &str) -> Self {
        Self::new(name, PatternKind::Call)
    }

    pub fn attribute(name: &str) -> Self {
        Self::new(name, PatternKind::Attribute)
    }

    pub fn bare(name: &str) -> Self {
        Self::new(name, PatternKind::Bare)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    /// Token as quoted in rejection messages (`open(`, `os.`, `__import__`)
    pub fn token(&self) -> String {
        match self.kind {
            PatternKind::Call => format!("{}(", self.name),
            PatternKind::Attribute => format!("{}.", self.name),
            PatternKind::Bare => self.name.clone(),
        }
    }

    /// Byte offset of the first use of this pattern in `lowered`.
    ///
    /// `lowered` must already be lower-cased. A hit only counts when the name
    /// is not the tail of a longer identifier or of a dotted path, so
    /// `profile(` does not trip `file(` and `re.compile(` does not trip
    /// `compile(`.
    pub(crate) fn find_in(&self, lowered: &str) -> Option<usize> {
        if self.name.is_empty() {
            return None;
        }

        for (idx, _) in lowered.match_indices(self.name.as_str()) {
            let before = lowered[..idx].chars().next_back();
            if before.is_some_and(|c| is_ident_char(c) || c == '.') {
                continue;
            }

            let rest = &lowered[idx + self.name.len()..];
            let hit = match self.kind {
                PatternKind::Call => rest.trim_start().starts_with('('),
                PatternKind::Attribute => rest.trim_start().starts_with('.'),
                PatternKind::Bare => !rest.chars().next().is_some_and(is_ident_char),
            };
            if hit {
                return Some(idx);
            }
        }

        None
    }
}

impl fmt::Display for CallPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Configurable set of forbidden imports and call patterns.
///
/// Matching is purely textual. The table is a first, cheap filter that turns
/// away obviously dangerous snippets; it does not stand in for the process
/// isolation applied by the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    modules: Vec<String>,
    patterns: Vec<CallPattern>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::reference()
    }
}

impl PolicyTable {
    /// Table that forbids nothing
    pub fn empty() -> Self {
        Self {
            modules: Vec::new(),
            patterns: Vec::new(),
        }
    }

    /// Reference deny list: filesystem, process, network and dynamic
    /// evaluation primitives.
    pub fn reference() -> Self {
        let mut table = Self::empty();
        for module in REFERENCE_MODULES {
            table = table.forbid_module(module);
        }

        table
            .forbid_pattern(CallPattern::call("open"))
            .forbid_pattern(CallPattern::call("file"))
            .forbid_pattern(CallPattern::attribute("os"))
            .forbid_pattern(CallPattern::attribute("sys"))
            .forbid_pattern(CallPattern::attribute("subprocess"))
            .forbid_pattern(CallPattern::attribute("shutil"))
            .forbid_pattern(CallPattern::bare("__import__"))
            .forbid_pattern(CallPattern::bare("__builtins__"))
            .forbid_pattern(CallPattern::call("eval"))
            .forbid_pattern(CallPattern::call("exec"))
            .forbid_pattern(CallPattern::call("compile"))
            .forbid_pattern(CallPattern::call("input"))
            .forbid_pattern(CallPattern::call("raw_input"))
    }

    /// Forbid importing `module` (and any of its submodules)
    pub fn forbid_module(mut self, module: &str) -> Self {
        let module = module.trim().to_lowercase();
        if !module.is_empty() && !self.modules.contains(&module) {
            self.modules.push(module);
        }
        self
    }

    /// Forbid a call or attribute pattern
    pub fn forbid_pattern(mut self, pattern: CallPattern) -> Self {
        if !pattern.name().is_empty() && !self.patterns.contains(&pattern) {
            self.patterns.push(pattern);
        }
        self
    }

    /// Forbidden modules, in insertion order
    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(String::as_str)
    }

    /// Forbidden call patterns, in insertion order
    pub fn patterns(&self) -> &[CallPattern] {
        &self.patterns
    }

    /// Number of entries in the table
    pub fn len(&self) -> usize {
        self.modules.len() + self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the forbidden entry covering the dotted module path, if any.
    ///
    /// `os.path` is covered by `os`; `osmosis` is not.
    pub fn forbidden_module(&self, dotted: &str) -> Option<&str> {
        self.modules
            .iter()
            .find(|m| {
                dotted == m.as_str()
                    || dotted
                        .strip_prefix(m.as_str())
                        .is_some_and(|rest| rest.starts_with('.'))
            })
            .map(String::as_str)
    }
}
