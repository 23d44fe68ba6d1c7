//! Path pattern matching for access rules
//!
//! Patterns are split on `/` and matched segment by segment:
//!
//! - `literal` matches the same text (optionally ignoring case)
//! - `*` matches exactly one segment
//! - `**` matches all remaining segments, zero included; only allowed last
//! - `{name}` captures one segment under `name`
//! - anything mixing literals with `*`, `?` or `{name}` inside one segment
//!   (`*.css`, `file?.txt`, `{id}.json`) is compiled to an anchored regex;
//!   a variable may carry its own constraint, `{id:[0-9]+}`
//!
//! In case-insensitive mode literals are compared in lower case, but captured
//! values always keep the case of the incoming path.

use crate::error::PatternError;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Compiled path pattern
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    segments: Vec<Segment>,
    trailing_wildcard: bool,
    trailing_slash: bool,
    case_sensitive: bool,
}

#[derive(Debug, Clone)]
enum Segment {
    /// Stored lower-cased when the pattern is case-insensitive
    Literal(String),
    Wildcard,
    Variable(String),
    Glob {
        regex: Regex,
        /// Variable names in capture-group order (`v0`, `v1`, ...)
        variables: Vec<String>,
    },
}

/// Result of matching one path against a [`PathPattern`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    matched: bool,
    variables: HashMap<String, String>,
}

impl MatchResult {
    pub fn no_match() -> Self {
        Self::default()
    }

    /// A successful match that captured nothing
    pub fn any() -> Self {
        Self::matched(HashMap::new())
    }

    fn matched(variables: HashMap<String, String>) -> Self {
        Self {
            matched: true,
            variables,
        }
    }

    pub fn is_match(&self) -> bool {
        self.matched
    }

    /// Captured value for a variable, by its exact declared name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn variables(&self) -> &HashMap<String, String> {
        &self.variables
    }

    pub fn into_variables(self) -> HashMap<String, String> {
        self.variables
    }
}

impl PathPattern {
    /// Compile a pattern
    pub fn compile(pattern: &str, case_sensitive: bool) -> Result<Self, PatternError> {
        check_braces(pattern)?;

        let raw_segments: Vec<&str> = split_segments(pattern).collect();
        let mut segments = Vec::with_capacity(raw_segments.len());
        let mut seen = HashSet::new();
        let mut trailing_wildcard = false;

        for (index, raw) in raw_segments.iter().enumerate() {
            if *raw == "**" {
                if index + 1 != raw_segments.len() {
                    return Err(PatternError::MisplacedMultiWildcard {
                        pattern: pattern.to_string(),
                    });
                }
                trailing_wildcard = true;
                continue;
            }

            let segment = compile_segment(pattern, raw, case_sensitive)?;
            let names: &[String] = match &segment {
                Segment::Variable(name) => std::slice::from_ref(name),
                Segment::Glob { variables, .. } => variables,
                _ => &[],
            };
            for name in names {
                if !seen.insert(name.clone()) {
                    return Err(PatternError::DuplicateVariable {
                        pattern: pattern.to_string(),
                        name: name.clone(),
                    });
                }
            }
            segments.push(segment);
        }

        Ok(Self {
            source: pattern.to_string(),
            segments,
            trailing_wildcard,
            trailing_slash: has_trailing_slash(pattern),
            case_sensitive,
        })
    }

    /// Match a request path, capturing variables on success
    pub fn matches(&self, path: &str) -> MatchResult {
        let path_segments: Vec<&str> = split_segments(path).collect();

        if self.trailing_wildcard {
            if path_segments.len() < self.segments.len() {
                return MatchResult::no_match();
            }
        } else if path_segments.len() != self.segments.len()
            || self.trailing_slash != has_trailing_slash(path)
        {
            return MatchResult::no_match();
        }

        let mut variables = HashMap::new();
        for (segment, raw) in self.segments.iter().zip(&path_segments) {
            if !self.match_segment(segment, raw, &mut variables) {
                return MatchResult::no_match();
            }
        }

        MatchResult::matched(variables)
    }

    /// Shorthand when captured variables are not needed
    pub fn is_match(&self, path: &str) -> bool {
        self.matches(path).is_match()
    }

    fn match_segment(
        &self,
        segment: &Segment,
        raw: &str,
        variables: &mut HashMap<String, String>,
    ) -> bool {
        match segment {
            Segment::Literal(literal) => {
                if self.case_sensitive {
                    literal == raw
                } else {
                    *literal == raw.to_lowercase()
                }
            }
            Segment::Wildcard => true,
            Segment::Variable(name) => {
                variables.insert(name.clone(), raw.to_string());
                true
            }
            Segment::Glob {
                regex,
                variables: names,
            } => {
                let Some(captures) = regex.captures(raw) else {
                    return false;
                };
                for (index, name) in names.iter().enumerate() {
                    if let Some(value) = captures.name(&format!("v{}", index)) {
                        variables.insert(name.clone(), value.as_str().to_string());
                    }
                }
                true
            }
        }
    }

    /// Get the pattern source
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Names of all variables, in declaration order
    pub fn variable_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .flat_map(|segment| match segment {
                Segment::Variable(name) => vec![name.as_str()],
                Segment::Glob { variables, .. } => variables.iter().map(String::as_str).collect(),
                _ => Vec::new(),
            })
            .collect()
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn has_trailing_slash(path: &str) -> bool {
    path.ends_with('/') && split_segments(path).next().is_some()
}

fn check_braces(pattern: &str) -> Result<(), PatternError> {
    let mut depth: i32 = 0;
    for ch in pattern.chars() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    break;
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(PatternError::UnbalancedBraces {
            pattern: pattern.to_string(),
        });
    }
    Ok(())
}

fn compile_segment(pattern: &str, raw: &str, case_sensitive: bool) -> Result<Segment, PatternError> {
    if raw == "*" {
        return Ok(Segment::Wildcard);
    }

    // A plain `{name}` spanning the whole segment needs no regex
    if let Some(inner) = raw.strip_prefix('{').and_then(|r| r.strip_suffix('}'))
        && !inner.contains(['{', '}', ':'])
    {
        if inner.is_empty() {
            return Err(PatternError::EmptyVariable {
                pattern: pattern.to_string(),
            });
        }
        return Ok(Segment::Variable(inner.to_string()));
    }

    if raw.contains(['*', '?', '{']) {
        return compile_glob(pattern, raw, case_sensitive);
    }

    Ok(Segment::Literal(if case_sensitive {
        raw.to_string()
    } else {
        raw.to_lowercase()
    }))
}

fn compile_glob(pattern: &str, raw: &str, case_sensitive: bool) -> Result<Segment, PatternError> {
    let mut source = String::from(if case_sensitive { "^" } else { "(?i)^" });
    let mut variables = Vec::new();
    let mut literal = String::new();
    let mut chars = raw.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '*' | '?' | '{' => {
                source.push_str(&regex::escape(&literal));
                literal.clear();
            }
            _ => {
                literal.push(ch);
                continue;
            }
        }

        match ch {
            '*' => {
                if chars.peek() == Some(&'*') {
                    return Err(PatternError::MisplacedMultiWildcard {
                        pattern: pattern.to_string(),
                    });
                }
                source.push_str(".*");
            }
            '?' => source.push('.'),
            _ => {
                // Collect up to the matching brace; constraints may nest braces
                let mut depth = 1;
                let mut body = String::new();
                for c in chars.by_ref() {
                    match c {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    body.push(c);
                }
                if depth != 0 {
                    return Err(PatternError::UnbalancedBraces {
                        pattern: pattern.to_string(),
                    });
                }

                let (name, constraint) = match body.split_once(':') {
                    Some((name, constraint)) => (name, constraint),
                    None => (body.as_str(), ".*"),
                };
                if name.is_empty() {
                    return Err(PatternError::EmptyVariable {
                        pattern: pattern.to_string(),
                    });
                }
                Regex::new(constraint).map_err(|e| PatternError::InvalidConstraint {
                    name: name.to_string(),
                    reason: e.to_string(),
                })?;

                source.push_str(&format!("(?P<v{}>{})", variables.len(), constraint));
                variables.push(name.to_string());
            }
        }
    }
    source.push_str(&regex::escape(&literal));
    source.push('$');

    let regex = Regex::new(&source).map_err(|e| PatternError::InvalidConstraint {
        name: variables.last().cloned().unwrap_or_default(),
        reason: e.to_string(),
    })?;

    Ok(Segment::Glob { regex, variables })
}
