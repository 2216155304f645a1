//! Parameter interpolation for stage and hook commands.
//!
//! Commands may reference trigger parameters with `${name}`.
//!
//! # Syntax
//!
//! - `${parameter}` - replaced with the parameter value when `parameter` is a
//!   known trigger parameter
//! - `${ANYTHING_ELSE}` - left untouched, so the shell expands it from the
//!   stage environment (this is how credentials are referenced)
//! - `$${escaped}` - produces literal `${escaped}` in output
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use stagegate::config::expand_parameters;
//!
//! let mut params = BTreeMap::new();
//! params.insert("execution_key".to_string(), "RD-4".to_string());
//!
//! let cmd = expand_parameters("fetch --exec ${execution_key} --token ${JIRA_TOKEN}", &params);
//! assert_eq!(cmd, "fetch --exec RD-4 --token ${JIRA_TOKEN}");
//! ```

use std::collections::{BTreeMap, BTreeSet};

/// A segment of a command template.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Literal text
    Literal(String),
    /// Reference: ${name}
    Reference(String),
}

/// Split a command into literal text and `${name}` references.
///
/// An unterminated `${` is kept as literal text.
pub fn parse_template(input: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        literal.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if let Some(escaped) = tail.strip_prefix("$${") {
            // $${x} -> literal ${x}
            match escaped.find('}') {
                Some(end) => {
                    literal.push_str("${");
                    literal.push_str(&escaped[..=end]);
                    rest = &escaped[end + 1..];
                }
                None => {
                    literal.push_str(tail);
                    rest = "";
                }
            }
        } else if let Some(body) = tail.strip_prefix("${") {
            match body.find('}') {
                Some(end) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Reference(body[..end].to_string()));
                    rest = &body[end + 1..];
                }
                None => {
                    literal.push_str(tail);
                    rest = "";
                }
            }
        } else {
            literal.push('$');
            rest = &tail[1..];
        }
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    segments
}

/// All names referenced with `${...}` in a command.
pub fn referenced_names(input: &str) -> BTreeSet<String> {
    parse_template(input)
        .into_iter()
        .filter_map(|seg| match seg {
            Segment::Reference(name) => Some(name),
            Segment::Literal(_) => None,
        })
        .collect()
}

/// Substitute known parameters; leave every other reference for the shell.
pub fn expand_parameters(input: &str, parameters: &BTreeMap<String, String>) -> String {
    let mut result = String::with_capacity(input.len());

    for segment in parse_template(input) {
        match segment {
            Segment::Literal(text) => result.push_str(&text),
            Segment::Reference(name) => match parameters.get(&name) {
                Some(value) => result.push_str(value),
                None => {
                    result.push_str("${");
                    result.push_str(&name);
                    result.push('}');
                }
            },
        }
    }

    result
}
