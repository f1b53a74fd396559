//! Route pattern compiler.
//!
//! Runs once per action at startup. The scanner is a three-state machine
//! (literal, placeholder type, placeholder name); literal runs are buffered and
//! escaped in one go when a placeholder or wildcard starts.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::error::CompileError;
use super::route::{ParamValue, ParamVec, RouteParameter};

const STRING_GROUP: &str = r"([0-9a-zA-Z\-_]+)";
const INT_GROUP: &str = r"([0-9]+)";
const WILDCARD_GROUP: &str = r"(?:[0-9a-zA-Z\-_./]+)?";

#[allow(clippy::expect_used)]
static PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/([0-9a-zA-Z\-_/]+)?$").expect("prefix regex is valid"));

/// Kind of a placeholder, which decides both its pattern group and the type
/// of the extracted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Int,
    String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDescriptor {
    pub name: Arc<str>,
    pub kind: ParamKind,
}

/// Output of [`compile`]. Immutable and shared for the process lifetime.
#[derive(Debug, Clone)]
pub struct CompiledRoute {
    prefix: String,
    template: String,
    full_path: String,
    pattern: Regex,
    params: Vec<ParamDescriptor>,
    is_generic: bool,
}

impl CompiledRoute {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Prefix joined with the template, e.g. `/shop/books/{int:id}.html`.
    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    pub fn params(&self) -> &[ParamDescriptor] {
        &self.params
    }

    /// True when the template holds a placeholder or a wildcard.
    pub fn is_generic(&self) -> bool {
        self.is_generic
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.pattern.is_match(path)
    }

    /// Match `path` and extract typed parameters in placeholder order.
    ///
    /// Returns `None` when the path does not match, or when an `int` value does
    /// not fit in an `i64`.
    pub fn captures(&self, path: &str) -> Option<ParamVec> {
        let caps = self.pattern.captures(path)?;
        let mut out = ParamVec::new();
        for (idx, desc) in self.params.iter().enumerate() {
            let raw = caps.get(idx + 1)?.as_str();
            let value = match desc.kind {
                ParamKind::Int => ParamValue::Int(raw.parse::<i64>().ok()?),
                ParamKind::String => ParamValue::Str(raw.to_owned()),
            };
            out.push(RouteParameter {
                name: Arc::clone(&desc.name),
                value,
            });
        }
        Some(out)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Literal,
    PlaceholderType,
    PlaceholderName,
}

/// Compile `prefix` + `template` into an anchored pattern.
///
/// The prefix is normalised to start with `/`. A `/` separator is inserted
/// unless the prefix already ends with one; an empty template yields the prefix
/// alone.
pub fn compile(prefix: &str, template: &str) -> Result<CompiledRoute, CompileError> {
    let prefix = normalize_prefix(prefix);
    if !PREFIX_RE.is_match(&prefix) {
        return Err(CompileError::InvalidPrefix { prefix });
    }

    let full_path = join_path(&prefix, template);
    if template.starts_with('/') {
        return Err(CompileError::InvalidTemplate {
            template: full_path,
            reason: "template must be relative to its prefix".to_string(),
        });
    }

    let base_len = full_path.len() - template.len();
    let mut pattern = String::with_capacity(full_path.len() * 2 + 2);
    pattern.push('^');
    pattern.push_str(&regex::escape(&full_path[..base_len]));

    let mut params: Vec<ParamDescriptor> = Vec::new();
    let mut is_generic = false;
    let mut state = ScanState::Literal;
    let mut literal = String::new();
    let mut type_buf = String::new();
    let mut name_buf = String::new();

    for (position, ch) in template.char_indices() {
        match (state, ch) {
            (ScanState::Literal, '{') => {
                flush_literal(&mut pattern, &mut literal);
                type_buf.clear();
                name_buf.clear();
                state = ScanState::PlaceholderType;
            }
            (ScanState::Literal, '}') => {
                return Err(CompileError::UnexpectedBrace {
                    template: full_path,
                    position,
                });
            }
            (ScanState::Literal, '*') => {
                flush_literal(&mut pattern, &mut literal);
                pattern.push_str(WILDCARD_GROUP);
                is_generic = true;
            }
            (ScanState::Literal, c) => {
                if !is_literal_char(c) {
                    return Err(CompileError::InvalidTemplate {
                        template: full_path,
                        reason: format!("character {c:?} is not allowed"),
                    });
                }
                literal.push(c);
            }
            (ScanState::PlaceholderType | ScanState::PlaceholderName, '{') => {
                return Err(CompileError::UnexpectedBrace {
                    template: full_path,
                    position,
                });
            }
            (ScanState::PlaceholderType, ':') => state = ScanState::PlaceholderName,
            (ScanState::PlaceholderType, '}') => {
                // `{name}`: what was read as the type is the name
                let name = std::mem::take(&mut type_buf);
                push_param(&mut pattern, &mut params, &full_path, name, ParamKind::String)?;
                is_generic = true;
                state = ScanState::Literal;
            }
            (ScanState::PlaceholderName, '}') => {
                let kind = if type_buf.eq_ignore_ascii_case("int") {
                    ParamKind::Int
                } else {
                    ParamKind::String
                };
                let name = std::mem::take(&mut name_buf);
                push_param(&mut pattern, &mut params, &full_path, name, kind)?;
                is_generic = true;
                state = ScanState::Literal;
            }
            (ScanState::PlaceholderType, c) => type_buf.push(c),
            (ScanState::PlaceholderName, c) => name_buf.push(c),
        }
    }

    if state != ScanState::Literal {
        return Err(CompileError::UnclosedPlaceholder {
            template: full_path,
        });
    }
    flush_literal(&mut pattern, &mut literal);
    pattern.push('$');

    let regex = Regex::new(&pattern).map_err(|e| CompileError::Pattern {
        template: full_path.clone(),
        message: e.to_string(),
    })?;

    debug!(
        full_path = %full_path,
        pattern = %pattern,
        param_count = params.len(),
        is_generic = is_generic,
        "Route compiled"
    );

    Ok(CompiledRoute {
        prefix,
        template: template.to_string(),
        full_path,
        pattern: regex,
        params,
        is_generic,
    })
}

fn normalize_prefix(prefix: &str) -> String {
    if prefix.starts_with('/') {
        prefix.to_string()
    } else {
        let mut out = String::with_capacity(prefix.len() + 1);
        out.push('/');
        out.push_str(prefix);
        out
    }
}

fn join_path(prefix: &str, template: &str) -> String {
    if template.is_empty() {
        return prefix.to_string();
    }
    let mut out = String::with_capacity(prefix.len() + template.len() + 1);
    out.push_str(prefix);
    if !prefix.ends_with('/') {
        out.push('/');
    }
    out.push_str(template);
    out
}

fn flush_literal(pattern: &mut String, literal: &mut String) {
    if !literal.is_empty() {
        pattern.push_str(&regex::escape(literal));
        literal.clear();
    }
}

fn is_literal_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '~' | ':')
}

fn push_param(
    pattern: &mut String,
    params: &mut Vec<ParamDescriptor>,
    template: &str,
    name: String,
    kind: ParamKind,
) -> Result<(), CompileError> {
    if name.is_empty() {
        return Err(CompileError::EmptyParamName {
            template: template.to_string(),
        });
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(CompileError::InvalidParamName {
            template: template.to_string(),
            name,
        });
    }
    if params.iter().any(|p| *p.name == *name) {
        return Err(CompileError::DuplicateParam {
            template: template.to_string(),
            name,
        });
    }
    pattern.push_str(match kind {
        ParamKind::Int => INT_GROUP,
        ParamKind::String => STRING_GROUP,
    });
    params.push(ParamDescriptor {
        name: Arc::from(name),
        kind,
    });
    Ok(())
}
