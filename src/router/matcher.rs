//! Route template compilation.
//!
//! A template such as `/todos/{id}` becomes the anchored pattern
//! `^/todos/([^/]+)$` plus the ordered parameter names `["id"]`. Literal text is
//! regex-escaped so `/v1.0/items` only matches a literal dot. Malformed templates
//! are rejected here, at registration time.

use regex::Regex;
use std::sync::Arc;
use thiserror::Error;

use super::core::{ParamVec, PathParams};

/// Reasons a route template or registration is rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("route template must start with '/': {template:?}")]
    MissingLeadingSlash { template: String },
    #[error("unbalanced '{{' or '}}' at byte {position} in {template:?}")]
    UnbalancedBrace { template: String, position: usize },
    #[error("empty parameter name at byte {position} in {template:?}")]
    EmptyParamName { template: String, position: usize },
    #[error("invalid parameter name {name:?} in {template:?}")]
    InvalidParamName { template: String, name: String },
    #[error("compiled pattern rejected for {template:?}: {reason}")]
    Pattern { template: String, reason: String },
}

/// A compiled route template.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    template: String,
    regex: Regex,
    param_names: Vec<Arc<str>>,
}

impl PathMatcher {
    /// Compile `template` into a matcher.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError`] for templates that do not start with `/`, that
    /// contain unbalanced or nested braces, or whose placeholder names are empty
    /// or contain anything other than ASCII alphanumerics and `_`.
    pub fn compile(template: &str) -> Result<Self, RouteError> {
        if !template.starts_with('/') {
            return Err(RouteError::MissingLeadingSlash {
                template: template.to_string(),
            });
        }

        let mut pattern = String::with_capacity(template.len() + 16);
        pattern.push('^');
        let mut param_names: Vec<Arc<str>> = Vec::with_capacity(template.matches('{').count());
        let mut literal_start = 0;
        let mut open: Option<usize> = None;

        for (pos, ch) in template.char_indices() {
            match (ch, open) {
                ('{', None) => {
                    pattern.push_str(&regex::escape(&template[literal_start..pos]));
                    open = Some(pos);
                }
                ('{', Some(_)) | ('}', None) => {
                    return Err(RouteError::UnbalancedBrace {
                        template: template.to_string(),
                        position: pos,
                    });
                }
                ('}', Some(start)) => {
                    let name = &template[start + 1..pos];
                    validate_name(template, name, start)?;
                    pattern.push_str("([^/]+)");
                    param_names.push(Arc::from(name));
                    open = None;
                    literal_start = pos + 1;
                }
                _ => {}
            }
        }

        if let Some(start) = open {
            return Err(RouteError::UnbalancedBrace {
                template: template.to_string(),
                position: start,
            });
        }

        pattern.push_str(&regex::escape(&template[literal_start..]));
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|e| RouteError::Pattern {
            template: template.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            template: template.to_string(),
            regex,
            param_names,
        })
    }

    /// The template this matcher was compiled from.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Declared parameter names in template order, duplicates included.
    #[must_use]
    pub fn param_names(&self) -> &[Arc<str>] {
        &self.param_names
    }

    #[must_use]
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Match `path` and return the captured values paired with their names in
    /// declared order, or `None` when the path does not match the whole pattern.
    #[must_use]
    pub fn captures(&self, path: &str) -> Option<PathParams> {
        let caps = self.regex.captures(path)?;
        let mut params = ParamVec::new();
        for (i, name) in self.param_names.iter().enumerate() {
            let value = caps.get(i + 1).map(|m| m.as_str()).unwrap_or_default();
            params.push((Arc::clone(name), value.to_string()));
        }
        Some(PathParams::from(params))
    }
}

fn validate_name(template: &str, name: &str, start: usize) -> Result<(), RouteError> {
    if name.is_empty() {
        return Err(RouteError::EmptyParamName {
            template: template.to_string(),
            position: start,
        });
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(RouteError::InvalidParamName {
            template: template.to_string(),
            name: name.to_string(),
        });
    }
    Ok(())
}
