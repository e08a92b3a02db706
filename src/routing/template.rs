//! Path templates.
//!
//! # Grammar
//! ```text
//! /orders/{id}          literal + single-segment parameter
//! /files/{*rest}        catch-all, last segment only, zero or more segments
//! ```
//!
//! # Design Decisions
//! - Literal segments compare case-sensitively
//! - Empty segments (repeated or trailing slashes) are ignored on both sides
//! - A segment is either fully literal or fully a placeholder; `file.{ext}`
//!   is rejected rather than half-matched

use thiserror::Error;

/// Captured placeholder values, in template order.
pub type Params = Vec<(String, String)>;

/// Look up a captured parameter by name.
pub fn param<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template must start with '/': {0:?}")]
    MissingLeadingSlash(String),

    #[error("invalid template segment {0:?}")]
    InvalidSegment(String),

    #[error("catch-all {{*{0}}} must be the last segment")]
    CatchAllNotLast(String),

    #[error("placeholder {{{0}}} appears more than once")]
    DuplicatePlaceholder(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    CatchAll(String),
}

/// What a template holds at one segment position, least specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum SegmentKind {
    CatchAll,
    Param,
    Literal,
    /// The template ends here without a catch-all.
    End,
}

/// Specificity of a template, compared segment by segment from the left:
/// literal beats parameter beats catch-all, and ending exactly beats a
/// catch-all that would match nothing. Greater is more specific.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TemplateRank(Vec<SegmentKind>);

/// A parsed path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        if !raw.starts_with('/') {
            return Err(TemplateError::MissingLeadingSlash(raw.to_string()));
        }

        let parts: Vec<&str> = split_path(raw).collect();
        let mut segments = Vec::with_capacity(parts.len());
        let mut seen: Vec<&str> = Vec::new();

        for (i, part) in parts.iter().enumerate() {
            let segment = match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(inner) => {
                    let (catch_all, name) = match inner.strip_prefix('*') {
                        Some(name) => (true, name),
                        None => (false, inner),
                    };
                    if !is_valid_name(name) {
                        return Err(TemplateError::InvalidSegment(part.to_string()));
                    }
                    if seen.contains(&name) {
                        return Err(TemplateError::DuplicatePlaceholder(name.to_string()));
                    }
                    seen.push(name);
                    if catch_all {
                        if i + 1 != parts.len() {
                            return Err(TemplateError::CatchAllNotLast(name.to_string()));
                        }
                        Segment::CatchAll(name.to_string())
                    } else {
                        Segment::Param(name.to_string())
                    }
                }
                None => {
                    if part.contains('{') || part.contains('}') {
                        return Err(TemplateError::InvalidSegment(part.to_string()));
                    }
                    Segment::Literal(part.to_string())
                }
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The template as written in the route definition.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Placeholder names, in order.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(n) | Segment::CatchAll(n) => Some(n.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Template with placeholder names erased, so `/o/{id}` and `/o/{oid}`
    /// compare equal.
    pub fn shape(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            match segment {
                Segment::Literal(l) => out.push_str(l),
                Segment::Param(_) => out.push_str("{}"),
                Segment::CatchAll(_) => out.push_str("{*}"),
            }
        }
        if out.is_empty() {
            out.push('/');
        }
        out
    }

    /// Match a request path, returning captured parameters on success.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let parts: Vec<&str> = split_path(path).collect();
        let mut params = Params::new();

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(l) => {
                    if parts.get(i) != Some(&l.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = parts.get(i)?;
                    params.push((name.clone(), (*value).to_string()));
                }
                Segment::CatchAll(name) => {
                    let rest = parts.get(i..).unwrap_or_default().join("/");
                    params.push((name.clone(), rest));
                    return Some(params);
                }
            }
        }

        if parts.len() == self.segments.len() {
            Some(params)
        } else {
            None
        }
    }

    /// Specificity used to order templates that match the same path.
    pub fn rank(&self) -> TemplateRank {
        let mut kinds: Vec<SegmentKind> = self
            .segments
            .iter()
            .map(|s| match s {
                Segment::Literal(_) => SegmentKind::Literal,
                Segment::Param(_) => SegmentKind::Param,
                Segment::CatchAll(_) => SegmentKind::CatchAll,
            })
            .collect();
        if !matches!(self.segments.last(), Some(Segment::CatchAll(_))) {
            kinds.push(SegmentKind::End);
        }
        TemplateRank(kinds)
    }

    /// Substitute captured parameters into this template.
    ///
    /// Returns `None` if a placeholder has no captured value.
    pub fn expand(&self, params: &Params) -> Option<String> {
        let mut out = String::new();
        for segment in &self.segments {
            let value = match segment {
                Segment::Literal(l) => l.as_str(),
                Segment::Param(name) | Segment::CatchAll(name) => param(params, name)?,
            };
            if value.is_empty() {
                continue;
            }
            out.push('/');
            out.push_str(value);
        }
        if out.is_empty() {
            out.push('/');
        }
        Some(out)
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
