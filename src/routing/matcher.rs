//! Request condition matching.
//!
//! # Responsibilities
//! - Match host header (exact match, case-insensitive, port ignored)
//! - Match HTTP method against a route's allowed set
//!
//! # Design Decisions
//! - Host matching is case-insensitive (RFC 9110)
//! - Empty condition = always matches (wildcard)

use axum::http::Method;

/// Matches the Host header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostMatcher {
    expected_host: String,
}

impl HostMatcher {
    /// Create a new host matcher.
    /// The host is normalized to lowercase for case-insensitive matching.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            expected_host: host.into().to_lowercase(),
        }
    }

    pub fn host(&self) -> &str {
        &self.expected_host
    }

    pub fn matches(&self, host: Option<&str>) -> bool {
        host.map(strip_port)
            .map(|h| h.eq_ignore_ascii_case(&self.expected_host))
            .unwrap_or(false)
    }
}

/// Matches the request method. An empty set accepts every method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodMatcher {
    methods: Vec<Method>,
}

impl MethodMatcher {
    /// Parse method names case-insensitively. Returns the offending name on
    /// failure.
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self, String> {
        let mut methods = Vec::with_capacity(names.len());
        for name in names {
            let upper = name.as_ref().trim().to_ascii_uppercase();
            let method = Method::from_bytes(upper.as_bytes())
                .map_err(|_| name.as_ref().to_string())?;
            if !methods.contains(&method) {
                methods.push(method);
            }
        }
        Ok(Self { methods })
    }

    pub fn matches(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }

    /// True if some method is accepted by both matchers.
    pub fn overlaps(&self, other: &MethodMatcher) -> bool {
        self.methods.is_empty()
            || other.methods.is_empty()
            || self.methods.iter().any(|m| other.methods.contains(m))
    }
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literals keep their colons.
    if let Some(end) = host.find(']') {
        return &host[..=end];
    }
    host.split(':').next().unwrap_or(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_matcher() {
        let matcher = HostMatcher::new("example.com");

        assert!(matcher.matches(Some("example.com")));
        assert!(matcher.matches(Some("EXAMPLE.COM"))); // Case insensitive
        assert!(matcher.matches(Some("example.com:8080")));
        assert!(!matcher.matches(Some("other.com")));
        assert!(!matcher.matches(None));
    }

    #[test]
    fn test_method_matcher() {
        let any = MethodMatcher::parse::<&str>(&[]).unwrap();
        assert!(any.matches(&Method::DELETE));

        let get = MethodMatcher::parse(&["get", "Head"]).unwrap();
        assert!(get.matches(&Method::GET));
        assert!(get.matches(&Method::HEAD));
        assert!(!get.matches(&Method::POST));

        assert!(MethodMatcher::parse(&["NOT A METHOD"]).is_err());
    }

    #[test]
    fn test_method_overlap() {
        let get = MethodMatcher::parse(&["GET"]).unwrap();
        let post = MethodMatcher::parse(&["POST"]).unwrap();
        let any = MethodMatcher::default();

        assert!(!get.overlaps(&post));
        assert!(get.overlaps(&any));
        assert!(any.overlaps(&post));
    }
}
