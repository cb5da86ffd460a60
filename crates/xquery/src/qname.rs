use crate::lexer::chars::{is_name_char, is_name_start_char};
use serde::Serialize;
use std::fmt;

/// A namespace-resolved name: namespace URI (absent for no namespace) plus local part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ExpandedName {
    pub ns_uri: Option<String>,
    pub local: String,
}

impl ExpandedName {
    pub fn new(ns_uri: Option<String>, local: impl Into<String>) -> Self {
        Self { ns_uri, local: local.into() }
    }

    pub fn in_ns(ns_uri: &str, local: impl Into<String>) -> Self {
        Self::new(Some(ns_uri.to_string()), local)
    }
}

impl fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ns_uri {
            Some(ns) => write!(f, "Q{{{}}}{}", ns, self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// Whether a lexical name is resolved as an element-like or attribute name.
/// Element naming applies the default element namespace to unprefixed names;
/// attribute naming never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Element,
    Attribute,
}

/// A lexical QName as written in the source, optionally carrying the
/// namespace it resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
    /// Set for `Q{uri}local` names and after resolution.
    pub ns_uri: Option<String>,
}

impl QName {
    /// Split `prefix:local`, `local` or `Q{uri}local`. Returns `None` when the
    /// text is not a lexically valid name.
    pub fn parse(text: &str) -> Option<QName> {
        if let Some(rest) = text.strip_prefix("Q{") {
            let (uri, local) = rest.split_once('}')?;
            if !is_ncname(local) {
                return None;
            }
            return Some(QName { prefix: None, local: local.to_string(), ns_uri: Some(uri.to_string()) });
        }
        match text.split_once(':') {
            Some((prefix, local)) if is_ncname(prefix) && is_ncname(local) => {
                Some(QName { prefix: Some(prefix.to_string()), local: local.to_string(), ns_uri: None })
            }
            Some(_) => None,
            None if is_ncname(text) => Some(QName { prefix: None, local: text.to_string(), ns_uri: None }),
            None => None,
        }
    }

    /// True for `Q{uri}local` names, which need no prefix resolution.
    pub fn is_braced(&self) -> bool {
        self.prefix.is_none() && self.ns_uri.is_some()
    }

    pub fn lexical(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{}:{}", p, self.local),
            None => self.local.clone(),
        }
    }
}

pub fn is_ncname(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_name_start_char(c) => chars.all(is_name_char),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::plain("foo", None, "foo")]
    #[case::prefixed("p:foo", Some("p"), "foo")]
    #[case::dashed("my-name.x", None, "my-name.x")]
    fn parses_lexical_names(#[case] text: &str, #[case] prefix: Option<&str>, #[case] local: &str) {
        let q = QName::parse(text).expect("valid name");
        assert_eq!(q.prefix.as_deref(), prefix);
        assert_eq!(q.local, local);
    }

    #[rstest]
    #[case::empty("")]
    #[case::digit_start("1abc")]
    #[case::double_colon("a:b:c")]
    #[case::trailing_colon("a:")]
    fn rejects_invalid_names(#[case] text: &str) {
        assert!(QName::parse(text).is_none());
    }

    #[test]
    fn braced_uri_names_carry_namespace() {
        let q = QName::parse("Q{urn:test}item").expect("valid name");
        assert!(q.is_braced());
        assert_eq!(q.ns_uri.as_deref(), Some("urn:test"));
        assert_eq!(q.local, "item");
    }
}
