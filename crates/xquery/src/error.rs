use crate::consts::ERR_NS;
use crate::lexer::Position;
use crate::qname::ExpandedName;
use core::fmt;
use std::sync::Arc;

macro_rules! error_codes {
    ($($(#[$doc:meta])* $code:ident,)*) => {
        /// Error codes raised while recognizing and compiling a module.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[allow(clippy::upper_case_acronyms)]
        pub enum ErrorCode {
            $($(#[$doc])* $code,)*
            Unknown,
        }

        impl ErrorCode {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(ErrorCode::$code => concat!("err:", stringify!($code)),)*
                    ErrorCode::Unknown => "err:UNKNOWN",
                }
            }

            pub fn from_code(s: &str) -> Self {
                match s.strip_prefix("err:").unwrap_or(s) {
                    $(stringify!($code) => ErrorCode::$code,)*
                    _ => ErrorCode::Unknown,
                }
            }
        }
    };
}

error_codes! {
    /// Syntax error.
    XPST0003,
    /// Unbound variable or undeclared type name.
    XPST0008,
    /// Unknown function name or arity.
    XPST0017,
    /// Unknown atomic type in a sequence type or cast.
    XPST0051,
    /// Cast to `xs:NOTATION` or `xs:anyAtomicType`.
    XPST0080,
    /// Unbound namespace prefix.
    XPST0081,
    /// Schema import is not supported.
    XQST0009,
    /// Namespace declaration attribute value is not a literal.
    XQST0022,
    /// Unsupported language version.
    XQST0031,
    /// More than one base-uri declaration.
    XQST0032,
    /// Duplicate namespace prefix declaration.
    XQST0033,
    /// Duplicate function declaration.
    XQST0034,
    /// Duplicate or unknown default collation.
    XQST0038,
    /// Duplicate parameter name.
    XQST0039,
    /// Duplicate attribute name in a direct element constructor.
    XQST0040,
    /// Function or annotation in a reserved namespace.
    XQST0045,
    /// Two imports of the same module namespace.
    XQST0047,
    /// Library module export outside the module namespace.
    XQST0048,
    /// Duplicate variable declaration.
    XQST0049,
    /// More than one copy-namespaces declaration.
    XQST0055,
    /// Module could not be loaded.
    XQST0059,
    /// Declared function name has no namespace.
    XQST0060,
    /// More than one ordering mode declaration.
    XQST0065,
    /// More than one default element or function namespace declaration.
    XQST0066,
    /// More than one construction declaration.
    XQST0067,
    /// More than one boundary-space declaration.
    XQST0068,
    /// More than one empty-order declaration.
    XQST0069,
    /// Rebinding of the `xml` or `xmlns` prefix.
    XQST0070,
    /// Duplicate namespace declaration attribute.
    XQST0071,
    /// Unknown collation in an `order by` or `group by` spec.
    XQST0076,
    /// Empty namespace URI in a prefix binding.
    XQST0085,
    /// Invalid encoding name.
    XQST0087,
    /// Empty target namespace in a module import.
    XQST0088,
    /// Positional variable has the same name as its range variable.
    XQST0089,
    /// Grouping variable is not bound by a preceding clause.
    XQST0094,
    /// More than one context item declaration.
    XQST0099,
    /// Conflicting visibility annotations.
    XQST0106,
    /// Closing tag does not match the open tag.
    XQST0118,
    /// Processing-instruction content contains `?>`.
    XQDY0026,
    /// Computed attribute named `xmlns` or in the xmlns namespace.
    XQDY0044,
    /// Processing-instruction target named `xml`.
    XQDY0064,
}

impl ErrorCode {
    pub fn qname(&self) -> ExpandedName {
        let local = self.as_str().trim_start_matches("err:");
        ExpandedName::new(Some(ERR_NS.to_string()), local)
    }
}

/// A static error with its W3C code, message and optional source position.
#[derive(Debug, Clone, thiserror::Error)]
pub struct Error {
    pub code: ExpandedName,
    pub message: String,
    pub position: Option<Position>,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn new_qname(code: ExpandedName, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), position: None, source: None }
    }

    pub fn from_code(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self::new_qname(code.qname(), msg)
    }

    /// Syntax error at a source position.
    pub fn syntax(msg: impl Into<String>, position: Position) -> Self {
        Self::from_code(ErrorCode::XPST0003, msg).at(position)
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    /// Attach a position only if the error does not carry one yet.
    pub fn or_at(mut self, position: Position) -> Self {
        if self.position.is_none() {
            self.position = Some(position);
        }
        self
    }

    pub fn with_source(mut self, source: impl Into<Option<Arc<dyn std::error::Error + Send + Sync>>>) -> Self {
        self.source = source.into();
        self
    }

    pub fn code_enum(&self) -> ErrorCode {
        if self.code.ns_uri.as_deref() == Some(ERR_NS) {
            ErrorCode::from_code(&self.code.local)
        } else {
            ErrorCode::Unknown
        }
    }

    /// Human-readable code: `err:LOCAL` for W3C codes, `Q{ns}local` otherwise.
    pub fn format_code(&self) -> String {
        if self.code.ns_uri.as_deref() == Some(ERR_NS) {
            format!("err:{}", self.code.local)
        } else if let Some(ns) = &self.code.ns_uri {
            format!("Q{{{}}}{}", ns, self.code.local)
        } else {
            self.code.local.clone()
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_code())?;
        if let Some(pos) = self.position {
            write!(f, " [at line {}, column {}]", pos.line, pos.column)?;
        }
        write!(f, ": {}", self.message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_roundtrips_through_qname() {
        let err = Error::from_code(ErrorCode::XQST0033, "duplicate prefix");
        assert_eq!(err.code_enum(), ErrorCode::XQST0033);
        assert_eq!(err.format_code(), "err:XQST0033");
    }

    #[test]
    fn display_includes_position() {
        let err = Error::syntax("unexpected token", Position { line: 3, column: 7 });
        assert_eq!(err.to_string(), "err:XPST0003 [at line 3, column 7]: unexpected token");
    }

    #[test]
    fn foreign_codes_are_unknown() {
        let err = Error::new_qname(ExpandedName::new(Some("urn:x".into()), "E1"), "boom");
        assert_eq!(err.code_enum(), ErrorCode::Unknown);
        assert_eq!(err.format_code(), "Q{urn:x}E1");
    }
}
