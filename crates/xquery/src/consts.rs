//! Well-known namespace URIs used during name resolution and static checks.

/// Namespace for W3C-defined error codes (`err:` prefix).
pub const ERR_NS: &str = "http://www.w3.org/2005/xqt-errors";
/// Reserved `xml` namespace; the prefix binding cannot be changed.
pub const XML_URI: &str = "http://www.w3.org/XML/1998/namespace";
/// Namespace of namespace declaration attributes; never bindable.
pub const XMLNS_URI: &str = "http://www.w3.org/2000/xmlns/";
/// XML Schema namespace (`xs:` prefix).
pub const XS_NS: &str = "http://www.w3.org/2001/XMLSchema";
/// XML Schema instance namespace (`xsi:` prefix).
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
/// Default function namespace (`fn:` prefix).
pub const FNS: &str = "http://www.w3.org/2005/xpath-functions";
/// Math function namespace.
pub const MATH_NS: &str = "http://www.w3.org/2005/xpath-functions/math";
/// Namespace for functions declared with the `local:` prefix.
pub const LOCAL_NS: &str = "http://www.w3.org/2005/xquery-local-functions";
/// Namespace of the built-in annotations (`%public`, `%private`).
pub const XQUERY_NS: &str = "http://www.w3.org/2012/xquery";
/// Namespace of unprefixed option declarations.
pub const OPTIONS_NS: &str = "http://www.w3.org/2011/xquery-options";
/// Unicode codepoint collation, always statically known.
pub const CODEPOINT_COLLATION: &str = "http://www.w3.org/2005/xpath-functions/collation/codepoint";

/// Namespaces in which user code may not declare functions or annotations.
pub const RESERVED_NAMESPACES: &[&str] = &[XML_URI, XS_NS, XSI_NS, FNS, MATH_NS, XQUERY_NS];

/// Language versions accepted in a version declaration.
pub const SUPPORTED_VERSIONS: &[&str] = &["1.0", "3.0", "3.1"];
