use platynui_xquery::{DeclScanner, ScanError, parse_module, sniff_encoding, sniff_encoding_bytes};
use rstest::rstest;

#[rstest]
#[case::quoted(r#"xquery version "3.1" encoding "UTF-16"; 1"#, Some("UTF-16"))]
#[case::doubled_quotes(r#"xquery version "1.0" encoding "a""b"; 1"#, Some("a\"b"))]
#[case::after_whitespace("\n\t xquery encoding 'Shift_JIS'; 1", Some("Shift_JIS"))]
#[case::comment_between_tokens("xquery (: why not :) version '1.0' encoding 'UTF-8';", Some("UTF-8"))]
#[case::keyword_prefix("xqueryx version '1.0' encoding 'UTF-8';", None)]
#[case::missing_semicolon("xquery version '1.0' encoding 'UTF-8' 1", None)]
#[case::empty("", None)]
fn sniffed_encodings(#[case] source: &str, #[case] expected: Option<&str>) {
    assert_eq!(sniff_encoding(source).as_deref(), expected);
}

#[rstest]
fn scanner_always_fails() {
    let mut found = DeclScanner::new("xquery version '3.0'; 1");
    assert_eq!(found.scan(), Err(ScanError::DeclarationFound));
    assert_eq!(found.version(), Some("3.0"));
    assert_eq!(found.encoding(), None);

    let mut missing = DeclScanner::new("1 + 1");
    assert!(matches!(missing.scan(), Err(ScanError::Malformed { line: 1, .. })));
}

#[rstest]
fn bytes_with_invalid_utf8_after_the_declaration() {
    let mut bytes = b"xquery encoding 'ISO-8859-1'; \"caf".to_vec();
    bytes.extend([0xE9, b'"']);
    assert_eq!(sniff_encoding_bytes(&bytes).as_deref(), Some("ISO-8859-1"));
}

#[rstest]
fn sniffed_and_parsed_encodings_agree() {
    let source = "xquery version '3.1' encoding 'UTF-8'; 42";
    let outcome = parse_module(source);
    assert!(!outcome.found_errors(), "{}", outcome.error_message());
    assert_eq!(sniff_encoding(source).as_deref(), Some("UTF-8"));
}
