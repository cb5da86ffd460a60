//! Character classes from XML 1.0 (fifth edition) used for NCName scanning.

pub fn is_name_start_char(c: char) -> bool {
    matches!(c,
        'A'..='Z' | '_' | 'a'..='z'
        | '\u{C0}'..='\u{D6}'
        | '\u{D8}'..='\u{F6}'
        | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}'
        | '\u{37F}'..='\u{1FFF}'
        | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}'
        | '\u{2C00}'..='\u{2FEF}'
        | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}'
        | '\u{FDF0}'..='\u{FFFD}'
        | '\u{10000}'..='\u{EFFFF}')
}

pub fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c, '-' | '.' | '0'..='9' | '\u{B7}' | '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}')
}

pub fn is_xml_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// Resolve a predefined entity or character reference at the start of `s`
/// (which begins with `&`). Returns the character and the number of bytes consumed.
pub fn resolve_reference(s: &str) -> Option<(char, usize)> {
    let end = s.find(';')?;
    let body = &s[1..end];
    let c = match body {
        "lt" => '<',
        "gt" => '>',
        "amp" => '&',
        "quot" => '"',
        "apos" => '\'',
        _ => {
            let code = if let Some(hex) = body.strip_prefix("#x") {
                u32::from_str_radix(hex, 16).ok()?
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok()?
            } else {
                return None;
            };
            let c = char::from_u32(code)?;
            if !is_xml_char(c) {
                return None;
            }
            c
        }
    };
    Some((c, end + 1))
}

fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::lt("&lt;", '<', 4)]
    #[case::amp("&amp;rest", '&', 5)]
    #[case::decimal("&#65;", 'A', 5)]
    #[case::hex("&#x20AC;", '€', 8)]
    fn resolves_references(#[case] input: &str, #[case] expected: char, #[case] len: usize) {
        assert_eq!(resolve_reference(input), Some((expected, len)));
    }

    #[rstest]
    #[case::unknown("&nbsp;")]
    #[case::unterminated("&lt")]
    #[case::null_char("&#0;")]
    fn rejects_bad_references(#[case] input: &str) {
        assert_eq!(resolve_reference(input), None);
    }
}
