use anyhow::{Context, Result, bail};
use platynui_xquery::sniff_encoding_bytes;
use std::io::Read;
use std::path::Path;

/// `-` reads standard input.
pub fn read_bytes(input: &Path) -> Result<Vec<u8>> {
    if input == Path::new("-") {
        let mut bytes = Vec::new();
        std::io::stdin().read_to_end(&mut bytes).context("failed to read standard input")?;
        return Ok(bytes);
    }
    std::fs::read(input).with_context(|| format!("failed to read {}", input.display()))
}

/// Module source as UTF-8. A byte-order mark is dropped.
pub fn read_source(input: &Path) -> Result<String> {
    decode(read_bytes(input)?, input)
}

pub fn decode(bytes: Vec<u8>, input: &Path) -> Result<String> {
    let bytes = match bytes.strip_prefix(b"\xEF\xBB\xBF") {
        Some(rest) => rest.to_vec(),
        None => bytes,
    };
    match String::from_utf8(bytes) {
        Ok(source) => Ok(source),
        Err(err) => match sniff_encoding_bytes(err.as_bytes()) {
            Some(encoding) => bail!("{} is not UTF-8 (declared encoding {encoding}); transcode it first", input.display()),
            None => bail!("{} is not valid UTF-8: {}", input.display(), err.utf8_error()),
        },
    }
}

/// `NAMESPACE=FILE` as given to `--module`.
pub fn parse_module_arg(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((namespace, path)) if !namespace.is_empty() && !path.is_empty() => {
            Ok((namespace.to_string(), path.to_string()))
        }
        _ => Err(format!("expected NAMESPACE=FILE, got {value:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::plain("urn:a=lib.xq", Some(("urn:a", "lib.xq")))]
    #[case::uri_with_equals("urn:a=dir/x=y.xq", Some(("urn:a", "dir/x=y.xq")))]
    #[case::missing_path("urn:a=", None)]
    #[case::no_separator("urn:a", None)]
    fn module_args(#[case] value: &str, #[case] expected: Option<(&str, &str)>) {
        let parsed = parse_module_arg(value).ok();
        assert_eq!(parsed.as_ref().map(|(n, p)| (n.as_str(), p.as_str())), expected);
    }

    #[rstest]
    fn decode_drops_bom_and_names_declared_encoding() {
        let path = Path::new("q.xq");
        assert_eq!(decode(b"\xEF\xBB\xBF1".to_vec(), path).expect("utf-8"), "1");
        let latin = b"xquery encoding 'ISO-8859-1'; '\xE9'".to_vec();
        let err = decode(latin, path).expect_err("not utf-8");
        assert!(err.to_string().contains("ISO-8859-1"));
    }
}
