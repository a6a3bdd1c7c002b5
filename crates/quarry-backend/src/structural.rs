//! Structural pattern translation
//!
//! A structural pattern is literal text with holes. `:[name]` and `...`
//! match any text (across lines), `:[[name]]` matches one identifier, and a
//! run of whitespace matches any non-empty run of whitespace.

/// Translate a structural pattern into an equivalent regular expression.
pub fn structural_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut rest = pattern;
    while let Some(c) = rest.chars().next() {
        if let Some(after) = rest.strip_prefix(":[[") {
            if let Some(end) = after.find("]]") {
                if is_hole_name(&after[..end]) {
                    out.push_str(r"\w+");
                    rest = &after[end + 2..];
                    continue;
                }
            }
        }
        if let Some(after) = rest.strip_prefix(":[") {
            if let Some(end) = after.find(']') {
                if is_hole_name(&after[..end]) {
                    out.push_str("(?s:.*?)");
                    rest = &after[end + 1..];
                    continue;
                }
            }
        }
        if let Some(after) = rest.strip_prefix("...") {
            out.push_str("(?s:.*?)");
            rest = after;
            continue;
        }
        if c.is_whitespace() {
            out.push_str(r"\s+");
            rest = rest.trim_start();
            continue;
        }
        out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])));
        rest = &rest[c.len_utf8()..];
    }
    out
}

fn is_hole_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_literal_text_is_escaped() {
        assert_eq!(structural_to_regex("a.b"), r"a\.b");
        assert_eq!(structural_to_regex("f(x)"), r"f\(x\)");
    }

    #[test]
    fn test_whitespace_collapses() {
        let re = Regex::new(&structural_to_regex("foo  bar")).unwrap();
        assert!(re.is_match("foo\n\tbar"));
        assert!(!re.is_match("foobar"));
    }

    #[test]
    fn test_holes() {
        let re = Regex::new(&structural_to_regex("fmt.Println(:[args])")).unwrap();
        assert!(re.is_match(r#"fmt.Println("Hello world")"#));

        let re = Regex::new(&structural_to_regex("func :[[name]]()")).unwrap();
        assert!(re.is_match("func main()"));
        assert!(!re.is_match("func ()"));

        let re = Regex::new(&structural_to_regex("if ... {")).unwrap();
        assert!(re.is_match("if a &&\n b {"));
    }

    #[test]
    fn test_unterminated_hole_is_literal() {
        let re = Regex::new(&structural_to_regex(":[oops")).unwrap();
        assert!(re.is_match(":[oops"));
    }
}
