//! Field tokenisation for encounter log records.
//!
//! Two modes over a single line:
//! - plain CSV with `""` quote-escaping,
//! - bracket-aware, where `[...]` groups (including nested `[[..],[..]]`)
//!   are kept as single fields. Used for records carrying unquoted lists,
//!   e.g. player loadouts.

/// Split a record body on commas, honouring double-quote escaping.
///
/// A `""` inside a quoted run is a literal `"`. No backslash escapes.
/// Whitespace is preserved; consumers trim where they care.
pub fn split_fields(input: &str) -> Vec<String> {
    split_impl(input, false)
}

/// Split like [`split_fields`], but additionally track bracket depth so a
/// comma inside `[...]` does not split. Depth is floored at zero, so a
/// stray `]` cannot poison the rest of the line.
pub fn split_fields_bracketed(input: &str) -> Vec<String> {
    split_impl(input, true)
}

fn split_impl(input: &str, brackets: bool) -> Vec<String> {
    let bytes = input.as_bytes();
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut depth: u32 = 0;

    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'"' => {
                if in_quotes && i + 1 < bytes.len() && bytes[i + 1] == b'"' {
                    current.push('"');
                    i += 1;
                } else {
                    in_quotes = !in_quotes;
                }
            }
            b'[' if brackets && !in_quotes => {
                depth += 1;
                current.push('[');
            }
            b']' if brackets && !in_quotes => {
                depth = depth.saturating_sub(1);
                current.push(']');
            }
            b',' if !in_quotes && depth == 0 => {
                fields.push(std::mem::take(&mut current));
            }
            _ => {
                // Input is UTF-8; copy whole characters, not bytes.
                let ch_len = utf8_len(b);
                current.push_str(&input[i..i + ch_len]);
                i += ch_len - 1;
            }
        }
        i += 1;
    }
    fields.push(current);
    fields
}

fn utf8_len(first: u8) -> usize {
    match first {
        b if b < 0x80 => 1,
        b if b >= 0xF0 => 4,
        b if b >= 0xE0 => 3,
        _ => 2,
    }
}

/// Strip one layer of surrounding brackets, if present.
pub fn strip_brackets(field: &str) -> &str {
    let t = field.trim();
    t.strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(t)
}

/// Parse a bare or bracketed integer list (`1,2,3` or `[1,2,3]`).
/// Unparseable entries default to 0; an empty field yields an empty list.
pub fn parse_int_list(field: &str) -> Vec<i64> {
    let inner = strip_brackets(field);
    if inner.is_empty() {
        return Vec::new();
    }
    inner
        .split(',')
        .map(|part| part.trim().parse::<i64>().unwrap_or(0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_split_preserves_empty_fields() {
        assert_eq!(split_fields("a,,c"), vec!["a", "", "c"]);
    }

    #[test]
    fn quoted_comma_does_not_split() {
        assert_eq!(split_fields(r#""a,b",c"#), vec!["a,b", "c"]);
    }

    #[test]
    fn doubled_quote_is_literal() {
        assert_eq!(split_fields(r#""say ""hi""",x"#), vec![r#"say "hi""#, "x"]);
    }

    #[test]
    fn bracket_group_stays_one_field() {
        let fields = split_fields_bracketed("5,[1,2,3],[[4,5],[6]],tail");
        assert_eq!(fields, vec!["5", "[1,2,3]", "[[4,5],[6]]", "tail"]);
    }

    #[test]
    fn unbalanced_close_bracket_is_harmless() {
        let fields = split_fields_bracketed("a],b,c");
        assert_eq!(fields, vec!["a]", "b", "c"]);
    }

    #[test]
    fn int_list_accepts_both_shapes() {
        assert_eq!(parse_int_list("[1,2,3]"), vec![1, 2, 3]);
        assert_eq!(parse_int_list("1,2,x"), vec![1, 2, 0]);
        assert_eq!(parse_int_list(""), Vec::<i64>::new());
        assert_eq!(parse_int_list("[]"), Vec::<i64>::new());
    }
}
