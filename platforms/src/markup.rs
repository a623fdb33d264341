//! Changelog sanitisation.
//!
//! CurseForge serves changelogs as HTML fragments. Notifications only carry plain text, so line
//! breaks become newlines and every other tag and entity is dropped.

const LINE_BREAK: &str = "<br>";

pub fn sanitize_changelog(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(c) = rest.chars().next() {
        match c {
            '<' if rest.starts_with(LINE_BREAK) => {
                out.push('\n');
                rest = &rest[LINE_BREAK.len()..];
            }
            '<' => match tag_len(rest) {
                Some(len) => rest = &rest[len..],
                None => {
                    out.push(c);
                    rest = &rest[1..];
                }
            },
            '&' => match entity_len(rest) {
                Some(len) => rest = &rest[len..],
                None => {
                    out.push(c);
                    rest = &rest[1..];
                }
            },
            _ => {
                out.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }

    out
}

/// Length of a `<...>` tag at the start of `s`. Tags never span lines.
fn tag_len(s: &str) -> Option<usize> {
    for (i, c) in s.char_indices().skip(1) {
        match c {
            '>' => return Some(i + 1),
            '\n' | '\r' => return None,
            _ => {}
        }
    }
    None
}

/// Length of an `&name;` entity at the start of `s`.
fn entity_len(s: &str) -> Option<usize> {
    for (i, c) in s.char_indices().skip(1) {
        match c {
            ';' => return Some(i + 1),
            c if c.is_ascii_alphanumeric() || c == '_' => {}
            _ => return None,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_changelog() {
        assert_eq!(
            sanitize_changelog("<p>Fixed things</p><br>Added &quot;stuff&quot;"),
            "Fixed things\nAdded stuff"
        );
        assert_eq!(
            sanitize_changelog("<ul><li>One</li><li>Two</li></ul>"),
            "OneTwo"
        );
    }

    #[test]
    fn test_plain_text_is_untouched() {
        let text = "- a < b\n- fish & chips\n- ünïcödé <3";
        assert_eq!(sanitize_changelog(text), text);
    }

    #[test]
    fn test_only_ascii_word_entities_are_stripped() {
        assert_eq!(sanitize_changelog("a&nbsp;b &x_1; c"), "ab  c");
        assert_eq!(sanitize_changelog("caf&é; ok"), "caf&é; ok");
    }

    #[test]
    fn test_unterminated_tag_is_kept() {
        assert_eq!(sanitize_changelog("x <b\ny>"), "x <b\ny>");
    }
}
