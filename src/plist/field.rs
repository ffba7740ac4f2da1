//! Label-anchored typed field extraction.
//!
//! Within a dict's inner content a field is a `<key>LABEL</key>` followed by
//! one typed element. Lookups only consider keys at the dict's own level:
//! a key of the same name inside a nested dict or array is ignored. Every
//! lookup returns `None` when the label is missing or is followed by a
//! different type.

use regex::{Captures, Regex};

use super::scan::{matching_close, nested_spans};

/// Raw text of a string field, XML entities decoded.
pub fn string_after_key(content: &str, label: &str) -> Option<String> {
    let caps = shallow_capture(content, label, r"(?:<string>(.*?)</string>|<string\s*/>)")?;
    Some(caps.get(1).map(|m| unescape(m.as_str())).unwrap_or_default())
}

/// A `<true/>` / `<false/>` field.
pub fn bool_after_key(content: &str, label: &str) -> Option<bool> {
    let caps = shallow_capture(content, label, r"<(true|false)\s*/>")?;
    Some(&caps[1] == "true")
}

/// An `<integer>` field.
pub fn integer_after_key(content: &str, label: &str) -> Option<i64> {
    let caps = shallow_capture(content, label, r"<integer>\s*([+-]?\d+)\s*</integer>")?;
    caps[1].parse().ok()
}

/// A `<real>` field.
pub fn real_after_key(content: &str, label: &str) -> Option<f64> {
    let caps = shallow_capture(content, label, r"<real>\s*([^<]+?)\s*</real>")?;
    caps[1].parse().ok()
}

/// A `<date>` field, as the ISO-8601 text stored in the document.
pub fn date_after_key(content: &str, label: &str) -> Option<String> {
    let caps = shallow_capture(content, label, r"<date>\s*([^<]+?)\s*</date>")?;
    Some(caps[1].to_string())
}

/// Inner content of a nested `<dict>` field.
///
/// The closing tag is found by depth counting, so dicts nested inside the
/// field's value do not cut it short. `<dict/>` yields an empty string.
pub fn sub_dict_after_key<'a>(content: &'a str, label: &str) -> Option<&'a str> {
    let caps = shallow_capture(content, label, r"(?:<dict>|<dict\s*/>)")?;
    let whole = caps.get(0)?;
    if !whole.as_str().ends_with("<dict>") {
        return Some("");
    }
    let close = matching_close(content, whole.end(), "dict")?;
    Some(&content[whole.end()..close])
}

/// Follow a chain of nested dict labels.
///
/// `dict_at_path(c, &["sync"])` is `sub_dict_after_key(c, "sync")`; an
/// empty path returns `content` itself.
pub fn dict_at_path<'a>(content: &'a str, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(content, |current, label| sub_dict_after_key(current, label))
}

/// Every key at the dict's own level, in document order.
pub fn keys(content: &str) -> Vec<String> {
    let Ok(re) = Regex::new(r"(?s)<key>(.*?)</key>") else {
        return Vec::new();
    };
    let spans = nested_spans(content);
    re.captures_iter(content)
        .filter(|caps| is_shallow(&spans, caps.get(0).map_or(0, |m| m.start())))
        .map(|caps| unescape(&caps[1]))
        .collect()
}

/// First match of `<key>LABEL</key>` + `value_pattern` at the top level.
fn shallow_capture<'a>(content: &'a str, label: &str, value_pattern: &str) -> Option<Captures<'a>> {
    let pattern = format!(
        r"(?s)<key>{}</key>\s*{}",
        regex::escape(&escape(label)),
        value_pattern
    );
    let re = Regex::new(&pattern).ok()?;
    let spans = nested_spans(content);
    let found = re
        .captures_iter(content)
        .find(|caps| is_shallow(&spans, caps.get(0).map_or(0, |m| m.start())));
    found
}

fn is_shallow(spans: &[std::ops::Range<usize>], offset: usize) -> bool {
    !spans.iter().any(|span| span.contains(&offset))
}

/// Encode `&`, `<` and `>` the way plist writers do.
pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Decode predefined and numeric XML entities. Unknown entities are kept.
pub(crate) fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').and_then(|semi| {
            let entity = &tail[1..semi];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            c.map(|c| (c, semi + 1))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unescapes_entities() {
        assert_eq!(unescape("Q&amp;A &lt;1&gt; &#233;&#x41;"), "Q&A <1> éA");
        assert_eq!(unescape("fish & chips &bogus;"), "fish & chips &bogus;");
    }

    #[test]
    fn escape_round_trips_through_unescape() {
        let label = "R&D <drafts>";
        assert_eq!(unescape(&escape(label)), label);
    }

    #[test]
    fn nested_keys_do_not_shadow_outer_ones() {
        let content = "<key>inner</key><dict><key>name</key><string>deep</string></dict>\
                       <key>name</key><string>top</string>";
        assert_eq!(string_after_key(content, "name").as_deref(), Some("top"));
        assert_eq!(
            sub_dict_after_key(content, "inner"),
            Some("<key>name</key><string>deep</string>")
        );
    }

    #[test]
    fn label_with_pattern_characters_is_literal() {
        let content = "<key>a.b</key><string>dot</string><key>a+b (x)</key><string>plus</string>";
        assert_eq!(string_after_key(content, "a.b").as_deref(), Some("dot"));
        assert_eq!(string_after_key(content, "a+b (x)").as_deref(), Some("plus"));
        assert_eq!(string_after_key(content, "aXb"), None);
    }
}
