//! RFC 2047 encoded-word decoding (`=?charset?B|Q?text?=`).

use std::sync::OnceLock;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use charset::{decode_ascii, decode_latin1, Charset};
use regex::{Captures, Regex};

/// Base64 that tolerates missing padding, as some mailers omit it.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

fn encoded_word() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"=\?([^?\s]+)\?([BbQq])\?([^?\s]*)\?=").expect("encoded-word pattern is valid")
    })
}

/// How the bytes of one word are turned into text.
#[derive(Debug, Clone, Copy)]
enum WordCharset {
    Ascii,
    Latin1,
    Declared(Charset),
}

impl WordCharset {
    fn from_label(label: &str) -> Option<Self> {
        // RFC 2231 language suffix: utf-8*en
        let label = label.split('*').next().unwrap_or(label).to_ascii_lowercase();
        match label.as_str() {
            "us-ascii" | "ascii" => Some(WordCharset::Ascii),
            "iso-8859-1" | "iso-8859-15" | "latin1" => Some(WordCharset::Latin1),
            other => Charset::for_label_no_replacement(other.as_bytes()).map(WordCharset::Declared),
        }
    }

    fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            WordCharset::Ascii if !bytes.is_ascii() => None,
            WordCharset::Ascii => Some(decode_ascii(bytes).into_owned()),
            WordCharset::Latin1 => Some(decode_latin1(bytes).into_owned()),
            WordCharset::Declared(charset) => {
                let (text, had_errors) = charset.decode_without_bom_handling(bytes);
                (!had_errors).then(|| text.into_owned())
            }
        }
    }
}

/// Decode the `Q` encoding: `_` is a space, `=HH` a hex byte.
fn decode_q(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => out.push(b' '),
            b'=' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match hex {
                    Some(b) => {
                        out.push(b);
                        i += 3;
                        continue;
                    }
                    None => out.push(b'='),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    out
}

fn decode_one(caps: &Captures<'_>) -> Option<String> {
    let charset = WordCharset::from_label(&caps[1])?;
    let bytes = match &caps[2] {
        "B" | "b" => LENIENT_BASE64.decode(&caps[3]).ok()?,
        _ => decode_q(&caps[3]),
    };
    charset.decode(&bytes)
}

/// Replace every encoded word in `value` with its decoded text.
///
/// Any charset label the WHATWG encoding registry knows is decoded as
/// declared. Words that cannot be decoded are left as they are. Whitespace separating two
/// adjacent encoded words is dropped.
pub fn decode_encoded_words(value: &str) -> String {
    if !value.contains("=?") {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut last = 0;
    let mut previous_was_word = false;

    for caps in encoded_word().captures_iter(value) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let between = &value[last..whole.start()];
        if !(previous_was_word && between.chars().all(char::is_whitespace)) {
            out.push_str(between);
        }

        match decode_one(&caps) {
            Some(decoded) => {
                out.push_str(&decoded);
                previous_was_word = true;
            }
            None => {
                out.push_str(whole.as_str());
                previous_was_word = false;
            }
        }
        last = whole.end();
    }

    out.push_str(&value[last..]);
    out
}
