// Text encoding resolution for source pages.
//
// Candidate order: charset from the Content-Type header, charset declared in
// a <meta> tag, the legacy Japanese encodings, then UTF-8. The first candidate
// that decodes without error wins. If none does, UTF-8 with replacement
// characters is returned and flagged as lossy.

use std::sync::LazyLock;

use encoding_rs::{Encoding, EUC_JP, SHIFT_JIS, UTF_8};
use regex::bytes::Regex;

/// Tried after any declared charset, in this order.
pub const LEGACY_ENCODINGS: &[&Encoding] = &[EUC_JP, SHIFT_JIS];

/// How far into the body to look for a <meta> charset declaration.
const META_SNIFF_BYTES: usize = 2048;

static META_CHARSET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?\s*([A-Za-z0-9_\-:.]+)"#).expect("valid regex")
});

#[derive(Debug, Clone)]
pub struct Decoded {
    pub text: String,
    pub encoding: &'static Encoding,
    /// True when every candidate failed and replacement characters were used.
    pub lossy: bool,
}

/// Pull the `charset=` parameter out of a Content-Type header value.
pub fn charset_from_content_type(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            (!value.is_empty()).then_some(value)
        } else {
            None
        }
    })
}

fn sniff_meta_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(META_SNIFF_BYTES)];
    let caps = META_CHARSET_RE.captures(head)?;
    Encoding::for_label(&caps[1])
}

/// Decode a response body. `declared` is the transport-level charset, if any.
pub fn decode_body(bytes: &[u8], declared: Option<&str>) -> Decoded {
    let mut candidates: Vec<&'static Encoding> = Vec::with_capacity(5);
    let mut push = |enc: &'static Encoding| {
        if !candidates.contains(&enc) {
            candidates.push(enc);
        }
    };

    if let Some(enc) = declared.and_then(|label| Encoding::for_label(label.as_bytes())) {
        push(enc);
    }
    if let Some(enc) = sniff_meta_charset(bytes) {
        push(enc);
    }
    for enc in LEGACY_ENCODINGS {
        push(enc);
    }
    push(UTF_8);

    for enc in candidates {
        if let Some(text) = enc.decode_without_bom_handling_and_without_replacement(bytes) {
            return Decoded {
                text: text.into_owned(),
                encoding: enc,
                lossy: false,
            };
        }
    }

    let (text, _) = UTF_8.decode_with_bom_removal(bytes);
    Decoded {
        text: text.into_owned(),
        encoding: UTF_8,
        lossy: true,
    }
}
