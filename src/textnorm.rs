// src/textnorm.rs
//! Locale-aware text utilities shared by the whole pipeline: search-text
//! normalization, merchant price parsing, and feed payload decoding.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalize text for matching: lowercase, decompose and strip diacritics,
/// collapse whitespace, trim. Idempotent, so derived fields can be re-fed
/// through it safely.
pub fn normalize(s: &str) -> String {
    let lowered = s.to_lowercase();
    let stripped: String = lowered.nfd().filter(|c| !is_combining_mark(*c)).collect();

    let mut out = String::with_capacity(stripped.len());
    let mut prev_space = false;
    for c in stripped.chars() {
        if c.is_whitespace() {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            out.push(c);
            prev_space = false;
        }
    }
    out.trim().to_string()
}

static RE_CURRENCY_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(dkk|sek|nok|eur|usd|gbp)\b|kr\.?|,-|[€$£]").unwrap());
static RE_NUMERIC_CHUNK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d[\d.,]*").unwrap());
static RE_EU_GROUPED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}(\.\d{3})+(,\d+)?$").unwrap());
static RE_US_GROUPED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}(,\d{3})+(\.\d+)?$").unwrap());
static RE_COMMA_DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+,\d+$").unwrap());
static RE_PLAIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+(\.\d+)?$").unwrap());

/// Parse a merchant price string into a decimal.
///
/// Merchants mix European (`1.234,56`), US (`1,234.56`) and plain (`849,00`,
/// `849.00`) formats, often with a currency label glued on. Separator
/// arrangement is pattern-matched before any generic parse so the grouping
/// character is never mistaken for a decimal point. Returns `None` (never
/// NaN) when no numeric value can be extracted.
pub fn parse_locale_number(s: &str) -> Option<f64> {
    let cleaned = RE_CURRENCY_LABEL.replace_all(s, " ");
    let chunk = RE_NUMERIC_CHUNK
        .find(&cleaned)?
        .as_str()
        .trim_matches(|c| c == '.' || c == ',');
    if chunk.is_empty() {
        return None;
    }

    let canonical = if RE_EU_GROUPED.is_match(chunk) {
        chunk.replace('.', "").replace(',', ".")
    } else if RE_US_GROUPED.is_match(chunk) {
        chunk.replace(',', "")
    } else if RE_COMMA_DECIMAL.is_match(chunk) {
        chunk.replace(',', ".")
    } else if RE_PLAIN.is_match(chunk) {
        chunk.to_string()
    } else {
        // Mixed separators in no recognizable arrangement; last resort is the
        // Danish feed convention: dots group, comma is the decimal mark.
        chunk.replace('.', "").replace(',', ".")
    };

    match canonical.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => None,
    }
}

static RE_XML_ENCODING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)encoding\s*=\s*["']?([a-z0-9._-]+)"#).unwrap());

fn is_latin1_family(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "iso-8859-1" | "iso8859-1" | "iso-8859-15" | "latin1" | "latin-1" | "windows-1252" | "cp1252"
    )
}

fn decode_latin1(bytes: &[u8]) -> String {
    // ISO-8859-1 maps bytes 1:1 onto the first 256 code points.
    bytes.iter().map(|&b| b as char).collect()
}

/// Decode a raw feed payload into text.
///
/// Affiliate feeds frequently declare a Latin-1-family encoding in the XML
/// prolog while the HTTP layer says nothing useful. The first ~200 decoded
/// characters are sniffed for such a declaration (a `charset_hint` from the
/// transport wins the same way); everything else is treated as UTF-8 with
/// lossy replacement. Never fails.
pub fn decode_payload_text(bytes: &[u8], charset_hint: Option<&str>) -> String {
    if let Some(hint) = charset_hint {
        if is_latin1_family(hint.trim()) {
            return decode_latin1(bytes);
        }
    }

    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
    let prolog: String = head.chars().take(200).collect();
    if let Some(caps) = RE_XML_ENCODING.captures(&prolog) {
        if is_latin1_family(&caps[1]) {
            return decode_latin1(bytes);
        }
    }

    String::from_utf8_lossy(bytes).into_owned()
}
