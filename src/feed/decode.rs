// src/feed/decode.rs
//! Feed payload decoding: format detection plus record extraction for the two
//! shapes affiliate networks actually ship — XML tag soup and delimited text.
//!
//! XML extraction runs a tolerant `quick_xml` reader (unchecked end names,
//! nearest-close matching via depth tracking) instead of regex scanning, so
//! nested same-named tags and CDATA bodies come out intact. Delimited
//! extraction is a small quoted-field state machine with delimiter sniffing.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;

use crate::config::DecoderConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Xml,
    Delimited,
}

/// One record cut out of a source payload. Ephemeral: produced here, consumed
/// immediately by the product normalizer.
#[derive(Debug, Clone)]
pub enum RawRecord {
    Xml {
        /// Leaf element text keyed by lowercased qualified tag name.
        /// First non-empty occurrence wins.
        fields: HashMap<String, String>,
        /// Attribute values keyed `tag@attr`.
        attrs: HashMap<String, String>,
    },
    Row {
        header: Arc<HashMap<String, usize>>,
        cells: Vec<String>,
    },
}

impl RawRecord {
    pub fn field(&self, name: &str) -> Option<&str> {
        match self {
            RawRecord::Xml { fields, .. } => fields.get(name).map(String::as_str),
            RawRecord::Row { header, cells } => header
                .get(name)
                .and_then(|&i| cells.get(i))
                .map(String::as_str),
        }
    }

    pub fn attr(&self, tag: &str, attr: &str) -> Option<&str> {
        match self {
            RawRecord::Xml { attrs, .. } => {
                attrs.get(&format!("{tag}@{attr}")).map(String::as_str)
            }
            // Delimited exports flatten attributes into column names.
            RawRecord::Row { .. } => self.field(&format!("{tag}@{attr}")),
        }
    }
}

static RE_XML_SIGNATURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<\?xml|<rss[\s>]|<feed[\s>]|<channel[\s>]|<products?[\s>]|<produkter?[\s>]|<item[\s>]")
        .unwrap()
});

/// XML if the head of the payload carries a known feed root-tag signature,
/// otherwise delimited text.
pub fn detect_format(text: &str) -> FeedFormat {
    let head: String = text.chars().take(512).collect();
    if RE_XML_SIGNATURE.is_match(&head) {
        FeedFormat::Xml
    } else {
        FeedFormat::Delimited
    }
}

/// Extract records from a payload of either format.
pub fn extract_records(text: &str, cfg: &DecoderConfig) -> Vec<RawRecord> {
    match detect_format(text) {
        FeedFormat::Xml => extract_xml_records(text, cfg),
        FeedFormat::Delimited => extract_delimited_records(text).records,
    }
}

/// Try the known container tags in order; when none yield records, fall back
/// to a generic scan over `fallback_containers`, keeping only bodies that
/// carry a URL-like anchor field (so wrapper tags don't masquerade as
/// products).
pub fn extract_xml_records(text: &str, cfg: &DecoderConfig) -> Vec<RawRecord> {
    for container in &cfg.containers {
        let records = scan_container(text, container);
        if !records.is_empty() {
            return records;
        }
    }

    let mut fallback = Vec::new();
    for container in &cfg.fallback_containers {
        let records = scan_container(text, container);
        fallback.extend(records.into_iter().filter(|r| {
            cfg.anchor_fields.iter().any(|a| {
                r.field(a).map(|v| !v.trim().is_empty()).unwrap_or(false)
            })
        }));
    }
    fallback
}

/// Collect every `<container>...</container>` block as a field/attribute map.
/// Depth tracking pairs each opening tag with its nearest close, so a nested
/// same-named tag never swallows its siblings.
fn scan_container(text: &str, container: &str) -> Vec<RawRecord> {
    let mut reader = Reader::from_str(text);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.trim_text_start = true;
    config.trim_text_end = true;

    let mut records = Vec::new();
    let mut depth = 0usize;
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut attrs: HashMap<String, String> = HashMap::new();
    let mut open: Vec<String> = Vec::new();
    let mut text_buf = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_lowercase();
                if depth == 0 {
                    if name == container {
                        depth = 1;
                        fields.clear();
                        attrs.clear();
                        open.clear();
                    }
                    continue;
                }
                if name == container {
                    depth += 1;
                }
                capture_attrs(&e, &name, &mut attrs);
                open.push(name);
                text_buf.clear();
            }
            Ok(Event::Empty(e)) => {
                if depth > 0 {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_lowercase();
                    capture_attrs(&e, &name, &mut attrs);
                }
            }
            Ok(Event::Text(t)) => {
                if depth > 0 && !open.is_empty() {
                    text_buf.push_str(&String::from_utf8_lossy(t.as_ref()));
                }
            }
            Ok(Event::CData(t)) => {
                if depth > 0 && !open.is_empty() {
                    text_buf.push_str(&String::from_utf8_lossy(&t.into_inner()));
                }
            }
            Ok(Event::End(e)) => {
                if depth == 0 {
                    continue;
                }
                let name = String::from_utf8_lossy(e.name().as_ref()).to_lowercase();
                if name == container {
                    depth -= 1;
                    if depth == 0 {
                        if !fields.is_empty() || !attrs.is_empty() {
                            records.push(RawRecord::Xml {
                                fields: std::mem::take(&mut fields),
                                attrs: std::mem::take(&mut attrs),
                            });
                        }
                        continue;
                    }
                }
                // Attribute the buffered text to the innermost open element;
                // mismatched closes (broken feeds) just unwind one level.
                if let Some(leaf) = open.pop() {
                    let value = text_buf.trim();
                    if !value.is_empty() {
                        fields.entry(leaf).or_insert_with(|| value.to_string());
                    }
                    text_buf.clear();
                }
            }
            Ok(Event::Eof) => break,
            // Malformed tail: keep what was extracted so far.
            Err(_) => break,
            Ok(_) => {}
        }
    }

    records
}

fn capture_attrs(e: &quick_xml::events::BytesStart<'_>, tag: &str, attrs: &mut HashMap<String, String>) {
    for attr in e.attributes().with_checks(false).flatten() {
        let key = format!(
            "{tag}@{}",
            String::from_utf8_lossy(attr.key.as_ref()).to_lowercase()
        );
        let value = String::from_utf8_lossy(&attr.value).trim().to_string();
        if !value.is_empty() {
            attrs.entry(key).or_insert(value);
        }
    }
}

pub struct DelimitedFeed {
    pub header: Vec<String>,
    pub records: Vec<RawRecord>,
}

/// Delimiter sniffing by presence priority (tab beats semicolon beats comma)
/// over the first ~1KB of the payload.
fn detect_delimiter(text: &str) -> char {
    let sample: String = text.chars().take(1024).collect();
    if sample.contains('\t') {
        '\t'
    } else if sample.contains(';') {
        ';'
    } else {
        ','
    }
}

/// Restrict header names to a lookup-safe charset: lowercase, whitespace
/// removed, everything outside `[a-z0-9_:@-]` dropped.
fn normalize_header_cell(cell: &str) -> String {
    cell.trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '@' | '-'))
        .collect()
}

/// Quoted-field CSV/TSV state machine: doubled-quote escaping, delimiters and
/// newlines inside quoted fields, bare `\r` stripped, blank lines skipped.
pub fn extract_delimited_records(text: &str) -> DelimitedFeed {
    let delimiter = detect_delimiter(text);

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    cell.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                cell.push(c);
            }
            continue;
        }
        match c {
            '"' if cell.is_empty() => in_quotes = true,
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut cell));
                if !(row.len() == 1 && row[0].trim().is_empty()) {
                    rows.push(std::mem::take(&mut row));
                } else {
                    row.clear();
                }
            }
            c if c == delimiter => row.push(std::mem::take(&mut cell)),
            c => cell.push(c),
        }
    }
    if !cell.is_empty() || !row.is_empty() {
        row.push(cell);
        if !(row.len() == 1 && row[0].trim().is_empty()) {
            rows.push(row);
        }
    }

    if rows.is_empty() {
        return DelimitedFeed {
            header: Vec::new(),
            records: Vec::new(),
        };
    }

    let header: Vec<String> = rows[0].iter().map(|c| normalize_header_cell(c)).collect();
    let mut index: HashMap<String, usize> = HashMap::new();
    for (i, name) in header.iter().enumerate() {
        index.entry(name.clone()).or_insert(i);
    }
    let index = Arc::new(index);

    let records = rows
        .into_iter()
        .skip(1)
        .map(|cells| RawRecord::Row {
            header: index.clone(),
            cells,
        })
        .collect();

    DelimitedFeed { header, records }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder_cfg() -> DecoderConfig {
        crate::config::SearchConfig::builtin().decoder
    }

    #[test]
    fn detects_xml_and_delimited() {
        assert_eq!(
            detect_format("<?xml version=\"1.0\"?><products><product/></products>"),
            FeedFormat::Xml
        );
        assert_eq!(detect_format("<rss version=\"2.0\"><channel>"), FeedFormat::Xml);
        assert_eq!(detect_format("name;price;link\nA;10;x"), FeedFormat::Delimited);
    }

    #[test]
    fn extracts_sibling_product_blocks_in_source_order() {
        let xml = r#"<?xml version="1.0"?><products>
            <product><name>Barolo DOCG</name><deeplink>https://a.example/1</deeplink><price>249,00</price></product>
            <product><name>Rioja Crianza</name><deeplink>https://a.example/2</deeplink><price>99,00</price></product>
        </products>"#;
        let recs = extract_xml_records(xml, &decoder_cfg());
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].field("name"), Some("Barolo DOCG"));
        assert_eq!(recs[1].field("deeplink"), Some("https://a.example/2"));
    }

    #[test]
    fn nested_same_named_tags_close_at_nearest_end() {
        let xml = r#"<products>
            <product><name>Outer</name><product><name>Inner</name></product><deeplink>u1</deeplink></product>
            <product><name>Second</name><deeplink>u2</deeplink></product>
        </products>"#;
        let recs = extract_xml_records(xml, &decoder_cfg());
        // The nested block stays inside the first record; the sibling survives.
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].field("name"), Some("Outer"));
        assert_eq!(recs[0].field("deeplink"), Some("u1"));
        assert_eq!(recs[1].field("name"), Some("Second"));
    }

    #[test]
    fn cdata_and_attributes_are_captured() {
        let xml = r#"<channel><item>
            <title><![CDATA[Amarone <Classico>]]></title>
            <link>https://x.example/p</link>
            <media:content url="https://img.example/p.jpg" type="image/jpeg"/>
        </item></channel>"#;
        let recs = extract_xml_records(xml, &decoder_cfg());
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].field("title"), Some("Amarone <Classico>"));
        assert_eq!(recs[0].attr("media:content", "url"), Some("https://img.example/p.jpg"));
    }

    #[test]
    fn fallback_scan_requires_anchor_field() {
        let xml = r#"<root>
            <entry><headline>No link here</headline></entry>
            <entry><name>Linked</name><url>https://x.example/ok</url></entry>
        </root>"#;
        let recs = extract_xml_records(xml, &decoder_cfg());
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].field("name"), Some("Linked"));
    }

    #[test]
    fn delimiter_priority_is_tab_semicolon_comma() {
        let tsv = "a\tb,c\n1\t2,3\n";
        let feed = extract_delimited_records(tsv);
        assert_eq!(feed.header, vec!["a", "bc"]);

        let semi = "a;b,c\n1;2,3\n";
        let feed = extract_delimited_records(semi);
        assert_eq!(feed.header.len(), 2);
    }

    #[test]
    fn quoted_fields_support_delimiters_newlines_and_doubled_quotes() {
        let csv =
            "name,description,link\n\"Côtes, du Rhône\",\"line one\nline \"\"two\"\"\",https://x.example/1\n\n";
        let feed = extract_delimited_records(csv);
        assert_eq!(feed.records.len(), 1);
        assert_eq!(feed.records[0].field("name"), Some("Côtes, du Rhône"));
        let desc = feed.records[0].field("description").unwrap();
        assert!(desc.contains("line one\nline"));
        assert!(desc.contains("\"two\""));
        assert_eq!(feed.records[0].field("link"), Some("https://x.example/1"));
    }

    #[test]
    fn blank_lines_and_bare_cr_are_ignored() {
        let csv = "name;link\r\nA;u1\r\n\r\nB;u2\r\n";
        let feed = extract_delimited_records(csv);
        assert_eq!(feed.records.len(), 2);
        assert_eq!(feed.records[1].field("name"), Some("B"));
    }
}
