// src/feed/fields.rs
//! Ordered-candidate field resolution across heterogeneous merchant schemas.
//!
//! Every merchant names the same logical attribute differently (`imageurl`,
//! `image_url`, `g:image_link`, ...). Resolution walks a per-attribute
//! candidate list and returns the first present, non-empty value, cleaned of
//! CDATA wrappers and HTML entities. A `tag@attr` candidate reads an element
//! attribute instead of element text.

use crate::feed::decode::RawRecord;

/// Resolve one logical attribute. Unresolvable lists yield an empty string,
/// which callers treat as "field absent". Never fails.
pub fn resolve_field(record: &RawRecord, candidates: &[String]) -> String {
    for candidate in candidates {
        let raw = match candidate.split_once('@') {
            Some((tag, attr)) => record.attr(tag, attr),
            None => record.field(candidate),
        };
        if let Some(raw) = raw {
            let cleaned = clean_value(raw);
            if !cleaned.is_empty() {
                return cleaned;
            }
        }
    }
    String::new()
}

/// Trim, strip a `<![CDATA[..]]>` wrapper, decode HTML entities, trim again.
pub fn clean_value(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|rest| rest.strip_suffix("]]>"))
        .unwrap_or(trimmed);
    html_escape::decode_html_entities(inner).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn xml_record(fields: &[(&str, &str)], attrs: &[(&str, &str)]) -> RawRecord {
        RawRecord::Xml {
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    fn cands(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn first_present_candidate_wins() {
        let rec = xml_record(&[("title", "Fallback"), ("name", "Primary")], &[]);
        assert_eq!(resolve_field(&rec, &cands(&["name", "title"])), "Primary");
        assert_eq!(resolve_field(&rec, &cands(&["produktnavn", "title"])), "Fallback");
    }

    #[test]
    fn unresolved_list_yields_empty_string() {
        let rec = xml_record(&[("name", "x")], &[]);
        assert_eq!(resolve_field(&rec, &cands(&["deeplink", "link"])), "");
    }

    #[test]
    fn entities_and_cdata_are_decoded() {
        let rec = xml_record(
            &[
                ("name", "Ch&amp;teau &quot;R&#039;s&quot; &lt;Reserve&gt;"),
                ("description", "<![CDATA[ Smager&nbsp;godt ]]>"),
            ],
            &[],
        );
        assert_eq!(
            resolve_field(&rec, &cands(&["name"])),
            "Ch&teau \"R's\" <Reserve>"
        );
        assert_eq!(resolve_field(&rec, &cands(&["description"])), "Smager\u{a0}godt");
    }

    #[test]
    fn attribute_candidates_read_element_attributes() {
        let rec = xml_record(&[], &[("media:content@url", "https://img.example/x.jpg")]);
        assert_eq!(
            resolve_field(&rec, &cands(&["imageurl", "media:content@url"])),
            "https://img.example/x.jpg"
        );
    }

    #[test]
    fn delimited_rows_resolve_against_header_map() {
        let feed = crate::feed::decode::extract_delimited_records(
            "produktnavn;deeplink;pris\nAmarone;https://x.example/1;249,00\n",
        );
        let rec = &feed.records[0];
        assert_eq!(resolve_field(rec, &cands(&["name", "produktnavn"])), "Amarone");
        assert_eq!(resolve_field(rec, &cands(&["deeplink"])), "https://x.example/1");
    }
}
