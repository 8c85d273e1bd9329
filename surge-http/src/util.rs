use std::collections::BTreeMap;

pub(super) fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

/// Lowercases header names and joins repeated values with ", ".
pub(super) fn normalize_headers(headers: &http::HeaderMap) -> Vec<(String, String)> {
    let mut merged: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let v = String::from_utf8_lossy(value.as_bytes()).into_owned();
        merged
            .entry(name.as_str().to_ascii_lowercase())
            .and_modify(|cur| {
                if !cur.is_empty() {
                    cur.push_str(", ");
                }
                cur.push_str(&v);
            })
            .or_insert(v);
    }
    merged.into_iter().collect()
}
