use std::time::Duration;

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.0}")
    } else {
        "0".to_string()
    }
}

/// Milliseconds with two decimals, or `-` when there is no value.
pub(crate) fn format_ms(v: Option<f64>) -> String {
    match v {
        Some(v) if v.is_finite() => format!("{v:.2}ms"),
        _ => "-".to_string(),
    }
}

pub(crate) fn format_pct(v: Option<f64>) -> String {
    match v {
        Some(v) if v.is_finite() => format!("{:.2}%", v * 100.0),
        _ => "-".to_string(),
    }
}

/// Single rounded component: `850ms`, `12.3s`.
pub(crate) fn format_elapsed(d: Duration) -> String {
    if d < Duration::from_secs(1) {
        format!("{}ms", d.as_millis())
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}

pub(crate) fn format_tags_inline(tags: &[(String, String)], exclude: &[&str]) -> String {
    let inner = tags
        .iter()
        .filter(|(k, _)| !exclude.contains(&k.as_str()))
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ");

    if inner.is_empty() {
        String::new()
    } else {
        format!("{{{inner}}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_missing_values_as_dash() {
        assert_eq!(format_ms(None), "-");
        assert_eq!(format_pct(Some(f64::NAN)), "-");
        assert_eq!(format_rate(f64::INFINITY), "0");
    }

    #[test]
    fn formats_values() {
        assert_eq!(format_ms(Some(12.345)), "12.35ms");
        assert_eq!(format_pct(Some(0.0312)), "3.12%");
        assert_eq!(format_elapsed(Duration::from_millis(850)), "850ms");
        assert_eq!(format_elapsed(Duration::from_millis(12_340)), "12.3s");
    }

    #[test]
    fn inline_tags_skip_excluded_keys() {
        let tags = vec![
            ("check".to_string(), "status".to_string()),
            ("status".to_string(), "201".to_string()),
        ];
        assert_eq!(format_tags_inline(&tags, &["check"]), "{status=201}");
        assert_eq!(format_tags_inline(&tags, &["check", "status"]), "");
    }
}
