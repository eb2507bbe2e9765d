use crate::reconcile::OrderedTagEntry;

const FULL_WIDTH_COMMA: char = '，';

/// Splits free-form prompt text into its ordered, trimmed, non-empty tags.
///
/// Full-width commas count as separators. Duplicates are kept.
pub fn normalize(raw: &str) -> Vec<String> {
    raw.replace(FULL_WIDTH_COMMA, ",")
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Renders entries back into a single prompt line.
///
/// Disabled entries are skipped; a weight other than 1.0 is written as `(tag:w)`.
pub fn compose(entries: &[OrderedTagEntry]) -> String {
    entries
        .iter()
        .filter(|entry| !entry.disabled && !entry.text.trim().is_empty())
        .map(format_weighted)
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_weighted(entry: &OrderedTagEntry) -> String {
    let text = entry.text.trim();
    if (entry.weight - 1.0).abs() < f32::EPSILON {
        text.to_string()
    } else {
        format!("({}:{:.1})", text, entry.weight)
    }
}

/// True when the tag carries at least one CJK Unified Ideograph.
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(|ch| ('\u{4e00}'..='\u{9fff}').contains(&ch))
}
