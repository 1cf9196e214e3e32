//! Guess which layout a string was typed in

use tracing::debug;

use super::{KeyMapping, LayoutId};

/// Number of characters in `text` that some key produces under `layout`
pub fn score<M>(text: &str, layout: &LayoutId, mapping: &M) -> usize
where
    M: KeyMapping + ?Sized,
{
    text.chars()
        .filter(|&ch| mapping.stroke_for(layout, ch).is_some())
        .count()
}

/// Pick the layout `text` was most likely typed in
///
/// The layout with the strictly highest score wins. Among tied candidates
/// `preferred` is chosen if it is one of them, otherwise the first one in
/// `layouts` order. Returns `None` when nothing in `text` maps anywhere.
pub fn detect<M>(text: &str, preferred: &LayoutId, layouts: &[LayoutId], mapping: &M) -> Option<LayoutId>
where
    M: KeyMapping + ?Sized,
{
    let mut best: Option<&LayoutId> = None;
    let mut best_score = 0;

    for layout in layouts {
        let score = score(text, layout, mapping);
        if score > best_score || (score > 0 && score == best_score && layout == preferred) {
            best = Some(layout);
            best_score = score;
        }
    }

    debug!(
        best = ?best.map(LayoutId::as_str),
        score = best_score,
        chars = text.chars().count(),
        "layout detection"
    );

    best.cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Keymaps;

    fn installed() -> Vec<LayoutId> {
        vec![LayoutId::new("us"), LayoutId::new("ru"), LayoutId::new("de")]
    }

    #[test]
    fn test_detects_cyrillic() {
        let maps = Keymaps::builtin();
        let found = detect("привет", &LayoutId::new("us"), &installed(), &maps);
        assert_eq!(found, Some(LayoutId::new("ru")));
    }

    #[test]
    fn test_detects_german_umlauts() {
        let maps = Keymaps::builtin();
        let found = detect("grüße", &LayoutId::new("us"), &installed(), &maps);
        assert_eq!(found, Some(LayoutId::new("de")));
    }

    #[test]
    fn test_empty_and_unmappable_text() {
        let maps = Keymaps::builtin();
        let preferred = LayoutId::new("us");
        assert_eq!(detect("", &preferred, &installed(), &maps), None);
        assert_eq!(detect("\n\t", &preferred, &installed(), &maps), None);
        assert_eq!(detect("日本", &preferred, &installed(), &maps), None);
        assert_eq!(detect("abc", &preferred, &[], &maps), None);
    }

    #[test]
    fn test_full_tie_returns_preferred() {
        let maps = Keymaps::builtin();
        // digits exist on every table
        let found = detect("2024", &LayoutId::new("de"), &installed(), &maps);
        assert_eq!(found, Some(LayoutId::new("de")));
    }

    #[test]
    fn test_tie_without_preferred_keeps_first() {
        let maps = Keymaps::builtin();
        let found = detect("2024", &LayoutId::new("fr"), &installed(), &maps);
        assert_eq!(found, Some(LayoutId::new("us")));
    }

    #[test]
    fn test_preferred_does_not_beat_higher_score() {
        let maps = Keymaps::builtin();
        // latin letters score on us and de, never on ru
        let found = detect("wq", &LayoutId::new("ru"), &installed(), &maps);
        assert_eq!(found, Some(LayoutId::new("us")));
    }
}
