//! Retype text typed under one layout as if it had been typed under another

use super::{KeyMapping, LayoutId};

/// Map each character through the key that produced it
///
/// Characters with no key under `source`, or whose key produces nothing
/// under `target`, are copied unchanged.
pub fn retype<M>(text: &str, source: &LayoutId, target: &LayoutId, mapping: &M) -> String
where
    M: KeyMapping + ?Sized,
{
    text.chars()
        .map(|ch| {
            mapping
                .stroke_for(source, ch)
                .and_then(|stroke| mapping.char_for(target, stroke))
                .unwrap_or(ch)
        })
        .collect()
}
