//! Save/restore markup directives
//!
//! Directive strings are opaque to us; the renderer interprets them. We only
//! choose whether to emit one and which slot it names.

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::MarkupSlot;

const SAVE_PREFIX: &str = "<mark name=\"cmd:playback-save,data:{+stateToSAVE+:+MarkupState";
const RESTORE_PREFIX: &str = "<mark name=\"cmd:playback-restore,data:{+stateToRESTORE+:+MarkupState";
const SUFFIX: &str = "+}\"/>";

lazy_static! {
    static ref RE_MARK: Regex = Regex::new(r"<mark\b[^>]*/>").unwrap();
}

/// Save directive for a slot; `None` gives the tangent (unslotted) form
pub fn save_directive(slot: Option<MarkupSlot>) -> String {
    directive(SAVE_PREFIX, slot)
}

/// Restore directive for a slot; `None` gives the tangent (unslotted) form
pub fn restore_directive(slot: Option<MarkupSlot>) -> String {
    directive(RESTORE_PREFIX, slot)
}

fn directive(prefix: &str, slot: Option<MarkupSlot>) -> String {
    match slot {
        Some(slot) => format!("{}{}{}", prefix, slot.index(), SUFFIX),
        None => format!("{}{}", prefix, SUFFIX),
    }
}

/// True when the text carries no speech: only markup tags and whitespace.
/// Empty text counts as markup-only.
pub fn is_markup_only(text: &str) -> bool {
    RE_MARK.replace_all(text, "").trim().is_empty()
}
