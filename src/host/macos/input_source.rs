//! Keyboard input sources through the Carbon Text Input Sources API
//!
//! Besides listing and selecting layouts, this reads each layout's
//! `uchr` data and asks `UCKeyTranslate` what the keymap positions type.

use std::ffi::c_void;

use core_foundation::array::{CFArray, CFArrayRef};
use core_foundation::base::{Boolean, TCFType};
use core_foundation::boolean::{CFBoolean, CFBooleanRef};
use core_foundation::data::{CFData, CFDataRef};
use core_foundation::dictionary::CFDictionaryRef;
use core_foundation::string::{CFString, CFStringRef};
use tracing::{debug, warn};

use super::keycodes::POSITION_CODES;
use crate::host::HostError;
use crate::layout::keymap::Keymap;
use crate::layout::{LayoutId, MAX_LAYOUTS};

type TISInputSourceRef = *const c_void;
type OSStatus = i32;

const UC_KEY_ACTION_DOWN: u16 = 0;
/// `shiftKey >> 8`
const UC_SHIFT_STATE: u32 = 0x02;
/// kUCKeyTranslateNoDeadKeysMask: dead keys type their spacing form
const UC_NO_DEAD_KEYS: u32 = 1;

#[link(name = "Carbon", kind = "framework")]
extern "C" {
    static kTISPropertyInputSourceCategory: CFStringRef;
    static kTISPropertyInputSourceID: CFStringRef;
    static kTISPropertyInputSourceIsSelectCapable: CFStringRef;
    static kTISPropertyLocalizedName: CFStringRef;
    static kTISPropertyUnicodeKeyLayoutData: CFStringRef;
    static kTISCategoryKeyboardInputSource: CFStringRef;

    fn TISCreateInputSourceList(properties: CFDictionaryRef, include_all_installed: Boolean) -> CFArrayRef;
    fn TISGetInputSourceProperty(source: TISInputSourceRef, key: CFStringRef) -> *const c_void;
    fn TISSelectInputSource(source: TISInputSourceRef) -> OSStatus;

    fn LMGetKbdType() -> u8;
    #[allow(clippy::too_many_arguments)]
    fn UCKeyTranslate(
        layout: *const c_void,
        key_code: u16,
        key_action: u16,
        modifier_state: u32,
        keyboard_type: u32,
        options: u32,
        dead_key_state: *mut u32,
        max_length: usize,
        actual_length: *mut usize,
        unicode: *mut u16,
    ) -> OSStatus;
}

/// An enabled keyboard layout
#[derive(Debug, Clone)]
pub struct InputSource {
    pub id: LayoutId,
    pub name: String,
}

fn string_property(source: TISInputSourceRef, key: CFStringRef) -> Option<String> {
    let value = unsafe { TISGetInputSourceProperty(source, key) };
    if value.is_null() {
        return None;
    }
    let value = unsafe { CFString::wrap_under_get_rule(value as CFStringRef) };
    Some(value.to_string())
}

fn bool_property(source: TISInputSourceRef, key: CFStringRef) -> bool {
    let value = unsafe { TISGetInputSourceProperty(source, key) };
    if value.is_null() {
        return false;
    }
    let value = unsafe { CFBoolean::wrap_under_get_rule(value as CFBooleanRef) };
    value.into()
}

/// Run `f` over the selectable keyboard layouts, in system order
fn with_keyboard_sources<R>(f: impl FnOnce(&[TISInputSourceRef]) -> R) -> Result<R, HostError> {
    let list = unsafe { TISCreateInputSourceList(std::ptr::null(), 0) };
    if list.is_null() {
        return Err(HostError::LayoutList("TISCreateInputSourceList returned nothing".into()));
    }
    // the array keeps the sources alive until it is dropped
    let list: CFArray<*const c_void> = unsafe { CFArray::wrap_under_create_rule(list) };
    let keyboard_category = unsafe { kTISCategoryKeyboardInputSource };
    let keyboard_category = unsafe { CFString::wrap_under_get_rule(keyboard_category) }.to_string();

    let sources: Vec<TISInputSourceRef> = list
        .get_all_values()
        .into_iter()
        .filter(|&source| {
            let category = unsafe { kTISPropertyInputSourceCategory };
            let selectable = unsafe { kTISPropertyInputSourceIsSelectCapable };
            string_property(source, category).as_deref() == Some(keyboard_category.as_str())
                && bool_property(source, selectable)
        })
        .collect();

    Ok(f(&sources))
}

/// Enabled keyboard layouts, at most `MAX_LAYOUTS`
pub fn keyboard_layouts() -> Result<Vec<InputSource>, HostError> {
    let id_key = unsafe { kTISPropertyInputSourceID };
    let name_key = unsafe { kTISPropertyLocalizedName };

    let layouts = with_keyboard_sources(|sources| {
        sources
            .iter()
            .filter_map(|&source| {
                let id = string_property(source, id_key)?;
                let name = string_property(source, name_key).unwrap_or_else(|| id.clone());
                Some(InputSource {
                    id: LayoutId::new(id),
                    name,
                })
            })
            .collect::<Vec<_>>()
    })?;

    if layouts.len() > MAX_LAYOUTS {
        warn!(
            installed = layouts.len(),
            max = MAX_LAYOUTS,
            "more keyboard layouts than supported, ignoring the rest"
        );
    }

    Ok(layouts.into_iter().take(MAX_LAYOUTS).collect())
}

/// Key tables for the enabled layouts that carry `uchr` data
///
/// Input methods (Japanese, Chinese and the like) have none and are left
/// out.
pub fn system_keymaps() -> Result<Vec<Keymap>, HostError> {
    let id_key = unsafe { kTISPropertyInputSourceID };
    let data_key = unsafe { kTISPropertyUnicodeKeyLayoutData };
    let keyboard_type = u32::from(unsafe { LMGetKbdType() });

    with_keyboard_sources(|sources| {
        sources
            .iter()
            .take(MAX_LAYOUTS)
            .filter_map(|&source| {
                let id = string_property(source, id_key)?;
                let data = unsafe { TISGetInputSourceProperty(source, data_key) };
                if data.is_null() {
                    debug!(id, "input source has no key layout data");
                    return None;
                }
                let data = unsafe { CFData::wrap_under_get_rule(data as CFDataRef) };
                let layout = data.bytes().as_ptr().cast::<c_void>();

                let row = |modifiers: u32| {
                    POSITION_CODES
                        .iter()
                        .map(|&code| translate_key(layout, code, modifiers, keyboard_type))
                        .collect::<Vec<_>>()
                };
                Some(Keymap::from_positions(id, row(0), row(UC_SHIFT_STATE)))
            })
            .collect()
    })
}

/// Character one key press types, if it is a single printable one
fn translate_key(layout: *const c_void, code: u16, modifiers: u32, keyboard_type: u32) -> Option<char> {
    let mut dead_key_state = 0u32;
    let mut buf = [0u16; 4];
    let mut len = 0usize;
    let status = unsafe {
        UCKeyTranslate(
            layout,
            code,
            UC_KEY_ACTION_DOWN,
            modifiers,
            keyboard_type,
            UC_NO_DEAD_KEYS,
            &mut dead_key_state,
            buf.len(),
            &mut len,
            buf.as_mut_ptr(),
        )
    };
    if status != 0 {
        return None;
    }
    single_printable(&buf[..len.min(buf.len())])
}

fn single_printable(units: &[u16]) -> Option<char> {
    let mut chars = char::decode_utf16(units.iter().copied());
    match (chars.next(), chars.next()) {
        (Some(Ok(ch)), None) if !ch.is_control() => Some(ch),
        _ => None,
    }
}

/// Make `layout` the active input source
pub fn select(layout: &LayoutId) -> Result<(), HostError> {
    let id_key = unsafe { kTISPropertyInputSourceID };

    let status = with_keyboard_sources(|sources| {
        sources
            .iter()
            .find(|&&source| string_property(source, id_key).is_some_and(|id| layout.matches(&id)))
            .map(|&source| unsafe { TISSelectInputSource(source) })
    })?;

    match status {
        Some(0) => {
            debug!(%layout, "input source selected");
            Ok(())
        }
        Some(status) => Err(HostError::Window(format!(
            "TISSelectInputSource failed with status {status}"
        ))),
        None => Err(HostError::UnknownLayout(layout.clone())),
    }
}
