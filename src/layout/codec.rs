//! Conversion between literal text and `U+XXXX` code point notation

/// Most significant hex digits a code point can have (U+10FFFF)
const MAX_HEX_DIGITS: usize = 6;

/// Replace every `U+` token followed by a valid code point with that character
///
/// A token is `U+` followed by a run of hex digits; leading zeros are
/// allowed in any number. Values beyond U+10FFFF and surrogate code points
/// are not Unicode scalar values; such tokens are copied unchanged, as is
/// everything else.
pub fn hex_to_unicode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find("U+") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];
        let digits = after
            .bytes()
            .take_while(|b| b.is_ascii_hexdigit())
            .count();

        let significant = after[..digits].trim_start_matches('0');
        let decoded = if digits == 0 || significant.len() > MAX_HEX_DIGITS {
            None
        } else if significant.is_empty() {
            Some('\0')
        } else {
            u32::from_str_radix(significant, 16)
                .ok()
                .and_then(char::from_u32)
        };

        match decoded {
            Some(ch) => {
                out.push(ch);
                rest = &after[digits..];
            }
            None => {
                // keep the 'U' and rescan from the '+'
                out.push('U');
                rest = &rest[pos + 1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Follow every character with `=U+XX ` naming its code point
///
/// Hex digits are uppercase, at least two wide.
pub fn unicode_to_hex(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 8);
    for ch in text.chars() {
        out.push(ch);
        out.push_str(&format!("=U+{:02X} ", u32::from(ch)));
    }
    out
}
