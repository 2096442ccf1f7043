//! Reversible obfuscation of text fields in the Kerio record
//!
//! The record stores `username` and `password` with a fixed
//! character-to-entity substitution table. This is not a security boundary.
//! Line breaks are escaped as well, since the reader only matches values
//! on a single line. Both directions are single left-to-right passes, so
//! any plaintext survives encode followed by decode unchanged.

/// Characters rewritten on encode, in table order
const SUBSTITUTIONS: [(char, &str); 10] = [
    ('&', "&amp;"),
    ('<', "&lt;"),
    ('>', "&gt;"),
    ('"', "&quot;"),
    ('\'', "&#39;"),
    ('!', "&#33;"),
    ('#', "&#35;"),
    ('$', "&#36;"),
    ('\n', "&#10;"),
    ('\r', "&#13;"),
];

/// Replace every character from the substitution table with its entity
pub fn encode_entities(text: &str) -> String {
    let mut encoded = String::with_capacity(text.len());
    for ch in text.chars() {
        match SUBSTITUTIONS.iter().find(|(c, _)| *c == ch) {
            Some((_, entity)) => encoded.push_str(entity),
            None => encoded.push(ch),
        }
    }
    encoded
}

/// Turn named entities from the table and decimal `&#N;` entities back
/// into characters
///
/// Anything that does not form a known entity is kept verbatim.
pub fn decode_entities(text: &str) -> String {
    let mut decoded = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find('&') {
        decoded.push_str(&rest[..pos]);
        rest = &rest[pos..];

        match decode_entity_prefix(rest) {
            Some((ch, consumed)) => {
                decoded.push(ch);
                rest = &rest[consumed..];
            }
            None => {
                decoded.push('&');
                rest = &rest[1..];
            }
        }
    }

    decoded.push_str(rest);
    decoded
}

/// Decode the entity at the start of `text`, returning the character and
/// the number of bytes it spans
fn decode_entity_prefix(text: &str) -> Option<(char, usize)> {
    if let Some((ch, entity)) = SUBSTITUTIONS
        .iter()
        .find(|(_, entity)| text.starts_with(entity))
    {
        return Some((*ch, entity.len()));
    }

    let digits = text.strip_prefix("&#")?;
    let end = digits.find(';')?;
    let number = &digits[..end];
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let code: u32 = number.parse().ok()?;
    let ch = char::from_u32(code)?;
    Some((ch, 2 + end + 1))
}
