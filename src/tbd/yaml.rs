//! Scalar quoting for the YAML subset stub files use.
//!
//! Most names are written bare. A name that YAML would misread (a leading
//! indicator, a flow-collection character, `: `, a reserved word) is wrapped
//! in single quotes; one that also contains a single quote or a control
//! character is double-quoted with backslash escapes.

use std::borrow::Cow;

/// How a scalar must be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quoting {
    /// Written as is
    None,
    /// Wrapped in `'...'`
    Single,
    /// Wrapped in `"..."` with escapes
    Double,
}

// Characters that cannot start a plain scalar.
const LEADING_INDICATORS: &[u8] = b"-?:,[]{}#&*!|>'\"%@`";

// Characters that end a plain scalar inside a flow sequence.
const FLOW_INDICATORS: &[u8] = b",[]{}";

const RESERVED_WORDS: &[&str] = &["~", "null", "true", "false", "yes", "no", "on", "off"];

/// Returns true if `value` cannot be written as a plain scalar.
#[inline]
pub fn needs_quotes(value: &str) -> bool {
    quoting_for(value) != Quoting::None
}

/// Decides how `value` must be quoted.
pub fn quoting_for(value: &str) -> Quoting {
    let bytes = value.as_bytes();
    let Some((&first, _)) = bytes.split_first() else {
        return Quoting::Single;
    };

    if bytes.iter().any(u8::is_ascii_control) {
        return Quoting::Double;
    }

    let mut special = LEADING_INDICATORS.contains(&first)
        || first.is_ascii_whitespace()
        || bytes.last().is_some_and(|b| b.is_ascii_whitespace() || *b == b':')
        || bytes.iter().any(|b| FLOW_INDICATORS.contains(b))
        || bytes.windows(2).any(|w| w == b": " || w == b" #")
        || RESERVED_WORDS.iter().any(|w| value.eq_ignore_ascii_case(w));

    // Numbers would be read back as numbers.
    special |= value.parse::<f64>().is_ok();

    match (special, bytes.contains(&b'\'')) {
        (false, _) => Quoting::None,
        (true, false) => Quoting::Single,
        (true, true) => Quoting::Double,
    }
}

/// Returns `value` in the form it is written in a stub file.
pub fn quote(value: &str) -> Cow<'_, str> {
    match quoting_for(value) {
        Quoting::None => Cow::Borrowed(value),
        Quoting::Single => Cow::Owned(format!("'{value}'")),
        Quoting::Double => {
            let mut out = String::with_capacity(value.len() + 2);
            out.push('"');
            for c in value.chars() {
                match c {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    '\n' => out.push_str("\\n"),
                    '\t' => out.push_str("\\t"),
                    '\r' => out.push_str("\\r"),
                    c if c.is_control() => out.push_str(&format!("\\x{:02X}", c as u32)),
                    c => out.push(c),
                }
            }
            out.push('"');
            Cow::Owned(out)
        }
    }
}
