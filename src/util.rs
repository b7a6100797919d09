//! String-escaping helpers for diagnostics and logging.
//!
//! Both functions are pure and synchronous. `ldap_escape` is the teacher's
//! own filter-literal escaper, unchanged; `dn_escape` is new, grounded on
//! the same byte-scanning shape, for the handful of places the core needs
//! to put an attacker-controlled DN or RDN value into a log line or a
//! diagnostic message without it being misread as structure.

use std::borrow::Cow;

/// Escape a filter literal.
///
/// Literal values appearing in an LDAP filter can contain any character,
/// but some characters (parentheses, asterisk, backslash, NUL) must be
/// escaped in the filter's string representation. This function does the
/// escaping.
///
/// The argument, `lit`, can be owned or borrowed. The function doesn't
/// allocate the return value unless there's need to escape the input.
pub fn ldap_escape<'a, S: Into<Cow<'a, str>>>(lit: S) -> Cow<'a, str> {
    #[inline]
    fn needs_escape(c: u8) -> bool {
        c == b'\\' || c == b'*' || c == b'(' || c == b')' || c == 0
    }

    #[inline]
    fn xdigit(c: u8) -> u8 {
        c + if c < 10 { b'0' } else { b'a' - 10 }
    }

    let lit = lit.into();
    let mut output = None;
    for (i, &c) in lit.as_bytes().iter().enumerate() {
        if needs_escape(c) {
            if output.is_none() {
                output = Some(Vec::with_capacity(lit.len() + 12)); // guess: up to 4 escaped chars
                output.as_mut().unwrap().extend(lit[..i].as_bytes());
            }
            let output = output.as_mut().unwrap();
            output.push(b'\\');
            output.push(xdigit(c >> 4));
            output.push(xdigit(c & 0xF));
        } else if let Some(ref mut output) = output {
            output.push(c);
        }
    }
    if let Some(output) = output {
        // unchecked conversion is safe here: we receive a valid
        // UTF-8 value, by definition, and only replace single ASCII
        // bytes with ASCII byte sequences
        Cow::Owned(unsafe { String::from_utf8_unchecked(output) })
    } else {
        lit.into()
    }
}

/// Escape an RDN/DN component per RFC 4514 §2.4: a leading space or `#`, a
/// trailing space, and any of `,+"\<>;` are backslash-escaped; NUL becomes
/// `\00`. Used when echoing an attacker-controlled DN back in a
/// diagnosticMessage or a log line, so it can't be misread as additional
/// DN structure.
pub fn dn_escape<'a, S: Into<Cow<'a, str>>>(dn: S) -> Cow<'a, str> {
    let dn = dn.into();
    let bytes = dn.as_bytes();

    #[inline]
    fn needs_escape(c: u8) -> bool {
        matches!(c, b',' | b'+' | b'"' | b'\\' | b'<' | b'>' | b';' | 0)
    }

    let mut output = String::with_capacity(dn.len());
    for (i, &c) in bytes.iter().enumerate() {
        let leading_space_or_hash = i == 0 && (c == b' ' || c == b'#');
        let trailing_space = i == bytes.len() - 1 && c == b' ';
        if c == 0 {
            output.push_str("\\00");
        } else if needs_escape(c) || leading_space_or_hash || trailing_space {
            output.push('\\');
            output.push(c as char);
        } else {
            output.push(c as char);
        }
    }
    if output == dn {
        dn
    } else {
        Cow::Owned(output)
    }
}

/// Lowercase-fold a byte string for case-insensitive ASCII comparison
/// (spec §4.9's compare fallback, spec §4.12's DN-free string matches).
pub fn ascii_fold_bytes(b: &[u8]) -> Vec<u8> {
    b.iter().map(|c| c.to_ascii_lowercase()).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ldap_escape_wraps_metacharacters() {
        assert_eq!(ldap_escape("a*b"), "a\\2ab");
        assert_eq!(ldap_escape("plain"), "plain");
    }

    #[test]
    fn dn_escape_handles_commas_and_leading_space() {
        assert_eq!(dn_escape("Doe, John"), "Doe\\, John");
        assert_eq!(dn_escape(" leading"), "\\ leading");
        assert_eq!(dn_escape("trailing "), "trailing\\ ");
        assert_eq!(dn_escape("plain"), "plain");
    }
}
