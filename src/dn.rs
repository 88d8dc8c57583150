//! Distinguished names.
//!
//! A [`Dn`] is an ordered list of RDNs, leaf first, exactly as written in
//! string form (`uid=jdoe,ou=people,o=example`). Equality, hashing and
//! ordering use a normalized form (lower-cased attribute types and values,
//! collapsed whitespace) so that `CN=John  Doe,O=Example` and
//! `cn=john doe,o=example` name the same entry, while `Display` preserves the
//! user-supplied spelling.

use crate::error::{DirectoryError, ResultCode};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Errors produced while decoding a DN string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DnError {
    #[error("DN '{dn}' contains an empty RDN component")]
    EmptyComponent { dn: String },

    #[error("DN '{dn}' has an attribute value assertion without '='")]
    MissingEquals { dn: String },

    #[error("DN '{dn}' has an empty attribute type")]
    EmptyAttributeType { dn: String },

    #[error("DN '{dn}' has an invalid attribute type '{attribute_type}'")]
    InvalidAttributeType { dn: String, attribute_type: String },

    #[error("DN '{dn}' contains an invalid escape sequence")]
    InvalidEscape { dn: String },

    #[error("DN '{dn}' contains an unterminated quoted value")]
    UnterminatedQuote { dn: String },
}

impl From<DnError> for DirectoryError {
    fn from(err: DnError) -> Self {
        DirectoryError::new(ResultCode::InvalidDnSyntax, err.to_string())
    }
}

/// A single attribute value assertion within an RDN.
#[derive(Debug, Clone)]
pub struct Ava {
    attribute_type: String,
    value: String,
}

impl Ava {
    pub fn new(attribute_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute_type: attribute_type.into(),
            value: value.into(),
        }
    }

    pub fn attribute_type(&self) -> &str {
        &self.attribute_type
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    fn normalized(&self) -> String {
        format!(
            "{}={}",
            self.attribute_type.to_ascii_lowercase(),
            escape_value(&normalize_value(&self.value))
        )
    }
}

/// A relative distinguished name: one or more AVAs joined by `+`.
#[derive(Debug, Clone)]
pub struct Rdn {
    avas: Vec<Ava>,
}

impl Rdn {
    /// Single-valued RDN.
    pub fn new(attribute_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            avas: vec![Ava::new(attribute_type, value)],
        }
    }

    /// Parse a standalone RDN such as `uid=jdoe` or `cn=a+sn=b`.
    pub fn parse(raw: &str) -> Result<Self, DnError> {
        let dn = Dn::parse(raw)?;
        match dn.rdns.len() {
            1 => Ok(dn.rdns.into_iter().next().unwrap_or_else(|| Rdn { avas: Vec::new() })),
            _ => Err(DnError::EmptyComponent {
                dn: raw.to_string(),
            }),
        }
    }

    pub fn avas(&self) -> &[Ava] {
        &self.avas
    }

    fn normalized(&self) -> String {
        let mut parts: Vec<String> = self.avas.iter().map(Ava::normalized).collect();
        parts.sort();
        parts.join("+")
    }
}

impl PartialEq for Rdn {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for Rdn {}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .avas
            .iter()
            .map(|ava| format!("{}={}", ava.attribute_type, escape_value(&ava.value)))
            .collect();
        write!(f, "{}", parts.join("+"))
    }
}

/// A distinguished name.
#[derive(Clone)]
pub struct Dn {
    rdns: Vec<Rdn>,
    normalized: String,
}

impl Dn {
    /// The empty DN naming the root DSE.
    pub fn root() -> Self {
        Self {
            rdns: Vec::new(),
            normalized: String::new(),
        }
    }

    fn from_rdns(rdns: Vec<Rdn>) -> Self {
        let normalized = rdns
            .iter()
            .map(Rdn::normalized)
            .collect::<Vec<_>>()
            .join(",");
        Self { rdns, normalized }
    }

    /// Decode a DN from its string representation.
    pub fn parse(raw: &str) -> Result<Self, DnError> {
        if raw.trim().is_empty() {
            return Ok(Self::root());
        }

        let mut rdns = Vec::new();
        let mut avas = Vec::new();
        let mut chars = raw.chars().peekable();

        loop {
            // attribute type
            let mut attribute_type = String::new();
            loop {
                match chars.next() {
                    Some('=') => break,
                    Some(',') | Some(';') | Some('+') | None => {
                        return Err(if attribute_type.trim().is_empty() {
                            DnError::EmptyComponent {
                                dn: raw.to_string(),
                            }
                        } else {
                            DnError::MissingEquals {
                                dn: raw.to_string(),
                            }
                        });
                    }
                    Some(c) => attribute_type.push(c),
                }
            }
            let attribute_type = attribute_type.trim().to_string();
            if attribute_type.is_empty() {
                return Err(DnError::EmptyAttributeType {
                    dn: raw.to_string(),
                });
            }
            if !is_valid_attribute_type(&attribute_type) {
                return Err(DnError::InvalidAttributeType {
                    dn: raw.to_string(),
                    attribute_type,
                });
            }

            // attribute value
            while chars.peek() == Some(&' ') {
                chars.next();
            }
            let mut value = String::new();
            let terminator;
            if chars.peek() == Some(&'"') {
                chars.next();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c) => value.push(c),
                            None => {
                                return Err(DnError::InvalidEscape {
                                    dn: raw.to_string(),
                                });
                            }
                        },
                        Some(c) => value.push(c),
                        None => {
                            return Err(DnError::UnterminatedQuote {
                                dn: raw.to_string(),
                            });
                        }
                    }
                }
                while chars.peek() == Some(&' ') {
                    chars.next();
                }
                terminator = chars.next();
            } else {
                let mut trailing_escaped = 0usize;
                loop {
                    match chars.next() {
                        Some('\\') => {
                            let decoded = unescape(&mut chars).ok_or_else(|| {
                                DnError::InvalidEscape {
                                    dn: raw.to_string(),
                                }
                            })?;
                            value.push_str(&decoded);
                            trailing_escaped = value.len();
                        }
                        Some(c @ (',' | ';' | '+')) => {
                            terminator = Some(c);
                            break;
                        }
                        Some(c) => value.push(c),
                        None => {
                            terminator = None;
                            break;
                        }
                    }
                }
                // unescaped trailing spaces are insignificant
                while value.len() > trailing_escaped && value.ends_with(' ') {
                    value.pop();
                }
            }

            avas.push(Ava::new(attribute_type, value));

            match terminator {
                Some('+') => continue,
                Some(',') | Some(';') => {
                    rdns.push(Rdn {
                        avas: std::mem::take(&mut avas),
                    });
                    while chars.peek() == Some(&' ') {
                        chars.next();
                    }
                    if chars.peek().is_none() {
                        return Err(DnError::EmptyComponent {
                            dn: raw.to_string(),
                        });
                    }
                }
                None => {
                    rdns.push(Rdn {
                        avas: std::mem::take(&mut avas),
                    });
                    break;
                }
                Some(_) => {
                    return Err(DnError::MissingEquals {
                        dn: raw.to_string(),
                    });
                }
            }
        }

        Ok(Self::from_rdns(rdns))
    }

    pub fn is_root(&self) -> bool {
        self.rdns.is_empty()
    }

    /// Number of RDN components.
    pub fn len(&self) -> usize {
        self.rdns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rdns.is_empty()
    }

    /// The leaf RDN, `None` for the root DSE.
    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// The immediate parent, `None` for the root DSE. The parent of a
    /// single-component DN is the root DSE.
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            None
        } else {
            Some(Self::from_rdns(self.rdns[1..].to_vec()))
        }
    }

    /// The DN of an immediate child.
    pub fn child(&self, rdn: Rdn) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.rdns.iter().cloned());
        Self::from_rdns(rdns)
    }

    /// Whether `self` lies strictly below `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &Dn) -> bool {
        self.rdns.len() > ancestor.rdns.len() && self.ends_with(ancestor)
    }

    /// Whether `self` equals `ancestor` or lies below it.
    pub fn is_subordinate_or_equal(&self, ancestor: &Dn) -> bool {
        self.rdns.len() >= ancestor.rdns.len() && self.ends_with(ancestor)
    }

    /// Whether `self` is an immediate child of `parent`.
    pub fn is_child_of(&self, parent: &Dn) -> bool {
        self.rdns.len() == parent.rdns.len() + 1 && self.ends_with(parent)
    }

    fn ends_with(&self, suffix: &Dn) -> bool {
        if suffix.rdns.is_empty() {
            return true;
        }
        let offset = self.rdns.len() - suffix.rdns.len();
        self.rdns[offset..]
            .iter()
            .zip(suffix.rdns.iter())
            .all(|(a, b)| a == b)
    }

    /// Move this DN from under `old_base` to under `new_base`. Returns `None`
    /// if `self` is not subordinate to `old_base`.
    pub fn rebase(&self, old_base: &Dn, new_base: &Dn) -> Option<Dn> {
        if !self.is_subordinate_or_equal(old_base) {
            return None;
        }
        let keep = self.rdns.len() - old_base.rdns.len();
        let mut rdns = self.rdns[..keep].to_vec();
        rdns.extend(new_base.rdns.iter().cloned());
        Some(Self::from_rdns(rdns))
    }

    /// Normalized string form used for comparisons and map keys.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for Dn {}

impl Hash for Dn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl PartialOrd for Dn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Dn {
    fn cmp(&self, other: &Self) -> Ordering {
        self.normalized.cmp(&other.normalized)
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.rdns.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

impl fmt::Debug for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dn(\"{}\")", self)
    }
}

impl std::str::FromStr for Dn {
    type Err = DnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dn::parse(s)
    }
}

impl Serialize for Dn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Dn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Dn::parse(&raw).map_err(serde::de::Error::custom)
    }
}

fn is_valid_attribute_type(attribute_type: &str) -> bool {
    let mut chars = attribute_type.chars();
    match chars.next() {
        // numeric OID
        Some(c) if c.is_ascii_digit() => attribute_type
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.'),
        Some(c) if c.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == ';')
        }
        _ => false,
    }
}

/// Decode one escape. Consecutive hex pairs are UTF-8 bytes of a single
/// sequence and are decoded together.
fn unescape(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<String> {
    let first = chars.next()?;
    if !first.is_ascii_hexdigit() {
        return Some(first.to_string());
    }
    let mut bytes = vec![hex_byte(first, chars.next()?)?];
    loop {
        let mut ahead = chars.clone();
        match (ahead.next(), ahead.next(), ahead.next()) {
            (Some('\\'), Some(high), Some(low)) if high.is_ascii_hexdigit() => {
                bytes.push(hex_byte(high, low)?);
                *chars = ahead;
            }
            _ => break,
        }
    }
    String::from_utf8(bytes).ok()
}

fn hex_byte(high: char, low: char) -> Option<u8> {
    Some((high.to_digit(16)? * 16 + low.to_digit(16)?) as u8)
}

fn normalize_value(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        match c {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '#' if i == 0 => escaped.push_str("\\#"),
            ' ' if i == 0 || i == last => escaped.push_str("\\ "),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    #[test]
    fn parses_components_leaf_first() {
        let parsed = dn("uid=jdoe,ou=People,o=example");
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed.rdn().unwrap().avas()[0].value(), "jdoe");
        assert_eq!(parsed.to_string(), "uid=jdoe,ou=People,o=example");
    }

    #[test]
    fn equality_is_case_and_space_insensitive() {
        assert_eq!(dn("CN=John  Doe, O=Example"), dn("cn=john doe,o=example"));
        assert_ne!(dn("cn=a,o=example"), dn("cn=b,o=example"));
    }

    #[test]
    fn handles_escapes_and_quotes() {
        let escaped = dn(r"cn=Doe\, John,o=example");
        assert_eq!(escaped.rdn().unwrap().avas()[0].value(), "Doe, John");
        let hex = dn(r"cn=Doe\2C John,o=example");
        assert_eq!(escaped, hex);
        let quoted = dn(r#"cn="Doe, John",o=example"#);
        assert_eq!(escaped, quoted);
        assert_eq!(escaped.to_string(), r"cn=Doe\, John,o=example");
    }

    #[test]
    fn hex_escapes_decode_as_utf8() {
        assert_eq!(dn(r"cn=caf\C3\A9,o=test"), dn("cn=café,o=test"));
        assert_eq!(dn(r"cn=caf\C3\A9,o=test").rdn().unwrap().avas()[0].value(), "café");
        assert_eq!(dn(r"cn=\C3\A9\2C x,o=test").rdn().unwrap().avas()[0].value(), "é, x");
        assert!(matches!(
            Dn::parse(r"cn=caf\C3,o=test"),
            Err(DnError::InvalidEscape { .. })
        ));
    }

    #[test]
    fn multi_valued_rdn_ignores_ava_order() {
        assert_eq!(dn("cn=a+sn=b,o=x"), dn("sn=b+cn=a,o=x"));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(Dn::parse("uid"), Err(DnError::MissingEquals { .. })));
        assert!(matches!(Dn::parse("=x,o=y"), Err(DnError::EmptyAttributeType { .. })));
        assert!(matches!(Dn::parse("uid=x,,o=y"), Err(DnError::EmptyComponent { .. })));
        assert!(matches!(Dn::parse("uid=x,"), Err(DnError::EmptyComponent { .. })));
        assert!(matches!(Dn::parse("cn=\"open,o=y"), Err(DnError::UnterminatedQuote { .. })));
        assert!(matches!(Dn::parse("c n=x"), Err(DnError::InvalidAttributeType { .. })));
        assert!(Dn::parse("").unwrap().is_root());
    }

    #[test]
    fn hierarchy_helpers() {
        let base = dn("o=example");
        let people = dn("ou=people,o=example");
        let user = dn("uid=jdoe,ou=people,o=example");
        assert!(user.is_descendant_of(&base));
        assert!(!base.is_descendant_of(&base));
        assert!(base.is_subordinate_or_equal(&base));
        assert!(user.is_child_of(&people));
        assert_eq!(user.parent().unwrap(), people);
        assert_eq!(base.parent().unwrap(), Dn::root());
        assert!(Dn::root().parent().is_none());
        assert!(user.is_descendant_of(&Dn::root()));

        let moved = user
            .rebase(&people, &dn("ou=staff,o=example"))
            .unwrap();
        assert_eq!(moved, dn("uid=jdoe,ou=staff,o=example"));
        assert!(base.rebase(&people, &base).is_none());
    }

    #[test]
    fn serde_uses_string_form() {
        let parsed = dn("uid=jdoe,o=example");
        let json = serde_json::to_string(&parsed).unwrap();
        assert_eq!(json, "\"uid=jdoe,o=example\"");
        let back: Dn = serde_json::from_str(&json).unwrap();
        assert_eq!(back, parsed);
    }

    proptest! {
        #[test]
        fn child_of_parent_is_descendant(values in proptest::collection::vec("[a-z][a-z0-9]{0,8}", 1..6)) {
            let raw = values
                .iter()
                .map(|v| format!("ou={}", v))
                .collect::<Vec<_>>()
                .join(",");
            let parent = Dn::parse(&raw).unwrap();
            let child = parent.child(Rdn::new("cn", "leaf"));
            prop_assert!(child.is_descendant_of(&parent));
            prop_assert!(child.is_child_of(&parent));
            prop_assert_eq!(child.parent().unwrap(), parent.clone());
            prop_assert_eq!(child.len(), parent.len() + 1);
        }
    }
}
