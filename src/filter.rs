//! Search filters in their RFC 4515 string form.
//!
//! Filters arrive from the protocol layer as strings (the search filter
//! itself, and the assertion and matched-values controls). They are decoded
//! once per operation and evaluated against candidate entries.

use crate::entry::{Entry, values_match};
use crate::error::{DirectoryError, ResultCode};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("Filter '{filter}' is empty")]
    Empty { filter: String },

    #[error("Filter '{filter}' has unbalanced parentheses")]
    Unbalanced { filter: String },

    #[error("Filter '{filter}' has a component without an attribute description")]
    MissingAttribute { filter: String },

    #[error("Filter '{filter}' has a component without a comparison operator")]
    MissingOperator { filter: String },

    #[error("Filter '{filter}' contains an invalid escape sequence")]
    InvalidEscape { filter: String },

    #[error("Filter '{filter}' has trailing characters after position {position}")]
    TrailingCharacters { filter: String, position: usize },
}

impl From<FilterError> for DirectoryError {
    fn from(err: FilterError) -> Self {
        DirectoryError::new(ResultCode::ProtocolError, err.to_string())
    }
}

/// A decoded search filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equality {
        attribute: String,
        value: String,
    },
    Substring {
        attribute: String,
        initial: Option<String>,
        any: Vec<String>,
        last: Option<String>,
    },
    GreaterOrEqual {
        attribute: String,
        value: String,
    },
    LessOrEqual {
        attribute: String,
        value: String,
    },
    Present {
        attribute: String,
    },
    Approximate {
        attribute: String,
        value: String,
    },
}

impl Filter {
    /// `(objectClass=*)`, the filter matching every entry.
    pub fn match_all() -> Self {
        Filter::Present {
            attribute: "objectClass".to_string(),
        }
    }

    /// Decode a string filter. A bare item such as `uid=jdoe` is accepted
    /// without its enclosing parentheses.
    pub fn parse(raw: &str) -> Result<Self, FilterError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(FilterError::Empty {
                filter: raw.to_string(),
            });
        }
        let owned;
        let text = if trimmed.starts_with('(') {
            trimmed
        } else {
            owned = format!("({})", trimmed);
            owned.as_str()
        };
        let chars: Vec<char> = text.chars().collect();
        let mut parser = Parser {
            raw,
            chars: &chars,
            pos: 0,
        };
        let filter = parser.parse_filter()?;
        if parser.pos != chars.len() {
            return Err(FilterError::TrailingCharacters {
                filter: raw.to_string(),
                position: parser.pos,
            });
        }
        Ok(filter)
    }

    /// Evaluate the filter against an entry.
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Filter::And(filters) => filters.iter().all(|f| f.matches(entry)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(entry)),
            Filter::Not(filter) => !filter.matches(entry),
            Filter::Present { attribute } => entry.has_attribute(attribute),
            _ => {
                let attribute = self.attribute().unwrap_or_default();
                entry
                    .values(attribute)
                    .iter()
                    .any(|value| self.matches_value(attribute, value))
            }
        }
    }

    /// Evaluate a simple filter item against one attribute value. Composite
    /// filters and items naming another attribute never match.
    pub fn matches_value(&self, attribute: &str, value: &str) -> bool {
        match self {
            Filter::Equality {
                attribute: a,
                value: v,
            } if a.eq_ignore_ascii_case(attribute) => values_match(value, v),
            Filter::Approximate {
                attribute: a,
                value: v,
            } if a.eq_ignore_ascii_case(attribute) => {
                squash(value) == squash(v)
            }
            Filter::GreaterOrEqual {
                attribute: a,
                value: v,
            } if a.eq_ignore_ascii_case(attribute) => compare(value, v) != Ordering::Less,
            Filter::LessOrEqual {
                attribute: a,
                value: v,
            } if a.eq_ignore_ascii_case(attribute) => compare(value, v) != Ordering::Greater,
            Filter::Present { attribute: a } => a.eq_ignore_ascii_case(attribute),
            Filter::Substring {
                attribute: a,
                initial,
                any,
                last,
            } if a.eq_ignore_ascii_case(attribute) => {
                substring_match(value, initial.as_deref(), any, last.as_deref())
            }
            _ => false,
        }
    }

    /// The attribute named by a simple filter item.
    pub fn attribute(&self) -> Option<&str> {
        match self {
            Filter::Equality { attribute, .. }
            | Filter::Substring { attribute, .. }
            | Filter::GreaterOrEqual { attribute, .. }
            | Filter::LessOrEqual { attribute, .. }
            | Filter::Present { attribute }
            | Filter::Approximate { attribute, .. } => Some(attribute),
            _ => None,
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(filters) => {
                write!(f, "(&")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                write!(f, ")")
            }
            Filter::Or(filters) => {
                write!(f, "(|")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                write!(f, ")")
            }
            Filter::Not(filter) => write!(f, "(!{})", filter),
            Filter::Equality { attribute, value } => {
                write!(f, "({}={})", attribute, escape(value))
            }
            Filter::Approximate { attribute, value } => {
                write!(f, "({}~={})", attribute, escape(value))
            }
            Filter::GreaterOrEqual { attribute, value } => {
                write!(f, "({}>={})", attribute, escape(value))
            }
            Filter::LessOrEqual { attribute, value } => {
                write!(f, "({}<={})", attribute, escape(value))
            }
            Filter::Present { attribute } => write!(f, "({}=*)", attribute),
            Filter::Substring {
                attribute,
                initial,
                any,
                last,
            } => {
                write!(f, "({}=", attribute)?;
                if let Some(initial) = initial {
                    write!(f, "{}", escape(initial))?;
                }
                write!(f, "*")?;
                for part in any {
                    write!(f, "{}*", escape(part))?;
                }
                if let Some(last) = last {
                    write!(f, "{}", escape(last))?;
                }
                write!(f, ")")
            }
        }
    }
}

struct Parser<'a> {
    raw: &'a str,
    chars: &'a [char],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn unbalanced(&self) -> FilterError {
        FilterError::Unbalanced {
            filter: self.raw.to_string(),
        }
    }

    fn invalid_escape(&self) -> FilterError {
        FilterError::InvalidEscape {
            filter: self.raw.to_string(),
        }
    }

    /// Decode a run of `\XX` escapes starting at the current backslash. The
    /// bytes of one run form a single UTF-8 sequence.
    fn escaped_sequence(&mut self) -> Result<String, FilterError> {
        let mut bytes = Vec::new();
        while self.peek() == Some('\\') {
            let byte = match self.chars.get(self.pos + 1..self.pos + 3) {
                Some(&[high, low]) => high
                    .to_digit(16)
                    .zip(low.to_digit(16))
                    .map(|(high, low)| (high * 16 + low) as u8),
                _ => None,
            };
            match byte {
                Some(byte) => bytes.push(byte),
                None if bytes.is_empty() => return Err(self.invalid_escape()),
                None => break,
            }
            self.pos += 3;
        }
        String::from_utf8(bytes).map_err(|_| self.invalid_escape())
    }

    fn expect(&mut self, expected: char) -> Result<(), FilterError> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unbalanced())
        }
    }

    fn parse_filter(&mut self) -> Result<Filter, FilterError> {
        self.expect('(')?;
        let filter = match self.peek() {
            Some('&') => {
                self.pos += 1;
                Filter::And(self.parse_list()?)
            }
            Some('|') => {
                self.pos += 1;
                Filter::Or(self.parse_list()?)
            }
            Some('!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.parse_filter()?))
            }
            Some(_) => self.parse_item()?,
            None => return Err(self.unbalanced()),
        };
        self.expect(')')?;
        Ok(filter)
    }

    fn parse_list(&mut self) -> Result<Vec<Filter>, FilterError> {
        let mut filters = Vec::new();
        while self.peek() == Some('(') {
            filters.push(self.parse_filter()?);
        }
        Ok(filters)
    }

    fn parse_item(&mut self) -> Result<Filter, FilterError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, '=' | '~' | '>' | '<' | '(' | ')') {
                break;
            }
            self.pos += 1;
        }
        let attribute: String = self.chars[start..self.pos].iter().collect();
        let attribute = attribute.trim().to_string();
        if attribute.is_empty() {
            return Err(FilterError::MissingAttribute {
                filter: self.raw.to_string(),
            });
        }

        let operator = match (self.peek(), self.chars.get(self.pos + 1).copied()) {
            (Some('='), _) => {
                self.pos += 1;
                "="
            }
            (Some('~'), Some('=')) => {
                self.pos += 2;
                "~="
            }
            (Some('>'), Some('=')) => {
                self.pos += 2;
                ">="
            }
            (Some('<'), Some('=')) => {
                self.pos += 2;
                "<="
            }
            _ => {
                return Err(FilterError::MissingOperator {
                    filter: self.raw.to_string(),
                });
            }
        };

        // raw value up to the closing parenthesis, split on unescaped '*'
        let mut parts: Vec<String> = vec![String::new()];
        while let Some(c) = self.peek() {
            match c {
                ')' => break,
                '(' => return Err(self.unbalanced()),
                '*' => {
                    parts.push(String::new());
                    self.pos += 1;
                }
                '\\' => {
                    let decoded = self.escaped_sequence()?;
                    if let Some(last) = parts.last_mut() {
                        last.push_str(&decoded);
                    }
                }
                _ => {
                    if let Some(last) = parts.last_mut() {
                        last.push(c);
                    }
                    self.pos += 1;
                }
            }
        }

        let filter = match operator {
            "=" if parts.len() == 2 && parts[0].is_empty() && parts[1].is_empty() => {
                Filter::Present { attribute }
            }
            "=" if parts.len() > 1 => {
                let last_index = parts.len() - 1;
                let initial = Some(parts[0].clone()).filter(|s| !s.is_empty());
                let last = Some(parts[last_index].clone()).filter(|s| !s.is_empty());
                let any = parts[1..last_index]
                    .iter()
                    .filter(|s| !s.is_empty())
                    .cloned()
                    .collect();
                Filter::Substring {
                    attribute,
                    initial,
                    any,
                    last,
                }
            }
            "=" => Filter::Equality {
                attribute,
                value: parts.concat(),
            },
            "~=" => Filter::Approximate {
                attribute,
                value: parts.join("*"),
            },
            ">=" => Filter::GreaterOrEqual {
                attribute,
                value: parts.join("*"),
            },
            _ => Filter::LessOrEqual {
                attribute,
                value: parts.join("*"),
            },
        };
        Ok(filter)
    }
}

fn compare(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<i64>(), b.trim().parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.to_lowercase().cmp(&b.to_lowercase()),
    }
}

fn squash(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

fn substring_match(value: &str, initial: Option<&str>, any: &[String], last: Option<&str>) -> bool {
    let value = value.to_lowercase();
    let mut rest = value.as_str();
    if let Some(initial) = initial {
        let initial = initial.to_lowercase();
        match rest.strip_prefix(initial.as_str()) {
            Some(r) => rest = r,
            None => return false,
        }
    }
    for part in any {
        let part = part.to_lowercase();
        match rest.find(part.as_str()) {
            Some(index) => rest = &rest[index + part.len()..],
            None => return false,
        }
    }
    match last {
        Some(last) => rest.ends_with(&last.to_lowercase()),
        None => true,
    }
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dn::Dn;

    fn entry() -> Entry {
        Entry::new(Dn::parse("uid=jdoe,ou=people,o=example").unwrap())
            .with_object_classes(["top", "person", "inetOrgPerson"])
            .with_attribute("uid", ["jdoe"])
            .with_attribute("cn", ["John Doe"])
            .with_attribute("employeeNumber", ["42"])
            .with_attribute("mail", ["john.doe@example.com"])
    }

    #[test]
    fn parses_composite_filters() {
        let filter = Filter::parse("(&(objectClass=person)(|(uid=jdoe)(uid=asmith))(!(cn=x)))").unwrap();
        match &filter {
            Filter::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("unexpected filter {:?}", other),
        }
        assert!(filter.matches(&entry()));
    }

    #[test]
    fn bare_item_is_accepted() {
        assert_eq!(
            Filter::parse("uid=jdoe").unwrap(),
            Filter::Equality {
                attribute: "uid".to_string(),
                value: "jdoe".to_string()
            }
        );
    }

    #[test]
    fn substring_and_presence() {
        let e = entry();
        assert!(Filter::parse("(cn=john*)").unwrap().matches(&e));
        assert!(Filter::parse("(cn=*oh*do*)").unwrap().matches(&e));
        assert!(Filter::parse("(mail=*@example.com)").unwrap().matches(&e));
        assert!(!Filter::parse("(cn=*smith)").unwrap().matches(&e));
        assert!(Filter::parse("(mail=*)").unwrap().matches(&e));
        assert!(!Filter::parse("(telephoneNumber=*)").unwrap().matches(&e));
    }

    #[test]
    fn ordering_comparisons_use_numbers_when_possible() {
        let e = entry();
        assert!(Filter::parse("(employeeNumber>=7)").unwrap().matches(&e));
        assert!(!Filter::parse("(employeeNumber<=7)").unwrap().matches(&e));
        assert!(Filter::parse("(cn~=johndoe)").unwrap().matches(&e));
    }

    #[test]
    fn escaped_values_are_decoded() {
        let filter = Filter::parse(r"(cn=a\2ab)").unwrap();
        assert_eq!(
            filter,
            Filter::Equality {
                attribute: "cn".to_string(),
                value: "a*b".to_string()
            }
        );
        assert_eq!(filter.to_string(), r"(cn=a\2ab)");
    }

    #[test]
    fn escaped_utf8_sequences_decode_as_one_character() {
        let escaped = Filter::parse(r"(cn=caf\c3\a9*)").unwrap();
        assert_eq!(escaped, Filter::parse("(cn=café*)").unwrap());
        let e = Entry::new(Dn::parse("cn=cafe,o=example").unwrap())
            .with_attribute("cn", ["café crème"]);
        assert!(escaped.matches(&e));
        assert!(matches!(
            Filter::parse(r"(cn=caf\c3)"),
            Err(FilterError::InvalidEscape { .. })
        ));
    }

    #[test]
    fn malformed_filters_are_rejected() {
        assert!(matches!(Filter::parse(""), Err(FilterError::Empty { .. })));
        assert!(matches!(Filter::parse("(uid=x"), Err(FilterError::Unbalanced { .. })));
        assert!(matches!(Filter::parse("(=x)"), Err(FilterError::MissingAttribute { .. })));
        assert!(matches!(Filter::parse("(uid>x)"), Err(FilterError::MissingOperator { .. })));
        assert!(matches!(Filter::parse(r"(uid=\zz)"), Err(FilterError::InvalidEscape { .. })));
        assert!(matches!(
            Filter::parse("(uid=x)(cn=y)"),
            Err(FilterError::TrailingCharacters { .. })
        ));
        let err: DirectoryError = Filter::parse("(uid=x").unwrap_err().into();
        assert_eq!(err.result_code, ResultCode::ProtocolError);
    }
}
