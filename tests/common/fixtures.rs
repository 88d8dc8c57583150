//! Fixture directory tree.
//!
//! ```text
//! o=test
//! ├── ou=people
//! │   ├── uid=jdoe         (SSHA256 password "secret")
//! │   ├── uid=legacy       (clear-text password "oldsecret")
//! │   └── uid=disabled     (administratively disabled)
//! └── ou=groups
//! ```

use ldap_workflow::auth::password::{self, PasswordScheme};
use ldap_workflow::backend::InMemoryBackend;
use ldap_workflow::dn::Dn;
use ldap_workflow::entry::{Attribute, Entry};

pub const BASE: &str = "o=test";
pub const PEOPLE: &str = "ou=people,o=test";
pub const GROUPS: &str = "ou=groups,o=test";
pub const JDOE: &str = "uid=jdoe,ou=people,o=test";
pub const LEGACY: &str = "uid=legacy,ou=people,o=test";
pub const DISABLED: &str = "uid=disabled,ou=people,o=test";
pub const JDOE_PASSWORD: &str = "secret";
pub const LEGACY_PASSWORD: &str = "oldsecret";

pub fn dn(raw: &str) -> Dn {
    Dn::parse(raw).expect("fixture DN should parse")
}

pub fn test_backend() -> InMemoryBackend {
    InMemoryBackend::new("userRoot", vec![dn(BASE)])
}

pub fn person(uid: &str, parent: &str) -> Entry {
    Entry::new(dn(&format!("uid={},{}", uid, parent)))
        .with_object_classes(["top", "person", "organizationalPerson", "inetOrgPerson"])
        .with_attribute("uid", [uid])
        .with_attribute("cn", [format!("{} user", uid)])
        .with_attribute("sn", [uid])
}

pub fn fixture_entries() -> Vec<Entry> {
    vec![
        Entry::new(dn(BASE))
            .with_object_classes(["top", "organization"])
            .with_attribute("o", ["test"]),
        Entry::new(dn(PEOPLE))
            .with_object_classes(["top", "organizationalUnit"])
            .with_attribute("ou", ["people"]),
        Entry::new(dn(GROUPS))
            .with_object_classes(["top", "organizationalUnit"])
            .with_attribute("ou", ["groups"]),
        person("jdoe", PEOPLE)
            .with_attribute("mail", ["jdoe@example.com"])
            .with_attribute(
                "userPassword",
                [password::encode(JDOE_PASSWORD, PasswordScheme::SaltedSha256)],
            ),
        person("legacy", PEOPLE).with_attribute("userPassword", [LEGACY_PASSWORD]),
        person("disabled", PEOPLE)
            .with_attribute(
                "userPassword",
                [password::encode("whatever", PasswordScheme::SaltedSha256)],
            )
            .with_operational_attribute("ds-pwp-account-disabled", ["true"]),
    ]
}

/// Attributes of a new person below `ou=people`.
pub fn new_person_attributes(uid: &str) -> Vec<Attribute> {
    vec![
        Attribute::new(
            "objectClass",
            vec!["person".into(), "inetOrgPerson".into()],
        ),
        Attribute::single("uid", uid),
        Attribute::single("cn", format!("{} user", uid)),
        Attribute::single("sn", uid),
    ]
}
