//! Embedded core directory schema.
//!
//! The core attribute types and object classes are embedded as a JSON
//! document so that a registry can be built without schema files on disk.

/// Returns the core schema as a JSON string.
pub fn core_schema() -> &'static str {
    r#"{
  "attributeTypes": [
    { "name": "objectClass" },
    { "name": "cn", "aliases": ["commonName"] },
    { "name": "sn", "aliases": ["surname"] },
    { "name": "givenName" },
    { "name": "displayName", "singleValue": true },
    { "name": "uid", "aliases": ["userid"] },
    { "name": "mail" },
    { "name": "userPassword" },
    { "name": "telephoneNumber" },
    { "name": "description" },
    { "name": "seeAlso" },
    { "name": "title" },
    { "name": "employeeNumber", "singleValue": true },
    { "name": "l", "aliases": ["localityName"] },
    { "name": "ou", "aliases": ["organizationalUnitName"] },
    { "name": "o", "aliases": ["organizationName"] },
    { "name": "dc", "aliases": ["domainComponent"], "singleValue": true },
    { "name": "c", "aliases": ["countryName"], "singleValue": true },
    { "name": "member" },
    { "name": "uniqueMember" },
    { "name": "businessCategory" },
    { "name": "postalAddress" },
    { "name": "createTimestamp", "singleValue": true, "noUserModification": true, "operational": true },
    { "name": "modifyTimestamp", "singleValue": true, "noUserModification": true, "operational": true },
    { "name": "creatorsName", "singleValue": true, "noUserModification": true, "operational": true },
    { "name": "modifiersName", "singleValue": true, "noUserModification": true, "operational": true },
    { "name": "entryUUID", "singleValue": true, "noUserModification": true, "operational": true },
    { "name": "entryDN", "singleValue": true, "noUserModification": true, "operational": true },
    { "name": "hasSubordinates", "singleValue": true, "noUserModification": true, "operational": true },
    { "name": "pwdChangedTime", "singleValue": true, "noUserModification": true, "operational": true },
    { "name": "pwdFailureTime", "noUserModification": true, "operational": true },
    { "name": "pwdAccountLockedTime", "singleValue": true, "operational": true },
    { "name": "pwdGraceUseTime", "noUserModification": true, "operational": true },
    { "name": "ds-privilege-name", "operational": true },
    { "name": "ds-pwp-last-login-time", "singleValue": true, "operational": true },
    { "name": "ds-pwp-account-disabled", "singleValue": true, "operational": true },
    { "name": "ds-rlim-size-limit", "singleValue": true, "operational": true },
    { "name": "ds-rlim-time-limit", "singleValue": true, "operational": true },
    { "name": "ds-rlim-lookthrough-limit", "singleValue": true, "operational": true },
    { "name": "ds-rlim-idle-time-limit", "singleValue": true, "operational": true }
  ],
  "objectClasses": [
    { "name": "top", "kind": "abstract", "must": ["objectClass"] },
    {
      "name": "person", "kind": "structural", "superiors": ["top"],
      "must": ["sn", "cn"],
      "may": ["userPassword", "telephoneNumber", "seeAlso", "description"]
    },
    {
      "name": "organizationalPerson", "kind": "structural", "superiors": ["person"],
      "may": ["title", "ou", "l", "postalAddress"]
    },
    {
      "name": "inetOrgPerson", "kind": "structural", "superiors": ["organizationalPerson"],
      "may": ["uid", "mail", "givenName", "displayName", "employeeNumber"]
    },
    {
      "name": "organizationalUnit", "kind": "structural", "superiors": ["top"],
      "must": ["ou"],
      "may": ["description", "telephoneNumber", "l", "seeAlso", "businessCategory"]
    },
    {
      "name": "organization", "kind": "structural", "superiors": ["top"],
      "must": ["o"],
      "may": ["description", "telephoneNumber", "l", "seeAlso", "businessCategory"]
    },
    {
      "name": "domain", "kind": "structural", "superiors": ["top"],
      "must": ["dc"],
      "may": ["description", "o", "l"]
    },
    {
      "name": "country", "kind": "structural", "superiors": ["top"],
      "must": ["c"],
      "may": ["description"]
    },
    {
      "name": "groupOfNames", "kind": "structural", "superiors": ["top"],
      "must": ["cn"],
      "may": ["member", "description", "ou", "o", "seeAlso", "businessCategory"]
    },
    {
      "name": "groupOfUniqueNames", "kind": "structural", "superiors": ["top"],
      "must": ["cn"],
      "may": ["uniqueMember", "description", "ou", "o", "seeAlso", "businessCategory"]
    },
    {
      "name": "account", "kind": "structural", "superiors": ["top"],
      "must": ["uid"],
      "may": ["description", "seeAlso", "l", "o", "ou", "userPassword"]
    },
    {
      "name": "ldapSubentry", "kind": "structural", "superiors": ["top"],
      "may": ["cn", "description"]
    },
    { "name": "extensibleObject", "kind": "auxiliary", "superiors": ["top"] }
  ]
}"#
}
