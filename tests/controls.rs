//! Request control handling across the processors.

mod common;

use common::*;
use ldap_workflow::auth::{ClientInfo, Privilege};
use ldap_workflow::backend::{Backend, InMemoryBackend};
use ldap_workflow::entry::Entry;
use ldap_workflow::operation::{Control, Modification, SearchScope};
use ldap_workflow::{Operation, ResultCode};
use std::sync::Arc;

fn proxy_client() -> ClientInfo {
    ClientInfo::authenticated(dn(LEGACY)).with_privilege(Privilege::ProxiedAuth)
}

fn describe(dn: &str) -> Operation {
    Operation::modify(dn, vec![Modification::replace("description", &["changed"])])
}

fn base_search(dn: &str) -> Operation {
    Operation::search(dn, SearchScope::Base, "(objectClass=*)")
}

// ============================================================================
// Assertion
// ============================================================================

#[tokio::test]
async fn assertion_gates_modify_on_the_current_entry() {
    let harness = Harness::new().await;

    let passing = harness
        .server
        .execute(describe(JDOE).with_control(Control::assertion("(mail=jdoe@example.com)")))
        .await;
    assert_eq!(passing.result_code, ResultCode::Success);

    let failing = harness
        .server
        .execute(describe(JDOE).with_control(Control::assertion("(mail=other@example.com)")))
        .await;
    assert_eq!(failing.result_code, ResultCode::AssertionFailed);
    assert_eq!(harness.mutations().await, 1);
    assert_eq!(harness.transactions().await, (2, 2));
}

#[tokio::test]
async fn assertion_on_add_is_checked_against_the_new_entry() {
    let harness = Harness::new().await;
    let add = |uid: &str, filter: &str| {
        Operation::add(format!("uid={},{}", uid, PEOPLE), new_person_attributes(uid))
            .with_control(Control::assertion(filter))
    };

    let passing = harness.server.execute(add("alice", "(uid=alice)")).await;
    assert_eq!(passing.result_code, ResultCode::Success);

    let failing = harness.server.execute(add("bob", "(uid=alice)")).await;
    assert_eq!(failing.result_code, ResultCode::AssertionFailed);
    assert!(
        harness
            .backend
            .entry(&dn(&format!("uid=bob,{}", PEOPLE)))
            .await
            .is_none()
    );
}

#[tokio::test]
async fn assertion_on_search_reads_the_base_entry() {
    let harness = Harness::new().await;

    let passing = harness
        .server
        .execute(
            Operation::search(BASE, SearchScope::Subtree, "(uid=jdoe)")
                .with_control(Control::assertion("(o=test)")),
        )
        .await;
    assert_eq!(passing.result_code, ResultCode::Success);
    assert_eq!(passing.entries.len(), 1);
    assert_eq!(harness.transactions().await, (1, 1));

    let failing = harness
        .server
        .execute(
            Operation::search(BASE, SearchScope::Subtree, "(uid=jdoe)")
                .with_control(Control::assertion("(o=other)")),
        )
        .await;
    assert_eq!(failing.result_code, ResultCode::AssertionFailed);
    assert!(failing.entries.is_empty());

    let missing = harness
        .server
        .execute(
            Operation::search("ou=missing,o=test", SearchScope::Subtree, "(uid=jdoe)")
                .with_control(Control::assertion("(o=test)")),
        )
        .await;
    assert_eq!(missing.result_code, ResultCode::NoSuchObject);
}

#[tokio::test]
async fn malformed_assertion_filter_is_a_protocol_error() {
    let harness = Harness::new().await;

    let response = harness
        .server
        .execute(describe(JDOE).with_control(Control::assertion("(mail=")))
        .await;

    assert_eq!(response.result_code, ResultCode::ProtocolError);
    assert_eq!(harness.mutations().await, 0);
}

// ============================================================================
// Unknown and denied controls
// ============================================================================

#[tokio::test]
async fn unsupported_critical_controls_are_rejected() {
    let harness = Harness::new().await;

    let critical = harness
        .server
        .execute(base_search(BASE).with_control(Control::other("1.3.6.1.4.1.99999.1", true)))
        .await;
    assert_eq!(critical.result_code, ResultCode::UnavailableCriticalExtension);

    let optional = harness
        .server
        .execute(base_search(BASE).with_control(Control::other("1.3.6.1.4.1.99999.1", false)))
        .await;
    assert_eq!(optional.result_code, ResultCode::Success);

    let write = harness
        .server
        .execute(describe(JDOE).with_control(Control::other("1.3.6.1.4.1.99999.1", true)))
        .await;
    assert_eq!(write.result_code, ResultCode::UnavailableCriticalExtension);
    assert_eq!(harness.mutations().await, 0);
}

#[tokio::test]
async fn critical_controls_supported_by_the_backend_pass() {
    let harness = Harness::new().await;
    let backend = Arc::new(
        InMemoryBackend::new("extended", vec![dn("o=extended")])
            .with_supported_control("1.3.6.1.4.1.99999.1"),
    );
    backend
        .import(vec![
            Entry::new(dn("o=extended"))
                .with_object_classes(["top", "organization"])
                .with_attribute("o", ["extended"]),
        ])
        .await
        .unwrap();
    harness
        .server
        .register_backend("extended", backend as Arc<dyn Backend>)
        .unwrap();

    let response = harness
        .server
        .execute(
            base_search("o=extended").with_control(Control::other("1.3.6.1.4.1.99999.1", true)),
        )
        .await;

    assert_eq!(response.result_code, ResultCode::Success);
    assert_eq!(response.entries.len(), 1);
}

#[tokio::test]
async fn controls_denied_by_access_control_fail_the_operation() {
    let harness = Harness::new().await;
    harness.access.deny_controls();

    let response = harness
        .server
        .execute(
            Operation::search(BASE, SearchScope::Subtree, "(objectClass=*)")
                .with_control(Control::subentries(true)),
        )
        .await;

    assert_eq!(response.result_code, ResultCode::InsufficientAccessRights);
    assert!(harness.plugin.events().is_empty());
}

// ============================================================================
// Proxied authorization
// ============================================================================

#[tokio::test]
async fn proxied_authorization_switches_the_identity() {
    let harness = Harness::new().await;

    let mut v1 = describe(JDOE)
        .with_client(proxy_client())
        .with_control(Control::proxied_auth_v1(JDOE));
    harness.server.process(&mut v1).await;
    assert_eq!(v1.result().result_code(), Some(ResultCode::Success));
    assert_eq!(v1.client().proxied_dn, Some(dn(JDOE)));
    assert_eq!(v1.client().authorization_dn(), Some(&dn(JDOE)));

    let mut v2 = base_search(BASE)
        .with_client(proxy_client())
        .with_control(Control::proxied_auth_v2("u:jdoe"));
    harness.server.process(&mut v2).await;
    assert_eq!(v2.result().result_code(), Some(ResultCode::Success));
    assert_eq!(v2.client().proxied_dn, Some(dn(JDOE)));
}

#[tokio::test]
async fn empty_authorization_id_proxies_as_anonymous() {
    let harness = Harness::new().await;

    let mut op = base_search(BASE)
        .with_client(proxy_client())
        .with_control(Control::proxied_auth_v2(""));
    harness.server.process(&mut op).await;

    assert_eq!(op.result().result_code(), Some(ResultCode::Success));
    assert!(op.client().is_anonymous());
}

#[tokio::test]
async fn proxied_authorization_needs_the_privilege() {
    let harness = Harness::new().await;

    let response = harness
        .server
        .execute(
            describe(JDOE)
                .with_client(ClientInfo::authenticated(dn(LEGACY)))
                .with_control(Control::proxied_auth_v2(format!("dn:{}", JDOE))),
        )
        .await;

    assert_eq!(response.result_code, ResultCode::AuthorizationDenied);
    assert_eq!(harness.mutations().await, 0);
    assert!(harness.plugin.events().is_empty());
}

#[tokio::test]
async fn proxied_identities_must_exist() {
    let harness = Harness::new().await;

    for control in [
        Control::proxied_auth_v1("uid=ghost,ou=people,o=test"),
        Control::proxied_auth_v2("dn:uid=ghost,ou=people,o=test"),
        Control::proxied_auth_v2("u:ghost"),
        Control::proxied_auth_v2("x:ghost"),
    ] {
        let response = harness
            .server
            .execute(describe(JDOE).with_client(proxy_client()).with_control(control))
            .await;
        assert_eq!(response.result_code, ResultCode::AuthorizationDenied);
    }
    assert_eq!(harness.mutations().await, 0);
}

#[tokio::test]
async fn only_one_proxied_authorization_control_is_allowed() {
    let harness = Harness::new().await;

    let response = harness
        .server
        .execute(
            describe(JDOE)
                .with_client(proxy_client())
                .with_control(Control::proxied_auth_v1(JDOE))
                .with_control(Control::proxied_auth_v2(format!("dn:{}", JDOE))),
        )
        .await;

    assert_eq!(response.result_code, ResultCode::ProtocolError);
}

// ============================================================================
// Search result shaping
// ============================================================================

#[tokio::test]
async fn matched_values_filters_returned_values() {
    let harness = Harness::new().await;
    harness
        .backend
        .import(vec![
            person("multi", PEOPLE).with_attribute("mail", ["multi@example.com", "multi@example.org"]),
        ])
        .await
        .unwrap();

    let response = harness
        .server
        .execute(
            base_search(&format!("uid=multi,{}", PEOPLE))
                .with_control(Control::matched_values(["(mail=*@example.org)"])),
        )
        .await;

    let entry = &response.entries[0];
    assert_eq!(entry.values("mail"), vec!["multi@example.org"]);
    assert_eq!(entry.values("cn"), vec!["multi user"]);
}

#[tokio::test]
async fn real_and_virtual_attribute_controls() {
    let harness = Harness::new().await;
    let everything = || base_search(JDOE).with_attributes(["*", "+"]);

    let real = harness
        .server
        .execute(everything().with_control(Control::real_attributes_only()))
        .await;
    assert!(real.entries[0].has_attribute("cn"));
    assert!(!real.entries[0].has_attribute("entryDN"));

    let virtual_only = harness
        .server
        .execute(everything().with_control(Control::virtual_attributes_only()))
        .await;
    assert!(!virtual_only.entries[0].has_attribute("cn"));
    assert!(virtual_only.entries[0].has_attribute("entryDN"));

    let both = harness
        .server
        .execute(
            everything()
                .with_control(Control::real_attributes_only())
                .with_control(Control::virtual_attributes_only()),
        )
        .await;
    assert_eq!(both.result_code, ResultCode::ProtocolError);
    assert!(both.entries.is_empty());
}
