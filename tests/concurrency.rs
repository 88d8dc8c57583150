//! Concurrent operations against one server, and abandon of in-flight work.

mod common;

use async_trait::async_trait;
use common::*;
use futures::future::join_all;
use ldap_workflow::auth::ClientInfo;
use ldap_workflow::operation::{Modification, OperationKind, SearchScope};
use ldap_workflow::ports::{HookResult, PluginPort};
use ldap_workflow::{Operation, ResultCode, ServerConfig};
use std::sync::Arc;
use tokio::sync::Notify;

/// Holds modify operations in pre-operation until released.
#[derive(Default)]
struct GatePlugin {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl PluginPort for GatePlugin {
    async fn pre_operation(&self, op: &mut Operation) -> HookResult {
        if op.kind() == OperationKind::Modify {
            self.entered.notify_one();
            self.release.notified().await;
        }
        HookResult::Continue
    }
}

#[tokio::test]
async fn concurrent_adds_all_commit() {
    let harness = Harness::new().await;

    let responses = join_all((0..20).map(|i| {
        let uid = format!("user{}", i);
        harness.server.execute(Operation::add(
            format!("uid={},{}", uid, PEOPLE),
            new_person_attributes(&uid),
        ))
    }))
    .await;

    assert!(responses.iter().all(|r| r.result_code == ResultCode::Success));
    assert_eq!(harness.mutations().await, 20);
    assert_eq!(harness.transactions().await, (20, 20));
    assert_eq!(harness.listener.changes().len(), 20);
    assert_eq!(harness.server.statistics().get(OperationKind::Add).successes, 20);
}

#[tokio::test]
async fn racing_adds_of_one_entry_commit_once() {
    let harness = Harness::new().await;

    let responses = join_all((0..5).map(|_| {
        harness.server.execute(Operation::add(
            format!("uid=alice,{}", PEOPLE),
            new_person_attributes("alice"),
        ))
    }))
    .await;

    let committed = responses
        .iter()
        .filter(|r| r.result_code == ResultCode::Success)
        .count();
    assert_eq!(committed, 1);
    assert!(
        responses
            .iter()
            .filter(|r| r.result_code != ResultCode::Success)
            .all(|r| r.result_code == ResultCode::EntryAlreadyExists)
    );
    assert_eq!(harness.listener.changes().len(), 1);
}

#[tokio::test]
async fn concurrent_binds_and_searches() {
    let harness = Harness::new().await;

    let binds = join_all(
        (0..10).map(|_| harness.server.execute(Operation::simple_bind(JDOE, JDOE_PASSWORD))),
    );
    let searches = join_all((0..10).map(|_| {
        harness.server.execute(Operation::search(
            BASE,
            SearchScope::Subtree,
            "(objectClass=person)",
        ))
    }));
    let (binds, searches) = tokio::join!(binds, searches);

    assert!(binds.iter().all(|r| r.result_code == ResultCode::Success));
    assert!(searches.iter().all(|r| r.entries.len() == 3));
    let stats = harness.server.statistics();
    assert_eq!(stats.get(OperationKind::Bind).requests, 10);
    assert_eq!(stats.get(OperationKind::Search).successes, 10);
}

#[tokio::test]
async fn abandon_cancels_the_running_operation() {
    let gate = Arc::new(GatePlugin::default());
    let harness = Harness::build(ServerConfig::default(), |builder| {
        builder.with_plugin(gate.clone())
    })
    .await;

    let modify = Operation::modify(JDOE, vec![Modification::replace("description", &["x"])])
        .with_connection(7, 3);
    let abandon = async {
        gate.entered.notified().await;
        let response = harness
            .server
            .execute(Operation::abandon(3).with_connection(7, 4))
            .await;
        gate.release.notify_one();
        response
    };
    let (modified, abandoned) = tokio::join!(harness.server.execute(modify), abandon);

    assert_eq!(abandoned.result_code, ResultCode::Success);
    assert_eq!(modified.result_code, ResultCode::Canceled);
    assert_eq!(harness.mutations().await, 0);
    assert_eq!(harness.transactions().await, (1, 1));
    assert_eq!(harness.plugin.count("post"), 0);
    assert!(harness.listener.changes().is_empty());
    assert_eq!(harness.server.statistics().get(OperationKind::Modify).canceled, 1);
}

#[tokio::test]
async fn cancel_of_unknown_message_is_a_no_op() {
    let harness = Harness::new().await;

    assert!(!harness.server.cancel(1, 99));
    let response = harness
        .server
        .execute(
            Operation::abandon(99)
                .with_connection(1, 100)
                .with_client(ClientInfo::authenticated(dn(JDOE))),
        )
        .await;
    assert_eq!(response.result_code, ResultCode::Success);
}

#[tokio::test]
async fn operations_without_a_connection_do_not_collide() {
    let gate = Arc::new(GatePlugin::default());
    let harness = Harness::build(ServerConfig::default(), |builder| {
        builder.with_plugin(gate.clone())
    })
    .await;

    let modify = Operation::modify(JDOE, vec![Modification::replace("description", &["x"])]);
    let others = async {
        gate.entered.notified().await;
        let search = harness
            .server
            .execute(Operation::search(BASE, SearchScope::Base, "(objectClass=*)"))
            .await;
        let abandon = harness
            .server
            .execute(Operation::abandon(0).with_connection(0, 1))
            .await;
        let canceled = harness.server.cancel(0, 0);
        gate.release.notify_one();
        (search, abandon, canceled)
    };
    let (modified, (search, abandon, canceled)) =
        tokio::join!(harness.server.execute(modify), others);

    assert_eq!(search.result_code, ResultCode::Success);
    assert_eq!(abandon.result_code, ResultCode::Success);
    assert!(!canceled);
    assert_eq!(modified.result_code, ResultCode::Success);
    assert_eq!(harness.mutations().await, 1);
}
