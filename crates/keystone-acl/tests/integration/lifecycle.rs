//! Integration tests for entity lifecycles, cascades, and membership
//! bookkeeping.

use futures::TryStreamExt;
use keystone_core::{Error, Grant, GrantScope, UserName};
use keystone_query::PageRequest;
use keystone_store::GrantFilter;

use crate::common::{TestHarness, group, user};

#[tokio::test]
async fn test_member_count_follows_adds_and_removes() {
    let h = TestHarness::new();
    let names = ["ann", "ben", "cat", "dan", "eve"];
    h.users(&names).await;
    let crew = h.group("crew", &[]).await;

    h.join(crew.id, &names).await;
    assert_eq!(h.member_count(crew.id).await, 5);

    // Re-adding is a no-op.
    h.join(crew.id, &["ann"]).await;
    assert_eq!(h.member_count(crew.id).await, 5);

    h.acl
        .memberships()
        .remove_user_from_group(&UserName::new("cat"), crew.id)
        .await
        .unwrap();
    assert_eq!(h.member_count(crew.id).await, 4);
    assert!(h.store.member_counts_consistent().await);
}

#[tokio::test]
async fn test_group_app_grant_outside_allow_list_leaves_table_unchanged() {
    let h = TestHarness::new();
    let ops = h.group("ops", &["deploy"]).await;
    let grants = h.acl.grants();
    grants.grant_app(group(ops.id), "deploy").await.unwrap();

    let err = grants.grant_app(group(ops.id), "drop_tables").await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));

    let held = grants.grants_for(&group(ops.id), &GrantFilter::All).await.unwrap();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].perm_name, "deploy");
}

#[tokio::test]
async fn test_narrowing_allow_list_with_live_grant_is_rejected() {
    let h = TestHarness::new();
    let ops = h.group("ops", &["deploy", "rollback"]).await;
    h.acl.grants().grant_app(group(ops.id), "rollback").await.unwrap();

    let mut narrowed = ops.clone();
    narrowed.possible_permissions.remove("rollback");
    let err = h.acl.entities().update_group(narrowed).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));

    h.acl
        .grants()
        .revoke(group(ops.id), "rollback", GrantScope::App)
        .await
        .unwrap();
    let mut narrowed = ops;
    narrowed.possible_permissions.remove("rollback");
    let updated = h.acl.entities().update_group(narrowed).await.unwrap();
    assert!(!updated.allows_permission("rollback"));
}

#[tokio::test]
async fn test_delete_user_cascades() {
    let h = TestHarness::new();
    h.users(&["alice", "bob"]).await;
    let team = h.group("team", &["report"]).await;
    h.join(team.id, &["alice", "bob"]).await;

    let mine = h.resource("mine", "document", user("alice"), None).await;
    let child = h.resource("child", "document", user("bob"), Some(mine.id)).await;
    let shared = h.resource("shared", "document", group(team.id), None).await;
    let grants = h.acl.grants();
    grants.grant_app(user("alice"), "report").await.unwrap();
    grants.grant_resource(user("alice"), "view", shared.id).await.unwrap();
    grants.grant_resource(user("bob"), "view", shared.id).await.unwrap();

    h.acl
        .entities()
        .delete_user(&UserName::new("alice"))
        .await
        .unwrap();

    let entities = h.acl.entities();
    assert!(entities.resource(mine.id).await.unwrap().is_none());
    // Bob's child outlives alice's folder at the top level.
    let child = entities.resource(child.id).await.unwrap().unwrap();
    assert_eq!(child.parent_id, None);
    assert!(entities.resource(shared.id).await.unwrap().is_some());
    assert_eq!(h.member_count(team.id).await, 1);
    assert!(
        grants
            .grants_for(&user("alice"), &GrantFilter::All)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        grants
            .grants_for(&user("bob"), &GrantFilter::Resources)
            .await
            .unwrap()
            .len(),
        1
    );
    assert!(h.store.member_counts_consistent().await);
}

#[tokio::test]
async fn test_delete_user_keeps_group_owned_children() {
    let h = TestHarness::new();
    h.users(&["ann", "ben"]).await;
    let crew = h.group("crew", &[]).await;
    h.join(crew.id, &["ann", "ben"]).await;

    let folder = h.resource("f", "folder", user("ann"), None).await;
    let sub = h.resource("sub", "folder", user("ann"), Some(folder.id)).await;
    let shared = h.resource("s", "document", group(crew.id), Some(sub.id)).await;
    let note = h.resource("note", "document", user("ann"), Some(shared.id)).await;
    h.acl
        .grants()
        .grant_resource(user("ben"), "view", shared.id)
        .await
        .unwrap();

    h.acl
        .entities()
        .delete_user(&UserName::new("ann"))
        .await
        .unwrap();

    let entities = h.acl.entities();
    assert!(entities.resource(folder.id).await.unwrap().is_none());
    assert!(entities.resource(sub.id).await.unwrap().is_none());
    // Ann's own resources go even when they sit under the group's document.
    assert!(entities.resource(note.id).await.unwrap().is_none());

    let shared = entities.resource(shared.id).await.unwrap().unwrap();
    assert_eq!(shared.parent_id, None);
    assert_eq!(shared.owner, Some(group(crew.id)));
    assert!(
        h.acl
            .grants()
            .has_grant(&Grant::resource(user("ben"), "view", shared.id))
            .await
            .unwrap()
    );
    assert!(
        h.acl
            .ownership()
            .ancestors(shared.id)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_delete_group_removes_owned_resources_and_grants() {
    let h = TestHarness::new();
    h.users(&["alice"]).await;
    let team = h.group("team", &["x"]).await;
    h.join(team.id, &["alice"]).await;
    let owned = h.resource("owned", "folder", group(team.id), None).await;
    h.acl.grants().grant_app(group(team.id), "x").await.unwrap();

    h.acl.entities().delete_group(team.id).await.unwrap();

    assert!(h.acl.entities().resource(owned.id).await.unwrap().is_none());
    assert!(
        h.acl
            .memberships()
            .groups_for_user(&UserName::new("alice"))
            .await
            .unwrap()
            .is_empty()
    );
    let err = h.acl.entities().delete_group(team.id).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_member_pagination_120_by_50() {
    let h = TestHarness::new();
    let names: Vec<String> = (0..120).map(|i| format!("member{i:03}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    h.users(&refs).await;
    let big = h.group("big", &[]).await;
    h.join(big.id, &refs).await;

    let members = h.acl.memberships();
    let first = members
        .user_paginator(big.id, PageRequest::new(1, 50), None)
        .await
        .unwrap();
    assert_eq!(first.items.len(), 50);
    assert_eq!(first.page_count, 3);

    let third = members
        .user_paginator(big.id, PageRequest::new(3, 50), None)
        .await
        .unwrap();
    assert_eq!(third.items.len(), 20);
    assert_eq!(third.items[0].user_name.as_str(), "member100");

    let beyond = members
        .user_paginator(big.id, PageRequest::new(4, 50).with_item_count(120), None)
        .await
        .unwrap();
    assert_eq!(beyond.page, 3);
    assert_eq!(beyond.items, third.items);

    let streamed: Vec<_> = members
        .users_for_group_stream(big.id, 16)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(streamed.len(), 120);
}

#[tokio::test]
async fn test_owner_requires_exactly_one_principal() {
    use keystone_core::{GroupId, Principal};

    let err = Principal::from_parts(Some(UserName::new("a")), Some(GroupId::new(1))).unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
    let err = Principal::from_parts(None, None).unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
}
