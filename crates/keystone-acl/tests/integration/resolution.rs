//! Integration tests for permission resolution.

use keystone_acl::{
    PermissionFilter, PermissionResolvable, PermissionSource, ResolveOptions, Target,
    UsersForPermFilter,
};
use keystone_core::{GrantScope, ResourceType, UserName};
use std::collections::BTreeSet;

use crate::common::{TestHarness, group, user};

fn names(perms: &[&str]) -> BTreeSet<String> {
    perms.iter().map(|p| p.to_string()).collect()
}

#[tokio::test]
async fn test_no_grants_means_empty_set_everywhere() {
    let h = TestHarness::new();
    h.users(&["alice", "bob"]).await;
    let doc = h.resource("doc", "document", user("bob"), None).await;
    let engine = h.acl.resolution();

    for target in [
        Target::App,
        Target::ResourceType(ResourceType::new("document")),
        Target::Resource(doc.id),
    ] {
        let perms = engine
            .effective(&user("alice"), &target, ResolveOptions::inheriting())
            .await
            .unwrap();
        assert!(perms.is_empty(), "expected nothing on {target}");
        assert!(!perms.is_owner());
    }
}

#[tokio::test]
async fn test_ownership_implies_full_type_set() {
    let h = TestHarness::new();
    h.users(&["alice"]).await;
    let doc = h.resource("doc", "document", user("alice"), None).await;

    let perms = h
        .acl
        .resolution()
        .effective(&user("alice"), &Target::Resource(doc.id), ResolveOptions::default())
        .await
        .unwrap();
    assert!(perms.is_owner());
    assert_eq!(perms.names(), names(&["delete", "edit", "view"]));
}

#[tokio::test]
async fn test_group_ownership_reaches_members() {
    let h = TestHarness::new();
    h.users(&["alice", "bob"]).await;
    let team = h.group("team", &[]).await;
    h.join(team.id, &["bob"]).await;
    let doc = h.resource("doc", "document", group(team.id), None).await;

    let engine = h.acl.resolution();
    let bob = engine
        .effective(&user("bob"), &Target::Resource(doc.id), ResolveOptions::default())
        .await
        .unwrap();
    assert!(bob.is_owner());
    assert!(bob.tuples().iter().all(|t| t.group_id == Some(team.id)));

    let alice = engine
        .effective(&user("alice"), &Target::Resource(doc.id), ResolveOptions::default())
        .await
        .unwrap();
    assert!(alice.is_empty());

    let as_group = engine
        .effective(&group(team.id), &Target::Resource(doc.id), ResolveOptions::default())
        .await
        .unwrap();
    assert_eq!(as_group.names().len(), 3);
    assert!(as_group.tuples().iter().all(|t| t.user_name.is_none()));
}

#[tokio::test]
async fn test_unregistered_type_grants_nothing_to_owner() {
    let h = TestHarness::new();
    h.users(&["alice"]).await;
    let sheet = h.resource("sheet", "spreadsheet", user("alice"), None).await;

    let perms = h
        .acl
        .resolution()
        .effective(&user("alice"), &Target::Resource(sheet.id), ResolveOptions::default())
        .await
        .unwrap();
    assert!(perms.is_owner());
    assert!(perms.is_empty());
}

#[tokio::test]
async fn test_duplicate_grants_are_idempotent() {
    let h = TestHarness::new();
    h.users(&["alice", "bob"]).await;
    let doc = h.resource("doc", "document", user("bob"), None).await;
    let grants = h.acl.grants();

    grants.grant_resource(user("alice"), "view", doc.id).await.unwrap();
    let once = h
        .acl
        .resolution()
        .effective(&user("alice"), &Target::Resource(doc.id), ResolveOptions::default())
        .await
        .unwrap();

    grants.grant_resource(user("alice"), "view", doc.id).await.unwrap();
    let twice = h
        .acl
        .resolution()
        .effective(&user("alice"), &Target::Resource(doc.id), ResolveOptions::default())
        .await
        .unwrap();

    assert_eq!(once, twice);
    assert_eq!(twice.tuples().len(), 1);
}

#[tokio::test]
async fn test_revoking_direct_grant_keeps_group_grant() {
    let h = TestHarness::new();
    h.users(&["alice"]).await;
    let editors = h.group("editors", &["publish"]).await;
    h.join(editors.id, &["alice"]).await;
    let grants = h.acl.grants();
    grants.grant_app(user("alice"), "publish").await.unwrap();
    grants.grant_app(group(editors.id), "publish").await.unwrap();

    grants
        .revoke(user("alice"), "publish", GrantScope::App)
        .await
        .unwrap();

    let perms = h
        .acl
        .resolution()
        .effective(&user("alice"), &Target::App, ResolveOptions::default())
        .await
        .unwrap();
    assert!(perms.contains("publish"));
    assert_eq!(perms.tuples()[0].group_id, Some(editors.id));
}

#[tokio::test]
async fn test_resource_target_combines_instance_and_wildcard() {
    let h = TestHarness::new();
    h.users(&["alice", "owner"]).await;
    let reviewers = h.group("reviewers", &[]).await;
    h.join(reviewers.id, &["alice"]).await;
    let doc = h.resource("doc", "document", user("owner"), None).await;
    let other = h.resource("other", "document", user("owner"), None).await;
    let grants = h.acl.grants();

    grants.grant_resource(user("alice"), "view", doc.id).await.unwrap();
    grants
        .grant_resource_type(user("alice"), "comment", "document")
        .await
        .unwrap();
    grants
        .grant_resource(group(reviewers.id), "edit", doc.id)
        .await
        .unwrap();
    grants
        .grant_resource_type(group(reviewers.id), "print", "document")
        .await
        .unwrap();
    grants.grant_resource(user("alice"), "delete", other.id).await.unwrap();

    let perms = h
        .acl
        .resolution()
        .effective(&user("alice"), &Target::Resource(doc.id), ResolveOptions::default())
        .await
        .unwrap();
    assert_eq!(perms.names(), names(&["comment", "edit", "print", "view"]));
    assert!(perms.tuples().iter().any(|t| t.source
        == PermissionSource::ResourceType(ResourceType::new("document"))));

    let wildcard = h
        .acl
        .resolution()
        .effective(
            &user("alice"),
            &Target::ResourceType(ResourceType::new("document")),
            ResolveOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(wildcard.names(), names(&["comment", "print"]));
}

#[tokio::test]
async fn test_inheritance_stops_at_non_inheritable_ancestor() {
    let h = TestHarness::new();
    h.users(&["alice", "owner"]).await;
    // folder(top) -> archive(mid) -> folder(inner) -> document(leaf)
    let top = h.resource("top", "folder", user("owner"), None).await;
    let mid = h.resource("mid", "archive", user("owner"), Some(top.id)).await;
    let inner = h.resource("inner", "folder", user("owner"), Some(mid.id)).await;
    let leaf = h.resource("leaf", "document", user("owner"), Some(inner.id)).await;
    let grants = h.acl.grants();
    grants.grant_resource(user("alice"), "share", top.id).await.unwrap();
    grants.grant_resource(user("alice"), "edit", inner.id).await.unwrap();

    let engine = h.acl.resolution();
    let plain = engine
        .effective(&user("alice"), &Target::Resource(leaf.id), ResolveOptions::default())
        .await
        .unwrap();
    assert!(plain.is_empty());

    let inherited = engine
        .effective(&user("alice"), &Target::Resource(leaf.id), ResolveOptions::inheriting())
        .await
        .unwrap();
    assert_eq!(inherited.names(), names(&["edit"]));
    assert!(inherited.tuples()[0].inherited);
    assert_eq!(inherited.tuples()[0].source, PermissionSource::Resource(inner.id));
}

#[tokio::test]
async fn test_users_for_perm_expands_groups() {
    let h = TestHarness::new();
    h.users(&["alice", "bob", "carol", "owner"]).await;
    let team = h.group("team", &[]).await;
    h.join(team.id, &["carol", "bob"]).await;
    let doc = h.resource("doc", "document", user("owner"), None).await;
    let grants = h.acl.grants();
    grants.grant_resource(user("alice"), "view", doc.id).await.unwrap();
    grants.grant_resource(group(team.id), "view", doc.id).await.unwrap();
    grants.grant_resource(group(team.id), "edit", doc.id).await.unwrap();

    let engine = h.acl.resolution();
    let viewers = engine
        .users_for_perm(doc.id, Some("view"), &UsersForPermFilter::default())
        .await
        .unwrap();
    let who: Vec<_> = viewers
        .iter()
        .map(|t| t.user_name.as_ref().unwrap().as_str())
        .collect();
    assert_eq!(who, vec!["alice", "bob", "carol", "owner"]);

    let limited = engine
        .users_for_perm(
            doc.id,
            None,
            &UsersForPermFilter {
                limit_group_permissions: true,
                user_names: Some(vec![UserName::new("alice")]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let group_rows: Vec<_> = limited.iter().filter(|t| t.user_name.is_none()).collect();
    assert_eq!(group_rows.len(), 2);
    assert!(group_rows.iter().all(|t| t.group_id == Some(team.id)));
    assert!(
        limited
            .iter()
            .filter_map(|t| t.user_name.as_ref())
            .all(|u| u.as_str() == "alice")
    );

    let only_other_groups = engine
        .users_for_perm(
            doc.id,
            Some("edit"),
            &UsersForPermFilter {
                group_ids: Some(vec![]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    // Owner still holds edit; the team's edit is filtered out.
    assert_eq!(only_other_groups.len(), 1);
    assert!(only_other_groups[0].is_ownership());
}

#[tokio::test]
async fn test_has_permission_and_resolvable_entities() {
    let h = TestHarness::new();
    h.users(&["alice", "bob"]).await;
    let doc = h.resource("doc", "document", user("alice"), None).await;
    h.acl.grants().grant_app(user("bob"), "audit").await.unwrap();

    let engine = h.acl.resolution();
    assert!(
        engine
            .has_permission(&user("alice"), "delete", &Target::Resource(doc.id), ResolveOptions::default())
            .await
            .unwrap()
    );
    assert!(
        !engine
            .has_permission(&user("bob"), "delete", &Target::Resource(doc.id), ResolveOptions::default())
            .await
            .unwrap()
    );

    let bob = h
        .acl
        .entities()
        .user(&UserName::new("bob"))
        .await
        .unwrap()
        .unwrap();
    assert!(bob.permissions(engine).await.unwrap().contains("audit"));
    let on_doc = bob
        .resource_permissions(engine, doc.id, ResolveOptions::default())
        .await
        .unwrap();
    assert!(on_doc.is_empty());

    let alice = h
        .acl
        .entities()
        .user(&UserName::new("alice"))
        .await
        .unwrap()
        .unwrap();
    let owned = alice
        .resources_with_perms(h.acl.ownership(), &PermissionFilter::new().perms(["delete"]))
        .await
        .unwrap();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].resource.id, doc.id);
}

#[tokio::test]
async fn test_resources_with_possible_perms_inheriting() {
    let h = TestHarness::new();
    h.users(&["alice", "owner"]).await;
    let folder = h.resource("f", "folder", user("owner"), None).await;
    let a = h.resource("a", "document", user("owner"), Some(folder.id)).await;
    let b = h.resource("b", "document", user("owner"), Some(folder.id)).await;
    h.acl
        .grants()
        .grant_resource(user("alice"), "view", folder.id)
        .await
        .unwrap();

    let graph = h.acl.ownership();
    let direct = graph
        .resources_with_possible_perms(
            &user("alice"),
            &PermissionFilter::new().types(["document"]),
        )
        .await
        .unwrap();
    assert!(direct.is_empty());

    let inherited = graph
        .resources_with_possible_perms(
            &user("alice"),
            &PermissionFilter::new().types(["document"]).perms(["view"]).inheriting(),
        )
        .await
        .unwrap();
    let ids: Vec<_> = inherited.iter().map(|rp| rp.resource.id).collect();
    assert_eq!(ids, vec![a.id, b.id]);
}
