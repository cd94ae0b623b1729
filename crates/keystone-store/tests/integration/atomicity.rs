//! Batches apply completely or not at all.

use keystone_core::{Error, Grant, Group, GroupId, Membership, Principal, User, UserName};
use keystone_store::{
    EntityKey, EntityStore, GrantFilter, MemoryStore, MembershipSubject, Mutation, WriteBatch,
};

fn group_with(id: i64, name: &str, perms: &[&str]) -> Group {
    let mut group = Group::new(GroupId::new(id), name);
    group.possible_permissions = perms.iter().map(|p| p.to_string()).collect();
    group
}

#[tokio::test]
async fn test_rejected_grant_rolls_back_whole_batch() {
    let store = MemoryStore::new();
    store
        .commit(
            WriteBatch::new()
                .with(Mutation::Insert(User::new("alice", "a@x.io").into()))
                .with(Mutation::Insert(group_with(1, "ops", &["deploy"]).into())),
        )
        .await
        .unwrap();

    let batch = WriteBatch::new()
        .with(Mutation::AddMembership(Membership::new("alice", GroupId::new(1))))
        .with(Mutation::PutGrant(Grant::app(Principal::group(GroupId::new(1)), "deploy")))
        .with(Mutation::PutGrant(Grant::app(Principal::group(GroupId::new(1)), "nuke")));
    let err = store.commit(batch).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));

    let reader = store.snapshot().await.unwrap();
    assert!(
        reader
            .query_memberships(&MembershipSubject::Group(GroupId::new(1)))
            .await
            .unwrap()
            .is_empty()
    );
    assert!(
        reader
            .query_grants_any_principal(&GrantFilter::All)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(reader.find_group(GroupId::new(1)).await.unwrap().unwrap().member_count, 0);
}

#[tokio::test]
async fn test_delete_missing_is_not_found() {
    let store = MemoryStore::new();
    let err = store
        .commit(Mutation::Delete(EntityKey::User(UserName::new("ghost"))).into())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_reader_sees_one_version_during_concurrent_writes() {
    let store = std::sync::Arc::new(MemoryStore::new());
    store
        .commit(Mutation::Insert(User::new("first", "f@x.io").into()).into())
        .await
        .unwrap();
    let reader = store.snapshot().await.unwrap();

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            for i in 0..10 {
                store
                    .commit(Mutation::Insert(User::new(format!("u{i}"), "u@x.io").into()).into())
                    .await
                    .unwrap();
            }
        })
    };
    writer.await.unwrap();

    let users = reader.list_users(&Default::default()).await.unwrap();
    assert_eq!(users.len(), 1);
    let latest = store.snapshot().await.unwrap();
    assert_eq!(latest.list_users(&Default::default()).await.unwrap().len(), 11);
}
