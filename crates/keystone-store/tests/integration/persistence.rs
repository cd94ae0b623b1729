//! JSON snapshot files.

use keystone_core::{
    ExternalIdentity, Grant, Group, GroupId, Membership, Principal, Resource, ResourceId, User,
    UserName,
};
use keystone_store::{EntityStore, GrantFilter, MemoryStore, Mutation, WriteBatch};

#[tokio::test]
async fn test_snapshot_file_restores_every_table() {
    let store = MemoryStore::new();
    let mut identity = ExternalIdentity::new("77", "github", "alice");
    identity.access_token = "secret".to_string();
    store
        .commit(
            WriteBatch::new()
                .with(Mutation::Insert(User::new("alice", "a@x.io").into()))
                .with(Mutation::Insert(Group::new(GroupId::new(1), "ops").into()))
                .with(Mutation::AddMembership(Membership::new("alice", GroupId::new(1))))
                .with(Mutation::Insert(
                    Resource::new(ResourceId::new(1), "root", "folder", Principal::user("alice"))
                        .into(),
                ))
                .with(Mutation::Insert(
                    Resource::new(ResourceId::new(2), "leaf", "document", Principal::group(GroupId::new(1)))
                        .with_parent(ResourceId::new(1))
                        .into(),
                ))
                .with(Mutation::PutGrant(Grant::resource(
                    Principal::user("alice"),
                    "edit",
                    ResourceId::new(2),
                )))
                .with(Mutation::Upsert(identity.clone().into())),
        )
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keystone.json");
    store.save_snapshot(&path).await.unwrap();

    let restored = MemoryStore::load_snapshot(&path).await.unwrap().unwrap();
    let reader = restored.snapshot().await.unwrap();
    assert!(reader.find_user(&UserName::new("alice")).await.unwrap().is_some());
    assert_eq!(
        reader.find_resource(ResourceId::new(2)).await.unwrap().unwrap().parent_id,
        Some(ResourceId::new(1))
    );
    assert_eq!(
        reader.find_external_identity(&identity.key()).await.unwrap(),
        Some(identity)
    );
    assert_eq!(
        reader
            .query_grants(&Principal::user("alice"), &GrantFilter::Resources)
            .await
            .unwrap()
            .len(),
        1
    );
    assert!(restored.member_counts_consistent().await);
}
