//! A failing store surfaces its error and never a partial permission set.

use keystone_acl::{ResolveOptions, Target, UsersForPermFilter};
use keystone_core::Error;

use crate::common::{TestHarness, user};

#[tokio::test]
async fn test_store_failure_propagates_from_resolution() {
    let h = TestHarness::new();
    h.users(&["alice"]).await;
    let doc = h.resource("doc", "document", user("alice"), None).await;
    h.acl.grants().grant_app(user("alice"), "audit").await.unwrap();

    h.store.break_reads();
    let engine = h.acl.resolution();
    for target in [Target::App, Target::Resource(doc.id)] {
        let err = engine
            .effective(&user("alice"), &target, ResolveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage { .. }), "got {err:?} on {target}");
    }
    let err = engine
        .users_for_perm(doc.id, None, &UsersForPermFilter::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Storage { .. }));
    assert!(!err.is_client_error());

    h.store.heal();
    let perms = engine
        .effective(&user("alice"), &Target::App, ResolveOptions::default())
        .await
        .unwrap();
    assert!(perms.contains("audit"));
}
