//! Property-based tests for resolution.

use keystone_acl::{AccessControl, ResolveOptions, Target};
use keystone_core::{GrantScope, NewResource, NewUser, Principal};
use proptest::prelude::*;
use std::collections::BTreeSet;

use crate::common::test_config;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn app_set_is_union_of_direct_grants(
        perms in prop::collection::vec("[a-z]{1,6}", 0..8),
    ) {
        let expected: BTreeSet<String> = perms.iter().cloned().collect();
        let resolved = runtime().block_on(async {
            let acl = AccessControl::in_memory(test_config()).unwrap();
            acl.entities().create_user(NewUser::new("p", "p@x.io")).await.unwrap();
            for perm in &perms {
                acl.grants().grant_app(Principal::user("p"), perm.as_str()).await.unwrap();
            }
            acl.resolution()
                .effective(&Principal::user("p"), &Target::App, ResolveOptions::default())
                .await
                .unwrap()
                .names()
        });
        prop_assert_eq!(resolved, expected);
    }

    #[test]
    fn owner_always_holds_type_set(
        extra in prop::collection::vec("[a-z]{1,6}", 0..5),
        inherit in any::<bool>(),
    ) {
        let resolved = runtime().block_on(async {
            let acl = AccessControl::in_memory(test_config()).unwrap();
            acl.entities().create_user(NewUser::new("o", "o@x.io")).await.unwrap();
            let doc = acl
                .entities()
                .create_resource(NewResource::new("d", "document").owned_by_user("o"))
                .await
                .unwrap();
            for perm in &extra {
                acl.grants()
                    .grant(Principal::user("o"), perm.as_str(), GrantScope::Resource(doc.id))
                    .await
                    .unwrap();
            }
            acl.resolution()
                .effective(&Principal::user("o"), &Target::Resource(doc.id), ResolveOptions { inherit })
                .await
                .unwrap()
                .names()
        });
        let mut expected: BTreeSet<String> =
            ["view", "edit", "delete"].iter().map(|p| p.to_string()).collect();
        expected.extend(extra);
        prop_assert_eq!(resolved, expected);
    }
}
