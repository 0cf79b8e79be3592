//! Identity map behavior through the session

mod common;

use std::sync::Arc;

use common::{record, world, Post, User};
use futures::future::join_all;
use quarry_core::storage::{Op, StorageBackend};
use quarry_core::{ForeignList, ForeignRef, Key, OdmError};
use serde_json::json;

async fn seed_users(w: &common::World) {
    for (id, name, age) in [("ann", "Ann", 30), ("bob", "Bob", 17), ("cy", "Cy", 45)] {
        w.users
            .insert("_id", &Key::from(id), record(json!({"name": name, "age": age})))
            .await
            .unwrap();
    }
    w.reset_stats();
}

#[tokio::test]
async fn test_second_load_returns_same_instance_without_get() {
    let w = world();
    seed_users(&w).await;

    let first = w.session.load::<User>("ann").await.unwrap().unwrap();
    assert_eq!(w.users.stats().calls(Op::Get), 1);

    let second = w.session.load::<User>("ann").await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(w.users.stats().calls(Op::Get), 1, "second load must not hit storage");
}

#[tokio::test]
async fn test_load_after_clear_issues_one_get() {
    let w = world();
    seed_users(&w).await;

    let first = w.session.load::<User>("ann").await.unwrap().unwrap();
    assert!(w.session.clear::<User>(&Key::from("ann")));
    w.reset_stats();

    let second = w.session.load::<User>("ann").await.unwrap().unwrap();
    assert_eq!(w.users.stats().calls(Op::Get), 1);
    assert!(!Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_clear_all_and_clear_type() {
    let w = world();
    seed_users(&w).await;

    for key in ["ann", "bob", "cy"] {
        w.session.load::<User>(key).await.unwrap().unwrap();
    }
    assert_eq!(w.session.identity().len(), 3);
    assert_eq!(w.session.clear_type::<User>(), 3);
    assert!(w.session.identity().is_empty());

    w.session.load::<User>("ann").await.unwrap().unwrap();
    w.session.clear_all();
    assert!(w.session.identity().is_empty());
}

#[tokio::test]
async fn test_concurrent_loads_share_one_fetch() {
    let w = world();
    seed_users(&w).await;

    let loads = (0..16).map(|_| w.session.load::<User>("cy"));
    let loaded: Vec<_> = join_all(loads)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    assert!(loaded.iter().all(|u| Arc::ptr_eq(u, &loaded[0])));
    assert_eq!(w.users.stats().calls(Op::Get), 1);
}

#[tokio::test]
async fn test_missing_key() {
    let w = world();
    seed_users(&w).await;

    assert!(w.session.load::<User>("nobody").await.unwrap().is_none());

    let err = w.session.load_required::<User>("nobody").await.unwrap_err();
    assert!(matches!(err, OdmError::NotFound { .. }));
}

#[tokio::test]
async fn test_relationships_resolve_lazily() {
    let w = world();
    seed_users(&w).await;

    let mut post = Post::new("hello");
    post.author = Some(ForeignRef::new("ann"));
    let post = w.session.create(post);
    let key = w.session.save(&post).await.unwrap();
    w.session.clear_all();
    w.reset_stats();

    let loaded = w.session.load::<Post>(key).await.unwrap().unwrap();
    assert_eq!(w.users.stats().calls(Op::Get), 0, "loading a post must not fetch its author");

    let author_ref = loaded.read().await.author.clone().unwrap();
    let author = author_ref.resolve(&w.session).await.unwrap().unwrap();
    assert_eq!(author.read().await.name, "Ann");
    assert_eq!(w.users.stats().calls(Op::Get), 1);

    let again = author_ref.resolve(&w.session).await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&author, &again));
    assert_eq!(w.users.stats().calls(Op::Get), 1);
}

#[tokio::test]
async fn test_foreign_list_one_get_per_distinct_key() {
    let w = world();
    seed_users(&w).await;

    let ann = w.session.load::<User>("ann").await.unwrap().unwrap();
    w.reset_stats();

    let list: ForeignList<User> =
        ForeignList::from_keys(vec![Key::from("ann"), Key::from("bob"), Key::from("gone")]);
    let resolved = list.resolve(&w.session).await.unwrap();

    assert_eq!(resolved.len(), 2);
    assert!(Arc::ptr_eq(&resolved[0], &ann));
    assert_eq!(w.users.stats().calls(Op::Get), 2, "one get for bob, one for the dangling key");
}

#[test]
fn test_load_from_blocking_context() {
    let w = world();
    tokio_test::block_on(async {
        seed_users(&w).await;
        let bob = w.session.load::<User>("bob").await.unwrap().unwrap();
        assert_eq!(bob.read().await.age, 17);
    });
}
