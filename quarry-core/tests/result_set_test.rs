//! Lazy result sets: windows, batching and restart

mod common;

use std::sync::Arc;

use common::{world, User};
use futures::{StreamExt, TryStreamExt};
use quarry_core::{Key, Query};

async fn seeded() -> common::World {
    let w = world();
    for i in 0..10u32 {
        let user = w.session.create(User {
            id: Some(Key::Int(i64::from(i))),
            name: format!("user{i}"),
            age: 20 + (i * 7) % 10,
        });
        w.session.save(&user).await.unwrap();
    }
    w
}

async fn names(rs: &quarry_core::ResultSet<User>) -> Vec<String> {
    let instances: Vec<_> = rs.stream().try_collect().await.unwrap();
    let mut names = Vec::with_capacity(instances.len());
    for instance in instances {
        names.push(instance.read().await.name.clone());
    }
    names
}

#[tokio::test]
async fn test_restart_after_partial_iteration() {
    let w = seeded().await;
    let rs = w
        .session
        .find_all::<User>()
        .await
        .unwrap()
        .sort(&["-age", "name"])
        .unwrap()
        .batch_size(3);

    let mut partial = Vec::new();
    let mut stream = Box::pin(rs.stream());
    for _ in 0..4 {
        let instance = stream.next().await.unwrap().unwrap();
        partial.push(instance.read().await.name.clone());
    }
    drop(stream);

    let first = names(&rs).await;
    let second = names(&rs).await;

    assert_eq!(first.len(), 10);
    assert_eq!(first, second);
    assert_eq!(&first[..4], partial.as_slice());
}

#[tokio::test]
async fn test_window_count_and_get() {
    let w = seeded().await;
    let rs = w
        .session
        .find::<User>(&[Query::new("age", "gte", 25).unwrap()])
        .await
        .unwrap()
        .sort(&["name"])
        .unwrap();

    let total = rs.count().await.unwrap();
    assert!(total > 2);

    let windowed = rs.clone().offset(1).limit(2);
    assert_eq!(windowed.count().await.unwrap(), 2);

    let second = rs.get(1).await.unwrap().unwrap();
    let first_of_window = windowed.get(0).await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&second, &first_of_window));

    assert!(windowed.get(2).await.unwrap().is_none());
    assert!(rs.get(total).await.unwrap().is_none());
}

#[tokio::test]
async fn test_stream_reuses_resident_instances() {
    let w = seeded().await;
    let three = w.session.load::<User>(3).await.unwrap().unwrap();

    let all = w.session.find_all::<User>().await.unwrap().to_vec().await.unwrap();
    assert_eq!(all.len(), 10);
    assert!(all.iter().any(|u| Arc::ptr_eq(u, &three)));
}

#[tokio::test]
async fn test_keys_without_hydrating() {
    let w = seeded().await;
    w.session.clear_all();

    let keys = w
        .session
        .find_all::<User>()
        .await
        .unwrap()
        .sort(&["-_id"])
        .unwrap()
        .limit(3)
        .keys()
        .await
        .unwrap();

    assert_eq!(keys, vec![Key::Int(9), Key::Int(8), Key::Int(7)]);
    assert!(w.session.identity().is_empty());
}

#[tokio::test]
async fn test_empty_result_set() {
    let w = seeded().await;
    let rs = w
        .session
        .find::<User>(&[Query::eq("name", "nobody")])
        .await
        .unwrap();

    assert_eq!(rs.count().await.unwrap(), 0);
    assert!(names(&rs).await.is_empty());
    assert!(rs.get(0).await.unwrap().is_none());
}
