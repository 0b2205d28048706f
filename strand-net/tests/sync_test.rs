//! Instances syncing over in-process pipes.

use std::sync::Arc;
use std::time::Duration;
use strand_kernel::{Instance, InstanceOptions};
use strand_model::{BundleInfo, Value};
use strand_net::serve_connection;
use strand_storage::{EntryStore, RedbStore};
use tokio::task::JoinHandle;

const WAIT: Option<Duration> = Some(Duration::from_secs(5));

fn instance(software: &str) -> Arc<Instance> {
    let store: Arc<dyn EntryStore> = Arc::new(RedbStore::in_memory().unwrap());
    let options = InstanceOptions::default().with_software(software);
    Arc::new(Instance::open(store, options).unwrap())
}

/// Join two instances with a duplex pipe, one connection task per side.
fn link(a: &Arc<Instance>, b: &Arc<Instance>) -> Vec<JoinHandle<()>> {
    let (left, right) = tokio::io::duplex(64 * 1024);
    let mut tasks = Vec::new();
    for (instance, io) in [(a.clone(), left), (b.clone(), right)] {
        tasks.push(tokio::spawn(async move {
            let (reader, writer) = tokio::io::split(io);
            let _ = serve_connection(instance, reader, writer).await;
        }));
    }
    tasks
}

async fn committed(instance: &Instance, key: &str, value: &str) -> BundleInfo {
    instance.root().set(key, value, None).await.unwrap();
    let chain = instance.my_chain();
    let seen = instance.store().get_seen_through(chain).unwrap().unwrap();
    BundleInfo {
        medallion: chain.medallion,
        chain_start: chain.chain_start,
        timestamp: seen,
        prior_time: None,
        comment: None,
    }
}

#[tokio::test]
async fn test_backlog_and_live_sync_both_ways() {
    let a = instance("a");
    let b = instance("b");

    // Written before the connection: arrives as backlog.
    let early = committed(&a, "early", "from a").await;
    let _tasks = link(&a, &b);
    b.wait_till_has(early.medallion, early.timestamp, WAIT).await.unwrap();
    assert_eq!(b.root().get("early", None).unwrap(), Some(Value::from("from a")));

    // Written after the handshake: forwarded live.
    let live = committed(&b, "live", "from b").await;
    a.wait_till_has(live.medallion, live.timestamp, WAIT).await.unwrap();
    assert_eq!(a.root().get("live", None).unwrap(), Some(Value::from("from b")));

    // Each side also learned the other's startup bundle.
    let about_a = b.store().get_seen_through(a.my_chain()).unwrap();
    assert!(about_a.is_some());
    let software = a
        .store()
        .get_entry(
            strand_model::Muid::medallion_container(b.medallion(), strand_model::Behavior::Directory),
            &strand_model::EntryKey::user("software"),
            None,
        )
        .unwrap()
        .and_then(|e| e.value);
    assert_eq!(software, Some(Value::from("b")));
}

#[tokio::test]
async fn test_relay_forwards_across_instances() {
    let a = instance("a");
    let hub = instance("hub");
    let c = instance("c");
    let _ab = link(&a, &hub);
    let _bc = link(&hub, &c);

    let info = committed(&a, "relayed", "yes").await;
    c.wait_till_has(info.medallion, info.timestamp, WAIT).await.unwrap();
    assert_eq!(c.root().get("relayed", None).unwrap(), Some(Value::from("yes")));

    let back = committed(&c, "reply", "ok").await;
    a.wait_till_has(back.medallion, back.timestamp, WAIT).await.unwrap();
    assert_eq!(a.root().get("reply", None).unwrap(), Some(Value::from("ok")));
}

#[tokio::test]
async fn test_connection_ends_when_remote_closes() {
    let a = instance("a");
    let (left, right) = tokio::io::duplex(64 * 1024);
    let (reader, writer) = tokio::io::split(left);
    let task = tokio::spawn(serve_connection(a.clone(), reader, writer));

    // Let the greeting go out, then hang up.
    let mut remote = strand_net::MessageStream::new(right);
    assert!(remote.recv().await.unwrap().is_some());
    drop(remote);

    task.await.unwrap().unwrap();
    assert_eq!(a.peer_count().await, 0);
}
