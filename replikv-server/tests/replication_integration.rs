//! Integration tests for primary/replica replication
//!
//! These tests cover:
//! - Snapshot ordering on a fresh sync session
//! - Live writes reaching a replica started with SLAVEOF
//! - SLAVEOF towards an unreachable primary
//! - Two sync sessions sharing one mutation stream

mod test_helper;

use bytes::Bytes;
use replikv_server::{Connection, Frame, MemStore, Request, Store};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use test_helper::{call, connect, spawn_server, wait_for_key};
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};

fn put(key: &'static str, value: &'static str) -> Frame {
    Frame::bulk_array(["put", key, value])
}

async fn open_sync(addr: std::net::SocketAddr) -> Connection {
    let mut conn = connect(addr).await;
    conn.send_request(Request::new("SYNC", ["0"])).await.unwrap();
    conn
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sync_snapshot_is_ordered_then_blocks() {
    let store = MemStore::new();
    for (k, v) in [("b", "2"), ("c", "3"), ("a", "1")] {
        store.put(Bytes::from(k), Bytes::from(v)).await.unwrap();
    }
    let (addr, _server) = spawn_server(Arc::new(store)).await;
    let mut replica = open_sync(addr).await;

    assert_eq!(replica.read_frame().await.unwrap(), Some(put("a", "1")));
    assert_eq!(replica.read_frame().await.unwrap(), Some(put("b", "2")));
    assert_eq!(replica.read_frame().await.unwrap(), Some(put("c", "3")));
    assert!(
        timeout(Duration::from_millis(200), replica.read_frame())
            .await
            .is_err()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sync_streams_writes_after_snapshot() {
    let store = MemStore::new();
    store.put(Bytes::from("a"), Bytes::from("1")).await.unwrap();
    let (addr, _server) = spawn_server(Arc::new(store)).await;

    let mut replica = open_sync(addr).await;
    assert_eq!(replica.read_frame().await.unwrap(), Some(put("a", "1")));

    let mut writer = connect(addr).await;
    assert_eq!(call(&mut writer, ["SET", "d", "4"]).await, Frame::Simple("OK".into()));
    assert_eq!(call(&mut writer, ["DEL", "a"]).await, Frame::Simple("OK".into()));

    let next = timeout(Duration::from_secs(2), replica.read_frame())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next, Some(put("d", "4")));
    let next = timeout(Duration::from_secs(2), replica.read_frame())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next, Some(Frame::bulk_array(["del", "a"])));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slaveof_replicates_into_local_store() {
    let primary_store = MemStore::new();
    primary_store
        .put(Bytes::from("seed"), Bytes::from("0"))
        .await
        .unwrap();
    let (primary_addr, _primary) = spawn_server(Arc::new(primary_store)).await;

    let replica_store = MemStore::new();
    let (replica_addr, _replica) = spawn_server(Arc::new(replica_store.clone())).await;

    let mut admin = connect(replica_addr).await;
    let port = primary_addr.port().to_string();
    admin
        .send_request(Request::new("SLAVEOF", ["127.0.0.1".to_string(), port]))
        .await
        .unwrap();
    assert_eq!(
        admin.read_frame().await.unwrap(),
        Some(Frame::Simple("OK".into()))
    );

    assert_eq!(
        wait_for_key(&replica_store, "seed").await,
        Some(Bytes::from("0"))
    );

    let mut writer = connect(primary_addr).await;
    call(&mut writer, ["SET", "live", "1"]).await;
    assert_eq!(
        wait_for_key(&replica_store, "live").await,
        Some(Bytes::from("1"))
    );

    // Reads on the replica see replicated data
    assert_eq!(
        call(&mut admin, ["GET", "live"]).await,
        Frame::Bulk(Bytes::from("1"))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slaveof_unreachable_primary_still_ok() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_port = listener.local_addr().unwrap().port();
    drop(listener);

    let (addr, _server) = spawn_server(Arc::new(MemStore::new())).await;
    let mut conn = connect(addr).await;

    conn.send_request(Request::new(
        "REPLICAOF",
        ["127.0.0.1".to_string(), dead_port.to_string()],
    ))
    .await
    .unwrap();
    assert_eq!(
        conn.read_frame().await.unwrap(),
        Some(Frame::Simple("OK".into()))
    );

    sleep(Duration::from_millis(100)).await;

    // Server keeps serving
    assert_eq!(call(&mut conn, ["PING"]).await, Frame::Simple("PONG".into()));
    let mut other = connect(addr).await;
    assert_eq!(call(&mut other, ["SET", "k", "v"]).await, Frame::Simple("OK".into()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slaveof_arity() {
    let (addr, _server) = spawn_server(Arc::new(MemStore::new())).await;
    let mut conn = connect(addr).await;
    assert_eq!(
        call(&mut conn, ["SLAVEOF", "127.0.0.1"]).await,
        Frame::Error("ERR wrong number of arguments for 'slaveof' command".into())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_sync_sessions_partition_stream() {
    let (addr, _server) = spawn_server(Arc::new(MemStore::new())).await;
    let mut first = open_sync(addr).await;
    let mut second = open_sync(addr).await;
    // Both sessions are past their (empty) snapshot once they are attached
    sleep(Duration::from_millis(100)).await;

    let mut writer = connect(addr).await;
    let keys = ["k0", "k1", "k2", "k3", "k4", "k5", "k6", "k7", "k8", "k9"];
    for key in keys {
        call(&mut writer, ["SET", key, "v"]).await;
    }

    let mut seen = Vec::new();
    for replica in [&mut first, &mut second] {
        while let Ok(Ok(Some(frame))) =
            timeout(Duration::from_millis(300), replica.read_frame()).await
        {
            if let Frame::Array(items) = frame {
                if let Some(Frame::Bulk(key)) = items.get(1) {
                    seen.push(key.clone());
                }
            }
        }
    }

    // Every record delivered exactly once across both sessions
    assert_eq!(seen.len(), keys.len());
    let unique: HashSet<_> = seen.into_iter().collect();
    assert_eq!(unique.len(), keys.len());
}
