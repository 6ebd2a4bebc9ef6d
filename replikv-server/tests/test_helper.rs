// Shared helpers for integration tests

#![allow(dead_code)]

use replikv_server::{Connection, Frame, MemStore, Request, Server, ServerConfig, Store};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::sleep;

/// Start a memory-backed server on an ephemeral port
pub async fn spawn_server(store: Arc<dyn Store>) -> (SocketAddr, Arc<Server>) {
    spawn_server_with(ServerConfig::default(), store).await
}

pub async fn spawn_server_with(
    config: ServerConfig,
    store: Arc<dyn Store>,
) -> (SocketAddr, Arc<Server>) {
    let server = Arc::new(Server::new(config, store));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let s = Arc::clone(&server);
    tokio::spawn(async move { s.serve(listener).await });
    (addr, server)
}

pub async fn connect(addr: SocketAddr) -> Connection {
    Connection::connect(addr).await.unwrap()
}

/// Send one command and return its reply
pub async fn call<const N: usize>(conn: &mut Connection, parts: [&'static str; N]) -> Frame {
    let (name, args) = parts.split_first().unwrap();
    conn.send_request(Request::new(*name, args.iter().copied()))
        .await
        .unwrap();
    conn.read_frame().await.unwrap().expect("connection closed")
}

/// Poll `store` until `key` appears (up to ~2s)
pub async fn wait_for_key(store: &MemStore, key: &'static str) -> Option<bytes::Bytes> {
    for _ in 0..100 {
        if let Some(v) = store.get(key.as_bytes()).await.unwrap() {
            return Some(v);
        }
        sleep(Duration::from_millis(20)).await;
    }
    None
}
