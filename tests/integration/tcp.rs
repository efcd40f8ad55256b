use crate::*;

use otscribe_bench::config::NetworkConfig;
use otscribe_bench::net::{accept_all, connect_all, open_channels};
use tokio::net::TcpListener;

// ══════════════════════════════════════════════════════════════════════════════
//  Localhost TCP runs
// ══════════════════════════════════════════════════════════════════════════════

fn localhost() -> NetworkConfig {
    NetworkConfig {
        listen_host: "127.0.0.1".to_string(),
        peer_host: "127.0.0.1".to_string(),
        connect_attempts: 200,
        connect_retry_ms: 10,
        nodelay: true,
    }
}

/// A base port with `count` free ports above it. Racy by nature; the
/// window between probing and binding is small.
async fn free_port_run(count: u16) -> u16 {
    'probe: loop {
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = probe.local_addr().unwrap().port();
        if base.checked_add(count).is_none() {
            continue;
        }
        let mut held = vec![probe];
        for i in 1..count {
            match TcpListener::bind(("127.0.0.1", base + i)).await {
                Ok(l) => held.push(l),
                Err(_) => continue 'probe,
            }
        }
        return base;
    }
}

#[tokio::test]
async fn tcp_run_on_ephemeral_ports() {
    let mut listeners = Vec::new();
    let mut ports = Vec::new();
    for _ in 0..2 {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        ports.push(l.local_addr().unwrap().port());
        listeners.push(l);
    }
    let net = localhost();
    let (a, b) = tokio::try_join!(
        accept_all(listeners, true),
        connect_all("127.0.0.1", ports, &net)
    )
    .unwrap();

    let (alice, bob) = run_pair(a, b, &params(10, 2)).await.unwrap();
    assert_consistent(&alice, &bob);
    assert_eq!(alice.peer_match, Some(true));
}

#[tokio::test]
async fn tcp_run_on_consecutive_ports() {
    let base = free_port_run(3).await;
    let net = localhost();

    let (a, b) = tokio::try_join!(
        open_channels(Role::Alice, base, 3, &net),
        open_channels(Role::Bob, base, 3, &net)
    )
    .unwrap();

    let (alice, bob) = run_pair(a, b, &params(10, 3)).await.unwrap();
    assert_consistent(&alice, &bob);
    assert!(alice.bytes_sent > 1024 * 16, "party 1 sends at least the blocks");
}
