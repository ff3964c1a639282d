use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::transport::tcp::tcp_config::TcpTransportConfig;
use crate::transport::tcp::TcpTransport;
use crate::transport::Rank;

/// Starts a TCP process group inside the current process, every rank listening on an ephemeral
///  port on localhost.
pub async fn loopback_tcp_group(group_size: u32) -> anyhow::Result<Vec<Arc<TcpTransport>>> {
    let mut listeners = Vec::new();
    for _ in 0..group_size {
        listeners.push(TcpListener::bind("127.0.0.1:0").await?);
    }
    let peers = listeners.iter()
        .map(|l| l.local_addr())
        .collect::<Result<Vec<SocketAddr>, _>>()?;

    let handles: Vec<_> = listeners.into_iter()
        .zip(0..)
        .map(|(listener, rank): (TcpListener, Rank)| {
            let config = TcpTransportConfig::new(rank, peers.clone());
            tokio::spawn(TcpTransport::start_with_listener(config, listener))
        })
        .collect();

    let mut result = Vec::new();
    for handle in handles {
        result.push(handle.await??);
    }
    Ok(result)
}
