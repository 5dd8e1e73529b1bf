use std::error::Error;

use gattlink::fragment::{self, Reassembler};
use gattlink::{Config, LeAdapter};
use tokio::sync::mpsc;
use tracing::{info, metadata::LevelFilter, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config {
        local_name: Some("gattlink echo".to_string()),
        ..Default::default()
    };
    let mtu = config.mtu;
    let adapter = LeAdapter::new(config);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let reassembler = Reassembler::new();
    adapter.set_server_packet_received_callback(Some(reassembler.into_callback(move |peer, packet| {
        let _ = tx.send((peer.to_owned(), packet));
    })));

    adapter.start().await?;
    info!("local address {}", adapter.address().await?);
    adapter.start_gatt_server().await?;
    info!("echo server started");

    while let Some((peer, packet)) = rx.recv().await {
        info!("{} bytes from {}: {:?}", packet.len(), peer, String::from_utf8_lossy(&packet));
        for chunk in fragment::split(&packet, mtu)? {
            if let Err(err) = adapter.send_to_gatt_client(&peer, &chunk).await {
                warn!("echo to {} failed: {}", peer, err);
                break;
            }
        }
    }

    adapter.stop_gatt_server().await?;
    Ok(())
}
