use std::error::Error;
use std::time::Duration;

use gattlink::fragment::{self, Reassembler};
use gattlink::{Config, LeAdapter};
use tracing::{info, metadata::LevelFilter};

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

    let message = std::env::args().nth(1).unwrap_or_else(|| "hello from gattlink".to_string());

    let config = Config::default();
    let mtu = config.mtu;
    let adapter = LeAdapter::new(config);

    let reassembler = Reassembler::new();
    adapter.set_client_packet_received_callback(Some(reassembler.into_callback(|peer, packet| {
        info!("{} answered {:?}", peer, String::from_utf8_lossy(&packet));
    })));

    adapter.start().await?;
    adapter.start_gatt_client().await?;
    info!("looking for GATT servers");

    for chunk in fragment::split(message.as_bytes(), mtu)? {
        adapter.send_to_all_gatt_servers(&chunk).await?;
    }
    info!("sent {} bytes", message.len());

    tokio::time::sleep(Duration::from_secs(5)).await;
    adapter.stop_gatt_client().await?;
    Ok(())
}
