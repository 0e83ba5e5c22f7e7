//! Radio RX task: the hub's exclusive owner of the receive socket. Does
//! nothing but read frames and hand them to the Reassembler task over a
//! bounded channel; never touches the session table or the Store itself.

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug)]
pub struct RxFrame {
    pub bytes: Vec<u8>,
    pub rssi: i32,
}

pub async fn run(bind: String, tx: mpsc::Sender<RxFrame>, shutdown: CancellationToken) -> anyhow::Result<()> {
    let socket = UdpSocket::bind(&bind).await?;
    tracing::info!(bind, "radio RX task listening");
    let mut buf = [0u8; 256];

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("radio RX task shutting down");
                return Ok(());
            }
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((n, _from)) => {
                        let frame = RxFrame {
                            bytes: buf[..n].to_vec(),
                            rssi: wire::synthesize_rssi(n) as i32,
                        };
                        if tx.send(frame).await.is_err() {
                            tracing::warn!("reassembler channel closed, dropping frame");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "radio RX receive error");
                    }
                }
            }
        }
    }
}
