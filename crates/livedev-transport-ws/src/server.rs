//! Accept loop and per-connection pump.

use crate::{Clients, Outbound, PageFrame};
use futures_util::{SinkExt, StreamExt};
use livedev_core::ClientId;
use livedev_protocol::TransportEvents;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

pub(crate) async fn accept_loop(
    listener: TcpListener,
    events: TransportEvents,
    clients: Clients,
    next_client: Arc<AtomicU64>,
) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!("Accept failed: {}", e);
                events.lost();
                return;
            }
        };
        let events = events.clone();
        let clients = clients.clone();
        let next_client = next_client.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, addr, events, clients, next_client).await {
                tracing::warn!("Connection error from {}: {}", addr, e);
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    events: TransportEvents,
    clients: Clients,
    next_client: Arc<AtomicU64>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();

    tracing::debug!("New connection from {}", addr);

    // Wait for the page to announce itself
    let url = loop {
        let Some(msg) = stream.next().await else {
            return Ok(());
        };
        if let Message::Text(text) = msg? {
            match serde_json::from_str::<PageFrame>(&text) {
                Ok(PageFrame::Connect { url }) => break url,
                Ok(PageFrame::Message { .. }) => {
                    tracing::debug!("Message before handshake from {}, dropped", addr);
                }
                Err(e) => tracing::warn!("Invalid frame from {}: {}", addr, e),
            }
        }
    };

    let client = ClientId(next_client.fetch_add(1, Ordering::Relaxed));
    let (tx, mut rx) = mpsc::unbounded_channel();
    clients.write().insert(client, tx);
    events.connect(client, url);

    loop {
        tokio::select! {
            msg = stream.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => match serde_json::from_str::<PageFrame>(&text) {
                        Ok(PageFrame::Message { message }) => {
                            events.message(client, message);
                        }
                        Ok(PageFrame::Connect { url }) => {
                            tracing::debug!(%client, url = %url, "repeated handshake ignored");
                        }
                        Err(e) => tracing::warn!("Invalid frame: {}", e),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }

            out = rx.recv() => {
                match out {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            tracing::debug!("Send to {} failed: {}", client, e);
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
        }
    }

    clients.write().remove(&client);
    events.close(client);
    tracing::debug!("Connection closed: {}", addr);
    Ok(())
}
