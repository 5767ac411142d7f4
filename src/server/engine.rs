//! TCP serve loop binding the broker's operation surface to remote clients.
//!
//! Each connection gets one consumer identity. Requests are read off the
//! socket as length-prefixed JSON frames; deliveries for the connection's
//! subscriptions are forwarded by a dedicated writer task so queue
//! operations never wait on a slow socket.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task;
use tracing::{error, info};

use crate::config::Config;
use crate::core::broker::Broker;
use crate::core::consumer::{ConsumerHandle, ConsumerId};
use crate::server::{encode_frame_into, extract_frame, AgentInfo, Request, Response, ServerFrame};

/// Reasonable caps to protect against malformed clients and reduce reallocs.
const INBUF_INIT: usize = 64 * 1024;
const MAX_FRAME_LEN: usize = 8 * 1024 * 1024; // 8 MiB cap per request

/// Bootstraps a broker from `config`, starts its sweeper, and serves it.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let broker = Broker::bootstrap(&config)?;
    broker.spawn_sweeper(Duration::from_secs(config.sweep.interval_secs));
    serve_with(broker, &config.server.bind_addr).await
}

/// Serves an already-bootstrapped broker on `bind_addr`.
pub async fn serve_with(broker: Arc<Broker>, bind_addr: &str) -> anyhow::Result<()> {
    info!("Starting RelayQ broker on {}", bind_addr);
    let listener = TcpListener::bind(bind_addr).await?;

    loop {
        let (socket, peer_addr) = listener.accept().await?;
        socket.set_nodelay(true)?;
        let broker = Arc::clone(&broker);
        info!("Client connected: {}", peer_addr);

        task::spawn(async move {
            if let Err(e) = handle_client(socket, broker).await {
                error!("Error handling {}: {:?}", peer_addr, e);
            }
        });
    }
}

async fn handle_client(stream: TcpStream, broker: Arc<Broker>) -> anyhow::Result<()> {
    let peer = stream.peer_addr()?;
    let (reader_half, writer_half) = stream.into_split();
    let mut reader = BufReader::new(reader_half);

    // Writer shared between request replies and the delivery forwarder.
    let shared_writer = Arc::new(Mutex::new(BufWriter::new(writer_half)));

    // One consumer identity per connection.
    let consumer_id = ConsumerId::random();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let handle = ConsumerHandle::new(consumer_id.clone(), tx);

    // Delivery forwarder: drains the consumer channel onto the socket.
    let delivery_writer = Arc::clone(&shared_writer);
    let forwarder = task::spawn(async move {
        while let Some(raw) = rx.recv().await {
            let mut buf = BytesMut::with_capacity(raw.len() + 32);
            encode_frame_into(&ServerFrame::Delivery(raw), &mut buf);
            let mut w = delivery_writer.lock().await;
            if w.write_all(&buf).await.is_err() || w.flush().await.is_err() {
                break;
            }
        }
    });

    let mut inbuf = BytesMut::with_capacity(INBUF_INIT);
    // Track subscriptions for cleanup at disconnect.
    let mut subscriptions: Vec<String> = Vec::with_capacity(8);

    'io: loop {
        let n = reader.read_buf(&mut inbuf).await?;
        if n == 0 {
            // EOF
            break 'io;
        }

        // Parse as many complete frames as available.
        loop {
            if inbuf.len() < 4 {
                break;
            }
            let len = u32::from_be_bytes([inbuf[0], inbuf[1], inbuf[2], inbuf[3]]) as usize;
            if len > MAX_FRAME_LEN {
                error!(
                    "Client {} sent frame larger than MAX_FRAME_LEN ({} > {})",
                    peer, len, MAX_FRAME_LEN
                );
                break 'io;
            }

            let Some(parsed) = extract_frame::<Request>(&mut inbuf) else {
                // Incomplete frame; read more.
                break;
            };
            let request = match parsed {
                Ok(r) => r,
                Err(e) => {
                    error!("Failed to decode request from {}: {:?}", peer, e);
                    continue; // Skip this frame, keep the connection alive.
                }
            };

            let reply = apply(&broker, &consumer_id, &handle, &mut subscriptions, request);

            let mut frame_buf = BytesMut::with_capacity(256);
            encode_frame_into(&ServerFrame::Reply(reply), &mut frame_buf);
            let mut w = shared_writer.lock().await;
            w.write_all(&frame_buf).await?;
            w.flush().await?;
        }
    }

    // Drop the queue-side handles so nothing dispatches to this connection
    // anymore, then close the delivery channel.
    for queue in subscriptions {
        broker.unsubscribe(&queue, &consumer_id);
    }
    drop(handle);
    let _ = forwarder.await;
    info!("Client disconnected: {}", peer);
    Ok(())
}

/// Maps one request onto the broker surface.
fn apply(
    broker: &Broker,
    consumer_id: &ConsumerId,
    handle: &ConsumerHandle,
    subscriptions: &mut Vec<String>,
    request: Request,
) -> Response {
    match request {
        Request::DeclareQueue { queue, durable } => {
            broker.declare_queue(&queue, durable);
            Response::Ok { ok: true }
        }
        Request::DeleteQueue { queue } => Response::Ok {
            ok: broker.delete_queue(&queue),
        },
        Request::Publish {
            queue,
            content,
            durable,
        } => Response::Ok {
            ok: broker.publish(&queue, &content, durable),
        },
        Request::Subscribe { queue } => match broker.subscribe(&queue, handle.clone()) {
            Ok(()) => {
                if !subscriptions.contains(&queue) {
                    subscriptions.push(queue);
                }
                Response::Ok { ok: true }
            }
            Err(e) => Response::Error {
                message: e.to_string(),
            },
        },
        Request::Unsubscribe { queue } => {
            let ok = broker.unsubscribe(&queue, consumer_id);
            if ok {
                subscriptions.retain(|q| q != &queue);
            }
            Response::Ok { ok }
        }
        Request::SetFairDispatch { queue, fair } => Response::Ok {
            ok: broker.set_fair_dispatch(&queue, fair),
        },
        Request::Ack { queue, message_id } => Response::Ok {
            ok: broker.ack(&queue, &message_id, consumer_id),
        },
        Request::Nack { queue, message_id } => Response::Ok {
            ok: broker.nack(&queue, &message_id, consumer_id),
        },
        Request::ListQueues => Response::Queues {
            names: broker.list_queues(),
        },
        Request::QueueInfo { queue } => Response::Info {
            text: broker.queue_info(&queue),
        },
        Request::ListAgents => Response::Agents {
            agents: broker
                .list_agents()
                .iter()
                .map(|a| AgentInfo::from(a.as_ref()))
                .collect(),
        },
        Request::RemoveAgent { name } => Response::Ok {
            ok: broker.remove_agent(&name),
        },
        Request::SetAgentsEnabled { enabled } => {
            broker.set_agents_enabled(enabled);
            Response::Ok { ok: true }
        }
        Request::AgentsEnabled => Response::Ok {
            ok: broker.agents_enabled(),
        },
    }
}
