//! Wire protocol: length-prefixed JSON frames.
//!
//! Every frame on the socket is a 4-byte big-endian length followed by a
//! JSON document. Clients send [`Request`]s; the server answers each with a
//! [`ServerFrame::Reply`] and pushes [`ServerFrame::Delivery`] frames as
//! messages are dispatched to the connection's consumer.

pub mod engine;

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::core::agents::FilterAgent;

/// Client → broker operations; the full broker surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    DeclareQueue {
        queue: String,
        #[serde(default)]
        durable: bool,
    },
    DeleteQueue {
        queue: String,
    },
    Publish {
        queue: String,
        content: String,
        #[serde(default)]
        durable: bool,
    },
    Subscribe {
        queue: String,
    },
    Unsubscribe {
        queue: String,
    },
    SetFairDispatch {
        queue: String,
        fair: bool,
    },
    Ack {
        queue: String,
        message_id: String,
    },
    Nack {
        queue: String,
        message_id: String,
    },
    ListQueues,
    QueueInfo {
        queue: String,
    },
    ListAgents,
    RemoveAgent {
        name: String,
    },
    SetAgentsEnabled {
        enabled: bool,
    },
    AgentsEnabled,
}

/// Flattened view of one admission agent, for listing over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: String,
    pub description: String,
    pub priority: i32,
}

impl From<&dyn FilterAgent> for AgentInfo {
    fn from(agent: &dyn FilterAgent) -> Self {
        AgentInfo {
            name: agent.name().to_string(),
            description: agent.description(),
            priority: agent.priority(),
        }
    }
}

/// Broker → client reply to one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    /// Boolean outcome; not-found and admission rejection both land here as
    /// `ok: false`, per the error taxonomy.
    Ok { ok: bool },
    Queues { names: Vec<String> },
    /// `text` is None for an unknown queue.
    Info { text: Option<String> },
    Agents { agents: Vec<AgentInfo> },
    Error { message: String },
}

/// One server → client frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "frame", content = "body", rename_all = "snake_case")]
pub enum ServerFrame {
    Reply(Response),
    /// An `id||content` delivery string; the reserved `SYSTEM` id carries
    /// queue-level notices such as deletion.
    Delivery(String),
}

/// Encodes any serializable value as a length-prefixed JSON frame.
pub fn encode_frame_into<T: Serialize>(value: &T, buf: &mut BytesMut) {
    let data = serde_json::to_vec(value).expect("frame types serialize infallibly");
    buf.reserve(4 + data.len());
    buf.put_u32(data.len() as u32);
    buf.extend_from_slice(&data);
}

/// Extracts one length-prefixed JSON frame from the buffer, if complete.
pub fn extract_frame<T: for<'de> Deserialize<'de>>(
    buf: &mut BytesMut,
) -> Option<serde_json::Result<T>> {
    if buf.len() < 4 {
        return None;
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if buf.len() < 4 + len {
        return None;
    }

    buf.advance(4);
    let payload = buf.split_to(len);
    Some(serde_json::from_slice(&payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_frame_round_trip() {
        let req = Request::Publish {
            queue: "info".into(),
            content: "[INFO] hello".into(),
            durable: true,
        };
        let mut buf = BytesMut::new();
        encode_frame_into(&req, &mut buf);

        let decoded: Request = extract_frame(&mut buf).unwrap().unwrap();
        match decoded {
            Request::Publish { queue, content, durable } => {
                assert_eq!(queue, "info");
                assert_eq!(content, "[INFO] hello");
                assert!(durable);
            }
            other => panic!("unexpected request: {other:?}"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_is_not_extracted() {
        let mut buf = BytesMut::new();
        encode_frame_into(&Request::ListQueues, &mut buf);
        let cut = buf.split_to(buf.len() - 1);
        let mut partial = cut;
        assert!(extract_frame::<Request>(&mut partial).is_none());
    }

    #[test]
    fn delivery_frame_round_trip() {
        let frame = ServerFrame::Delivery("abc||payload with || inside".into());
        let mut buf = BytesMut::new();
        encode_frame_into(&frame, &mut buf);
        let decoded: ServerFrame = extract_frame(&mut buf).unwrap().unwrap();
        match decoded {
            ServerFrame::Delivery(raw) => assert_eq!(raw, "abc||payload with || inside"),
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
