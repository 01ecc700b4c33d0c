//! Wire protocol between the pool and a replica: length-prefixed JSON
//! frames over a long-lived duplex transport (a Tokio `TcpStream` in
//! production, an in-memory duplex in tests).
//!
//! Each request carries a `request_id`; a replica emits any number of
//! advisory `Progress` frames followed by exactly one terminal frame
//! (`Result`, `Error`, or `Overload`) per request.

use std::collections::BTreeMap;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use uuid::Uuid;

use contracts::finding::Finding;
use contracts::replica::AnalyzerKind;
use contracts::task::{TaskId, ToolExecutionRecord, ToolSelection};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub request_id: Uuid,
    pub kind: AnalyzerKind,
    pub task_id: TaskId,
    pub app_identifier: String,
    pub source_path: String,
    pub tool_selection: ToolSelection,
    pub configuration: serde_json::Value,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcomeWire {
    pub record: ToolExecutionRecord,
    pub findings: Vec<Finding>,
    /// Raw SARIF document, still embedded on the wire; the result store
    /// extracts it into `sarif/` and replaces it with a reference before
    /// anything is persisted (§4.1 SARIF handling).
    pub sarif: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResultPayload {
    pub tools: BTreeMap<String, ToolOutcomeWire>,
    pub total_findings: u32,
    pub findings_by_severity: BTreeMap<String, u32>,
}

/// Error classification carried on an `Error` frame, matching the taxonomy
/// in `contracts::error::ErrorClass` one-to-one so the pool and executor
/// can branch on it without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireErrorClass {
    Validation,
    Transient,
    Health,
    Tool,
    Timeout,
    Fatal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFrame {
    Progress {
        request_id: Uuid,
        message: String,
        percent: Option<f32>,
    },
    Result {
        request_id: Uuid,
        payload: AnalysisResultPayload,
    },
    Error {
        request_id: Uuid,
        class: WireErrorClass,
        message: String,
    },
    /// Transient: the replica's queue was full. The pool should retry on a
    /// different endpoint, not against this one.
    Overload {
        request_id: Uuid,
    },
    Cancelled {
        request_id: Uuid,
    },
}

impl ResponseFrame {
    pub fn request_id(&self) -> Uuid {
        match self {
            ResponseFrame::Progress { request_id, .. }
            | ResponseFrame::Result { request_id, .. }
            | ResponseFrame::Error { request_id, .. }
            | ResponseFrame::Overload { request_id }
            | ResponseFrame::Cancelled { request_id } => *request_id,
        }
    }

    /// Only the terminal frame is authoritative; progress frames are
    /// advisory and never drive caller-visible state transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ResponseFrame::Progress { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Request(AnalysisRequest),
    Cancel { request_id: Uuid },
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("transport closed before a terminal frame arrived")]
    Closed,
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame was not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

pub fn framed_write<W: AsyncWrite>(writer: W) -> FramedWrite<W, LengthDelimitedCodec> {
    FramedWrite::new(writer, LengthDelimitedCodec::new())
}

pub fn framed_read<R: AsyncRead>(reader: R) -> FramedRead<R, LengthDelimitedCodec> {
    FramedRead::new(reader, LengthDelimitedCodec::new())
}

pub async fn send_frame<W, T>(
    sink: &mut FramedWrite<W, LengthDelimitedCodec>,
    frame: &T,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = serde_json::to_vec(frame)?;
    sink.send(Bytes::from(bytes)).await?;
    Ok(())
}

pub async fn recv_frame<R, T>(
    stream: &mut FramedRead<R, LengthDelimitedCodec>,
) -> Result<T, ProtocolError>
where
    R: AsyncRead + Unpin,
    T: for<'de> Deserialize<'de>,
{
    match stream.next().await {
        Some(Ok(bytes)) => Ok(serde_json::from_slice(&bytes)?),
        Some(Err(e)) => Err(e.into()),
        None => Err(ProtocolError::Closed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_not_terminal_but_everything_else_is() {
        let id = Uuid::new_v4();
        assert!(!ResponseFrame::Progress { request_id: id, message: "".into(), percent: None }.is_terminal());
        assert!(ResponseFrame::Overload { request_id: id }.is_terminal());
        assert!(ResponseFrame::Cancelled { request_id: id }.is_terminal());
    }

    #[tokio::test]
    async fn round_trips_a_request_over_an_in_memory_duplex() {
        let (client, server) = tokio::io::duplex(4096);
        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);

        let mut client_sink = framed_write(client_write);
        let mut server_stream = framed_read(server_read);

        let request = AnalysisRequest {
            request_id: Uuid::new_v4(),
            kind: AnalyzerKind::Static,
            task_id: Uuid::new_v4(),
            app_identifier: "m/1".into(),
            source_path: "/subjects/m/app1".into(),
            tool_selection: ToolSelection::new(["bandit".to_string()]),
            configuration: serde_json::Value::Null,
            timeout_seconds: 1800,
        };

        send_frame(&mut client_sink, &ClientFrame::Request(request.clone())).await.unwrap();
        let received: ClientFrame = recv_frame(&mut server_stream).await.unwrap();
        match received {
            ClientFrame::Request(r) => assert_eq!(r.request_id, request.request_id),
            _ => panic!("expected a request frame"),
        }

        drop(client_read);
        drop(server_write);
    }
}
