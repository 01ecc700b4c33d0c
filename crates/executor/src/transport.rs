//! Production `ReplicaTransport`: opens a TCP connection to a replica
//! endpoint, speaks the length-prefixed JSON frame protocol, and returns
//! the first terminal frame, discarding any advisory `Progress` frames
//! along the way.

use async_trait::async_trait;
use tokio::net::TcpStream;

use analyzer_pool::pool::{ReplicaTransport, TransportError};
use analyzer_pool::protocol::{framed_read, framed_write, recv_frame, send_frame, AnalysisRequest, ClientFrame, ProtocolError, ResponseFrame};

/// Endpoint URLs are plain `host:port` pairs; the pool never parses them,
/// it only ever hands them to this transport.
pub struct TcpReplicaTransport;

impl From<ProtocolError> for TransportError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Closed => TransportError::Disconnected,
            ProtocolError::Io(_) => TransportError::ConnectionRefused,
            ProtocolError::Decode(e) => TransportError::Other(e.to_string()),
        }
    }
}

#[async_trait]
impl ReplicaTransport for TcpReplicaTransport {
    async fn send(&self, endpoint_url: &str, request: AnalysisRequest) -> Result<ResponseFrame, TransportError> {
        let stream = TcpStream::connect(endpoint_url)
            .await
            .map_err(|_| TransportError::ConnectionRefused)?;
        let (read_half, write_half) = stream.into_split();
        let mut sink = framed_write(write_half);
        let mut source = framed_read(read_half);

        send_frame(&mut sink, &ClientFrame::Request(request)).await?;

        loop {
            let frame: ResponseFrame = recv_frame(&mut source).await?;
            if frame.is_terminal() {
                return Ok(frame);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connection_refused_maps_to_the_transient_transport_error() {
        let transport = TcpReplicaTransport;
        let request = AnalysisRequest {
            request_id: uuid::Uuid::new_v4(),
            kind: contracts::replica::AnalyzerKind::Static,
            task_id: uuid::Uuid::new_v4(),
            app_identifier: "m/1".into(),
            source_path: "/subjects/m/app1".into(),
            tool_selection: contracts::task::ToolSelection::new([]),
            configuration: serde_json::Value::Null,
            timeout_seconds: 5,
        };

        // Port 1 is reserved and nothing should ever be listening there.
        let result = transport.send("127.0.0.1:1", request).await;
        assert!(matches!(result, Err(TransportError::ConnectionRefused)));
    }
}
