//! TCP + bincode agent client
//!
//! Requests share one connection and run one at a time. The connection is
//! taken out of its slot for the duration of an exchange and only put back
//! after a complete response, so an exchange that fails, times out or is
//! cancelled never leaves a half-read stream behind: the next call simply
//! dials again. Log streams get a connection of their own.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};

use crate::error::{ControllerError, ControllerResult};
use crate::traits::{AgentClient, Connector};
use shared::wire::{read_frame, write_frame};
use shared::{node_debug, AgentRequest, AgentResponse, LogEntry, NodeId};

/// Buffered log entries per stream before the reader waits for the consumer
const LOG_CHANNEL_CAPACITY: usize = 1000;

pub struct TcpAgentClient {
    address: String,
    dial_timeout: Duration,
    stream: Mutex<Option<TcpStream>>,
}

impl TcpAgentClient {
    /// Dial `address` and keep the connection for later calls
    pub async fn connect(address: &str, dial_timeout: Duration) -> ControllerResult<Self> {
        let stream = dial(address, dial_timeout).await?;
        Ok(Self {
            address: address.to_string(),
            dial_timeout,
            stream: Mutex::new(Some(stream)),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

async fn dial(address: &str, limit: Duration) -> ControllerResult<TcpStream> {
    let stream = tokio::time::timeout(limit, TcpStream::connect(address))
        .await
        .map_err(|_| ControllerError::timeout(format!("connect to {address}"), limit))?
        .map_err(|e| ControllerError::DialFailed {
            address: address.to_string(),
            reason: e.to_string(),
        })?;
    let _ = stream.set_nodelay(true);
    Ok(stream)
}

async fn exchange(stream: &mut TcpStream, request: &AgentRequest) -> ControllerResult<AgentResponse> {
    write_frame(stream, request).await?;
    read_frame(stream).await?.ok_or_else(|| ControllerError::ConnectionLost {
        message: "agent closed the connection".to_string(),
    })
}

#[async_trait]
impl AgentClient for TcpAgentClient {
    async fn call(&self, request: AgentRequest, timeout: Duration) -> ControllerResult<AgentResponse> {
        let mut slot = self.stream.lock().await;
        let mut stream = match slot.take() {
            Some(stream) => stream,
            None => dial(&self.address, self.dial_timeout).await?,
        };

        match tokio::time::timeout(timeout, exchange(&mut stream, &request)).await {
            Ok(Ok(response)) => {
                *slot = Some(stream);
                Ok(response)
            }
            Ok(Err(e)) => {
                node_debug!(NodeId::current(), "{} to {} failed: {}", request.name(), self.address, e);
                Err(e)
            }
            Err(_) => Err(ControllerError::timeout(request.name(), timeout)),
        }
    }

    async fn stream_logs(&self, server_id: &str) -> ControllerResult<mpsc::Receiver<LogEntry>> {
        let mut stream = dial(&self.address, self.dial_timeout).await?;
        write_frame(
            &mut stream,
            &AgentRequest::StreamLogs {
                server_id: server_id.to_string(),
            },
        )
        .await?;

        let (tx, rx) = mpsc::channel(LOG_CHANNEL_CAPACITY);

        // The agent acknowledges (or refuses) the stream before any log line
        let first = tokio::time::timeout(self.dial_timeout, read_frame::<_, AgentResponse>(&mut stream))
            .await
            .map_err(|_| ControllerError::timeout("stream_logs", self.dial_timeout))??;
        match first {
            Some(AgentResponse::StreamStarted) => {}
            Some(AgentResponse::LogEntry(entry)) => {
                let _ = tx.send(entry).await;
            }
            Some(AgentResponse::EndOfStream) | None => return Ok(rx),
            Some(AgentResponse::Error { message }) => return Err(ControllerError::RemoteError { message }),
            Some(_) => {
                return Err(ControllerError::UnexpectedResponse {
                    operation: "stream_logs".to_string(),
                })
            }
        }

        let server_id = server_id.to_string();
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = tx.closed() => break,
                    frame = read_frame::<_, AgentResponse>(&mut stream) => frame,
                };
                match frame {
                    Ok(Some(AgentResponse::LogEntry(entry))) => {
                        if tx.send(entry).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => break,
                    Err(e) => {
                        node_debug!(NodeId::current(), "Log stream of {} ended: {}", server_id, e);
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn close(&self) {
        self.stream.lock().await.take();
    }
}

/// Opens [`TcpAgentClient`]s
#[derive(Debug, Default, Clone)]
pub struct TcpConnector;

impl TcpConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn dial(&self, address: &str, timeout: Duration) -> ControllerResult<Arc<dyn AgentClient>> {
        let client = TcpAgentClient::connect(address, timeout).await?;
        Ok(Arc::new(client))
    }
}
