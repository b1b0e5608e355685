//! TCP + bincode request server for the controller
//!
//! One task per accepted connection. A connection carries any number of
//! request/response exchanges until it asks for `StreamLogs`, after which it
//! belongs to that stream until the server exits or the peer hangs up.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::agent::Agent;
use crate::error::{AgentError, AgentResult};
use shared::wire::{read_frame, write_frame};
use shared::{node_debug, node_info, node_warn, AgentRequest, AgentResponse, NodeId};

pub struct RpcServer {
    agent: Arc<Agent>,
    listener: TcpListener,
    shutdown: CancellationToken,
}

impl RpcServer {
    /// Bind the listening socket
    pub async fn bind(agent: Arc<Agent>, address: &str, shutdown: CancellationToken) -> AgentResult<Self> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| AgentError::network(format!("Failed to bind to {address}: {e}")))?;

        Ok(Self {
            agent,
            listener,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> AgentResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the shutdown token fires
    pub async fn serve(self) -> AgentResult<()> {
        node_info!(NodeId::current(), "📡 Listening for controller on {}", self.local_addr()?);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let _ = stream.set_nodelay(true);
                        tokio::spawn(serve_connection(
                            Arc::clone(&self.agent),
                            stream,
                            peer,
                            self.shutdown.clone(),
                        ));
                    }
                    Err(e) => node_warn!(NodeId::current(), "Accept failed: {}", e),
                }
            }
        }

        node_info!(NodeId::current(), "RPC server stopped");
        Ok(())
    }
}

async fn serve_connection(agent: Arc<Agent>, stream: TcpStream, peer: SocketAddr, shutdown: CancellationToken) {
    node_debug!(NodeId::current(), "Controller connected from {}", peer);
    let (mut reader, mut writer) = stream.into_split();

    loop {
        let request = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = read_frame::<_, AgentRequest>(&mut reader) => frame,
        };

        let request = match request {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(e) => {
                if !e.is_disconnect() {
                    node_warn!(NodeId::current(), "Bad frame from {}: {}", peer, e);
                    let _ = write_frame(&mut writer, &AgentResponse::error(e.to_string())).await;
                }
                break;
            }
        };

        if let AgentRequest::StreamLogs { server_id } = request {
            stream_logs(&agent, &server_id, &mut reader, &mut writer, &shutdown).await;
            break;
        }

        let response = agent.handle(request).await;
        if let Err(e) = write_frame(&mut writer, &response).await {
            node_debug!(NodeId::current(), "Reply to {} failed: {}", peer, e);
            break;
        }
    }

    node_debug!(NodeId::current(), "Controller {} disconnected", peer);
}

/// Push log entries until the server exits, the peer hangs up or we shut down
async fn stream_logs<R, W>(
    agent: &Agent,
    server_id: &str,
    reader: &mut R,
    writer: &mut W,
    shutdown: &CancellationToken,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut follower = match agent.follow_logs(server_id).await {
        Ok(follower) => follower,
        Err(e) => {
            let _ = write_frame(writer, &AgentResponse::error(e.to_string())).await;
            return;
        }
    };

    if write_frame(writer, &AgentResponse::StreamStarted).await.is_err() {
        return;
    }
    node_debug!(NodeId::current(), "Streaming logs of {}", server_id);
    let mut peer_byte = [0u8; 1];

    loop {
        let batch = tokio::select! {
            _ = shutdown.cancelled() => None,
            // Any read result means the peer is done with this stream
            _ = reader.read(&mut peer_byte) => return,
            batch = follower.next_batch() => batch,
        };

        let Some(batch) = batch else {
            break;
        };
        for entry in batch {
            if write_frame(writer, &AgentResponse::LogEntry(entry)).await.is_err() {
                return;
            }
        }
    }

    let _ = write_frame(writer, &AgentResponse::EndOfStream).await;
}
