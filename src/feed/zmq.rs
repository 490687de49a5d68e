//! ZeroMQ SUB socket transport
//!
//! The `zeromq` crate is async; each socket owns a current-thread tokio
//! runtime and blocks on it from the worker thread. The runtime lives exactly
//! as long as the socket.

use super::socket::{FeedConnector, FeedFrame, FeedSocket};
use crate::config::FeedConfig;
use crate::error::{FeedError, Result};
use std::time::Duration;
use tokio::runtime::Runtime;
use zeromq::{Socket, SocketRecv, SubSocket};

/// Production connector
#[derive(Debug, Default, Clone, Copy)]
pub struct ZmqConnector;

impl ZmqConnector {
    pub fn new() -> Self {
        Self
    }
}

impl FeedConnector for ZmqConnector {
    fn name(&self) -> &str {
        "zmq"
    }

    fn connect(&self, config: &FeedConfig, timeout: Duration) -> Result<Box<dyn FeedSocket>> {
        Ok(Box::new(ZmqFeedSocket::connect(config, timeout)?))
    }
}

/// A connected SUB socket
pub struct ZmqFeedSocket {
    runtime: Runtime,
    socket: SubSocket,
    endpoint: String,
}

impl ZmqFeedSocket {
    pub fn connect(config: &FeedConfig, timeout: Duration) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| FeedError::Transport(format!("failed to start socket runtime: {}", e)))?;

        let endpoint = config.endpoint.clone();
        let subscription = config.subscription().to_string();

        let socket = runtime.block_on(async {
            let mut socket = SubSocket::new();
            tokio::time::timeout(timeout, socket.connect(&endpoint))
                .await
                .map_err(|_| {
                    FeedError::Transport(format!(
                        "connect to {} timed out after {:?}",
                        endpoint, timeout
                    ))
                })??;
            socket.subscribe(&subscription).await?;
            Ok::<_, FeedError>(socket)
        })?;

        tracing::info!(
            endpoint = %endpoint,
            subscriber = %config.subscriber_id,
            topic = %config.topic_filter,
            "Subscribed"
        );

        Ok(Self {
            runtime,
            socket,
            endpoint,
        })
    }
}

impl FeedSocket for ZmqFeedSocket {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<FeedFrame>> {
        let socket = &mut self.socket;
        self.runtime.block_on(async {
            match tokio::time::timeout(timeout, socket.recv()).await {
                Err(_) => Ok(None),
                Ok(Ok(message)) => {
                    let parts = message.into_vec().into_iter().map(|b| b.to_vec()).collect();
                    Ok(Some(FeedFrame::from_parts(parts)))
                }
                Ok(Err(e)) => Err(FeedError::from(e)),
            }
        })
    }
}

impl Drop for ZmqFeedSocket {
    fn drop(&mut self) {
        tracing::debug!(endpoint = %self.endpoint, "Closing subscriber socket");
    }
}
