//! Stdout as the host's single client context.
//!
//! Every line the host emits (event replies and client messages) goes
//! through one channel so lines never interleave.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use swgate_core::{Client, ClientMessage, ClientRegistry, Error};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Cloneable handle for emitting JSON lines.
#[derive(Clone, Debug)]
pub struct Output {
    tx: mpsc::UnboundedSender<String>,
}

impl Output {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Serialize `value` as one line. Fails only if the writer is gone.
    pub fn send<T: Serialize>(&self, value: &T) -> Result<(), Error> {
        let line = serde_json::to_string(value).map_err(|e| Error::InvalidRequest(e.to_string()))?;
        self.tx
            .send(line)
            .map_err(|_| Error::InvalidState("output closed".to_string()))
    }
}

/// Drain lines into `sink` until every [`Output`] is dropped.
pub fn spawn_writer<W>(mut rx: mpsc::UnboundedReceiver<String>, mut sink: W) -> JoinHandle<std::io::Result<()>>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            sink.write_all(line.as_bytes()).await?;
            sink.write_all(b"\n").await?;
            sink.flush().await?;
        }
        Ok(())
    })
}

pub fn stdout_writer() -> (Output, JoinHandle<std::io::Result<()>>) {
    let (output, rx) = Output::channel();
    (output, spawn_writer(rx, tokio::io::stdout()))
}

/// The stdout stream seen as a client context.
#[derive(Debug)]
pub struct StdoutClient {
    output: Output,
}

#[async_trait]
impl Client for StdoutClient {
    fn id(&self) -> &str {
        "stdout"
    }

    async fn post_message(&self, message: &ClientMessage) -> Result<(), Error> {
        self.output.send(message)
    }
}

/// Registry holding the single stdout client.
#[derive(Debug)]
pub struct StdioClients {
    client: Arc<StdoutClient>,
    controlled: AtomicBool,
}

impl StdioClients {
    pub fn new(output: Output) -> Self {
        Self { client: Arc::new(StdoutClient { output }), controlled: AtomicBool::new(false) }
    }
}

#[async_trait]
impl ClientRegistry for StdioClients {
    async fn claim(&self) -> Result<usize, Error> {
        self.controlled.store(true, Ordering::Release);
        Ok(1)
    }

    async fn match_all(&self) -> Vec<Arc<dyn Client>> {
        if self.controlled.load(Ordering::Acquire) {
            vec![Arc::clone(&self.client) as Arc<dyn Client>]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unclaimed_client_not_matched() {
        let (output, _rx) = Output::channel();
        let clients = StdioClients::new(output);
        assert!(clients.match_all().await.is_empty());
        assert_eq!(clients.claim().await.unwrap(), 1);
        assert_eq!(clients.match_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_post_message_writes_json_line() {
        let (output, mut rx) = Output::channel();
        let clients = StdioClients::new(output);
        clients.claim().await.unwrap();
        for client in clients.match_all().await {
            client.post_message(&ClientMessage::CacheUpdated).await.unwrap();
        }
        assert_eq!(rx.recv().await.unwrap(), r#"{"type":"CACHE_UPDATED"}"#);
    }

    #[tokio::test]
    async fn test_writer_terminates_lines() {
        let (output, rx) = Output::channel();
        let (sink, mut read_half) = tokio::io::duplex(1024);
        let writer = spawn_writer(rx, sink);

        output.send(&serde_json::json!({"event": "install"})).unwrap();
        drop(output);
        writer.await.unwrap().unwrap();

        let mut text = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut read_half, &mut text).await.unwrap();
        assert_eq!(text, "{\"event\":\"install\"}\n");
    }
}
