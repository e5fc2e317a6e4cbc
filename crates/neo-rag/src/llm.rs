//! Seam to the language model that turns a rendered prompt into answer text.
//!
//! The model itself lives outside this crate; callers plug in any backend
//! by implementing [`Generator`].

use std::pin::Pin;
use std::task::{Context, Poll};

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;

#[async_trait]
pub trait Generator: Send + Sync {
    /// Complete `prompt` in one shot.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Token-by-token completion. The default yields the whole answer as a
    /// single token.
    async fn generate_stream(&self, prompt: &str) -> Result<TokenStream> {
        let text = self.generate(prompt).await?;
        let (tx, rx) = mpsc::channel(1);
        // capacity 1 and a fresh receiver, so this cannot fail
        let _ = tx.send(text).await;
        Ok(TokenStream::new(rx))
    }

    fn model_name(&self) -> &str;
}

/// Tokens as they arrive from a streaming generator.
pub struct TokenStream {
    receiver: mpsc::Receiver<String>,
}

impl TokenStream {
    pub fn new(receiver: mpsc::Receiver<String>) -> Self {
        Self { receiver }
    }

    /// Stream over a fixed token list; handy for backends that buffer.
    pub fn from_tokens(tokens: Vec<String>) -> Self {
        let (tx, rx) = mpsc::channel(tokens.len().max(1));
        for token in tokens {
            if tx.try_send(token).is_err() {
                break;
            }
        }
        Self::new(rx)
    }

    pub async fn next(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Drain the stream into one string.
    pub async fn collect(mut self) -> String {
        let mut result = String::new();
        while let Some(token) = self.next().await {
            result.push_str(&token);
        }
        result
    }
}

impl Stream for TokenStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
