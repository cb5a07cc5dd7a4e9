// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound transport abstraction: how a batch or an artifact chunk
//! actually reaches the control plane. Production uses [`ReqwestTransport`];
//! tests use [`fake::FakeTransport`] to assert on what was sent without a
//! network.

use crate::error::EgressError;
use async_trait::async_trait;
use std::time::Duration;

/// A chunk of bytes destined for an upload endpoint, streamed rather than
/// buffered whole by the caller.
pub type ByteStream = std::pin::Pin<Box<dyn futures::Stream<Item = std::io::Result<bytes::Bytes>> + Send>>;

#[async_trait]
pub trait EgressTransport: Send + Sync + 'static {
    /// POST a JSON body to `url`, returning the response status and body
    /// text. Never retries internally — retry policy lives in
    /// [`crate::retry`].
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        deadline: Duration,
    ) -> Result<(u16, String), EgressError>;

    /// Stream `body` to `url` with a known content length, for artifact
    /// upload chunks. Must not buffer the whole stream in memory.
    async fn put_stream(
        &self,
        url: &str,
        body: ByteStream,
        content_length: u64,
        deadline: Duration,
    ) -> Result<(u16, String), EgressError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EgressTransport for ReqwestTransport {
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        deadline: Duration,
    ) -> Result<(u16, String), EgressError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .timeout(deadline)
            .send()
            .await
            .map_err(|e| EgressError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| EgressError::Transport(e.to_string()))?;
        Ok((status, text))
    }

    async fn put_stream(
        &self,
        url: &str,
        body: ByteStream,
        content_length: u64,
        deadline: Duration,
    ) -> Result<(u16, String), EgressError> {
        let stream_body = reqwest::Body::wrap_stream(body);
        let response = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_LENGTH, content_length)
            .timeout(deadline)
            .body(stream_body)
            .send()
            .await
            .map_err(|e| EgressError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| EgressError::Transport(e.to_string()))?;
        Ok((status, text))
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    #[derive(Debug, Clone)]
    pub struct RecordedCall {
        pub url: String,
        pub body: Option<serde_json::Value>,
        pub content_length: Option<u64>,
    }

    /// Programmable fake transport: enqueue `(status, body)` responses
    /// with [`FakeTransport::push_response`]; defaults to `200 "{}"` once
    /// the queue is drained.
    #[derive(Default)]
    pub struct FakeTransport {
        responses: Mutex<VecDeque<Result<(u16, String), EgressError>>>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_response(&self, result: Result<(u16, String), EgressError>) {
            self.responses.lock().push_back(result);
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().clone()
        }

        fn next_response(&self) -> Result<(u16, String), EgressError> {
            self.responses
                .lock()
                .pop_front()
                .unwrap_or(Ok((200, "{}".to_string())))
        }
    }

    #[async_trait]
    impl EgressTransport for FakeTransport {
        async fn post_json(
            &self,
            url: &str,
            body: &serde_json::Value,
            _deadline: Duration,
        ) -> Result<(u16, String), EgressError> {
            self.calls.lock().push(RecordedCall {
                url: url.to_string(),
                body: Some(body.clone()),
                content_length: None,
            });
            self.next_response()
        }

        async fn put_stream(
            &self,
            url: &str,
            mut body: ByteStream,
            content_length: u64,
            _deadline: Duration,
        ) -> Result<(u16, String), EgressError> {
            use futures::StreamExt;
            while body.next().await.is_some() {}
            self.calls.lock().push(RecordedCall {
                url: url.to_string(),
                body: None,
                content_length: Some(content_length),
            });
            self.next_response()
        }
    }
}
