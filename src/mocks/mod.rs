//! Mock transport for testing the pipeline without a network.

use crate::errors::TransportError;
use crate::transport::Transport;
use crate::types::{Request, Response};
use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

type ScriptedResult = Result<(StatusCode, Bytes), TransportError>;

/// Transport that replays a scripted sequence of results in order.
///
/// Once the script is exhausted the last scripted result repeats. Each call
/// is counted so tests can assert how many transport attempts were made.
pub struct MockTransport {
    script: Mutex<VecDeque<ScriptedResult>>,
    last: Mutex<Option<ScriptedResult>>,
    delay: Option<Duration>,
    calls: AtomicU32,
}

impl MockTransport {
    /// Create a mock with an empty script.
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            delay: None,
            calls: AtomicU32::new(0),
        }
    }

    /// Make every scripted call take `delay` before settling.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Script a response with the given status and body.
    pub fn respond(self, status: u16, body: &str) -> Self {
        self.script.lock().push_back(Ok((
            StatusCode::from_u16(status).expect("valid status"),
            Bytes::from(body.to_string()),
        )));
        self
    }

    /// Script a transport-level failure.
    pub fn fail(self, error: TransportError) -> Self {
        self.script.lock().push_back(Err(error));
        self
    }

    /// Number of transport calls made so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, _request: &Request) -> Result<Response, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = {
            let mut script = self.script.lock();
            match script.pop_front() {
                Some(result) => {
                    *self.last.lock() = Some(result.clone());
                    result
                }
                None => self
                    .last
                    .lock()
                    .clone()
                    .unwrap_or(Err(TransportError::Io("script exhausted".to_string()))),
            }
        };
        match scripted {
            Ok((status, body)) => Ok(Response {
                status,
                headers: http::HeaderMap::new(),
                body,
                elapsed: self.delay.unwrap_or(Duration::from_millis(1)),
                from_cache: false,
                attempt_count: 0,
            }),
            Err(error) => Err(error),
        }
    }
}
