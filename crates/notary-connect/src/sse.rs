//! Server-sent events: line decoding and the reconnecting event stream

use crate::error::{ClientError, Result};
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

/// Stream of event `data` payloads
pub type EventStream = BoxStream<'static, Result<String>>;

/// Incremental `text/event-stream` decoder
///
/// Bytes may arrive split anywhere, including inside a line or a UTF-8
/// sequence; incomplete lines stay buffered until the next chunk. `data`
/// lines accumulate until a blank line dispatches them as one payload
/// joined with `\n`.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every payload it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            self.handle_line(&String::from_utf8_lossy(&line), &mut events);
        }
        events
    }

    /// Flush whatever is left when the connection ends
    pub fn finish(&mut self) -> Vec<String> {
        let mut events = Vec::new();
        if !self.buf.is_empty() {
            let rest = std::mem::take(&mut self.buf);
            self.handle_line(&String::from_utf8_lossy(&rest), &mut events);
        }
        if !self.data.is_empty() {
            events.push(self.data.drain(..).collect::<Vec<_>>().join("\n"));
        }
        events
    }

    fn handle_line(&mut self, line: &str, events: &mut Vec<String>) {
        if line.is_empty() {
            if !self.data.is_empty() {
                events.push(self.data.drain(..).collect::<Vec<_>>().join("\n"));
            }
            return;
        }
        if line.starts_with(':') {
            return;
        }
        if let Some(value) = line.strip_prefix("data:") {
            self.data
                .push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
        // event:, id: and retry: fields are not surfaced
    }
}

struct StreamState {
    http: reqwest::Client,
    url: String,
    token: String,
    params: Vec<(String, String)>,
    body: Option<BoxStream<'static, reqwest::Result<Bytes>>>,
    decoder: SseDecoder,
    ready: VecDeque<String>,
    reconnects_left: u32,
    reconnect_delay: Duration,
    connected: bool,
    finished: bool,
}

async fn connect(
    http: &reqwest::Client,
    url: &str,
    token: &str,
    params: &[(String, String)],
) -> Result<BoxStream<'static, reqwest::Result<Bytes>>> {
    let response = http
        .get(url)
        .query(params)
        .header(AUTHORIZATION, format!("Bearer {}", token))
        .header(ACCEPT, "text/event-stream")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ClientError::ServerRejected {
            status: status.as_u16(),
            message,
        });
    }

    debug!(url = %url, "Event stream connected");
    Ok(response.bytes_stream().boxed())
}

impl StreamState {
    /// Spend one reconnect, sleeping first; false when none are left
    async fn take_reconnect(&mut self) -> bool {
        if self.reconnects_left == 0 {
            return false;
        }
        self.reconnects_left -= 1;
        tokio::time::sleep(self.reconnect_delay).await;
        true
    }
}

async fn next_event(mut st: StreamState) -> Option<(Result<String>, StreamState)> {
    loop {
        if let Some(event) = st.ready.pop_front() {
            return Some((Ok(event), st));
        }
        if st.finished {
            return None;
        }

        let Some(body) = st.body.as_mut() else {
            let connected = connect(&st.http, &st.url, &st.token, &st.params).await;
            match connected {
                Ok(body) => {
                    st.body = Some(body);
                    st.connected = true;
                }
                Err(e) => {
                    let retry = st.connected && e.is_transient() && st.take_reconnect().await;
                    if retry {
                        warn!(error = %e, "Event stream reconnect failed, retrying");
                    } else {
                        st.finished = true;
                        return Some((Err(e), st));
                    }
                }
            }
            continue;
        };

        let next = body.next().await;
        match next {
            Some(Ok(chunk)) => {
                let events = st.decoder.feed(&chunk);
                st.ready.extend(events);
            }
            Some(Err(e)) => {
                warn!(error = %e, "Event stream dropped");
                st.body = None;
                st.decoder = SseDecoder::new();
                if !st.take_reconnect().await {
                    st.finished = true;
                    return Some((Err(ClientError::StreamClosed(e.to_string())), st));
                }
            }
            None => {
                debug!("Event stream closed by server");
                let events = st.decoder.finish();
                st.ready.extend(events);
                st.body = None;
                if !st.take_reconnect().await {
                    st.finished = true;
                }
            }
        }
    }
}

/// Build a lazy event stream; nothing is sent until it is first polled
pub(crate) fn event_stream(
    http: reqwest::Client,
    url: String,
    token: String,
    params: Vec<(String, String)>,
    max_reconnects: u32,
    reconnect_delay: Duration,
) -> EventStream {
    let state = StreamState {
        http,
        url,
        token,
        params,
        body: None,
        decoder: SseDecoder::new(),
        ready: VecDeque::new(),
        reconnects_left: max_reconnects,
        reconnect_delay,
        connected: false,
        finished: false,
    };
    stream::unfold(state, next_event).boxed()
}
