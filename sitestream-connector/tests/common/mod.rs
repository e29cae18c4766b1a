#![allow(dead_code)]

use async_trait::async_trait;
use sitestream_connector::{
    error::{DecodeError, TransportFailure},
    events::{DecodedEvent, EventDecoder, Status, StatusDeletionNotice, StreamEvent, SubscriberId, User},
    transport::{CommandResult, LineStream, Request, Response, Transport},
};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{
    sync::{mpsc, watch},
    time::Instant,
};
use tokio_stream::wrappers::UnboundedReceiverStream;

pub type Responder = Box<dyn Fn(&Request) -> CommandResult + Send + Sync>;

/// A scripted outcome for one `open_stream` call.
pub enum Connect {
    Fail(TransportFailure),
    Lines(mpsc::UnboundedReceiver<Result<String, TransportFailure>>),
}

/// An in-memory transport.
///
/// `invoke` answers through a responder closure, optionally after a delay.
/// `open_stream` pops the next scripted [`Connect`]; once the script is
/// exhausted it never completes.
pub struct FakeTransport {
    responder: Responder,
    invoke_delay: Option<Duration>,
    started: Mutex<Vec<String>>,
    script: Mutex<VecDeque<Connect>>,
    connect_times: Mutex<Vec<Instant>>,
    connects_tx: watch::Sender<usize>,
    last_stream_request: Mutex<Option<Request>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::with_responder(|request| Ok(Response::ok(request.operation.clone())))
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&Request) -> CommandResult + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            invoke_delay: None,
            started: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            connect_times: Mutex::new(Vec::new()),
            connects_tx: watch::channel(0).0,
            last_stream_request: Mutex::new(None),
        }
    }

    pub fn with_invoke_delay(mut self, delay: Duration) -> Self {
        self.invoke_delay = Some(delay);
        self
    }

    pub fn script(self, connects: impl IntoIterator<Item = Connect>) -> Self {
        self.script.lock().unwrap().extend(connects);
        self
    }

    /// Operations in the order their `invoke` started.
    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn connect_times(&self) -> Vec<Instant> {
        self.connect_times.lock().unwrap().clone()
    }

    pub fn last_stream_request(&self) -> Option<Request> {
        self.last_stream_request.lock().unwrap().clone()
    }

    /// Waits until `open_stream` has been called at least `count` times.
    pub async fn wait_for_connects(&self, count: usize) {
        let mut rx = self.connects_tx.subscribe();
        rx.wait_for(|n| *n >= count).await.unwrap();
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn invoke(&self, request: &Request) -> CommandResult {
        self.started.lock().unwrap().push(request.operation.clone());
        if let Some(delay) = self.invoke_delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(request)
    }

    async fn open_stream(&self, request: &Request) -> Result<LineStream, TransportFailure> {
        self.connect_times.lock().unwrap().push(Instant::now());
        *self.last_stream_request.lock().unwrap() = Some(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        self.connects_tx.send_modify(|n| *n += 1);
        match next {
            Some(Connect::Fail(failure)) => Err(failure),
            Some(Connect::Lines(rx)) => Ok(Box::pin(UnboundedReceiverStream::new(rx))),
            None => futures::future::pending().await,
        }
    }
}

/// A stream connection driven by the test.
pub fn connection() -> (mpsc::UnboundedSender<Result<String, TransportFailure>>, Connect) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, Connect::Lines(rx))
}

pub fn user(name: &str) -> User {
    User {
        id: name.len() as u64,
        screen_name: name.to_string(),
    }
}

/// Decodes a compact test format: `<for_user|-> <kind> <args>`.
///
/// - `7 status 42 hello world`
/// - `7 follow alice>bob`
/// - `- delete 42`
pub struct LineDecoder;

impl EventDecoder for LineDecoder {
    fn decode(&self, line: &str) -> Result<DecodedEvent, DecodeError> {
        let bad = |reason: &str| DecodeError::new(line, reason);
        let mut parts = line.splitn(3, ' ');
        let who = parts.next().ok_or_else(|| bad("empty line"))?;
        let kind = parts.next().ok_or_else(|| bad("missing event kind"))?;
        let rest = parts.next().unwrap_or("");

        let subscriber = match who {
            "-" => None,
            id => Some(SubscriberId(id.parse().map_err(|_| bad("bad for_user"))?)),
        };

        let event = match kind {
            "status" => {
                let (id, text) = rest.split_once(' ').unwrap_or((rest, ""));
                StreamEvent::Status(Status {
                    id: id.parse().map_err(|_| bad("bad status id"))?,
                    text: text.to_string(),
                    user: user("author"),
                })
            }
            "follow" => {
                let (source, target) = rest.split_once('>').ok_or_else(|| bad("bad follow"))?;
                StreamEvent::Follow {
                    source: user(source),
                    target: user(target),
                }
            }
            "delete" => StreamEvent::StatusDeletion(StatusDeletionNotice {
                status_id: rest.parse().map_err(|_| bad("bad status id"))?,
                user_id: 0,
            }),
            other => return Err(bad(&format!("unknown event kind '{other}'"))),
        };

        Ok(DecodedEvent { subscriber, event })
    }
}

pub fn status_id(event: &StreamEvent) -> Option<u64> {
    match event {
        StreamEvent::Status(status) => Some(status.id),
        _ => None,
    }
}

pub fn shared<T>(value: T) -> Arc<Mutex<T>> {
    Arc::new(Mutex::new(value))
}
