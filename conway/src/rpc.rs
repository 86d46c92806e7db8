//! Request/response envelopes and the async client used by the controller.
//!
//! Envelopes travel as one JSON object per line. Every request carries an id
//! chosen by the client; the worker answers with the same id, possibly out of
//! order, so a long `ComputeTurns` can be in flight while other calls on the
//! same connection complete.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, ErrorKind, Result};

/// Named remote operations exposed by the worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    LoadInitialState,
    ComputeTurns,
    Pause,
    Resume,
    Stop,
    GetSnapshot,
    GetCellCount,
    GetTurn,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: Method,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub outcome: Outcome,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Ok { message: String },
    Err { kind: ErrorKind, message: String },
}

impl Response {
    pub fn from_result(id: u64, result: Result<String>) -> Self {
        let outcome = match result {
            Ok(message) => Outcome::Ok { message },
            Err(err) => Outcome::Err {
                kind: err.kind(),
                message: err.wire_message(),
            },
        };
        Self { id, outcome }
    }

    pub fn into_result(self) -> Result<String> {
        match self.outcome {
            Outcome::Ok { message } => Ok(message),
            Outcome::Err { kind, message } => Err(Error::from_wire(kind, message)),
        }
    }
}

/// Writes one envelope followed by a newline.
pub async fn write_frame<W, T>(writer: &mut W, frame: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(frame)
        .map_err(|err| Error::protocol(format!("unable to encode envelope: {err}")))?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

pub fn parse_frame<T: for<'de> Deserialize<'de>>(line: &str) -> Result<T> {
    serde_json::from_str(line).map_err(|err| Error::protocol(format!("malformed envelope: {err}")))
}

type Reply = oneshot::Sender<Result<String>>;

/// Outstanding calls keyed by request id. `None` once the connection is gone.
type Pending = Arc<Mutex<Option<HashMap<u64, Reply>>>>;

/// Client half of a worker connection.
pub struct Client {
    next_id: AtomicU64,
    outgoing: mpsc::UnboundedSender<Request>,
    pending: Pending,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Client {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }

    /// Wraps an already-established stream. Must be called inside a tokio runtime.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let pending: Pending = Arc::new(Mutex::new(Some(HashMap::new())));
        let (outgoing, requests) = mpsc::unbounded_channel();

        let writer = tokio::spawn(write_requests(write_half, requests, pending.clone()));
        let reader = tokio::spawn(read_responses(read_half, pending.clone()));

        Self {
            next_id: AtomicU64::new(1),
            outgoing,
            pending,
            reader,
            writer,
        }
    }

    /// Sends a request without waiting for its response.
    pub fn go(&self, method: Method, message: impl Into<String>) -> PendingCall {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            match pending.as_mut() {
                Some(map) => {
                    map.insert(id, reply);
                }
                None => {
                    let _ = reply.send(Err(Error::connection_closed()));
                    return PendingCall { rx };
                }
            }
        }

        let request = Request {
            id,
            method,
            message: message.into(),
        };
        debug!(id, ?method, "sending request");
        if self.outgoing.send(request).is_err() {
            fail(&self.pending, id);
        }
        PendingCall { rx }
    }

    /// Sends a request and waits for its response.
    pub async fn call(&self, method: Method, message: impl Into<String>) -> Result<String> {
        self.go(method, message).await
    }

    /// Flushes queued requests and tears the connection down. Calls still in
    /// flight resolve with a transport error.
    pub async fn close(self) {
        let Client {
            outgoing,
            pending,
            reader,
            writer,
            ..
        } = self;
        drop(outgoing);
        let _ = writer.await;
        reader.abort();
        let _ = reader.await;
        fail_all(&pending);
    }
}

/// Completion handle for a request sent with [`Client::go`].
pub struct PendingCall {
    rx: oneshot::Receiver<Result<String>>,
}

impl Future for PendingCall {
    type Output = Result<String>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|reply| reply.unwrap_or_else(|_| Err(Error::connection_closed())))
    }
}

async fn write_requests<W>(
    mut writer: W,
    mut requests: mpsc::UnboundedReceiver<Request>,
    pending: Pending,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(request) = requests.recv().await {
        if let Err(err) = write_frame(&mut writer, &request).await {
            warn!(id = request.id, "failed to send request: {err}");
            fail(&pending, request.id);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_responses<R>(reader: R, pending: Pending)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let response: Response = match parse_frame(&line) {
                    Ok(response) => response,
                    Err(err) => {
                        warn!("dropping response: {err}");
                        continue;
                    }
                };
                let reply = pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .as_mut()
                    .and_then(|map| map.remove(&response.id));
                match reply {
                    Some(reply) => {
                        let _ = reply.send(response.into_result());
                    }
                    None => warn!(id = response.id, "response for unknown request"),
                }
            }
            Ok(None) => {
                debug!("worker closed the connection");
                break;
            }
            Err(err) => {
                warn!("connection error: {err}");
                break;
            }
        }
    }
    fail_all(&pending);
}

fn fail(pending: &Pending, id: u64) {
    let reply = pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .as_mut()
        .and_then(|map| map.remove(&id));
    if let Some(reply) = reply {
        let _ = reply.send(Err(Error::connection_closed()));
    }
}

fn fail_all(pending: &Pending) {
    let drained = pending.lock().unwrap_or_else(PoisonError::into_inner).take();
    for (_, reply) in drained.into_iter().flatten() {
        let _ = reply.send(Err(Error::connection_closed()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StateConflict;

    #[test]
    fn test_envelope_json_shape() {
        let request = Request {
            id: 7,
            method: Method::ComputeTurns,
            message: "100".into(),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"id":7,"method":"ComputeTurns","message":"100"}"#);

        let response = Response::from_result(7, Err(StateConflict::NotPaused.into()));
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(
            json,
            r#"{"id":7,"outcome":{"status":"err","kind":"not_paused","message":"calculations aren't paused"}}"#
        );
    }

    #[test]
    fn test_missing_message_defaults_to_empty() {
        let request: Request = parse_frame(r#"{"id":1,"method":"Pause"}"#).unwrap();
        assert_eq!(request.message, "");
    }

    #[test]
    fn test_unknown_method_is_a_protocol_error() {
        let err = parse_frame::<Request>(r#"{"id":1,"method":"Explode"}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_out_of_order_responses_reach_their_callers() {
        let (client_end, server_end) = tokio::io::duplex(4096);
        let client = Client::new(client_end);

        let (server_read, mut server_write) = tokio::io::split(server_end);
        let server = tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();
            let first: Request = parse_frame(&lines.next_line().await.unwrap().unwrap()).unwrap();
            let second: Request = parse_frame(&lines.next_line().await.unwrap().unwrap()).unwrap();
            // Answer the second request first
            for request in [second, first] {
                let reply = Response::from_result(request.id, Ok(format!("{:?}", request.method)));
                write_frame(&mut server_write, &reply).await.unwrap();
            }
        });

        let slow = client.go(Method::ComputeTurns, "10");
        let fast = client.call(Method::GetTurn, "").await.unwrap();
        assert_eq!(fast, "GetTurn");
        assert_eq!(slow.await.unwrap(), "ComputeTurns");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_pending_calls_fail_when_connection_drops() {
        let (client_end, server_end) = tokio::io::duplex(4096);
        let client = Client::new(client_end);

        let call = client.go(Method::ComputeTurns, "10");
        drop(server_end);

        let err = call.await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);

        // Later calls fail straight away instead of hanging
        let err = client.call(Method::GetTurn, "").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
