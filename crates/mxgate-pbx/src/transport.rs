//! Framed XML transport to the PBX
//!
//! One TCP connection carries both directions of the CSTA dialogue. Every
//! frame is an 8-byte header (two reserved zero bytes, the total frame
//! length as big-endian u16, a 4-digit ASCII message id) followed by the
//! XML payload. Replies carry the id of the request they answer; the PBX
//! sends unsolicited events with id 9999.
//!
//! A single reader task demultiplexes inbound frames: frames whose id
//! matches an in-flight request complete that request, everything else is
//! handed to the installed event handler by root element name. Senders are
//! safe to call concurrently.

use mxgate_core::{GatewayError, GatewayResult};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch, Notify};
use tracing::{debug, error, warn};

const HEADER_LEN: usize = 8;
const MAX_FRAME_LEN: usize = 1 << 20;

/// Highest id used for requests; events arrive as 9999.
const MAX_REQUEST_ID: u16 = 9998;

/// Default timeout for a correlated PBX reply.
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

type EventHandler = Box<dyn Fn(&str, &str) -> GatewayResult<()> + Send + Sync>;

struct Dispatcher {
    names: HashSet<String>,
    handler: EventHandler,
}

struct Inner {
    peer: String,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: Mutex<HashMap<u16, oneshot::Sender<String>>>,
    dispatcher: RwLock<Option<Dispatcher>>,
    next_id: AtomicU16,
    read_timeout: Duration,
    terminated: AtomicBool,
    terminal: Mutex<Option<String>>,
    done_tx: watch::Sender<bool>,
    closing: Notify,
}

/// Duplex framing layer over one TCP connection to the PBX.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

impl Transport {
    /// Connect to the PBX with the default reply timeout.
    pub async fn connect(host: &str) -> GatewayResult<Self> {
        Self::connect_with(host, READ_TIMEOUT).await
    }

    /// Connect with an explicit reply timeout.
    pub async fn connect_with(host: &str, read_timeout: Duration) -> GatewayResult<Self> {
        let stream = TcpStream::connect(host)
            .await
            .map_err(|e| GatewayError::PbxUnavailable(format!("connect {}: {}", host, e)))?;
        let (read_half, write_half) = stream.into_split();

        let (done_tx, _) = watch::channel(false);
        let inner = Arc::new(Inner {
            peer: host.to_string(),
            writer: tokio::sync::Mutex::new(write_half),
            pending: Mutex::new(HashMap::new()),
            dispatcher: RwLock::new(None),
            next_id: AtomicU16::new(0),
            read_timeout,
            terminated: AtomicBool::new(false),
            terminal: Mutex::new(None),
            done_tx,
            closing: Notify::new(),
        });

        tokio::spawn(read_loop(Arc::clone(&inner), read_half));

        Ok(Self { inner })
    }

    /// Serialize-free send: write one framed XML command, no reply expected.
    pub async fn send(&self, xml: &str) -> GatewayResult<()> {
        let id = self.next_id();
        self.write_frame(id, xml).await
    }

    /// Send a command and wait for the correlated reply.
    ///
    /// Fails with `PbxTimeout` when no reply arrives within the read
    /// timeout and with `PbxUnavailable` when the transport terminates
    /// while the request is in flight.
    pub async fn send_await(&self, xml: &str) -> GatewayResult<String> {
        if self.inner.terminated.load(Ordering::Acquire) {
            return Err(self.terminal_error());
        }

        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.inner
            .pending
            .lock()
            .expect("pending lock")
            .insert(id, tx);

        if let Err(e) = self.write_frame(id, xml).await {
            self.inner.pending.lock().expect("pending lock").remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.inner.read_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(self.terminal_error()),
            Err(_) => {
                self.inner.pending.lock().expect("pending lock").remove(&id);
                Err(GatewayError::PbxTimeout(format!(
                    "no reply from {} within {:?}",
                    self.inner.peer, self.inner.read_timeout
                )))
            }
        }
    }

    /// Install the event dispatcher.
    ///
    /// The handler runs on the reader task for every inbound frame whose
    /// root element name is in `names`; returning an error terminates the
    /// transport.
    pub fn handle(
        &self,
        names: &[&str],
        handler: impl Fn(&str, &str) -> GatewayResult<()> + Send + Sync + 'static,
    ) {
        let dispatcher = Dispatcher {
            names: names.iter().map(|n| n.to_string()).collect(),
            handler: Box::new(handler),
        };
        *self.inner.dispatcher.write().expect("dispatcher lock") = Some(dispatcher);
    }

    /// Subscribe to transport termination.
    ///
    /// The watched value flips to `true` when the transport dies for any
    /// reason. Check `borrow_and_update()` before awaiting `changed()`:
    /// termination may predate the subscription.
    pub fn done(&self) -> watch::Receiver<bool> {
        self.inner.done_tx.subscribe()
    }

    /// True once the transport has terminated.
    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::Acquire)
    }

    /// Terminate the transport locally: fail in-flight requests, stop the
    /// reader and shut the socket down. Idempotent.
    pub async fn close(&self) {
        self.inner.terminate(None);
        self.inner.closing.notify_waiters();
        let mut writer = self.inner.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    fn next_id(&self) -> u16 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed) % MAX_REQUEST_ID + 1
    }

    fn terminal_error(&self) -> GatewayError {
        let detail = self
            .inner
            .terminal
            .lock()
            .expect("terminal lock")
            .clone()
            .unwrap_or_else(|| "connection closed".to_string());
        GatewayError::PbxUnavailable(format!("{}: {}", self.inner.peer, detail))
    }

    async fn write_frame(&self, id: u16, xml: &str) -> GatewayResult<()> {
        if self.inner.terminated.load(Ordering::Acquire) {
            return Err(self.terminal_error());
        }
        let frame = encode_frame(id, xml)?;
        let mut writer = self.inner.writer.lock().await;
        writer.write_all(&frame).await.map_err(|e| {
            let msg = format!("write: {}", e);
            self.inner.terminate(Some(msg.clone()));
            GatewayError::PbxUnavailable(format!("{}: {}", self.inner.peer, msg))
        })?;
        writer.flush().await.map_err(|e| {
            let msg = format!("flush: {}", e);
            self.inner.terminate(Some(msg.clone()));
            GatewayError::PbxUnavailable(format!("{}: {}", self.inner.peer, msg))
        })
    }
}

impl Inner {
    /// Mark the transport dead: record the terminal error, drop every
    /// pending request (their receivers fail) and signal `done`.
    fn terminate(&self, error: Option<String>) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.terminal.lock().expect("terminal lock") = error;
        self.pending.lock().expect("pending lock").clear();
        let _ = self.done_tx.send(true);
    }
}

async fn read_loop(inner: Arc<Inner>, mut reader: OwnedReadHalf) {
    let error = loop {
        if inner.terminated.load(Ordering::Acquire) {
            break None;
        }
        let frame = tokio::select! {
            frame = read_frame(&mut reader) => frame,
            _ = inner.closing.notified() => break None,
        };

        let (id, xml) = match frame {
            Ok(frame) => frame,
            Err(ReadError::Closed) => break None,
            Err(ReadError::Io(e)) => break Some(format!("read: {}", e)),
            Err(ReadError::Framing(e)) => break Some(format!("bad frame: {}", e)),
        };

        let pending = inner.pending.lock().expect("pending lock").remove(&id);
        if let Some(tx) = pending {
            // Correlated reply; receiver may have timed out meanwhile.
            let _ = tx.send(xml);
            continue;
        }

        let Some(name) = root_name(&xml) else {
            warn!(peer = %inner.peer, "inbound frame without root element");
            continue;
        };

        let dispatcher = inner.dispatcher.read().expect("dispatcher lock");
        match dispatcher.as_ref() {
            Some(d) if d.names.contains(&name) => {
                if let Err(e) = (d.handler)(&name, &xml) {
                    drop(dispatcher);
                    break Some(format!("event handler: {}", e));
                }
            }
            _ => debug!(peer = %inner.peer, event = %name, "dropping unhandled frame"),
        }
    };

    if let Some(msg) = &error {
        error!(peer = %inner.peer, error = %msg, "pbx transport terminated");
    }
    inner.terminate(error);
}

enum ReadError {
    Closed,
    Io(std::io::Error),
    Framing(String),
}

impl From<std::io::Error> for ReadError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ReadError::Closed
        } else {
            ReadError::Io(e)
        }
    }
}

async fn read_frame(reader: &mut OwnedReadHalf) -> Result<(u16, String), ReadError> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await?;

    let total = u16::from_be_bytes([header[2], header[3]]) as usize;
    if total < HEADER_LEN || total > MAX_FRAME_LEN {
        return Err(ReadError::Framing(format!("length {}", total)));
    }
    let id = std::str::from_utf8(&header[4..8])
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| ReadError::Framing("non-numeric message id".to_string()))?;

    let mut payload = vec![0u8; total - HEADER_LEN];
    reader.read_exact(&mut payload).await?;
    let xml = String::from_utf8(payload)
        .map_err(|e| ReadError::Framing(format!("payload not utf-8: {}", e)))?;

    Ok((id, xml))
}

/// Encode one frame: header + XML payload.
pub fn encode_frame(id: u16, xml: &str) -> GatewayResult<Vec<u8>> {
    let total = xml.len() + HEADER_LEN;
    if total > MAX_FRAME_LEN || total > u16::MAX as usize {
        return Err(GatewayError::Internal(format!(
            "command too large: {} bytes",
            xml.len()
        )));
    }
    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(&[0, 0]);
    frame.extend_from_slice(&(total as u16).to_be_bytes());
    frame.extend_from_slice(format!("{:04}", id).as_bytes());
    frame.extend_from_slice(xml.as_bytes());
    Ok(frame)
}

/// Name of the root element of an XML document, if any.
pub fn root_name(xml: &str) -> Option<String> {
    let mut reader = quick_xml::Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(quick_xml::events::Event::Start(e))
            | Ok(quick_xml::events::Event::Empty(e)) => {
                return std::str::from_utf8(e.name().as_ref())
                    .ok()
                    .map(str::to_string);
            }
            Ok(quick_xml::events::Event::Eof) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}
