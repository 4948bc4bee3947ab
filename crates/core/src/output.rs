//! Output multiplexing
//!
//! Every worker writes through an [`Output`], a cloneable handle to a
//! mutex-guarded sink. Whole `write_all`/`write_fmt` calls are performed under
//! the lock, so lines written concurrently by parallel tasks never interleave
//! at the byte level.
//!
//! Middlewares choose what a task's output really is: the live sink, a
//! [`SharedBuffer`] that is copied to the sink later, or a [`Recorder`] that
//! keeps the standard and messaging streams apart while remembering their
//! relative order.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::warn;

/// Thread-safe, cloneable writer handed to tasks and middlewares.
#[derive(Clone)]
pub struct Output {
    sink: Arc<Mutex<dyn Write + Send>>,
}

impl Output {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            sink: Arc::new(Mutex::new(writer)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    /// An output that discards everything written to it.
    pub fn discard() -> Self {
        Self::new(io::sink())
    }

    /// Write formatted text in one locked call. Write failures are logged
    /// and otherwise ignored: reporting must never fail a task.
    pub fn print(&self, args: fmt::Arguments<'_>) {
        if let Err(err) = self.clone().write_fmt(args) {
            warn!(error = %err, "failed to write output");
        }
    }

    /// Whether both handles write into the same underlying sink.
    pub fn same_sink(&self, other: &Output) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.sink), Arc::as_ptr(&other.sink))
    }

    fn address(&self) -> usize {
        Arc::as_ptr(&self.sink).cast::<()>() as usize
    }

    fn lock(&self) -> MutexGuard<'_, dyn Write + Send + 'static> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.lock().write_all(buf)
    }

    fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        // Format first so the whole line goes out under a single lock.
        let text = fmt::format(args);
        self.lock().write_all(text.as_bytes())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock().flush()
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output").finish_non_exhaustive()
    }
}

impl From<SharedBuffer> for Output {
    fn from(buffer: SharedBuffer) -> Self {
        Output::new(buffer)
    }
}

/// In-memory byte sink that can be cloned and read back.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn contents(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Buffer contents decoded as UTF-8, replacing invalid sequences.
    pub fn contents_lossy(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drain the buffer, leaving it empty.
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.lock())
    }

    /// Copy the buffered bytes to `out` in one write and clear the buffer.
    pub fn flush_to(&self, out: &Output) -> io::Result<()> {
        let bytes = self.take();
        if bytes.is_empty() {
            return Ok(());
        }
        out.clone().write_all(&bytes)
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The two logical channels a task run writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Task output proper: action logs and command output.
    Standard,
    /// Status and report lines produced by middlewares.
    Messaging,
}

/// Records writes to both streams, tagged and in arrival order.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    chunks: Arc<Mutex<Vec<(Stream, Vec<u8>)>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(Stream, Vec<u8>)>> {
        self.chunks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Output recording into the standard stream.
    pub fn standard(&self) -> Output {
        self.output(Stream::Standard)
    }

    /// Output recording into the messaging stream.
    pub fn messaging(&self) -> Output {
        self.output(Stream::Messaging)
    }

    pub fn output(&self, stream: Stream) -> Output {
        Output::new(StreamWriter {
            recorder: self.clone(),
            stream,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn push(&self, stream: Stream, buf: &[u8]) {
        let mut chunks = self.lock();
        match chunks.last_mut() {
            Some((last, bytes)) if *last == stream => bytes.extend_from_slice(buf),
            _ => chunks.push((stream, buf.to_vec())),
        }
    }

    /// Replay the recording, sending each chunk to the sink of its stream in
    /// the order it was written. When both sinks are the same the recording is
    /// written in a single call. The recorder is left empty.
    ///
    /// Both sinks stay locked for the whole replay, so replays running on
    /// other threads cannot interleave with this one.
    pub fn replay(&self, standard: &Output, messaging: &Output) -> io::Result<()> {
        if standard.same_sink(messaging) {
            return self.replay_merged(standard);
        }
        let chunks = std::mem::take(&mut *self.lock());
        if chunks.is_empty() {
            return Ok(());
        }

        // Lock in address order so two replays over the same pair never deadlock.
        let (mut standard_sink, mut messaging_sink) = if standard.address() <= messaging.address() {
            let standard_sink = standard.lock();
            (standard_sink, messaging.lock())
        } else {
            let messaging_sink = messaging.lock();
            (standard.lock(), messaging_sink)
        };
        for (stream, bytes) in chunks {
            match stream {
                Stream::Standard => standard_sink.write_all(&bytes)?,
                Stream::Messaging => messaging_sink.write_all(&bytes)?,
            }
        }
        Ok(())
    }

    /// Replay both streams, interleaved in original order, into one sink.
    pub fn replay_merged(&self, out: &Output) -> io::Result<()> {
        let chunks = std::mem::take(&mut *self.lock());
        let merged: Vec<u8> = chunks.into_iter().flat_map(|(_, bytes)| bytes).collect();
        if merged.is_empty() {
            return Ok(());
        }
        out.clone().write_all(&merged)
    }
}

struct StreamWriter {
    recorder: Recorder,
    stream: Stream,
}

impl Write for StreamWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.recorder.push(self.stream, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
