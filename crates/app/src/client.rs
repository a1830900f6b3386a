use std::env;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::process::{Child, Command, Stdio};

use graphpod::protocol::OutboundMessage;

/// Line-oriented exchange with an agent worker. Requests go out as one
/// JSON-encoded string per line so newlines inside the user text survive
/// framing; replies come back as one JSON message per line.
pub struct MessageStream<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> MessageStream<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn send(&mut self, message: &str) -> Result<(), String> {
        let line = serde_json::to_string(message).map_err(|err| err.to_string())?;
        self.writer
            .write_all(line.as_bytes())
            .map_err(|err| format!("agent worker write failed: {err}"))?;
        self.writer
            .write_all(b"\n")
            .map_err(|err| format!("agent worker write failed: {err}"))?;
        self.writer
            .flush()
            .map_err(|err| format!("agent worker flush failed: {err}"))
    }

    pub fn recv(&mut self) -> Result<OutboundMessage, String> {
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .map_err(|err| format!("agent worker read failed: {err}"))?;
        if read == 0 {
            return Err("agent worker closed stdout".to_owned());
        }
        serde_json::from_str(line.trim_end())
            .map_err(|err| format!("agent worker invalid message: {err}"))
    }

    /// Drains bootstrap progress until the worker announces readiness,
    /// reporting each status line through `progress`. A bootstrap error is
    /// terminal.
    pub fn wait_ready(&mut self, mut progress: impl FnMut(&str)) -> Result<(), String> {
        loop {
            match self.recv()? {
                OutboundMessage::Status { message, .. } => progress(&message),
                OutboundMessage::Ready { .. } => return Ok(()),
                OutboundMessage::Error { error } => return Err(error),
                OutboundMessage::Result { result } => {
                    return Err(format!("unexpected result before ready: {result}"));
                }
            }
        }
    }

    /// Sends one request and reads through to its terminal message.
    pub fn request(&mut self, message: &str) -> Result<String, String> {
        self.send(message)?;
        loop {
            match self.recv()? {
                OutboundMessage::Result { result } => return Ok(result),
                OutboundMessage::Error { error } => return Err(error),
                // Late bootstrap chatter is harmless; skip it.
                OutboundMessage::Status { .. } | OutboundMessage::Ready { .. } => continue,
            }
        }
    }
}

/// Owns a spawned worker process and the message stream over its pipes.
pub struct WorkerClient {
    child: Child,
    stream: MessageStream<BufReader<std::process::ChildStdout>, BufWriter<std::process::ChildStdin>>,
}

impl WorkerClient {
    pub fn spawn() -> Result<Self, String> {
        let worker_bin = resolve_worker_bin()?;
        let mut child = Command::new(worker_bin)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|err| format!("failed to spawn agent worker: {err}"))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| "agent worker missing stdin".to_owned())?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| "agent worker missing stdout".to_owned())?;
        Ok(Self {
            child,
            stream: MessageStream::new(BufReader::new(stdout), BufWriter::new(stdin)),
        })
    }

    pub fn wait_ready(&mut self, progress: impl FnMut(&str)) -> Result<(), String> {
        self.stream.wait_ready(progress)
    }

    pub fn request(&mut self, message: &str) -> Result<String, String> {
        self.stream.request(message)
    }
}

impl Drop for WorkerClient {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn resolve_worker_bin() -> Result<std::path::PathBuf, String> {
    let current =
        env::current_exe().map_err(|err| format!("failed to resolve current executable: {err}"))?;
    let mut worker = current
        .parent()
        .ok_or_else(|| "failed to resolve executable directory".to_owned())?
        .to_path_buf();
    worker.push("agent_worker");
    if let Some(ext) = current.extension() {
        worker.set_extension(ext);
    }
    if !worker.exists() {
        return Err(format!(
            "agent worker binary not found at {}. Build it with `cargo build -p app --bin agent_worker`",
            worker.display()
        ));
    }
    Ok(worker)
}
