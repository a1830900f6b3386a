use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;

use graphpod::bridge::HttpBackend;
use graphpod::config::WorkerConfig;
use graphpod::protocol::OutboundMessage;
use graphpod::worker;
use tokio::sync::mpsc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()?;
    let _guard = runtime.enter();

    let backend = Arc::new(HttpBackend::new(&config.backend_url)?);
    let (handle, outbound) = worker::spawn(config, backend)?;
    let pump = thread::Builder::new()
        .name("outbound-pump".to_owned())
        .spawn(move || pump_outbound(outbound))?;

    // One request per line: a JSON-encoded string, or raw text as a
    // convenience when the line is not valid JSON.
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let message = serde_json::from_str::<String>(&line).unwrap_or(line);
        if handle.send(message).is_err() {
            break;
        }
    }

    // Closing the inbound side lets the worker thread finish, which in turn
    // closes the outbound channel and ends the pump.
    drop(handle);
    let _ = pump.join();
    Ok(())
}

fn pump_outbound(mut outbound: mpsc::UnboundedReceiver<OutboundMessage>) {
    let mut stdout = io::stdout();
    while let Some(message) = outbound.blocking_recv() {
        let Ok(payload) = serde_json::to_string(&message) else {
            continue;
        };
        if stdout.write_all(payload.as_bytes()).is_err()
            || stdout.write_all(b"\n").is_err()
            || stdout.flush().is_err()
        {
            break;
        }
    }
}
