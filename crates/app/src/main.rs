use std::io::{self, BufRead, Write};

use app::client::WorkerClient;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let mut client = WorkerClient::spawn()?;
    client.wait_ready(|status| eprintln!("[worker] {status}"))?;
    eprintln!("[worker] ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match client.request(&line) {
            Ok(result) => {
                stdout.write_all(result.as_bytes())?;
                stdout.write_all(b"\n")?;
                stdout.flush()?;
            }
            Err(err) => eprintln!("[worker] {err}"),
        }
    }
    Ok(())
}
