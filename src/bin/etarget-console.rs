//! Host console: drive the command core from a terminal.
//!
//! Usage: etarget-console [SETTINGS_FILE]
//!
//! Stdin is the primary serial port and stdout its transmit side. Settings
//! persist to SETTINGS_FILE, or `~/.etarget/settings.json` by default.
//! Set `RUST_LOG=debug` to see every bind.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{error, info};

use etarget::serial::SerialPort;
use etarget::store::FileStore;
use etarget::{Aggregator, Effect, LinkError, Target};

/// Bytes serviced per loop pass.
const BUDGET: usize = 64;
const IDLE_SLEEP: Duration = Duration::from_millis(5);

// ---------------------------------------------------------------------------
// Stdio port
// ---------------------------------------------------------------------------

/// Stdin filled by a reader thread; writes go straight to stdout.
#[derive(Clone)]
struct StdioPort {
    rx: Arc<Mutex<VecDeque<u8>>>,
    eof: Arc<AtomicBool>,
}

impl StdioPort {
    fn spawn() -> Self {
        let port = Self {
            rx: Arc::new(Mutex::new(VecDeque::new())),
            eof: Arc::new(AtomicBool::new(false)),
        };
        let reader = port.clone();
        thread::spawn(move || {
            let mut buf = [0u8; 256];
            let mut stdin = io::stdin().lock();
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if let Ok(mut rx) = reader.rx.lock() {
                            rx.extend(&buf[..n]);
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        error!("stdin: {e}");
                        break;
                    }
                }
            }
            reader.eof.store(true, Ordering::SeqCst);
        });
        port
    }

    /// Stdin is closed and every byte has been consumed.
    fn finished(&self) -> bool {
        self.eof.load(Ordering::SeqCst) && self.available() == 0
    }
}

impl SerialPort for StdioPort {
    fn read(&mut self) -> Option<u8> {
        self.rx.lock().ok()?.pop_front()
    }

    fn available(&self) -> usize {
        self.rx.lock().map_or(0, |rx| rx.len())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let mut out = io::stdout().lock();
        out.write_all(bytes)?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run() {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run() -> io::Result<()> {
    let path = match std::env::args_os().nth(1) {
        Some(p) => PathBuf::from(p),
        None => FileStore::default_path()?,
    };
    let store = FileStore::open(&path);
    info!("settings file: {}", store.path().display());

    let stdio = StdioPort::spawn();
    let mut target = Target::new(Aggregator::new().with_primary(stdio.clone()), store);

    loop {
        if target.service(BUDGET) == 0 {
            if stdio.finished() {
                break;
            }
            thread::sleep(IDLE_SLEEP);
        }
        for effect in target.take_effects() {
            match effect {
                Effect::AdvancePaper(0) => {
                    info!("paper: advance {} steps", target.settings().paper_step)
                }
                Effect::AdvancePaper(n) => info!("paper: advance {n} steps"),
                Effect::Calibrate => info!("calibration requested"),
            }
        }
    }
    Ok(())
}
