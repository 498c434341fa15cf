//! advsift host: std replay and live-pipe front end
//!
//! Reads NDJSON lines (advertisement reports and host commands) from a
//! capture file or stdin, runs them through the engine and writes device,
//! status and reply messages to stdout as NDJSON. Logs go to stderr
//! (`RUST_LOG=advsift=debug` for per-device decisions).
//!
//! Thread layout:
//!   reader(s) ──mpsc──▶ engine ──mpsc──▶ output (stdout)
//!                         ▲                ▲
//!                         └── Mutex ─ status ┘

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;

use advsift::comm::{self, ScanReport};
use advsift::engine::{Engine, EngineConfig, Outcome};
use advsift::protocol::{DeviceMessage, HostCommand, MsgBuffer, MAX_MSG_LEN, VERSION};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// NDJSON capture of advertisement reports to replay (default: stdin)
    #[arg(short, long)]
    capture: Option<PathBuf>,

    /// start with empty filter lists instead of the built-in deny-list
    #[arg(long)]
    no_builtin: bool,

    /// report every admitted advertisement, not just new or changed devices
    #[arg(long)]
    no_dedup: bool,

    /// seconds between status messages; 0 disables them
    #[arg(short, long, default_value_t = 30)]
    status_interval: u64,
}

/// One parsed input line
enum Input {
    Scan(ScanReport),
    Command(HostCommand),
    /// The primary input is exhausted
    End,
}

// ── Shared state ─────────────────────────────────────────────────────

static SCANNING: AtomicBool = AtomicBool::new(true);

/// Start time, captured once in main, used for report timestamps.
static START_INSTANT: OnceLock<Instant> = OnceLock::new();

fn uptime_millis_u32() -> u32 {
    START_INSTANT
        .get()
        .map(|start| (start.elapsed().as_millis() & 0xFFFF_FFFF) as u32)
        .unwrap_or(0)
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let args = Args::parse();
    START_INSTANT.get_or_init(Instant::now);

    log::info!("advsift v{} starting", VERSION);

    let config = EngineConfig {
        dedup: !args.no_dedup,
    };
    let mut engine = if args.no_builtin {
        Engine::new(config)
    } else {
        Engine::with_builtin_filters(config)
    };
    engine.start_session();
    let engine = Arc::new(Mutex::new(engine));

    // ── Channels ─────────────────────────────────────────────────────

    let (input_tx, input_rx) = mpsc::sync_channel::<Input>(16);
    let (output_tx, output_rx) = mpsc::sync_channel::<MsgBuffer>(8);
    let (stop_tx, stop_rx) = mpsc::channel::<()>();

    // ── Output thread ────────────────────────────────────────────────

    let output = thread::Builder::new()
        .name("output".into())
        .spawn(move || output_thread(output_rx))?;

    // ── Reader threads ───────────────────────────────────────────────

    match &args.capture {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("opening capture {}", path.display()))?;
            log::info!("Replaying {}", path.display());
            let capture_tx = input_tx.clone();
            thread::Builder::new()
                .name("capture".into())
                .spawn(move || reader_thread(BufReader::new(file), capture_tx, true))?;
            // Commands may still arrive on stdin; its EOF does not end the replay
            let stdin_tx = input_tx;
            thread::Builder::new()
                .name("stdin".into())
                .spawn(move || reader_thread(io::stdin().lock(), stdin_tx, false))?;
        }
        None => {
            thread::Builder::new()
                .name("stdin".into())
                .spawn(move || reader_thread(io::stdin().lock(), input_tx, true))?;
        }
    }

    // ── Status thread ────────────────────────────────────────────────

    let status = if args.status_interval > 0 {
        let status_engine = Arc::clone(&engine);
        let status_output_tx = output_tx.clone();
        let interval = Duration::from_secs(args.status_interval);
        Some(
            thread::Builder::new()
                .name("status".into())
                .spawn(move || status_thread(status_engine, status_output_tx, stop_rx, interval))?,
        )
    } else {
        None
    };

    // ── Engine thread ────────────────────────────────────────────────

    let engine_output_tx = output_tx.clone();
    let engine_shared = Arc::clone(&engine);
    let engine_handle = thread::Builder::new()
        .name("engine".into())
        .spawn(move || engine_thread(input_rx, engine_shared, engine_output_tx))?;

    engine_handle
        .join()
        .map_err(|_| anyhow::anyhow!("engine thread panicked"))?;

    // ── Shutdown ─────────────────────────────────────────────────────

    drop(stop_tx);
    if let Some(status) = status {
        status
            .join()
            .map_err(|_| anyhow::anyhow!("status thread panicked"))?;
    }

    {
        let engine = engine
            .lock()
            .map_err(|_| anyhow::anyhow!("engine lock poisoned"))?;
        send(&output_tx, &comm::status_message(&engine, SCANNING.load(Ordering::Relaxed)));
        let stats = engine.stats();
        log::info!(
            "Done: {} received, {} filtered, {} duplicates, {} reported, {} unique",
            stats.received,
            stats.filtered,
            stats.duplicates,
            stats.reported,
            engine.unique_devices()
        );
    }
    drop(output_tx);

    output
        .join()
        .map_err(|_| anyhow::anyhow!("output thread panicked"))??;
    Ok(())
}

// ── Reader ───────────────────────────────────────────────────────────

fn parse_line(line: &str) -> Option<Input> {
    if let Some(cmd) = comm::parse_command(line.as_bytes()) {
        return Some(Input::Command(cmd));
    }
    comm::parse_scan_report(line.as_bytes()).map(Input::Scan)
}

/// Forward parsed lines to the engine. A reader that `ends_input` tells the
/// engine to finish once its source runs dry.
fn reader_thread<R: BufRead>(reader: R, input_tx: SyncSender<Input>, ends_input: bool) {
    for (lineno, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::error!("Input read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line) {
            Some(input) => {
                if input_tx.send(input).is_err() {
                    break;
                }
            }
            None => log::warn!("Line {}: not a report or command, skipped", lineno + 1),
        }
    }
    log::debug!("Reader finished");
    if ends_input {
        let _ = input_tx.send(Input::End);
    }
}

// ── Engine thread ────────────────────────────────────────────────────

/// Runs until the primary input ends or every reader is gone.
fn engine_thread(
    input_rx: Receiver<Input>,
    engine: Arc<Mutex<Engine>>,
    output_tx: SyncSender<MsgBuffer>,
) {
    log::info!("Engine thread started");

    while let Ok(input) = input_rx.recv() {
        let Ok(mut engine) = engine.lock() else {
            log::error!("Engine lock poisoned");
            return;
        };

        match input {
            Input::End => break,
            Input::Scan(report) => {
                if !SCANNING.load(Ordering::Relaxed) {
                    continue;
                }
                let ts = report.ts.unwrap_or_else(uptime_millis_u32);
                if let Outcome::Report(r) = engine.observe(&report.as_adv_report(), ts) {
                    send(&output_tx, &r.message(ts));
                }
            }
            Input::Command(cmd) => {
                let mut scanning = SCANNING.load(Ordering::Relaxed);
                let outcome = comm::handle_command(&cmd, &mut engine, &mut scanning);
                SCANNING.store(scanning, Ordering::Relaxed);
                send(&output_tx, &comm::reply_message(outcome, &engine, scanning));
            }
        }
    }
    log::info!("Input finished");
}

// ── Status thread ────────────────────────────────────────────────────

fn status_thread(
    engine: Arc<Mutex<Engine>>,
    output_tx: SyncSender<MsgBuffer>,
    stop_rx: Receiver<()>,
    interval: Duration,
) {
    loop {
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            _ => return,
        }

        let Ok(engine) = engine.lock() else {
            return;
        };
        send(&output_tx, &comm::status_message(&engine, SCANNING.load(Ordering::Relaxed)));
    }
}

// ── Output thread ────────────────────────────────────────────────────

fn output_thread(output_rx: Receiver<MsgBuffer>) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    while let Ok(msg) = output_rx.recv() {
        out.write_all(&msg)?;
        out.flush()?;
    }
    Ok(())
}

fn send(output_tx: &SyncSender<MsgBuffer>, msg: &DeviceMessage) {
    match comm::encode_message(msg) {
        Some(buf) => {
            let _ = output_tx.send(buf);
        }
        None => log::warn!("Message did not fit in {} bytes, dropped", MAX_MSG_LEN),
    }
}
