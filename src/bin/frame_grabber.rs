//! frame_grabber - serve camera frames over a local Unix socket.
//!
//! Pulls the RTSP stream through `ffmpeg` as MJPEG at `FRAME_RATE`, splits it into
//! JPEG images and writes each to the connected client as `[u32 LE length][JPEG]`.
//! One client is served at a time. Pair with `FRAME_SOURCE=socket` in the monitor.

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::io::{self, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use aicam::config::{MonitorConfig, DEFAULT_CONFIG_PATH};
use aicam::credentials::{resolve_credentials, KeychainStore};
use aicam::ingest::codec::write_frame;
use aicam::ingest::mjpeg::MjpegSplitter;
use aicam::ingest::probe::{authenticated_url, executable_available, masked_url};
use aicam::logging::init_logging;
use aicam::ShutdownSignal;

const ACCEPT_POLL: Duration = Duration::from_secs(1);
const CLIENT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
const STREAM_RETRY_DELAY: Duration = Duration::from_secs(10);
const PROGRESS_EVERY: u64 = 50;
const READ_CHUNK: usize = 64 * 1024;
/// How often a stalled ffmpeg read re-checks for shutdown.
const READ_POLL: Duration = Duration::from_millis(250);
/// ffmpeg MJPEG quantizer; roughly JPEG quality 85.
const MJPEG_QSCALE: &str = "5";

#[derive(Parser, Debug)]
#[command(
    name = "frame_grabber",
    version,
    about = "Serve length-prefixed JPEG camera frames on a Unix socket"
)]
struct Args {
    /// Path to the key=value configuration file.
    #[arg(long, env = "AICAM_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Socket path (defaults to SOCKET_PATH from the configuration).
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Debug logging (RUST_LOG still wins).
    #[arg(short, long)]
    verbose: bool,
}

struct Grabber {
    url: String,
    display_url: String,
    frame_rate: u32,
}

enum ClientEnd {
    Disconnected,
    Shutdown,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = MonitorConfig::load(&args.config)?;
    let stream = &config.stream;
    let url = stream
        .url
        .as_deref()
        .ok_or_else(|| anyhow!("RTSP_FEED_URL is required"))?;
    let credentials = resolve_credentials(
        stream.username.as_deref(),
        stream.password.as_deref(),
        &stream.keychain_service,
        &KeychainStore,
    )?;
    if !executable_available("ffmpeg") {
        bail!("ffmpeg not found on PATH");
    }
    let url = authenticated_url(url, credentials.as_ref())?;
    let grabber = Grabber {
        display_url: masked_url(&url),
        url,
        frame_rate: stream.frame_rate,
    };

    let socket_path = args.socket.unwrap_or_else(|| stream.socket_path.clone());
    let listener = bind(&socket_path)?;

    let shutdown = ShutdownSignal::new();
    let handler_signal = shutdown.clone();
    ctrlc::set_handler(move || {
        handler_signal.trigger();
    })
    .expect("error setting Ctrl-C handler");

    log::info!(
        "frame_grabber serving {} on {} at {} fps",
        grabber.display_url,
        socket_path.display(),
        grabber.frame_rate
    );

    let result = serve(&listener, &grabber, &shutdown);
    drop(listener);
    if let Err(e) = std::fs::remove_file(&socket_path) {
        log::warn!("failed to remove {}: {}", socket_path.display(), e);
    }
    log::info!("frame_grabber stopped");
    result
}

fn bind(path: &Path) -> Result<UnixListener> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("failed to remove stale socket {}", path.display()))?;
    }
    let listener = UnixListener::bind(path)
        .with_context(|| format!("failed to bind {}", path.display()))?;
    listener
        .set_nonblocking(true)
        .context("failed to make listener non-blocking")?;
    Ok(listener)
}

fn serve(listener: &UnixListener, grabber: &Grabber, shutdown: &ShutdownSignal) -> Result<()> {
    while !shutdown.is_triggered() {
        match listener.accept() {
            Ok((client, _)) => {
                log::info!("client connected");
                client
                    .set_nonblocking(false)
                    .context("failed to configure client socket")?;
                client
                    .set_write_timeout(Some(CLIENT_WRITE_TIMEOUT))
                    .context("failed to configure client socket")?;
                match serve_client(client, grabber, shutdown) {
                    ClientEnd::Disconnected => log::info!("client disconnected, waiting for next"),
                    ClientEnd::Shutdown => break,
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                shutdown.sleep(ACCEPT_POLL);
            }
            Err(e) => {
                log::warn!("accept failed: {}", e);
                shutdown.sleep(ACCEPT_POLL);
            }
        }
    }
    Ok(())
}

fn serve_client(mut client: UnixStream, grabber: &Grabber, shutdown: &ShutdownSignal) -> ClientEnd {
    let mut sent = 0u64;
    loop {
        if shutdown.is_triggered() {
            return ClientEnd::Shutdown;
        }
        let mut child = match spawn_mjpeg(grabber) {
            Ok(child) => child,
            Err(e) => {
                log::error!("{:#}", e);
                if !shutdown.sleep(STREAM_RETRY_DELAY) {
                    return ClientEnd::Shutdown;
                }
                continue;
            }
        };
        log::info!("stream opened: {}", grabber.display_url);

        let outcome = match child.stdout.take() {
            Some(stdout) => pump(stdout, &mut client, &mut sent, shutdown),
            None => Pump::StreamEnded("ffmpeg stdout was not captured".to_string()),
        };
        let _ = child.kill();
        let _ = child.wait();

        match outcome {
            Pump::ClientGone(e) => {
                log::info!("client write failed: {}", e);
                return ClientEnd::Disconnected;
            }
            Pump::Shutdown => return ClientEnd::Shutdown,
            Pump::StreamEnded(reason) => {
                log::warn!(
                    "stream ended ({}), retrying in {}s",
                    reason,
                    STREAM_RETRY_DELAY.as_secs()
                );
                if !shutdown.sleep(STREAM_RETRY_DELAY) {
                    return ClientEnd::Shutdown;
                }
            }
        }
    }
}

fn spawn_mjpeg(grabber: &Grabber) -> Result<Child> {
    let mut command = Command::new("ffmpeg");
    command.args(["-hide_banner", "-loglevel", "error", "-nostdin"]);
    if grabber.url.starts_with("rtsp://") || grabber.url.starts_with("rtsps://") {
        command.args(["-rtsp_transport", "tcp"]);
    }
    command
        .args(["-i", grabber.url.as_str(), "-an", "-vf"])
        .arg(format!("fps={}", grabber.frame_rate))
        .args(["-f", "image2pipe", "-c:v", "mjpeg", "-q:v", MJPEG_QSCALE, "-"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());
    command.spawn().context("failed to start ffmpeg")
}

enum Pump {
    ClientGone(io::Error),
    StreamEnded(String),
    Shutdown,
}

/// Output chunks from the ffmpeg reader thread; `None` marks end of output.
type Chunks = Receiver<io::Result<Option<Vec<u8>>>>;

/// Read ffmpeg output on its own thread so a stalled stream never blocks shutdown.
fn spawn_reader<R: Read + Send + 'static>(mut stdout: R) -> io::Result<Chunks> {
    let (sender, receiver) = mpsc::sync_channel(4);
    std::thread::Builder::new()
        .name("ffmpeg-stdout".to_string())
        .spawn(move || loop {
            let mut chunk = vec![0u8; READ_CHUNK];
            let message = match stdout.read(&mut chunk) {
                Ok(0) => Ok(None),
                Ok(n) => {
                    chunk.truncate(n);
                    Ok(Some(chunk))
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => Err(e),
            };
            let done = !matches!(message, Ok(Some(_)));
            if sender.send(message).is_err() || done {
                break;
            }
        })?;
    Ok(receiver)
}

fn pump<R, W>(stdout: R, client: &mut W, sent: &mut u64, shutdown: &ShutdownSignal) -> Pump
where
    R: Read + Send + 'static,
    W: Write,
{
    let chunks = match spawn_reader(stdout) {
        Ok(chunks) => chunks,
        Err(e) => return Pump::StreamEnded(format!("failed to start reader: {}", e)),
    };
    let mut splitter = MjpegSplitter::new();
    loop {
        if shutdown.is_triggered() {
            return Pump::Shutdown;
        }
        let chunk = match chunks.recv_timeout(READ_POLL) {
            Ok(Ok(Some(chunk))) => chunk,
            Ok(Ok(None)) => return Pump::StreamEnded("ffmpeg output closed".to_string()),
            Ok(Err(e)) => return Pump::StreamEnded(e.to_string()),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                return Pump::StreamEnded("ffmpeg reader stopped".to_string())
            }
        };
        splitter.push(&chunk);
        while let Some(jpeg) = splitter.next_image() {
            if let Err(e) = write_frame(client, &jpeg) {
                return Pump::ClientGone(e);
            }
            *sent += 1;
            if *sent % PROGRESS_EVERY == 0 {
                log::info!("sent {} frames ({} bytes last)", sent, jpeg.len());
            }
        }
    }
}
