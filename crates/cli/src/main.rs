use clap::Parser;
use rtsp::{Client, ClientConfig, Credentials, Event, FrameQueue, TrackParameters};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rtsp-client", about = "Pull an RTSP stream over interleaved TCP")]
struct Args {
    /// Stream URL (rtsp://host[:port]/path)
    url: String,

    /// Username for Basic/Digest authentication
    #[arg(long, short)]
    user: Option<String>,

    /// Password for Basic/Digest authentication
    #[arg(long, short, default_value = "")]
    password: String,

    /// Do not request the video track
    #[arg(long)]
    no_video: bool,

    /// Also request the audio track (AAC only)
    #[arg(long)]
    audio: bool,

    /// User-Agent header sent with every request
    #[arg(long)]
    user_agent: Option<String>,

    /// Stop after this many seconds (runs until the stream ends otherwise)
    #[arg(long, short)]
    duration: Option<u64>,

    /// Write the video elementary stream (Annex-B) to this file
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Write raw AAC access units to this file
    #[arg(long)]
    audio_output: Option<PathBuf>,

    /// Log every response header
    #[arg(long)]
    dump_headers: bool,

    /// Only check whether the stream is reachable, then exit
    #[arg(long)]
    probe: bool,
}

/// Drain `queue` into `path` until `done` is set and the queue runs dry.
fn spawn_writer(
    queue: Arc<FrameQueue>,
    path: PathBuf,
    done: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    let mut out = BufWriter::new(File::create(&path)?);
    Ok(thread::spawn(move || {
        let mut written = 0u64;
        loop {
            match queue.pop() {
                Some(frame) => {
                    if let Err(e) = out.write_all(&frame.data) {
                        tracing::error!(path = %path.display(), error = %e, "write failed");
                        break;
                    }
                    written += frame.len() as u64;
                }
                None if done.load(Ordering::SeqCst) => break,
                None => {}
            }
        }
        if let Err(e) = out.flush() {
            tracing::error!(path = %path.display(), error = %e, "flush failed");
        }
        tracing::info!(path = %path.display(), bytes = written, "output closed");
    }))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = ClientConfig::new(&args.url);
    config.credentials = args
        .user
        .as_ref()
        .map(|user| Credentials::new(user.as_str(), args.password.as_str()));
    if let Some(agent) = &args.user_agent {
        config.user_agent = Some(agent.clone());
    }
    config.want_video = !args.no_video;
    config.want_audio = args.audio;
    config.dump_headers = args.dump_headers;

    if args.probe {
        let timeout = Duration::from_secs(args.duration.unwrap_or(10));
        let reachable = Client::probe(config, timeout);
        println!("{}: {}", args.url, if reachable { "reachable" } else { "unreachable" });
        return if reachable {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
    }

    let mut client = Client::new(config);
    let done = Arc::new(AtomicBool::new(false));
    let mut writers = Vec::new();
    for (queue, path) in [
        (client.video_queue(), args.output.clone()),
        (client.audio_queue(), args.audio_output.clone()),
    ] {
        if let Some(path) = path {
            match spawn_writer(queue, path.clone(), done.clone()) {
                Ok(handle) => writers.push(handle),
                Err(e) => {
                    eprintln!("Failed to open {}: {}", path.display(), e);
                    return ExitCode::FAILURE;
                }
            }
        }
    }

    let (tx, rx) = mpsc::channel();
    let listener = move |event: Event| match event {
        Event::AccessUnit { .. } => {}
        Event::TrackReady(TrackParameters::Video {
            codec,
            width,
            height,
            ..
        }) => tracing::info!(?codec, ?width, ?height, "video track ready"),
        Event::TrackReady(TrackParameters::Audio {
            codec,
            sample_rate,
            channels,
            ..
        }) => tracing::info!(?codec, sample_rate, channels, "audio track ready"),
        Event::Connected(sdp) => {
            tracing::info!(session = ?sdp.session_name, "connected");
        }
        Event::Connecting => tracing::info!("connecting"),
        terminal => {
            let _ = tx.send(terminal);
        }
    };

    if let Err(e) = client.start(listener) {
        eprintln!("Failed to start client: {}", e);
        return ExitCode::FAILURE;
    }

    let terminal = match args.duration {
        Some(secs) => rx.recv_timeout(Duration::from_secs(secs)).ok(),
        None => rx.recv().ok(),
    };
    let terminal = match terminal {
        Some(event) => event,
        None => {
            client.stop();
            rx.recv().unwrap_or(Event::Disconnected)
        }
    };
    client.join();

    done.store(true, Ordering::SeqCst);
    client.video_queue().interrupt();
    client.audio_queue().interrupt();
    for writer in writers {
        let _ = writer.join();
    }

    let stats = client.stats();
    println!(
        "video: {} units / {} bytes, audio: {} units / {} bytes, dropped: {}, resyncs: {}",
        stats.video_units,
        stats.video_bytes,
        stats.audio_units,
        stats.audio_bytes,
        stats.dropped_payloads,
        stats.resyncs
    );

    match terminal {
        Event::Disconnected => ExitCode::SUCCESS,
        Event::Unauthorized => {
            eprintln!("Unauthorized: check --user/--password");
            ExitCode::FAILURE
        }
        Event::Failed(reason) => {
            eprintln!("Session failed: {}", reason);
            ExitCode::FAILURE
        }
        _ => ExitCode::SUCCESS,
    }
}
