//! Parley terminal host.
//!
//! Wires the SDK to a command line: creates a session over REST, connects
//! the WebSocket, streams the microphone, renders transcripts and
//! connection state, and fetches the feedback report when the interview
//! completes. Typed answers can be entered on stdin at any time.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use parley_core::api::{ApiClient, StartInterviewRequest};
use parley_core::audio::device::list_input_devices;
use parley_core::{
    ClientConfig, ClientEvent, ConnectionStatus, InterviewClient, Role, TransportConfig,
    TurnConfig,
};

#[derive(Parser, Debug)]
#[command(name = "parley", version, about = "Voice interview practice from the terminal")]
struct Cli {
    /// Backend origin, e.g. http://localhost:8000
    #[arg(long, env = "PARLEY_SERVER", default_value = "http://localhost:8000")]
    server: String,

    /// Candidate name used in the interview script
    #[arg(long, default_value = "Candidate")]
    name: String,

    /// Company to interview for
    #[arg(long, default_value = "Acme")]
    company: String,

    /// Position to interview for
    #[arg(long, default_value = "Software Engineer")]
    position: String,

    /// Number of questions to generate
    #[arg(long, default_value_t = 5)]
    questions: u32,

    /// Optional job description to tailor questions to
    #[arg(long)]
    job_description: Option<String>,

    /// Input device name (see --list-devices); defaults to the system default
    #[arg(long)]
    input_device: Option<String>,

    /// RMS threshold (i16 units) below which a frame counts as silence
    #[arg(long, default_value_t = 400.0)]
    turn_threshold: f32,

    /// Milliseconds of silence before an end-of-turn signal is sent
    #[arg(long, default_value_t = 7000)]
    turn_silence_ms: u64,

    /// Reconnect attempts after an abnormal connection drop
    #[arg(long, default_value_t = 3)]
    reconnect_attempts: u32,

    /// List audio input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Skip the microphone; answer with typed text only
    #[arg(long)]
    text_only: bool,
}

/// The REST origin speaks http(s); the session socket speaks ws(s).
fn ws_origin(server: &str) -> String {
    if let Some(rest) = server.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = server.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        server.to_owned()
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "You",
        Role::Agent => "Interviewer",
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    if cli.list_devices {
        let devices = list_input_devices();
        if devices.is_empty() {
            println!("no input devices found");
        }
        for device in devices {
            let marker = if device.is_default { " (default)" } else { "" };
            println!("{}{}", device.name, marker);
        }
        return Ok(());
    }

    // ── Session setup over REST ───────────────────────────────────────────
    let api = ApiClient::new(&cli.server);
    let started = api
        .start_interview(&StartInterviewRequest {
            candidate_name: cli.name.clone(),
            company: cli.company.clone(),
            position: cli.position.clone(),
            question_count: cli.questions,
            job_description: cli.job_description.clone(),
        })
        .await
        .context("failed to start an interview session")?;

    info!(
        session_id = %started.session_id,
        questions = started.questions_count,
        "session created"
    );
    println!(
        "Interview for {} at {} — {} questions. Speak, or type an answer and press enter.",
        cli.position, cli.company, started.questions_count
    );

    // ── Client setup ──────────────────────────────────────────────────────
    let config = ClientConfig {
        transport: TransportConfig {
            server_url: ws_origin(&cli.server),
            max_reconnect_attempts: cli.reconnect_attempts,
            ..TransportConfig::default()
        },
        turn: TurnConfig {
            rms_threshold: cli.turn_threshold,
            silence: Duration::from_millis(cli.turn_silence_ms),
        },
        preferred_input_device: cli.input_device.clone(),
    };

    let client = Arc::new(InterviewClient::new(config));
    let mut events = client.subscribe_events();

    client
        .connect(&started.session_id)
        .context("failed to open the audio output")?;

    if cli.text_only {
        println!("(text-only mode, microphone disabled)");
    } else if let Err(e) = client.start_capture() {
        warn!(error = %e, "microphone unavailable, continuing in text-only mode");
        println!("(microphone unavailable: {e} — type answers instead)");
    }

    // ── Render loop ───────────────────────────────────────────────────────
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut completed = false;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ClientEvent::Transcript { entry }) => {
                    if entry.is_final {
                        println!("{}: {}", role_label(entry.role), entry.text);
                    }
                }
                Ok(ClientEvent::Phase { phase }) => {
                    println!("-- phase: {phase:?}");
                }
                Ok(ClientEvent::Progress { question_number, total_questions }) => {
                    println!("-- question {question_number} of {total_questions}");
                }
                Ok(ClientEvent::Connection { status }) => match status {
                    ConnectionStatus::Connected => println!("[connected]"),
                    ConnectionStatus::Reconnecting => println!("[connection lost, reconnecting...]"),
                    ConnectionStatus::Disconnected => println!("[disconnected]"),
                    ConnectionStatus::Connecting => {}
                },
                Ok(ClientEvent::Notice { message }) => {
                    eprintln!("server: {message}");
                }
                Ok(ClientEvent::ReconnectsExhausted) => {
                    eprintln!("connection lost for good — check that the server is reachable and restart the session");
                    break;
                }
                Ok(ClientEvent::Completed) => {
                    println!("-- interview complete");
                    completed = true;
                    break;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) if !line.trim().is_empty() => {
                    if let Err(e) = client.send_text(line.trim()) {
                        warn!(error = %e, "could not send text answer");
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                println!("\ninterrupted, leaving the session");
                break;
            }
        }
    }

    if client.is_capturing() {
        let _ = client.stop_capture();
    }
    client.disconnect();

    if !completed {
        return Ok(());
    }

    // ── Evaluation + feedback ─────────────────────────────────────────────
    println!("evaluating your answers...");
    api.evaluate(&started.session_id)
        .await
        .context("evaluation request failed")?;

    // The evaluator runs asynchronously; poll briefly before giving up.
    let mut feedback = None;
    for _ in 0..30 {
        match api.feedback(&started.session_id).await {
            Ok(report) => {
                feedback = Some(report);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_secs(2)).await,
        }
    }

    match feedback {
        Some(report) => {
            if let Some(score) = report.get("overall_score") {
                println!("overall score: {score}");
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        None => bail!("feedback was not ready in time; fetch it later with the session id {}", started.session_id),
    }
}
