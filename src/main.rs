//! Terminal front end for the streaming client
//!
//! Thin wiring only: logger, env config, a line-based prompt, and println
//! sinks. All session logic lives in the library.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use jarvis_client::{
    client_channel, ClientConfig, ClientEvent, ConnectionStatus, PlaybackSink, SessionMode,
    StreamController, UiSink,
};

/// Prints connection and turn signals to the terminal
struct TerminalUi;

impl UiSink for TerminalUi {
    fn connection_status(&self, status: ConnectionStatus) {
        match status {
            ConnectionStatus::Connected => println!("[connected]"),
            ConnectionStatus::Disconnected => println!("[disconnected, reconnecting...]"),
            ConnectionStatus::Error => println!("[connection error]"),
        }
    }

    fn indicator(&self, visible: bool) {
        if visible {
            println!("[agent is responding...]");
        }
    }

    fn turn_started(&self, _id: &str) {}

    fn turn_text(&self, _id: &str, delta: &str, _text: &str) {
        // Deltas stream in arrival order; print them as they come
        print!("{}", delta);
        use std::io::Write;
        let _ = std::io::stdout().flush();
    }

    fn turn_audio_tagged(&self, _id: &str) {
        println!("[audio]");
    }

    fn turn_completed(&self, _id: &str) {
        println!();
    }
}

/// Stand-in for a speaker: reports decoded audio instead of playing it
struct LoggingPlayback;

impl PlaybackSink for LoggingPlayback {
    fn play(&self, pcm: &[u8]) {
        log::debug!("Playback sink received {} PCM bytes", pcm.len());
    }
}

#[tokio::main]
async fn main() {
    // Load .env if present; production uses system env vars
    let _ = dotenvy::dotenv();
    env_logger::init();

    // Pin the ring provider so wss:// dials don't depend on feature
    // unification picking one
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        log::debug!("rustls crypto provider already installed");
    }

    let config = ClientConfig {
        server_url: std::env::var("JARVIS_SERVER_URL")
            .unwrap_or_else(|_| jarvis_client::DEFAULT_SERVER_URL.to_string()),
        ..ClientConfig::default()
    };
    log::info!("Using server {}", config.server_url);

    let controller = StreamController::new(
        config,
        SessionMode::Text,
        Arc::new(TerminalUi),
        Arc::new(LoggingPlayback),
    );
    let (tx, runtime) = client_channel(controller);

    // Line-based prompt: plain lines are messages, /audio and /text switch
    // modes, /quit exits.
    let input_tx = tx.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let event = match line.trim() {
                "" => continue,
                "/quit" => ClientEvent::Shutdown,
                "/audio" => ClientEvent::SwitchMode(SessionMode::Audio),
                "/text" => ClientEvent::SwitchMode(SessionMode::Text),
                text => ClientEvent::SendText(text.to_string()),
            };
            let quitting = matches!(event, ClientEvent::Shutdown);
            if input_tx.send(event).await.is_err() || quitting {
                break;
            }
        }
        // Stdin closed: shut the runtime down
        let _ = input_tx.send(ClientEvent::Shutdown).await;
    });

    runtime.run().await;
}
