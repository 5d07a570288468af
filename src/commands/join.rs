//! `mangahub join`: interactive chat session.
//!
//! Connects to the general room, or to a manga room with `--manga-id`, then
//! hands stdin to the [`Session`] input loop. Ctrl-C / SIGTERM close the
//! connection and exit with status 130.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tokio::sync::mpsc;

use crate::chat::{Console, Interrupter, Room, Session, SessionConfig, Stdout};
use crate::config::Config;

/// Exit status after an interrupt (128 + SIGINT).
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Session settings derived from the CLI config.
pub fn session_config(config: &Config) -> SessionConfig {
    SessionConfig {
        chat_url: config.chat_url(),
        http_url: config.http_url(),
        history_limit: config.history_limit,
    }
}

/// Run an interactive session until `/quit`, end of input, disconnect or signal.
pub async fn run(config: &Config, manga_id: Option<&str>) -> Result<()> {
    let console: Arc<dyn Console> = Arc::new(Stdout);
    let session_config = session_config(config);
    let chat_url = session_config.chat_url.clone();
    let mut session = Session::new(
        session_config,
        Room::from_manga_id(manga_id),
        Arc::clone(&console),
    )?;

    if let Err(e) = session.connect().await {
        log::error!("[Chat] Connect to {chat_url} failed: {e}");
        console.error(
            &format!("Failed to connect to chat server: {e}"),
            Some(&format!("Check if chat server is running at {chat_url}")),
        );
        std::process::exit(1);
    }

    spawn_signal_loop(session.interrupter())?;

    session.run(BufReader::new(tokio::io::stdin())).await
}

/// Forward SIGINT/SIGTERM into the session and terminate the process.
fn spawn_signal_loop(interrupter: Interrupter) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        // Receiver gone means we are already exiting
        let _ = tx.send(());
    })
    .context("Failed to install signal handler")?;

    tokio::spawn(async move {
        if rx.recv().await.is_some() {
            log::info!("[Chat] Signal received");
            if interrupter.interrupt().await {
                println!("\nDisconnected.");
            }
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_from_config() {
        let config = Config {
            server_url: "https://manga.example.com".to_string(),
            history_limit: 5,
        };
        let session = session_config(&config);
        assert_eq!(session.chat_url, "wss://manga.example.com/chat");
        assert_eq!(session.http_url, "https://manga.example.com");
        assert_eq!(session.history_limit, 5);
    }
}
