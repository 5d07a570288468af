//! `mangahub history`: print recent chat messages without joining.
//!
//! ```bash
//! mangahub history                       # general room, configured limit
//! mangahub history --manga-id berserk --limit 50
//! ```

use anyhow::Result;

use crate::chat::render::history_lines;
use crate::chat::{HistoryClient, Room};
use crate::config::Config;

/// Fetch and print history for the room. `limit` falls back to the config.
pub async fn run(config: &Config, manga_id: Option<&str>, limit: Option<usize>) -> Result<()> {
    for line in fetch_lines(config, manga_id, limit).await? {
        println!("{line}");
    }
    Ok(())
}

/// Rendered lines for the history of the room.
pub async fn fetch_lines(
    config: &Config,
    manga_id: Option<&str>,
    limit: Option<usize>,
) -> Result<Vec<String>> {
    let room = Room::from_manga_id(manga_id);
    let limit = limit.unwrap_or(config.history_limit).max(1);
    let client = HistoryClient::new(config.http_url())?;
    let history = client.fetch(room.history_key(), limit).await?;
    Ok(history_lines(&history))
}
