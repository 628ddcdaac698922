use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use poise::serenity_prelude::{Colour, CreateEmbed, ShardManager};
use poise::CreateReply;
use sqlx::SqlitePool;
use tracing::{error, info};

use crate::{Context, Data, Error};

/// Default colour to use for embeds.
pub const DEFAULT_EMBED_COLOUR: Colour = Colour::from_rgb(205, 92, 92);

/// Handles stashed away for graceful shutdown on Ctrl+C. Set once
/// during startup.
pub static RUNTIME: OnceCell<tokio::runtime::Handle> = OnceCell::new();
pub static BOT_SHARDS: OnceCell<Arc<ShardManager>> = OnceCell::new();
pub static DB_POOL: OnceCell<SqlitePool> = OnceCell::new();

/// Create an embed with some default settings applied to it.
pub fn create_embed() -> CreateEmbed {
    CreateEmbed::new().colour(DEFAULT_EMBED_COLOUR)
}

/// Wrap text in Discord’s spoiler markup so it stays hidden until
/// clicked.
pub fn spoiler(s: &str) -> String {
    format!("||`{}`||", s)
}

pub async fn handle_command_error(e: poise::FrameworkError<'_, Data, Error>) {
    // Reply with a message if possible. Otherwise, just log the error.
    let Some(ctx) = e.ctx() else {
        error!("{}", e);
        return;
    };

    match ctx {
        Context::Application(a) => {
            // Log the entire command string so we have a record of it.
            error!("In invocation of command: {}", a.invocation_string());

            // Get the nested error, if possible.
            let command_error = match e {
                poise::FrameworkError::Command { error, .. } => error.to_string(),
                other => other.to_string(),
            };
            error!("{}", command_error);

            // The full error stays in the logs; the user only ever sees
            // a generic failure notice.
            if let Err(e) = poise::send_application_reply(
                a,
                CreateReply::default()
                    .ephemeral(true)
                    .content("Failed to run command. Please check logs."),
            ).await {
                error!("{}", e);
            }
        }

        // We don’t use prefix commands.
        _ => unreachable!(),
    }
}

pub async fn log_command(ctx: Context<'_>) {
    info!(
        "{} invoked command {}",
        ctx.author().name,
        ctx.invocation_string()
    );
}

/// Truncate a string w/o panicking.
pub fn safe_truncate(mut s: String, mut len: usize) -> String {
    if s.len() <= len { return s; }
    if len == 0 {
        s.clear();
        return s;
    }

    while len != 0 {
        if s.is_char_boundary(len) {
            s.truncate(len);
            return s;
        }

        len -= 1;
    }

    unreachable!();
}

/// Terminate the bot gracefully.
pub async fn terminate() {
    // Don’t terminate twice.
    static TERMINATION_LOCK: AtomicBool = AtomicBool::new(false);
    if TERMINATION_LOCK
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return;
    }

    info!("Shutting down bot...");
    if let Some(shards) = BOT_SHARDS.get() {
        shards.shutdown_all().await;
    }

    info!("Shutting down DB...");
    if let Some(pool) = DB_POOL.get() {
        pool.close().await;
    }

    info!("Exiting...");
    std::process::exit(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_truncate_respects_char_boundaries() {
        assert_eq!(safe_truncate("abcdef".into(), 3), "abc");
        assert_eq!(safe_truncate("abc".into(), 10), "abc");
        assert_eq!(safe_truncate("abc".into(), 0), "");
        // ‘é’ is two bytes; cutting inside it must back off.
        assert_eq!(safe_truncate("aé".into(), 2), "a");
    }

    #[test]
    fn spoiler_hides_the_answer() {
        assert_eq!(spoiler("hunter2"), "||`hunter2`||");
    }
}
