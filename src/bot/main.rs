mod commands;
mod core;
mod leaderboard;
mod lifecycle;
mod messaging;
mod sql;

use std::sync::Arc;

use clap::Parser;
use poise::serenity_prelude as ser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::commands::{set_challenge, shutdown_challenge};
use crate::core::{log_command, terminate, BOT_SHARDS, DB_POOL, RUNTIME};
use crate::lifecycle::ChallengeLifecycle;
use crate::messaging::DiscordMessenger;
use crate::sql::{ChallengeStore, ConfigStore};

/// User data.
pub struct Data {
    pub lifecycle: ChallengeLifecycle,
}

/// Basic types.
type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;
type AppContext<'a> = poise::ApplicationContext<'a, Data, Error>;
type Res = Result<(), Error>;

/// Clopts.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Whether to register the commands.
    #[clap(long, short)]
    register: bool,

    /// Path to the sqlite database.
    #[clap(long, default_value = ctfbot_sql_defs::DB_PATH)]
    db: String,
}

/// This is called from a thread that is not part of the runtime.
fn ctrlc_impl() {
    let Some(handle) = RUNTIME.get() else { std::process::exit(1) };
    let _guard = handle.enter();
    handle.block_on(terminate());
}

#[tokio::main]
async fn main() {
    // Register a panic hook to tear down the bot in case of an error;
    // this is so the bot restarts on error instead of hanging.
    let old_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        old_panic(info);
        std::process::abort();
    }));

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Save the runtime *before* registering the SIGINT handler, as the
    // handler will attempt to enter the runtime.
    let _ = RUNTIME.set(tokio::runtime::Handle::current());
    ctrlc::set_handler(ctrlc_impl).expect("Failed to register SIGINT handler");

    let args = Args::parse();
    let token = std::env::var("DISCORD_BOT_TOKEN").expect("DISCORD_BOT_TOKEN must be set");

    // Initialise the database.
    info!("Initialising sqlite db...");
    let pool = sql::connect(&args.db).await.expect("Failed to open sqlite db");
    let _ = DB_POOL.set(pool.clone());

    let config = ConfigStore::new(pool.clone());
    let store = ChallengeStore::new(pool);

    let fw = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            pre_command: |ctx| Box::pin(async move { log_command(ctx).await; }),
            commands: vec![
                set_challenge(),
                shutdown_challenge(),
            ],
            ..Default::default()
        })

        .setup(move |ctx, _, framework| {
            let _ = BOT_SHARDS.set(framework.shard_manager().clone());
            let messenger = Arc::new(DiscordMessenger::new(ctx.http.clone()));

            Box::pin(async move {
                if args.register {
                    info!("Registering commands...");
                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                    info!("Commands registered.");
                }
                info!("Setup done");
                Ok(Data {
                    lifecycle: ChallengeLifecycle::new(config, store, messenger),
                })
            })
        })
        .build();

    ser::ClientBuilder::new(token, ser::GatewayIntents::non_privileged())
        .framework(fw)
        .await
        .unwrap()
        .start()
        .await
        .unwrap();
}
