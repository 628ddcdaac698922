use poise::{CreateReply, Modal};
use tracing::error;

use crate::core::{handle_command_error, safe_truncate};
use crate::lifecycle::{Caller, ChallengeForm, LifecycleError};
use crate::{AppContext, Context, Error, Res};

/// Form shown to challenge creators. Field constraints mirror what the
/// lifecycle validates; required fields can still arrive as whitespace,
/// so validation happens again before anything is persisted.
#[derive(Debug, poise::Modal)]
#[name = "Set a Challenge"]
struct SetChallengeModal {
    #[name = "Description"]
    #[placeholder = "Description of the challenge"]
    #[paragraph]
    #[max_length = 2000]
    description: String,

    #[name = "Answer"]
    #[placeholder = "Answer to the challenge"]
    answer: String,

    #[name = "Attachment"]
    #[placeholder = "Optional: a single URL for files related to the challenge"]
    attachment: Option<String>,

    #[name = "Hints"]
    #[placeholder = "Hints for the challenge"]
    hints: String,

    #[name = "Write-up"]
    #[placeholder = "Optional: describe how to solve the challenge"]
    #[paragraph]
    #[max_length = 2000]
    writeup: Option<String>,
}

/// Create a new challenge.
#[poise::command(slash_command, guild_only, rename = "setchallenge", on_error = "handle_command_error")]
pub async fn set_challenge(ctx: AppContext<'_>) -> Res {
    let caller = caller(Context::Application(ctx)).await?;
    let guild = ctx.guild_id().ok_or("Not invoked in a guild")?;
    let lifecycle = &ctx.data().lifecycle;

    // Check config and permissions up front so an unauthorised caller
    // never sees the form.
    if let Err(e) = lifecycle.authorize(guild, &caller).await {
        return reply_error(Context::Application(ctx), &e).await;
    }

    let Some(modal) = SetChallengeModal::execute(ctx).await? else {
        // Form timed out or was dismissed.
        return Ok(());
    };

    let form = ChallengeForm {
        description: modal.description,
        answer: modal.answer,
        attachment: modal.attachment,
        hints: modal.hints,
        writeup: modal.writeup,
    };

    match lifecycle.create(guild, &caller, &form).await {
        Ok(day) => {
            ephemeral(
                Context::Application(ctx),
                format!("Challenge set successfully for Day {}!", day),
            )
            .await
        }
        Err(LifecycleError::Messaging(e)) => {
            error!("Challenge saved but announcement failed: {:?}", e);
            ephemeral(
                Context::Application(ctx),
                "The challenge was saved but could not be announced. Please check logs.".into(),
            )
            .await
        }
        Err(e) => reply_error(Context::Application(ctx), &e).await,
    }
}

/// Shut down the active challenge and publish the results.
#[poise::command(slash_command, ephemeral, guild_only, rename = "shutdown", on_error = "handle_command_error")]
pub async fn shutdown_challenge(ctx: Context<'_>) -> Res {
    let caller = caller(ctx).await?;
    let guild = ctx.guild_id().ok_or("Not invoked in a guild")?;

    match ctx.data().lifecycle.close(guild, &caller).await {
        Ok(_) => {
            ephemeral(
                ctx,
                "Challenge has been shut down and leaderboard has been printed.".into(),
            )
            .await
        }
        Err(LifecycleError::Messaging(e)) => {
            error!("Failed to publish challenge results: {:?}", e);
            ephemeral(
                ctx,
                "Failed to publish the results; the challenge is still active. Please check logs and retry.".into(),
            )
            .await
        }
        Err(e) => reply_error(ctx, &e).await,
    }
}

/// Build the per-invocation caller identity from the interaction.
async fn caller(ctx: Context<'_>) -> Result<Caller, Error> {
    // guild_only guarantees member data is available.
    let member = ctx.author_member().await.ok_or("Member data unavailable")?;
    Ok(Caller {
        id: ctx.author().id,
        name: ctx.author().name.clone(),
        roles: member.roles.clone(),
    })
}

async fn ephemeral(ctx: Context<'_>, text: String) -> Res {
    ctx.send(
        CreateReply::default()
            .ephemeral(true)
            .content(safe_truncate(text, 2000)),
    )
    .await?;
    Ok(())
}

async fn reply_error(ctx: Context<'_>, e: &LifecycleError) -> Res {
    // Internal failures are logged in full but never echoed back.
    if matches!(e, LifecycleError::Storage(_) | LifecycleError::Messaging(_)) {
        error!("{:?}", e);
    }
    ephemeral(ctx, user_message(e)).await
}

/// Map a lifecycle failure to the ephemeral reply shown to the caller.
fn user_message(e: &LifecycleError) -> String {
    match e {
        LifecycleError::NotConfigured
        | LifecycleError::Unauthorized
        | LifecycleError::AlreadyActive
        | LifecycleError::NoActiveChallenge
        | LifecycleError::InvalidInput { .. } => e.to_string(),
        LifecycleError::Messaging(_) => "Failed to publish to the configured channel. Please check logs.".into(),
        LifecycleError::Storage(_) => "Something went wrong. Please check logs.".into(),
    }
}
