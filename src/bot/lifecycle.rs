use std::sync::Arc;

use poise::serenity_prelude::{CreateEmbedFooter, GuildId, RoleId, UserId};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::core::{create_embed, spoiler};
use crate::leaderboard;
use crate::messaging::{Messenger, MessagingError};
use crate::sql::{ChallengeStore, ConfigStore, GuildConfig, NewChallenge, StoreError};

/// URL schemes accepted for challenge attachments.
const ALLOWED_ATTACHMENT_SCHEMES: &[&str] = &["http", "https", "discord"];

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Failed to fetch config. Did you run `/setup`?")]
    NotConfigured,

    #[error("You don't have permission to manage challenges!")]
    Unauthorized,

    #[error("Invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("A challenge is already active; shut it down first.")]
    AlreadyActive,

    #[error("No active challenge to shut down.")]
    NoActiveChallenge,

    #[error("failed to publish: {0}")]
    Messaging(#[from] MessagingError),

    #[error("storage error: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for LifecycleError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ActiveChallengeExists => LifecycleError::AlreadyActive,
            StoreError::NoActiveChallenge => LifecycleError::NoActiveChallenge,
            other => LifecycleError::Storage(other),
        }
    }
}

/// Who is invoking an admin operation. Derived per invocation from the
/// interaction; never persisted.
#[derive(Clone, Debug)]
pub struct Caller {
    pub id: UserId,
    pub name: String,
    pub roles: Vec<RoleId>,
}

/// Raw values collected from the challenge entry form, before
/// validation.
#[derive(Clone, Debug, Default)]
pub struct ChallengeForm {
    pub description: String,
    pub answer: String,
    pub attachment: Option<String>,
    pub hints: String,
    pub writeup: Option<String>,
}

struct ValidatedForm {
    description: String,
    answer: String,
    attachment: Option<String>,
    hints: String,
    writeup: Option<String>,
}

/// The single-active-challenge state machine: `create` moves a guild
/// from no-active-challenge to active, `close` publishes the results
/// and moves it back.
pub struct ChallengeLifecycle {
    config: ConfigStore,
    store: ChallengeStore,
    messenger: Arc<dyn Messenger>,
}

impl ChallengeLifecycle {
    pub fn new(config: ConfigStore, store: ChallengeStore, messenger: Arc<dyn Messenger>) -> Self {
        Self { config, store, messenger }
    }

    /// Fetch the guild config and check that the caller holds the
    /// creator role. Both admin operations start here.
    pub async fn authorize(&self, guild: GuildId, caller: &Caller) -> Result<GuildConfig, LifecycleError> {
        let Some(config) = self
            .config
            .fetch_config(guild)
            .await
            .map_err(LifecycleError::Storage)?
        else {
            return Err(LifecycleError::NotConfigured);
        };

        if !caller.roles.contains(&config.creator_role) {
            return Err(LifecycleError::Unauthorized);
        }

        Ok(config)
    }

    /// Create a new challenge: authorize, validate the form, persist it
    /// as the sole active challenge, then announce it. The answer never
    /// appears in the announcement. Returns the assigned day number.
    ///
    /// If persisting succeeds but announcing fails, the challenge stays
    /// active in the store and the error is reported to the caller.
    pub async fn create(
        &self,
        guild: GuildId,
        caller: &Caller,
        form: &ChallengeForm,
    ) -> Result<i64, LifecycleError> {
        let config = self.authorize(guild, caller).await?;
        let form = validate(form)?;

        let challenge = self
            .store
            .insert_challenge(guild, NewChallenge {
                created_by: caller.id,
                description: &form.description,
                answer: &form.answer,
                attachment_url: form.attachment.as_deref(),
                hints: &form.hints,
                writeup: form.writeup.as_deref(),
            })
            .await?;
        info!("Created challenge for day {} in guild {}", challenge.day, guild);

        self.messenger
            .send_message(config.challenge_channel, "@everyone")
            .await?;

        let embed = create_embed()
            .title(format!("Day: {} Challenge", challenge.day))
            .field("Description:", format!("```{}```", challenge.description), false)
            .footer(CreateEmbedFooter::new(format!(
                "Challenge submitted by {}",
                caller.name
            )));
        self.messenger
            .send_embed(config.challenge_channel, embed, challenge.attachment_url.as_deref())
            .await?;

        Ok(challenge.day)
    }

    /// Shut down the active challenge: publish the leaderboard, the
    /// answer, the write-up, and the average rating, then clear the
    /// record. Clearing is the commit point; any publish failure leaves
    /// the challenge active so that `close` can be retried.
    pub async fn close(&self, guild: GuildId, caller: &Caller) -> Result<i64, LifecycleError> {
        let config = self.authorize(guild, caller).await?;

        let Some(challenge) = self.store.fetch_current_challenge(guild).await? else {
            return Err(LifecycleError::NoActiveChallenge);
        };
        let channel = config.leaderboard_channel;

        let ranked = leaderboard::compute_leaderboard(&challenge);
        if ranked.is_empty() {
            self.messenger
                .send_message(channel, "No one has solved the challenge yet.")
                .await?;
        } else {
            let embed = leaderboard::leaderboard_embed(challenge.day, &ranked);
            self.messenger.send_embed(channel, embed, None).await?;
        }

        self.messenger
            .send_message(
                channel,
                &format!(
                    "Correct answer for Day-{} was: {}",
                    challenge.day,
                    spoiler(&challenge.answer)
                ),
            )
            .await?;

        match &challenge.writeup {
            Some(writeup) => {
                self.messenger
                    .send_message(channel, &format!("Official Writeup: {}", writeup))
                    .await?
            }
            None => {
                self.messenger
                    .send_message(channel, &format!("No official writeup for Day-{}", challenge.day))
                    .await?
            }
        }

        match leaderboard::compute_average_rating(&challenge) {
            Some(avg) => {
                self.messenger
                    .send_message(
                        channel,
                        &format!("The average rating for the challenge is: {:.2}", avg),
                    )
                    .await?
            }
            None => {
                self.messenger
                    .send_message(channel, "No ratings received for the challenge.")
                    .await?
            }
        }

        // Everything is published; this is the commit point.
        self.store.clear_challenge(guild).await?;
        info!("Closed challenge for day {} in guild {}", challenge.day, guild);
        Ok(challenge.day)
    }
}

fn validate(form: &ChallengeForm) -> Result<ValidatedForm, LifecycleError> {
    fn required(field: &'static str, value: &str) -> Result<String, LifecycleError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(LifecycleError::InvalidInput {
                field,
                reason: "must not be empty".into(),
            });
        }
        Ok(value.to_owned())
    }

    fn optional(value: &Option<String>) -> Option<String> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    }

    let attachment = match optional(&form.attachment) {
        None => None,
        Some(raw) => Some(validate_attachment_url(&raw)?),
    };

    Ok(ValidatedForm {
        description: required("description", &form.description)?,
        answer: required("answer", &form.answer)?,
        attachment,
        hints: required("hints", &form.hints)?,
        writeup: optional(&form.writeup),
    })
}

/// Attachment URLs must parse and carry an allowed scheme; this is
/// checked here, at validation time, so scheme problems get their own
/// precise error instead of a generic failure.
fn validate_attachment_url(raw: &str) -> Result<String, LifecycleError> {
    let invalid = |reason: String| LifecycleError::InvalidInput { field: "attachment", reason };

    let url = Url::parse(raw).map_err(|_| {
        invalid(format!(
            "not a valid URL; provide one with a {} scheme",
            ALLOWED_ATTACHMENT_SCHEMES.join("/")
        ))
    })?;

    if !ALLOWED_ATTACHMENT_SCHEMES.contains(&url.scheme()) {
        return Err(invalid(format!(
            "URL scheme '{}' is not allowed; use one of {}",
            url.scheme(),
            ALLOWED_ATTACHMENT_SCHEMES.join(", ")
        )));
    }

    Ok(url.into())
}
