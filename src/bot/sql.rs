use std::str::FromStr;

use ctfbot_sql_defs::SCHEMA;
use poise::serenity_prelude::{ChannelId, GuildId, RoleId, UserId};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a challenge is already active")]
    ActiveChallengeExists,

    #[error("no active challenge")]
    NoActiveChallenge,

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Open the bot database and make sure the schema exists.
//
// A single connexion is enough for this bot; it also serialises the
// create/close transitions at the database level.
pub async fn connect(url: &str) -> StoreResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    for statement in SCHEMA {
        sqlx::query(statement).execute(&pool).await?;
    }
    Ok(pool)
}

/// Where the bot posts in a guild and who is allowed to make it post.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GuildConfig {
    pub creator_role: RoleId,
    pub challenge_channel: ChannelId,
    pub leaderboard_channel: ChannelId,
}

/// Read access to per-guild configuration.
#[derive(Clone)]
pub struct ConfigStore {
    pool: SqlitePool,
}

impl ConfigStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// `None` means the guild has not run `/setup` yet; that is a
    /// user-facing state, not a storage error.
    pub async fn fetch_config(&self, guild: GuildId) -> StoreResult<Option<GuildConfig>> {
        let row: Option<(i64, i64, i64)> = sqlx::query_as(r#"
            SELECT creator_role, challenge_channel, leaderboard_channel
            FROM guild_config
            WHERE guild = ?;
        "#)
            .bind(guild.get() as i64)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(role, challenge, leaderboard)| GuildConfig {
            creator_role: RoleId::new(role as u64),
            challenge_channel: ChannelId::new(challenge as u64),
            leaderboard_channel: ChannelId::new(leaderboard as u64),
        }))
    }

    /// Used by guild setup; the challenge lifecycle never writes config.
    pub async fn save_config(&self, guild: GuildId, config: &GuildConfig) -> StoreResult<()> {
        sqlx::query(r#"
            INSERT INTO guild_config (guild, creator_role, challenge_channel, leaderboard_channel)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (guild) DO UPDATE SET
                creator_role = excluded.creator_role,
                challenge_channel = excluded.challenge_channel,
                leaderboard_channel = excluded.leaderboard_channel;
        "#)
            .bind(guild.get() as i64)
            .bind(config.creator_role.get() as i64)
            .bind(config.challenge_channel.get() as i64)
            .bind(config.leaderboard_channel.get() as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// A first correct solve by one participant.
#[derive(Clone, Copy, Debug)]
pub struct Solve {
    pub user: UserId,
    pub score: i64,
    pub solved_at: i64,
}

/// The active challenge, together with the solves and ratings that
/// accumulated during its active period.
#[derive(Clone, Debug)]
pub struct Challenge {
    pub day: i64,
    pub description: String,
    pub answer: String,
    pub attachment_url: Option<String>,
    pub hints: String,
    pub writeup: Option<String>,
    pub created_by: UserId,
    pub leaderboard: Vec<Solve>,
    pub ratings: Vec<i64>,
}

/// Validated challenge content about to be persisted.
#[derive(Clone, Copy, Debug)]
pub struct NewChallenge<'a> {
    pub created_by: UserId,
    pub description: &'a str,
    pub answer: &'a str,
    pub attachment_url: Option<&'a str>,
    pub hints: &'a str,
    pub writeup: Option<&'a str>,
}

#[derive(FromRow)]
struct ChallengeRow {
    day: i64,
    description: String,
    answer: String,
    attachment: Option<String>,
    hints: String,
    writeup: Option<String>,
    created_by: i64,
}

/// Persistence for the single active challenge per guild and its
/// accumulated solves and ratings.
#[derive(Clone)]
pub struct ChallengeStore {
    pool: SqlitePool,
}

impl ChallengeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Assign the next day number and store the challenge as the sole
    /// active one for the guild.
    ///
    /// The whole transition runs in one transaction; the primary key on
    /// `current_challenge.guild` acts as the compare-and-set that makes
    /// sure two concurrent creations cannot both succeed.
    pub async fn insert_challenge(
        &self,
        guild: GuildId,
        new: NewChallenge<'_>,
    ) -> StoreResult<Challenge> {
        let guild_id = guild.get() as i64;
        let mut tx = self.pool.begin().await?;

        let previous: Option<i64> = sqlx::query_scalar("SELECT day FROM days WHERE guild = ?;")
            .bind(guild_id)
            .fetch_optional(&mut *tx)
            .await?;
        let day = previous.unwrap_or(0) + 1;

        let inserted = sqlx::query(r#"
            INSERT OR IGNORE INTO current_challenge
                (guild, day, description, answer, attachment, hints, writeup, created_by)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?);
        "#)
            .bind(guild_id)
            .bind(day)
            .bind(new.description)
            .bind(new.answer)
            .bind(new.attachment_url)
            .bind(new.hints)
            .bind(new.writeup)
            .bind(new.created_by.get() as i64)
            .execute(&mut *tx)
            .await?;
        if inserted.rows_affected() == 0 {
            return Err(StoreError::ActiveChallengeExists);
        }

        sqlx::query(r#"
            INSERT INTO days (guild, day) VALUES (?, ?)
            ON CONFLICT (guild) DO UPDATE SET day = excluded.day;
        "#)
            .bind(guild_id)
            .bind(day)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Challenge {
            day,
            description: new.description.to_owned(),
            answer: new.answer.to_owned(),
            attachment_url: new.attachment_url.map(str::to_owned),
            hints: new.hints.to_owned(),
            writeup: new.writeup.map(str::to_owned),
            created_by: new.created_by,
            leaderboard: Vec::new(),
            ratings: Vec::new(),
        })
    }

    /// Fetch the active challenge, if any, including the solves and
    /// ratings accumulated so far.
    pub async fn fetch_current_challenge(&self, guild: GuildId) -> StoreResult<Option<Challenge>> {
        let guild_id = guild.get() as i64;

        let Some(row) = sqlx::query_as::<_, ChallengeRow>(r#"
            SELECT day, description, answer, attachment, hints, writeup, created_by
            FROM current_challenge
            WHERE guild = ?;
        "#)
            .bind(guild_id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let solves: Vec<(i64, i64, i64)> = sqlx::query_as(r#"
            SELECT user, score, solved_at FROM solves
            WHERE guild = ? AND day = ?
            ORDER BY solved_at, score DESC;
        "#)
            .bind(guild_id)
            .bind(row.day)
            .fetch_all(&self.pool)
            .await?;

        let ratings: Vec<i64> = sqlx::query_scalar(r#"
            SELECT rating FROM ratings WHERE guild = ? AND day = ?;
        "#)
            .bind(guild_id)
            .bind(row.day)
            .fetch_all(&self.pool)
            .await?;

        Ok(Some(Challenge {
            day: row.day,
            description: row.description,
            answer: row.answer,
            attachment_url: row.attachment,
            hints: row.hints,
            writeup: row.writeup,
            created_by: UserId::new(row.created_by as u64),
            leaderboard: solves
                .into_iter()
                .map(|(user, score, solved_at)| Solve {
                    user: UserId::new(user as u64),
                    score,
                    solved_at,
                })
                .collect(),
            ratings,
        }))
    }

    /// Reset the guild to the no-active-challenge state. Idempotent;
    /// solves and ratings stay behind as history, keyed by day.
    pub async fn clear_challenge(&self, guild: GuildId) -> StoreResult<()> {
        sqlx::query("DELETE FROM current_challenge WHERE guild = ?;")
            .bind(guild.get() as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a participant’s first correct solve for the active
    /// challenge; later correct answers from the same user are ignored.
    pub async fn record_solve(&self, guild: GuildId, user: UserId, score: i64) -> StoreResult<()> {
        let guild_id = guild.get() as i64;
        let mut tx = self.pool.begin().await?;

        let Some(day) = self.active_day(guild_id, &mut tx).await? else {
            return Err(StoreError::NoActiveChallenge);
        };

        sqlx::query(r#"
            INSERT OR IGNORE INTO solves (guild, day, user, score)
            VALUES (?, ?, ?, ?);
        "#)
            .bind(guild_id)
            .bind(day)
            .bind(user.get() as i64)
            .bind(score)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Record a rating for the active challenge; re-rating replaces the
    /// participant’s previous value.
    pub async fn record_rating(&self, guild: GuildId, user: UserId, rating: i64) -> StoreResult<()> {
        let guild_id = guild.get() as i64;
        let mut tx = self.pool.begin().await?;

        let Some(day) = self.active_day(guild_id, &mut tx).await? else {
            return Err(StoreError::NoActiveChallenge);
        };

        sqlx::query(r#"
            INSERT INTO ratings (guild, day, user, rating)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (guild, day, user) DO UPDATE SET rating = excluded.rating;
        "#)
            .bind(guild_id)
            .bind(day)
            .bind(user.get() as i64)
            .bind(rating)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn active_day(
        &self,
        guild_id: i64,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    ) -> StoreResult<Option<i64>> {
        Ok(
            sqlx::query_scalar("SELECT day FROM current_challenge WHERE guild = ?;")
                .bind(guild_id)
                .fetch_optional(&mut **tx)
                .await?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUILD: GuildId = GuildId::new(1);
    const CREATOR: UserId = UserId::new(42);

    async fn stores() -> (ConfigStore, ChallengeStore) {
        let pool = connect("sqlite::memory:").await.unwrap();
        (ConfigStore::new(pool.clone()), ChallengeStore::new(pool))
    }

    fn new_challenge() -> NewChallenge<'static> {
        NewChallenge {
            created_by: CREATOR,
            description: "d",
            answer: "a",
            attachment_url: None,
            hints: "h",
            writeup: None,
        }
    }

    #[tokio::test]
    async fn day_starts_at_one_and_increments() {
        let (_, store) = stores().await;

        let first = store.insert_challenge(GUILD, new_challenge()).await.unwrap();
        assert_eq!(first.day, 1);

        store.clear_challenge(GUILD).await.unwrap();
        let second = store.insert_challenge(GUILD, new_challenge()).await.unwrap();
        assert_eq!(second.day, 2);
    }

    #[tokio::test]
    async fn second_insert_conflicts_and_keeps_the_first() {
        let (_, store) = stores().await;

        store.insert_challenge(GUILD, new_challenge()).await.unwrap();
        let err = store.insert_challenge(GUILD, new_challenge()).await.unwrap_err();
        assert!(matches!(err, StoreError::ActiveChallengeExists));

        // The failed insert must not have bumped the day counter either.
        store.clear_challenge(GUILD).await.unwrap();
        let next = store.insert_challenge(GUILD, new_challenge()).await.unwrap();
        assert_eq!(next.day, 2);
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let (_, store) = stores().await;

        store.insert_challenge(GUILD, new_challenge()).await.unwrap();
        store.clear_challenge(GUILD).await.unwrap();
        assert!(store.fetch_current_challenge(GUILD).await.unwrap().is_none());

        store.clear_challenge(GUILD).await.unwrap();
        assert!(store.fetch_current_challenge(GUILD).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn solves_and_ratings_round_trip() {
        let (_, store) = stores().await;
        let alice = UserId::new(1001);
        let bob = UserId::new(1002);

        store.insert_challenge(GUILD, new_challenge()).await.unwrap();
        store.record_solve(GUILD, alice, 100).await.unwrap();
        store.record_solve(GUILD, alice, 50).await.unwrap(); // Ignored, first solve wins.
        store.record_rating(GUILD, alice, 2).await.unwrap();
        store.record_rating(GUILD, alice, 5).await.unwrap(); // Replaces the 2.
        store.record_rating(GUILD, bob, 3).await.unwrap();

        let challenge = store.fetch_current_challenge(GUILD).await.unwrap().unwrap();
        assert_eq!(challenge.leaderboard.len(), 1);
        assert_eq!(challenge.leaderboard[0].user, alice);
        assert_eq!(challenge.leaderboard[0].score, 100);
        let mut ratings = challenge.ratings.clone();
        ratings.sort();
        assert_eq!(ratings, vec![3, 5]);
    }

    #[tokio::test]
    async fn recording_without_active_challenge_fails() {
        let (_, store) = stores().await;
        let err = store.record_solve(GUILD, CREATOR, 10).await.unwrap_err();
        assert!(matches!(err, StoreError::NoActiveChallenge));
    }

    #[tokio::test]
    async fn config_round_trip() {
        let (config, _) = stores().await;
        assert!(config.fetch_config(GUILD).await.unwrap().is_none());

        let saved = GuildConfig {
            creator_role: RoleId::new(10),
            challenge_channel: ChannelId::new(100),
            leaderboard_channel: ChannelId::new(200),
        };
        config.save_config(GUILD, &saved).await.unwrap();
        assert_eq!(config.fetch_config(GUILD).await.unwrap(), Some(saved));
    }
}
