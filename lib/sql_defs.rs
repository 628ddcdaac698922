use const_format::formatcp;

pub const DB_PATH: &str = "ctfbot.db";

/// Per-guild bot configuration. Written by guild setup; the challenge
/// lifecycle only ever reads it.
pub const GUILD_CONFIG_DDL: &str = r#"
    CREATE TABLE IF NOT EXISTS guild_config (
        guild INTEGER PRIMARY KEY, -- Discord guild ID.
        creator_role INTEGER NOT NULL, -- Role allowed to manage challenges.
        challenge_channel INTEGER NOT NULL, -- Where new challenges are announced.
        leaderboard_channel INTEGER NOT NULL -- Where results are published.
    ) STRICT;
"#;

/// The active challenge, if any. The primary key on `guild` means a
/// guild can never have more than one active challenge; inserting a
/// second one is a no-op that the store reports as a conflict.
pub const CURRENT_CHALLENGE_DDL: &str = r#"
    CREATE TABLE IF NOT EXISTS current_challenge (
        guild INTEGER PRIMARY KEY, -- Discord guild ID.
        day INTEGER NOT NULL, -- Day number of this challenge.
        description TEXT NOT NULL,
        answer TEXT NOT NULL, -- Hidden until the challenge is shut down.
        attachment TEXT, -- Optional URL for challenge files.
        hints TEXT NOT NULL,
        writeup TEXT, -- Optional official write-up.
        created_by INTEGER NOT NULL, -- Discord user ID of the creator.
        created_at INTEGER NOT NULL DEFAULT (unixepoch())
    ) STRICT;
"#;

/// Day counter, one row per guild. Survives shutdowns so that each new
/// challenge gets the next day number.
pub const DAYS_DDL: &str = r#"
    CREATE TABLE IF NOT EXISTS days (
        guild INTEGER PRIMARY KEY, -- Discord guild ID.
        day INTEGER NOT NULL -- Day number of the most recent challenge.
    ) STRICT;
"#;

/// Day numbers only ever go up.
pub const DAYS_TRIGGER_DDL: &str = formatcp!(r#"
    CREATE TRIGGER IF NOT EXISTS day_regression
    BEFORE UPDATE OF day ON days
    WHEN NEW.day <= OLD.day
    BEGIN
        SELECT RAISE(ABORT, "day numbers must be monotonically increasing!");
    END;
"#);

/// First correct solve per participant. Keyed by day so the rows remain
/// as history after the challenge is cleared.
pub const SOLVES_DDL: &str = r#"
    CREATE TABLE IF NOT EXISTS solves (
        guild INTEGER NOT NULL, -- Discord guild ID.
        day INTEGER NOT NULL, -- Day the solve belongs to.
        user INTEGER NOT NULL, -- Discord user ID of the solver.
        score INTEGER NOT NULL DEFAULT 0, -- Points awarded for the solve.
        solved_at INTEGER NOT NULL DEFAULT (unixepoch()), -- Time of the solve.
        PRIMARY KEY (guild, day, user)
    ) STRICT;
"#;

/// Challenge ratings, one per participant and day; a re-rating replaces
/// the previous value.
pub const RATINGS_DDL: &str = r#"
    CREATE TABLE IF NOT EXISTS ratings (
        guild INTEGER NOT NULL, -- Discord guild ID.
        day INTEGER NOT NULL, -- Day the rating belongs to.
        user INTEGER NOT NULL, -- Discord user ID of the rater.
        rating INTEGER NOT NULL, -- Numeric rating.
        PRIMARY KEY (guild, day, user)
    ) STRICT;
"#;

/// Statements that bring a database up to the current schema, in
/// execution order.
pub const SCHEMA: &[&str] = &[
    GUILD_CONFIG_DDL,
    CURRENT_CHALLENGE_DDL,
    DAYS_DDL,
    DAYS_TRIGGER_DDL,
    SOLVES_DDL,
    RATINGS_DDL,
];
