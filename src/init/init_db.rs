use ctfbot_sql_defs::{DB_PATH, SCHEMA};
use sqlx::migrate::MigrateDatabase;
use sqlx::{Sqlite, SqlitePool};

#[tokio::main]
async fn main() {
    // Create the database if it doesn’t exist yet.
    println!("Initialising db...");
    if let Err(e) = Sqlite::create_database(DB_PATH).await {
        panic!("Failed to open db connexion: {}", e);
    }

    // Create DB connexion.
    let pool = SqlitePool::connect(DB_PATH).await.unwrap();

    // Create the tables.
    for statement in SCHEMA {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }

    // Merge everything into one db file.
    sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)").execute(&pool).await.unwrap();
    pool.close().await;
    println!("Done.");
}
