use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::error::Result;

/// Statements creating the schema. All idempotent, run inside one
/// transaction so a half-applied migration never survives.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS sites (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        original_url TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS frontpages (
        id INTEGER PRIMARY KEY,
        site_id INTEGER NOT NULL REFERENCES sites(id) ON DELETE CASCADE,
        archived_at TEXT NOT NULL,
        scheduled_at TEXT NOT NULL,
        url_original TEXT NOT NULL,
        url_snapshot TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY,
        url TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS titles (
        id INTEGER PRIMARY KEY,
        text TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS main_articles (
        id INTEGER PRIMARY KEY,
        frontpage_id INTEGER NOT NULL REFERENCES frontpages(id) ON DELETE CASCADE,
        article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
        title_id INTEGER NOT NULL REFERENCES titles(id) ON DELETE CASCADE,
        url TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS top_articles (
        id INTEGER PRIMARY KEY,
        frontpage_id INTEGER NOT NULL REFERENCES frontpages(id) ON DELETE CASCADE,
        article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
        title_id INTEGER NOT NULL REFERENCES titles(id) ON DELETE CASCADE,
        url TEXT NOT NULL,
        rank INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS embeddings (
        id INTEGER PRIMARY KEY,
        title_id INTEGER NOT NULL REFERENCES titles(id) ON DELETE CASCADE,
        vector BLOB NOT NULL
    )",
    // Natural keys. Every insert is keyed on one of these.
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_sites_name ON sites(name)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_frontpages_site_scheduled
        ON frontpages(site_id, scheduled_at)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_articles_url ON articles(url)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_titles_text ON titles(text)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_main_articles_frontpage
        ON main_articles(frontpage_id, article_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_top_articles_frontpage
        ON top_articles(frontpage_id, article_id, rank)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_embeddings_title ON embeddings(title_id)",
    // Every main/top appearance of an article, joined up for the read side.
    "CREATE VIEW IF NOT EXISTS frontpage_appearances AS
        SELECT
            f.id AS frontpage_id,
            f.site_id,
            s.name AS site_name,
            f.scheduled_at,
            a.id AS article_id,
            t.id AS title_id,
            t.text AS title,
            a.url AS url_article,
            ma.url AS url_archive,
            1 AS is_main,
            NULL AS rank
        FROM main_articles ma
        JOIN frontpages f ON f.id = ma.frontpage_id
        JOIN sites s ON s.id = f.site_id
        JOIN articles a ON a.id = ma.article_id
        JOIN titles t ON t.id = ma.title_id
        UNION ALL
        SELECT
            f.id,
            f.site_id,
            s.name,
            f.scheduled_at,
            a.id,
            t.id,
            t.text,
            a.url,
            ta.url,
            0,
            ta.rank
        FROM top_articles ta
        JOIN frontpages f ON f.id = ta.frontpage_id
        JOIN sites s ON s.id = f.site_id
        JOIN articles a ON a.id = ta.article_id
        JOIN titles t ON t.id = ta.title_id",
];

/// Open (creating if needed) the SQLite database and apply the schema.
pub async fn open_pool(path: &str) -> Result<SqlitePool> {
    // busy_timeout absorbs transient lock contention between the writer
    // lane and readers instead of surfacing SQLITE_BUSY.
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{path}"))?
        .create_if_missing(true)
        .foreign_keys(true)
        .pragma("busy_timeout", "5000");

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

async fn migrate(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;
    for &statement in SCHEMA {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}
