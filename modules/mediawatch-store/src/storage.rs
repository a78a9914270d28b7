use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat};
use sqlx::{SqliteConnection, SqlitePool};
use tokio::sync::Mutex;
use tracing::debug;

use mediawatch_sites::{FrontPage, SiteSpec};

use crate::error::{Result, StoreError};
use crate::schema::open_pool;
use crate::types::{ArticleOnFrontPage, NeighbouringMainArticle, SiteRow, TitleRow};
use crate::vector;

/// The relational store shared between the ingestion pipeline (writer)
/// and the read side.
///
/// Reads go straight to the pool; writes are serialised through one
/// in-process lane on top of SQLite's own single-writer model.
pub struct Storage {
    pool: SqlitePool,
    writer: Mutex<()>,
}

type AppearanceRow = (
    i64,         // frontpage_id
    i64,         // site_id
    String,      // site_name
    String,      // scheduled_at
    i64,         // article_id
    i64,         // title_id
    String,      // title
    String,      // url_article
    String,      // url_archive
    i64,         // is_main
    Option<i64>, // rank
);

const APPEARANCE_COLUMNS: &str = "frontpage_id, site_id, site_name, scheduled_at, \
     article_id, title_id, title, url_article, url_archive, is_main, rank";

type NeighbourRow = (
    i64,
    i64,
    String,
    String,
    i64,
    i64,
    String,
    String,
    String,
    i64,
    Option<i64>,
    i64,
);

impl Storage {
    /// Open (creating if needed) the database at `path` and apply the
    /// schema.
    pub async fn open(path: &str) -> Result<Self> {
        let pool = open_pool(path).await?;
        Ok(Self {
            pool,
            writer: Mutex::new(()),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Whether a front page is already stored for (site, scheduled
    /// instant). The pipeline uses this as its idempotency check.
    pub async fn front_page_exists(
        &self,
        site_name: &str,
        scheduled_at: &DateTime<FixedOffset>,
    ) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1
             FROM frontpages f
             JOIN sites s ON s.id = f.site_id
             WHERE s.name = ?1 AND f.scheduled_at = ?2",
        )
        .bind(site_name)
        .bind(encode_offset(scheduled_at))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// Store one captured front page in a single transaction.
    ///
    /// Every row uses insert-or-get on its natural key, so replaying the
    /// same page is a no-op and never violates a uniqueness constraint.
    /// Returns the site id.
    pub async fn add_page(
        &self,
        collection: &SiteSpec,
        page: &FrontPage,
        scheduled_at: &DateTime<FixedOffset>,
    ) -> Result<i64> {
        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;

        let site_id = insert_or_get_site(&mut *tx, collection.name, collection.url).await?;
        let frontpage_id = insert_or_get_frontpage(
            &mut *tx,
            site_id,
            &page.snapshot_id.timestamp,
            scheduled_at,
            &page.snapshot_id.original,
            &page.snapshot_id.web_url(),
        )
        .await?;

        let main = &page.main_article.article;
        let article_id = insert_or_get_article(&mut *tx, main.original_url.as_str()).await?;
        let title_id = insert_or_get_title(&mut *tx, &main.title).await?;
        sqlx::query(
            "INSERT INTO main_articles (frontpage_id, article_id, title_id, url)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(frontpage_id, article_id) DO NOTHING",
        )
        .bind(frontpage_id)
        .bind(article_id)
        .bind(title_id)
        .bind(main.archive_url.as_str())
        .execute(&mut *tx)
        .await?;

        for top in &page.top_articles {
            let article_id =
                insert_or_get_article(&mut *tx, top.article.original_url.as_str()).await?;
            let title_id = insert_or_get_title(&mut *tx, &top.article.title).await?;
            sqlx::query(
                "INSERT INTO top_articles (frontpage_id, article_id, title_id, url, rank)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(frontpage_id, article_id, rank) DO NOTHING",
            )
            .bind(frontpage_id)
            .bind(article_id)
            .bind(title_id)
            .bind(top.article.archive_url.as_str())
            .bind(top.rank as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            site = collection.name,
            frontpage_id,
            top_articles = page.top_articles.len(),
            "Stored front page"
        );
        Ok(site_id)
    }

    pub async fn list_sites(&self) -> Result<Vec<SiteRow>> {
        let rows: Vec<(i64, String, String)> =
            sqlx::query_as("SELECT id, name, original_url FROM sites ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name, original_url)| SiteRow {
                id,
                name,
                original_url,
            })
            .collect())
    }

    /// Main articles around an anchor instant: everything published at
    /// exactly the anchor (all sites, the focused article included), plus
    /// the single next and single previous main article on the same
    /// site. `time_diff_secs` is signed seconds relative to the anchor.
    ///
    /// With no explicit anchor, the site's latest front page is used.
    pub async fn list_neighbouring_main_articles(
        &self,
        site_id: i64,
        scheduled_at: Option<&DateTime<FixedOffset>>,
    ) -> Result<Vec<NeighbouringMainArticle>> {
        let anchor = match scheduled_at {
            Some(dt) => encode_offset(dt),
            None => self.latest_scheduled_at(site_id).await?,
        };

        // Three statements over the appearance view, merged in order:
        // everything at exactly the anchor, then the single next and the
        // single previous main article on the focused site.
        let simultaneous = format!(
            "SELECT {APPEARANCE_COLUMNS},
                    unixepoch(scheduled_at) - unixepoch(?1) AS time_diff
             FROM frontpage_appearances
             WHERE is_main = 1 AND unixepoch(scheduled_at) = unixepoch(?1)
             ORDER BY site_id"
        );
        let after = format!(
            "SELECT {APPEARANCE_COLUMNS},
                    unixepoch(scheduled_at) - unixepoch(?1) AS time_diff
             FROM frontpage_appearances
             WHERE is_main = 1 AND site_id = ?2
               AND unixepoch(scheduled_at) - unixepoch(?1) > 0
             ORDER BY time_diff
             LIMIT 1"
        );
        let before = format!(
            "SELECT {APPEARANCE_COLUMNS},
                    unixepoch(scheduled_at) - unixepoch(?1) AS time_diff
             FROM frontpage_appearances
             WHERE is_main = 1 AND site_id = ?2
               AND unixepoch(scheduled_at) - unixepoch(?1) < 0
             ORDER BY time_diff DESC
             LIMIT 1"
        );

        let mut rows: Vec<NeighbourRow> = sqlx::query_as(&simultaneous)
            .bind(&anchor)
            .fetch_all(&self.pool)
            .await?;
        for query in [after.as_str(), before.as_str()] {
            rows.extend(
                sqlx::query_as::<_, NeighbourRow>(query)
                    .bind(&anchor)
                    .bind(site_id)
                    .fetch_all(&self.pool)
                    .await?,
            );
        }

        rows.into_iter()
            .map(|row| {
                let (
                    frontpage_id,
                    site_id,
                    site_name,
                    scheduled_at,
                    article_id,
                    title_id,
                    title,
                    url_article,
                    url_archive,
                    is_main,
                    rank,
                    time_diff_secs,
                ) = row;
                Ok(NeighbouringMainArticle {
                    article: build_appearance((
                        frontpage_id,
                        site_id,
                        site_name,
                        scheduled_at,
                        article_id,
                        title_id,
                        title,
                        url_article,
                        url_archive,
                        is_main,
                        rank,
                    ))?,
                    time_diff_secs,
                })
            })
            .collect()
    }

    /// Every front-page appearance (main or top) of the given titles.
    /// An empty input is an empty result, not a query error.
    pub async fn list_articles_on_frontpage(
        &self,
        title_ids: &[i64],
    ) -> Result<Vec<ArticleOnFrontPage>> {
        if title_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; title_ids.len()].join(", ");
        let query = format!(
            "SELECT {APPEARANCE_COLUMNS}
             FROM frontpage_appearances
             WHERE title_id IN ({placeholders})
             ORDER BY frontpage_id, is_main DESC, rank"
        );

        let mut q = sqlx::query_as::<_, AppearanceRow>(&query);
        for &id in title_ids {
            q = q.bind(id);
        }
        let rows = q.fetch_all(&self.pool).await?;

        rows.into_iter().map(build_appearance).collect()
    }

    pub async fn list_titles_without_embedding(&self) -> Result<Vec<TitleRow>> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT t.id, t.text
             FROM titles t
             WHERE NOT EXISTS (SELECT 1 FROM embeddings e WHERE e.title_id = t.id)
             ORDER BY t.id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, text)| TitleRow { id, text })
            .collect())
    }

    pub async fn list_all_embeddings(&self) -> Result<Vec<(i64, Vec<f32>)>> {
        let rows: Vec<(i64, Vec<u8>)> =
            sqlx::query_as("SELECT title_id, vector FROM embeddings ORDER BY title_id")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(title_id, bytes)| {
                let len = bytes.len();
                vector::from_le_bytes(&bytes)
                    .map(|v| (title_id, v))
                    .ok_or(StoreError::MalformedVector { title_id, len })
            })
            .collect()
    }

    /// Persist one title's vector. A title has at most one embedding;
    /// replays are swallowed by the natural key.
    pub async fn add_embedding(&self, title_id: i64, embedding: &[f32]) -> Result<()> {
        let _writer = self.writer.lock().await;
        sqlx::query(
            "INSERT INTO embeddings (title_id, vector)
             VALUES (?1, ?2)
             ON CONFLICT(title_id) DO NOTHING",
        )
        .bind(title_id)
        .bind(vector::to_le_bytes(embedding))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_scheduled_at(&self, site_id: i64) -> Result<String> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT scheduled_at
             FROM frontpages
             WHERE site_id = ?1
             ORDER BY unixepoch(scheduled_at) DESC
             LIMIT 1",
        )
        .bind(site_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(ts,)| ts)
            .ok_or(StoreError::NoFrontPages { site_id })
    }
}

async fn insert_or_get_site(
    conn: &mut SqliteConnection,
    name: &str,
    original_url: &str,
) -> Result<i64> {
    sqlx::query(
        "INSERT INTO sites (name, original_url) VALUES (?1, ?2)
         ON CONFLICT(name) DO NOTHING",
    )
    .bind(name)
    .bind(original_url)
    .execute(&mut *conn)
    .await?;

    let (id,): (i64,) = sqlx::query_as("SELECT id FROM sites WHERE name = ?1")
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;
    Ok(id)
}

async fn insert_or_get_frontpage(
    conn: &mut SqliteConnection,
    site_id: i64,
    archived_at: &NaiveDateTime,
    scheduled_at: &DateTime<FixedOffset>,
    url_original: &str,
    url_snapshot: &str,
) -> Result<i64> {
    let scheduled = encode_offset(scheduled_at);
    sqlx::query(
        "INSERT INTO frontpages (site_id, archived_at, scheduled_at, url_original, url_snapshot)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(site_id, scheduled_at) DO NOTHING",
    )
    .bind(site_id)
    .bind(encode_utc(archived_at))
    .bind(&scheduled)
    .bind(url_original)
    .bind(url_snapshot)
    .execute(&mut *conn)
    .await?;

    let (id,): (i64,) =
        sqlx::query_as("SELECT id FROM frontpages WHERE site_id = ?1 AND scheduled_at = ?2")
            .bind(site_id)
            .bind(&scheduled)
            .fetch_one(&mut *conn)
            .await?;
    Ok(id)
}

async fn insert_or_get_article(conn: &mut SqliteConnection, url: &str) -> Result<i64> {
    sqlx::query("INSERT INTO articles (url) VALUES (?1) ON CONFLICT(url) DO NOTHING")
        .bind(url)
        .execute(&mut *conn)
        .await?;

    let (id,): (i64,) = sqlx::query_as("SELECT id FROM articles WHERE url = ?1")
        .bind(url)
        .fetch_one(&mut *conn)
        .await?;
    Ok(id)
}

async fn insert_or_get_title(conn: &mut SqliteConnection, text: &str) -> Result<i64> {
    sqlx::query("INSERT INTO titles (text) VALUES (?1) ON CONFLICT(text) DO NOTHING")
        .bind(text)
        .execute(&mut *conn)
        .await?;

    let (id,): (i64,) = sqlx::query_as("SELECT id FROM titles WHERE text = ?1")
        .bind(text)
        .fetch_one(&mut *conn)
        .await?;
    Ok(id)
}

fn build_appearance(row: AppearanceRow) -> Result<ArticleOnFrontPage> {
    let (
        frontpage_id,
        site_id,
        site_name,
        scheduled_at,
        article_id,
        title_id,
        title,
        url_article,
        url_archive,
        is_main,
        rank,
    ) = row;

    let scheduled_at = DateTime::parse_from_rfc3339(&scheduled_at)
        .map_err(|_| StoreError::MalformedTimestamp(scheduled_at))?;

    Ok(ArticleOnFrontPage {
        frontpage_id,
        site_id,
        site_name,
        scheduled_at,
        article_id,
        title_id,
        title,
        url_article,
        url_archive,
        is_main: is_main != 0,
        rank,
    })
}

/// Scheduled instants keep their local offset so window queries stay
/// consistent across DST transitions.
fn encode_offset(dt: &DateTime<FixedOffset>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Archive capture instants are UTC.
fn encode_utc(ts: &NaiveDateTime) -> String {
    ts.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true)
}
