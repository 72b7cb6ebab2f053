// src/store/mod.rs
//! Relational store for the pipeline: headlines, generated templates, in-kind items.
//! Every mutation runs in its own transaction so a failure mid-batch rolls back
//! only the current item, never the whole run.

pub mod models;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::generate::schema::ReliefTemplate;
use models::{CandidateRow, GenerateRelief, GeneratedInkind, Headline, NewHeadline};

/// Sentinel category for headlines the classifier rejected.
pub const NON_DISASTER: &str = "non-disaster";

/// Unranked sentinel for `urgency_rank`.
pub const UNRANKED: i64 = -1;

/// Outcome of the one-way consumption flip. Returned as a code, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseOutcome {
    Used,
    NotFound,
    AlreadyUsed,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) a SQLite database and initialize the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("parsing database url {url}"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .context("opening sqlite pool")?;
        init(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory database for tests. A single never-recycled connection keeps
    /// the database alive and shared across all queries on the pool.
    pub async fn in_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await
            .context("opening in-memory sqlite")?;
        init(&pool).await?;
        Ok(Self { pool })
    }

    // ---- Headlines ----

    pub async fn headline_by_link(&self, link: &str) -> Result<Option<Headline>> {
        let row = sqlx::query_as::<_, Headline>("SELECT * FROM headlines WHERE link = ?")
            .bind(link)
            .fetch_optional(&self.pool)
            .await
            .context("querying headline by link")?;
        Ok(row)
    }

    pub async fn insert_headline(&self, new: &NewHeadline) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let res = sqlx::query(
            "INSERT INTO headlines (title, link, disaster_type, posted_datetime, article_body, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.title)
        .bind(&new.link)
        .bind(&new.disaster_type)
        .bind(new.posted_datetime)
        .bind(&new.article_body)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .context("inserting headline")?;
        tx.commit().await?;
        Ok(res.last_insert_rowid())
    }

    /// Classified headlines, newest first. The posted-date upper bound guards
    /// against future-dated articles from the source.
    pub async fn recent_disasters(&self, limit: i64, offset: i64) -> Result<Vec<Headline>> {
        let horizon = Utc::now() + Duration::weeks(2);
        let rows = sqlx::query_as::<_, Headline>(
            "SELECT * FROM headlines \
             WHERE disaster_type != ? AND posted_datetime < ? \
             ORDER BY posted_datetime DESC LIMIT ? OFFSET ?",
        )
        .bind(NON_DISASTER)
        .bind(horizon)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("querying recent disaster headlines")?;
        Ok(rows)
    }

    /// Headlines with no template yet: the generator's work queue.
    pub async fn untemplated_headlines(&self, limit: i64, offset: i64) -> Result<Vec<Headline>> {
        let rows = sqlx::query_as::<_, Headline>(
            "SELECT * FROM headlines \
             WHERE id NOT IN (SELECT headline_id FROM generate_relief) \
             ORDER BY id LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("querying untemplated headlines")?;
        Ok(rows)
    }

    // ---- Templates ----

    /// Persist a template and its in-kind children as one unit of work.
    pub async fn insert_template(&self, headline_id: i64, tpl: &ReliefTemplate) -> Result<i64> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let res = sqlx::query(
            "INSERT INTO generate_relief \
             (headline_id, relief_title, description, monetary_goal, deployment_date, \
              is_used, urgency_rank, created_at) \
             VALUES (?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(headline_id)
        .bind(&tpl.relief_title)
        .bind(&tpl.description)
        .bind(tpl.monetary_goal)
        .bind(tpl.deployment_date)
        .bind(UNRANKED)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("inserting generated relief")?;
        let relief_id = res.last_insert_rowid();

        for item in &tpl.inkind {
            sqlx::query(
                "INSERT INTO generated_inkind (generate_relief_id, item, item_desc, quantity) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(relief_id)
            .bind(&item.item)
            .bind(&item.item_desc)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await
            .context("inserting in-kind item")?;
        }

        tx.commit().await?;
        Ok(relief_id)
    }

    pub async fn template_by_id(&self, id: i64) -> Result<Option<GenerateRelief>> {
        let row = sqlx::query_as::<_, GenerateRelief>("SELECT * FROM generate_relief WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("querying generated relief by id")?;
        Ok(row)
    }

    pub async fn templates_for_headline(&self, headline_id: i64) -> Result<Vec<GenerateRelief>> {
        let rows = sqlx::query_as::<_, GenerateRelief>(
            "SELECT * FROM generate_relief WHERE headline_id = ? ORDER BY id",
        )
        .bind(headline_id)
        .fetch_all(&self.pool)
        .await
        .context("querying templates for headline")?;
        Ok(rows)
    }

    /// Not-yet-used templates joined with their headlines, oldest first.
    pub async fn generated_candidates(&self, limit: i64, offset: i64) -> Result<Vec<CandidateRow>> {
        let rows = sqlx::query_as::<_, CandidateRow>(
            "SELECT gr.id, gr.headline_id, gr.relief_title, gr.description, gr.monetary_goal, \
                    gr.deployment_date, gr.is_used, gr.urgency_rank, \
                    h.disaster_type, h.title AS headline_title, h.link, \
                    h.posted_datetime AS date_posted \
             FROM generate_relief gr \
             JOIN headlines h ON h.id = gr.headline_id \
             WHERE gr.is_used = 0 \
             ORDER BY gr.created_at, gr.id LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("querying generated candidates")?;
        Ok(rows)
    }

    pub async fn inkind_for(&self, relief_id: i64) -> Result<Vec<GeneratedInkind>> {
        let rows = sqlx::query_as::<_, GeneratedInkind>(
            "SELECT * FROM generated_inkind WHERE generate_relief_id = ? ORDER BY id",
        )
        .bind(relief_id)
        .fetch_all(&self.pool)
        .await
        .context("querying in-kind items")?;
        Ok(rows)
    }

    /// Ranks are advisory and recomputed per pass; a failed write is not fatal
    /// to the listing that triggered it.
    pub async fn update_urgency(&self, id: i64, rank: i64) -> Result<()> {
        sqlx::query("UPDATE generate_relief SET urgency_rank = ?, updated_at = ? WHERE id = ?")
            .bind(rank)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("updating urgency rank")?;
        Ok(())
    }

    /// The one-way `is_used` flip. The UPDATE is guarded by `is_used = 0` so a
    /// concurrent consumer cannot double-flip.
    pub async fn use_generated(&self, id: i64) -> Result<UseOutcome> {
        let mut tx = self.pool.begin().await?;
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT is_used FROM generate_relief WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .context("querying is_used")?;

        let outcome = match row {
            None => UseOutcome::NotFound,
            Some((true,)) => UseOutcome::AlreadyUsed,
            Some((false,)) => {
                let res = sqlx::query(
                    "UPDATE generate_relief SET is_used = 1, updated_at = ? \
                     WHERE id = ? AND is_used = 0",
                )
                .bind(Utc::now())
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("flipping is_used")?;
                if res.rows_affected() == 1 {
                    UseOutcome::Used
                } else {
                    UseOutcome::AlreadyUsed
                }
            }
        };
        tx.commit().await?;
        Ok(outcome)
    }
}

async fn init(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS headlines (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          title TEXT NOT NULL,
          link TEXT NOT NULL,
          disaster_type TEXT NOT NULL,
          posted_datetime TEXT NOT NULL,
          article_body TEXT NOT NULL,
          created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("creating headlines table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS generate_relief (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          headline_id INTEGER NOT NULL REFERENCES headlines(id),
          relief_title TEXT NOT NULL,
          description TEXT NOT NULL,
          monetary_goal INTEGER NOT NULL,
          deployment_date TEXT NOT NULL,
          is_used INTEGER NOT NULL DEFAULT 0,
          urgency_rank INTEGER NOT NULL DEFAULT -1,
          created_at TEXT NOT NULL,
          updated_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await
    .context("creating generate_relief table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS generated_inkind (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          generate_relief_id INTEGER NOT NULL REFERENCES generate_relief(id),
          item TEXT NOT NULL,
          item_desc TEXT NOT NULL,
          quantity INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("creating generated_inkind table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_headlines_link ON headlines(link)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_generate_relief_headline ON generate_relief(headline_id)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::schema::{InkindItem, ReliefTemplate};
    use crate::store::models::NewHeadline;
    use chrono::NaiveDate;

    fn headline(n: usize) -> NewHeadline {
        NewHeadline {
            title: format!("Headline {n}"),
            link: format!("https://news.example/h{n}"),
            disaster_type: "fire".into(),
            posted_datetime: Utc::now(),
            article_body: "Body.".into(),
        }
    }

    fn template() -> ReliefTemplate {
        ReliefTemplate {
            relief_title: "Relief".into(),
            description: "Aid.".into(),
            monetary_goal: 1000,
            deployment_date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            inkind: vec![
                InkindItem {
                    item: "Water".into(),
                    item_desc: "Bottled".into(),
                    quantity: 10,
                },
                InkindItem {
                    item: "Blankets".into(),
                    item_desc: "Thermal".into(),
                    quantity: 5,
                },
            ],
        }
    }

    #[tokio::test]
    async fn use_gate_is_one_way() {
        let store = Store::in_memory().await.unwrap();
        let hid = store.insert_headline(&headline(1)).await.unwrap();
        let rid = store.insert_template(hid, &template()).await.unwrap();

        assert_eq!(store.use_generated(rid).await.unwrap(), UseOutcome::Used);
        assert_eq!(
            store.use_generated(rid).await.unwrap(),
            UseOutcome::AlreadyUsed
        );
        assert_eq!(
            store.use_generated(999).await.unwrap(),
            UseOutcome::NotFound
        );

        let row = store.template_by_id(rid).await.unwrap().unwrap();
        assert!(row.is_used);
    }

    #[tokio::test]
    async fn untemplated_queue_shrinks_as_templates_land() {
        let store = Store::in_memory().await.unwrap();
        let h1 = store.insert_headline(&headline(1)).await.unwrap();
        let h2 = store.insert_headline(&headline(2)).await.unwrap();

        let queue = store.untemplated_headlines(10, 0).await.unwrap();
        assert_eq!(queue.len(), 2);

        store.insert_template(h1, &template()).await.unwrap();
        let queue = store.untemplated_headlines(10, 0).await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id, h2);
    }

    #[tokio::test]
    async fn inkind_children_persist_with_their_parent() {
        let store = Store::in_memory().await.unwrap();
        let hid = store.insert_headline(&headline(1)).await.unwrap();
        let rid = store.insert_template(hid, &template()).await.unwrap();

        let items = store.inkind_for(rid).await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.generate_relief_id == rid));
    }

    #[tokio::test]
    async fn urgency_updates_are_visible_in_candidates() {
        let store = Store::in_memory().await.unwrap();
        let hid = store.insert_headline(&headline(1)).await.unwrap();
        let rid = store.insert_template(hid, &template()).await.unwrap();

        let rows = store.generated_candidates(10, 0).await.unwrap();
        assert_eq!(rows[0].urgency_rank, UNRANKED);

        store.update_urgency(rid, 1).await.unwrap();
        let rows = store.generated_candidates(10, 0).await.unwrap();
        assert_eq!(rows[0].urgency_rank, 1);
    }
}
