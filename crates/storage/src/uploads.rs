//! Registry of extracted upload bundles.

use crate::models::Upload;
use sqlx::SqlitePool;

const SELECT_UPLOADS: &str = "SELECT id, digest, root, cities, created_at FROM uploads";

pub struct NewUpload<'a> {
    pub id: &'a str,
    pub digest: &'a str,
    pub root: &'a str,
    pub cities: usize,
}

pub async fn record(pool: &SqlitePool, upload: &NewUpload<'_>) -> anyhow::Result<Upload> {
    let created_at = chrono::Utc::now().timestamp_millis();
    sqlx::query(
        "INSERT INTO uploads (id, digest, root, cities, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(upload.id)
    .bind(upload.digest)
    .bind(upload.root)
    .bind(upload.cities as i64)
    .bind(created_at)
    .execute(pool)
    .await?;
    Ok(Upload {
        id: upload.id.to_string(),
        digest: upload.digest.to_string(),
        root: upload.root.to_string(),
        cities: upload.cities as i64,
        created_at,
    })
}

/// Most recently registered upload, if any.
pub async fn latest(pool: &SqlitePool) -> anyhow::Result<Option<Upload>> {
    let row = sqlx::query_as::<_, Upload>(&format!(
        "{SELECT_UPLOADS} ORDER BY created_at DESC, rowid DESC LIMIT 1"
    ))
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get(pool: &SqlitePool, id: &str) -> anyhow::Result<Option<Upload>> {
    let row = sqlx::query_as::<_, Upload>(&format!("{SELECT_UPLOADS} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Deletes every upload older than the `keep` most recent ones and returns
/// the removed rows, oldest first, so their directories can be cleaned up.
/// `keep == 0` keeps everything.
pub async fn prune(pool: &SqlitePool, keep: usize) -> anyhow::Result<Vec<Upload>> {
    if keep == 0 {
        return Ok(Vec::new());
    }
    let mut tx = pool.begin().await?;
    let mut stale = sqlx::query_as::<_, Upload>(&format!(
        "{SELECT_UPLOADS} ORDER BY created_at DESC, rowid DESC LIMIT -1 OFFSET ?1"
    ))
    .bind(keep as i64)
    .fetch_all(&mut *tx)
    .await?;
    for upload in &stale {
        sqlx::query("DELETE FROM uploads WHERE id = ?1")
            .bind(&upload.id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    stale.reverse();
    if !stale.is_empty() {
        tracing::debug!(removed = stale.len(), keep, "uploads pruned");
    }
    Ok(stale)
}
