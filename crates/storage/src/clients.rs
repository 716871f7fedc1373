//! Client catalog: CRUD plus upsert keyed by client id.

use crate::models::{Client, ClientPatch};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

const SELECT_CLIENTS: &str = "SELECT id, category_name, churn_score FROM clients";

pub async fn list(pool: &SqlitePool) -> anyhow::Result<Vec<Client>> {
    let rows = sqlx::query_as::<_, Client>(&format!("{SELECT_CLIENTS} ORDER BY id"))
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn get(pool: &SqlitePool, id: i64) -> anyhow::Result<Option<Client>> {
    let row = sqlx::query_as::<_, Client>(&format!("{SELECT_CLIENTS} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Inserts a new client. Returns `false` when the id is already taken.
pub async fn insert(pool: &SqlitePool, client: &Client) -> anyhow::Result<bool> {
    let res = sqlx::query(
        "INSERT INTO clients (id, category_name, churn_score, updated_at)
         VALUES (?1, ?2, ?3, strftime('%s','now'))
         ON CONFLICT(id) DO NOTHING",
    )
    .bind(client.id)
    .bind(&client.category_name)
    .bind(client.churn_score)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// Replaces an existing client. Returns `None` when the id is unknown.
pub async fn update(pool: &SqlitePool, client: &Client) -> anyhow::Result<Option<Client>> {
    let res = sqlx::query(
        "UPDATE clients SET category_name = ?2, churn_score = ?3, updated_at = strftime('%s','now')
         WHERE id = ?1",
    )
    .bind(client.id)
    .bind(&client.category_name)
    .bind(client.churn_score)
    .execute(pool)
    .await?;
    if res.rows_affected() == 0 {
        return Ok(None);
    }
    Ok(Some(client.clone()))
}

pub async fn patch(pool: &SqlitePool, id: i64, patch: ClientPatch) -> anyhow::Result<Option<Client>> {
    let Some(existing) = get(pool, id).await? else {
        return Ok(None);
    };
    update(pool, &patch.apply(existing)).await
}

pub async fn delete(pool: &SqlitePool, id: i64) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM clients WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn upsert(pool: &SqlitePool, client: &Client) -> anyhow::Result<()> {
    let mut conn = pool.acquire().await?;
    upsert_with(&mut *conn, client).await
}

/// Upserts every client in one transaction; either all land or none do.
pub async fn upsert_many(pool: &SqlitePool, clients: &[Client]) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    for client in clients {
        upsert_with(&mut *tx, client).await?;
    }
    tx.commit().await?;
    tracing::debug!(count = clients.len(), "clients upserted");
    Ok(())
}

async fn upsert_with(conn: &mut SqliteConnection, client: &Client) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO clients (id, category_name, churn_score, updated_at)
        VALUES (?1, ?2, ?3, strftime('%s','now'))
        ON CONFLICT(id) DO UPDATE SET
            category_name = excluded.category_name,
            churn_score = excluded.churn_score,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(client.id)
    .bind(&client.category_name)
    .bind(client.churn_score)
    .execute(conn)
    .await?;
    Ok(())
}

/// Loads the clients whose id is in `ids`, ordered by id. Unknown ids are ignored.
pub async fn fetch_by_ids(pool: &SqlitePool, ids: &[i64]) -> anyhow::Result<Vec<Client>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut qb = QueryBuilder::<Sqlite>::new(SELECT_CLIENTS);
    qb.push(" WHERE id IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY id");
    let rows = qb.build_query_as::<Client>().fetch_all(pool).await?;
    Ok(rows)
}
