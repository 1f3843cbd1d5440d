//! Genre sets stored in the polymorphic `track_genres` table.

use crate::error::Result;
use crate::models::{fold_case, normalize_genres, GenreParent};
use sqlx::{query, query_as, SqliteConnection};
use std::collections::HashMap;

/// Replace the whole genre set of one parent.
pub(crate) async fn replace_genres(
    conn: &mut SqliteConnection,
    parent: GenreParent,
    parent_id: i64,
    genres: &[String],
) -> Result<()> {
    delete_genres(conn, parent, parent_id).await?;

    for genre in normalize_genres(genres) {
        query(
            "INSERT OR IGNORE INTO track_genres (parent_kind, parent_id, genre, genre_key) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(parent.as_str())
        .bind(parent_id)
        .bind(&genre)
        .bind(fold_case(&genre))
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

pub(crate) async fn delete_genres(
    conn: &mut SqliteConnection,
    parent: GenreParent,
    parent_id: i64,
) -> Result<()> {
    query("DELETE FROM track_genres WHERE parent_kind = ? AND parent_id = ?")
        .bind(parent.as_str())
        .bind(parent_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Genre sets for many parents at once, keyed by parent id.
pub(crate) async fn load_genres(
    conn: &mut SqliteConnection,
    parent: GenreParent,
    parent_ids: &[i64],
) -> Result<HashMap<i64, Vec<String>>> {
    let mut by_parent: HashMap<i64, Vec<String>> = HashMap::new();
    if parent_ids.is_empty() {
        return Ok(by_parent);
    }

    // SQLite caps bound parameters, so large id lists are fetched in chunks.
    for chunk in parent_ids.chunks(500) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!(
            "SELECT parent_id, genre FROM track_genres \
             WHERE parent_kind = ? AND parent_id IN ({}) ORDER BY parent_id, rowid",
            placeholders
        );

        let mut q = query_as::<_, (i64, String)>(&sql).bind(parent.as_str());
        for id in chunk {
            q = q.bind(*id);
        }

        for (parent_id, genre) in q.fetch_all(&mut *conn).await? {
            by_parent.entry(parent_id).or_default().push(genre);
        }
    }

    Ok(by_parent)
}
