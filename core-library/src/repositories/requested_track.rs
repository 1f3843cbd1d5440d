//! Registry of requested (not owned) tracks, deduplicated by artist and title

use crate::error::{LibraryError, Result};
use crate::models::{GenreParent, RequestedTrack, TrackDetails};
use crate::repositories::genres::{load_genres, replace_genres};
use async_trait::async_trait;
use sqlx::{query, query_as, SqliteConnection, SqlitePool};

const SELECT_REQUESTED_TRACK: &str = "SELECT id, artist, title, album_artist, album, year, \
     length, publisher, created_at FROM requested_tracks";

#[async_trait]
pub trait RequestedTrackRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<RequestedTrack>>;

    async fn find_by_key(&self, artist: &str, title: &str) -> Result<Option<RequestedTrack>>;

    /// Return the row keyed by `(artist, title)`, creating it from `details`
    /// when absent.
    ///
    /// # Errors
    /// Returns `InvalidInput` if artist or title is blank.
    async fn find_or_create(
        &self,
        artist: &str,
        title: &str,
        details: &TrackDetails,
        now: i64,
    ) -> Result<RequestedTrack>;
}

pub struct SqliteRequestedTrackRepository {
    pool: SqlitePool,
}

impl SqliteRequestedTrackRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id_in(
        conn: &mut SqliteConnection,
        id: i64,
    ) -> Result<Option<RequestedTrack>> {
        let track =
            query_as::<_, RequestedTrack>(&format!("{} WHERE id = ?", SELECT_REQUESTED_TRACK))
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;
        Self::attach_genres(conn, track).await
    }

    pub async fn find_by_key_in(
        conn: &mut SqliteConnection,
        artist: &str,
        title: &str,
    ) -> Result<Option<RequestedTrack>> {
        let track = query_as::<_, RequestedTrack>(&format!(
            "{} WHERE artist = ? AND title = ?",
            SELECT_REQUESTED_TRACK
        ))
        .bind(artist)
        .bind(title)
        .fetch_optional(&mut *conn)
        .await?;
        Self::attach_genres(conn, track).await
    }

    pub async fn find_or_create_in(
        conn: &mut SqliteConnection,
        artist: &str,
        title: &str,
        details: &TrackDetails,
        now: i64,
    ) -> Result<RequestedTrack> {
        let (artist, title) = (artist.trim(), title.trim());
        if artist.is_empty() {
            return Err(LibraryError::invalid("artist", "Requested track needs an artist"));
        }
        if title.is_empty() {
            return Err(LibraryError::invalid("title", "Requested track needs a title"));
        }

        let inserted = query(
            r#"
            INSERT INTO requested_tracks (
                artist, title, album_artist, album, year, length, publisher, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(artist, title) DO NOTHING
            "#,
        )
        .bind(artist)
        .bind(title)
        .bind(&details.album_artist)
        .bind(&details.album)
        .bind(details.year)
        .bind(details.length)
        .bind(&details.publisher)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if inserted.rows_affected() > 0 {
            replace_genres(
                conn,
                GenreParent::RequestedTrack,
                inserted.last_insert_rowid(),
                &details.genres,
            )
            .await?;
        }

        Self::find_by_key_in(conn, artist, title)
            .await?
            .ok_or_else(|| LibraryError::not_found("RequestedTrack", format!("{} - {}", artist, title)))
    }

    async fn attach_genres(
        conn: &mut SqliteConnection,
        track: Option<RequestedTrack>,
    ) -> Result<Option<RequestedTrack>> {
        let Some(mut track) = track else {
            return Ok(None);
        };
        let mut genres = load_genres(conn, GenreParent::RequestedTrack, &[track.id]).await?;
        track.genres = genres.remove(&track.id).unwrap_or_default();
        Ok(Some(track))
    }
}

#[async_trait]
impl RequestedTrackRepository for SqliteRequestedTrackRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<RequestedTrack>> {
        let mut conn = self.pool.acquire().await?;
        Self::find_by_id_in(&mut conn, id).await
    }

    async fn find_by_key(&self, artist: &str, title: &str) -> Result<Option<RequestedTrack>> {
        let mut conn = self.pool.acquire().await?;
        Self::find_by_key_in(&mut conn, artist.trim(), title.trim()).await
    }

    async fn find_or_create(
        &self,
        artist: &str,
        title: &str,
        details: &TrackDetails,
        now: i64,
    ) -> Result<RequestedTrack> {
        let mut tx = self.pool.begin().await?;
        let track = Self::find_or_create_in(&mut tx, artist, title, details, now).await?;
        tx.commit().await?;
        Ok(track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn test_same_artist_and_title_resolve_to_one_row() {
        let repo = SqliteRequestedTrackRepository::new(create_test_pool().await.unwrap());

        let details = TrackDetails::default().with_album("Dummy");
        let first = repo
            .find_or_create("Portishead", "Glory Box", &details, 1)
            .await
            .unwrap();
        let second = repo
            .find_or_create(" Portishead ", "Glory Box", &TrackDetails::default(), 2)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.album.as_deref(), Some("Dummy"));

        let other = repo
            .find_or_create("Portishead", "Roads", &TrackDetails::default(), 3)
            .await
            .unwrap();
        assert_ne!(other.id, first.id);
    }

    #[tokio::test]
    async fn test_blank_key_rejected() {
        let repo = SqliteRequestedTrackRepository::new(create_test_pool().await.unwrap());
        assert!(repo
            .find_or_create("", "Title", &TrackDetails::default(), 0)
            .await
            .unwrap_err()
            .is_validation());
        assert!(repo
            .find_or_create("Artist", " ", &TrackDetails::default(), 0)
            .await
            .unwrap_err()
            .is_validation());
    }
}
