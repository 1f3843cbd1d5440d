//! # Catalog Search
//!
//! Token relevance search and field filters over `music_files`.
//!
//! Each whitespace-separated token scores every candidate on the first rule it
//! matches. Matching runs against the Unicode-lowercased `*_key` columns, so
//! "BJÖRK" finds "Björk":
//!
//! | Rule | Score |
//! |---|---|
//! | title equals token | 100 |
//! | title starts with token | 75 |
//! | title contains token | 50 |
//! | artist equals token | 40 |
//! | artist contains token | 30 |
//! | album equals token | 20 |
//! | album contains token | 10 |
//!
//! A row's relevance is the sum over all tokens. Only rows matching at least
//! one token somewhere in title, artist or album are candidates. Results come
//! back by relevance, ties broken by id.

use crate::error::Result;
use crate::models::{fold_case, MusicFile};
use crate::repositories::SqliteMusicFileRepository;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, instrument};

pub const DEFAULT_SEARCH_LIMIT: u32 = 50;

const MUSIC_FILE_COLUMNS: &str = "id, path, title, artist, album_artist, album, year, length, \
     publisher, kind, last_scanned, missing";

/// AND-combined substring filters. Unset fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackFilter {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// Matches when any member of the genre set contains this text
    pub genre: Option<String>,
    pub limit: Option<u32>,
}

impl TrackFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    fn is_empty(&self) -> bool {
        [&self.title, &self.artist, &self.album, &self.genre]
            .iter()
            .all(|f| f.as_deref().map_or(true, |v| v.trim().is_empty()))
    }
}

/// Read-only search over the catalog.
#[derive(Clone)]
pub struct CatalogSearch {
    pool: SqlitePool,
}

impl CatalogSearch {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Relevance-ranked search.
    ///
    /// The query may arrive percent-encoded; it is decoded before
    /// tokenizing. A query with no tokens yields no results.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, limit: Option<u32>) -> Result<Vec<MusicFile>> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT);

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT ");
        qb.push(MUSIC_FILE_COLUMNS);
        qb.push(", (");
        for (i, token) in tokens.iter().enumerate() {
            if i > 0 {
                qb.push(" + ");
            }
            push_token_score(&mut qb, token);
        }
        qb.push(") AS relevance FROM music_files WHERE ");
        for (i, token) in tokens.iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            let pattern = contains_pattern(token);
            qb.push("(title_key LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR artist_key LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR album_key LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }
        qb.push(" ORDER BY relevance DESC, id ASC LIMIT ");
        qb.push_bind(i64::from(limit));

        let mut conn = self.pool.acquire().await?;
        let files: Vec<MusicFile> = qb.build_query_as().fetch_all(&mut *conn).await?;
        debug!(tokens = tokens.len(), results = files.len(), "Search finished");

        SqliteMusicFileRepository::with_genres(&mut conn, files).await
    }

    /// Unscored field filters, id ascending. With no field set, every row
    /// matches up to `limit`.
    #[instrument(skip(self))]
    pub async fn filter(&self, filter: &TrackFilter) -> Result<Vec<MusicFile>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT ");
        qb.push(MUSIC_FILE_COLUMNS);
        qb.push(" FROM music_files WHERE 1 = 1");

        for (column, value) in [
            ("title_key", &filter.title),
            ("artist_key", &filter.artist),
            ("album_key", &filter.album),
        ] {
            if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                qb.push(format!(" AND {} LIKE ", column))
                    .push_bind(contains_pattern(&fold_case(value)))
                    .push(" ESCAPE '\\'");
            }
        }

        if let Some(genre) = filter
            .genre
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            qb.push(
                " AND EXISTS (SELECT 1 FROM track_genres g WHERE g.parent_kind = 'music_file' \
                 AND g.parent_id = music_files.id AND g.genre_key LIKE ",
            )
            .push_bind(contains_pattern(&fold_case(genre)))
            .push(" ESCAPE '\\')");
        }

        qb.push(" ORDER BY id ASC LIMIT ");
        qb.push_bind(i64::from(filter.limit.unwrap_or(DEFAULT_SEARCH_LIMIT)));

        let mut conn = self.pool.acquire().await?;
        let files: Vec<MusicFile> = qb.build_query_as().fetch_all(&mut *conn).await?;
        debug!(unfiltered = filter.is_empty(), results = files.len(), "Filter finished");

        SqliteMusicFileRepository::with_genres(&mut conn, files).await
    }
}

fn push_token_score(qb: &mut QueryBuilder<'_, Sqlite>, token: &str) {
    let contains = contains_pattern(token);
    let prefix = format!("{}%", escape_like(token));

    qb.push("CASE WHEN title_key = ")
        .push_bind(token.to_string())
        .push(" THEN 100 WHEN title_key LIKE ")
        .push_bind(prefix)
        .push(" ESCAPE '\\' THEN 75 WHEN title_key LIKE ")
        .push_bind(contains.clone())
        .push(" ESCAPE '\\' THEN 50 WHEN artist_key = ")
        .push_bind(token.to_string())
        .push(" THEN 40 WHEN artist_key LIKE ")
        .push_bind(contains.clone())
        .push(" ESCAPE '\\' THEN 30 WHEN album_key = ")
        .push_bind(token.to_string())
        .push(" THEN 20 WHEN album_key LIKE ")
        .push_bind(contains)
        .push(" ESCAPE '\\' THEN 10 ELSE 0 END");
}

/// Percent-decode, case-fold and split on whitespace. Undecodable input is
/// tokenized as given.
fn tokenize(query: &str) -> Vec<String> {
    let decoded = urlencoding::decode(query)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| query.to_string());

    decoded.split_whitespace().map(fold_case).collect()
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn contains_pattern(value: &str) -> String {
    format!("%{}%", escape_like(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::{NewMusicFile, TrackDetails};
    use crate::repositories::MusicFileRepository;

    async fn seed(tracks: &[(&str, &str, &str)]) -> CatalogSearch {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteMusicFileRepository::new(pool.clone());
        for (i, (title, artist, album)) in tracks.iter().enumerate() {
            let file = NewMusicFile::new(
                format!("/music/{:02}.mp3", i),
                TrackDetails::new(*title, *artist).with_album(*album),
            );
            repo.upsert(&file, 0).await.unwrap();
        }
        CatalogSearch::new(pool)
    }

    fn titles(files: &[MusicFile]) -> Vec<&str> {
        files.iter().filter_map(|f| f.title.as_deref()).collect()
    }

    #[tokio::test]
    async fn test_exact_title_beats_prefix_beats_contains() {
        let search = seed(&[
            ("I Believe", "Someone", "Album"),
            ("Believer", "Imagine Dragons", "Evolve"),
            ("Believe", "Cher", "Believe"),
            ("Unrelated", "Nobody", "Nothing"),
        ])
        .await;

        let results = search.search("Believe", None).await.unwrap();
        assert_eq!(titles(&results), vec!["Believe", "Believer", "I Believe"]);
    }

    #[tokio::test]
    async fn test_scores_sum_across_tokens() {
        let search = seed(&[
            ("Roads", "Someone Else", "Dummy"),
            ("Roads", "Portishead", "Dummy"),
        ])
        .await;

        // Second row gains the artist match on top of the equal title match.
        let results = search.search("roads portishead", None).await.unwrap();
        assert_eq!(results[0].artist.as_deref(), Some("Portishead"));
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_ties_break_by_id_and_limit_truncates() {
        let search = seed(&[
            ("Song A", "Band", "X"),
            ("Song B", "Band", "X"),
            ("Song C", "Band", "X"),
        ])
        .await;

        let results = search.search("band", Some(2)).await.unwrap();
        assert_eq!(titles(&results), vec!["Song A", "Song B"]);
    }

    #[tokio::test]
    async fn test_empty_and_encoded_queries() {
        let search = seed(&[("Glory Box", "Portishead", "Dummy")]).await;

        assert!(search.search("", None).await.unwrap().is_empty());
        assert!(search.search("   ", None).await.unwrap().is_empty());

        let results = search.search("Glory%20Box", None).await.unwrap();
        assert_eq!(titles(&results), vec!["Glory Box"]);
    }

    #[tokio::test]
    async fn test_like_wildcards_are_literal() {
        let search = seed(&[("100% Pure", "A", "B"), ("100 Pure", "A", "B")]).await;

        let results = search.search("100%25", None).await.unwrap();
        assert_eq!(titles(&results), vec!["100% Pure"]);
    }

    #[tokio::test]
    async fn test_case_folding_covers_non_ascii() {
        let search = seed(&[
            ("Jóga", "Björk", "Homogenic"),
            ("Schrei nach Liebe", "Die Ärzte", "Die Bestie in Menschengestalt"),
        ])
        .await;

        let results = search.search("BJÖRK", None).await.unwrap();
        assert_eq!(titles(&results), vec!["Jóga"]);

        let results = search.search("ärzte", None).await.unwrap();
        assert_eq!(titles(&results), vec!["Schrei nach Liebe"]);

        let results = search.search("JÓGA", None).await.unwrap();
        assert_eq!(results[0].artist.as_deref(), Some("Björk"));

        let filtered = search
            .filter(&TrackFilter::new().artist("björk").album("HOMOGENIC"))
            .await
            .unwrap();
        assert_eq!(titles(&filtered), vec!["Jóga"]);

        let filtered = search
            .filter(&TrackFilter::new().artist("DIE ÄRZTE"))
            .await
            .unwrap();
        assert_eq!(titles(&filtered), vec!["Schrei nach Liebe"]);
    }

    #[tokio::test]
    async fn test_filter_combines_fields_and_genre() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteMusicFileRepository::new(pool.clone());
        repo.upsert(
            &NewMusicFile::new(
                "/m/1.mp3",
                TrackDetails::new("Teardrop", "Massive Attack")
                    .with_album("Mezzanine")
                    .with_genres(["Trip-Hop"]),
            ),
            0,
        )
        .await
        .unwrap();
        repo.upsert(
            &NewMusicFile::new(
                "/m/2.mp3",
                TrackDetails::new("Angel", "Massive Attack")
                    .with_album("Mezzanine")
                    .with_genres(["Electronic"]),
            ),
            0,
        )
        .await
        .unwrap();

        let search = CatalogSearch::new(pool);

        let by_artist = search
            .filter(&TrackFilter::new().artist("massive"))
            .await
            .unwrap();
        assert_eq!(titles(&by_artist), vec!["Teardrop", "Angel"]);

        let by_genre = search
            .filter(&TrackFilter::new().artist("massive").genre("trip"))
            .await
            .unwrap();
        assert_eq!(titles(&by_genre), vec!["Teardrop"]);
        assert_eq!(by_genre[0].genres, vec!["Trip-Hop"]);

        let none = search
            .filter(&TrackFilter::new().album("Mezzanine").title("Unfinished"))
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
