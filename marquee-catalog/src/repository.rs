use async_trait::async_trait;
use marquee_core::CoreResult;
use uuid::Uuid;

use crate::movie::{Movie, Showing};

/// One page of the movie list, optionally narrowed to a release year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovieQuery {
    /// 1-based.
    pub page: u32,
    pub per_page: u32,
    pub year: Option<i32>,
}

impl Default for MovieQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
            year: None,
        }
    }
}

impl MovieQuery {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }
}

#[derive(Debug, Clone)]
pub struct MoviePage {
    pub movies: Vec<Movie>,
    /// Movies matching the filter across all pages.
    pub total: u64,
}

impl MoviePage {
    pub fn total_pages(&self, per_page: u32) -> u64 {
        if per_page == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(per_page))
    }
}

/// Repository trait for movie and showing data access
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Fails with `CoreError::Conflict` when a movie with the same identity key exists.
    async fn create_movie(&self, movie: &Movie) -> CoreResult<()>;

    async fn get_movie(&self, id: Uuid) -> CoreResult<Option<Movie>>;

    /// Movies ordered by name, then year.
    async fn list_movies(&self, query: &MovieQuery) -> CoreResult<MoviePage>;

    async fn create_showing(&self, showing: &Showing) -> CoreResult<()>;

    async fn get_showing(&self, id: Uuid) -> CoreResult<Option<Showing>>;

    async fn list_showings(&self, movie_id: Option<Uuid>) -> CoreResult<Vec<Showing>>;

    /// Persist the committed seat count tracked by the inventory ledger.
    async fn set_seats_reserved(&self, showing_id: Uuid, seats: u32) -> CoreResult<()>;
}
