use async_trait::async_trait;
use marquee_core::{CoreError, CoreResult};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::movie::{Movie, Showing};
use crate::repository::{CatalogRepository, MoviePage, MovieQuery};

/// Catalog kept in process memory. Used for standalone runs and tests.
#[derive(Default)]
pub struct InMemoryCatalogRepository {
    movies: RwLock<HashMap<Uuid, Movie>>,
    showings: RwLock<HashMap<Uuid, Showing>>,
}

impl InMemoryCatalogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn create_movie(&self, movie: &Movie) -> CoreResult<()> {
        let mut movies = self.movies.write().await;
        let key = movie.identity_key();
        if movies.values().any(|m| m.identity_key() == key) {
            return Err(CoreError::Conflict(format!(
                "movie '{}' ({}, {} min) already exists",
                movie.name, movie.year, movie.duration_minutes
            )));
        }
        movies.insert(movie.id, movie.clone());
        Ok(())
    }

    async fn get_movie(&self, id: Uuid) -> CoreResult<Option<Movie>> {
        Ok(self.movies.read().await.get(&id).cloned())
    }

    async fn list_movies(&self, query: &MovieQuery) -> CoreResult<MoviePage> {
        let mut movies: Vec<Movie> = self
            .movies
            .read()
            .await
            .values()
            .filter(|m| query.year.is_none_or(|year| m.year == year))
            .cloned()
            .collect();
        movies.sort_by(|a, b| a.name.cmp(&b.name).then(a.year.cmp(&b.year)).then(a.id.cmp(&b.id)));

        let total = movies.len() as u64;
        let movies = movies
            .into_iter()
            .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
            .take(query.per_page as usize)
            .collect();
        Ok(MoviePage { movies, total })
    }

    async fn create_showing(&self, showing: &Showing) -> CoreResult<()> {
        if !self.movies.read().await.contains_key(&showing.movie_id) {
            return Err(CoreError::NotFound(format!("movie {}", showing.movie_id)));
        }
        self.showings.write().await.insert(showing.id, showing.clone());
        Ok(())
    }

    async fn get_showing(&self, id: Uuid) -> CoreResult<Option<Showing>> {
        Ok(self.showings.read().await.get(&id).cloned())
    }

    async fn list_showings(&self, movie_id: Option<Uuid>) -> CoreResult<Vec<Showing>> {
        let mut showings: Vec<Showing> = self
            .showings
            .read()
            .await
            .values()
            .filter(|s| movie_id.is_none_or(|id| s.movie_id == id))
            .cloned()
            .collect();
        showings.sort_by(|a, b| a.starts_at.cmp(&b.starts_at));
        Ok(showings)
    }

    async fn set_seats_reserved(&self, showing_id: Uuid, seats: u32) -> CoreResult<()> {
        let mut showings = self.showings.write().await;
        let showing = showings
            .get_mut(&showing_id)
            .ok_or_else(|| CoreError::NotFound(format!("showing {}", showing_id)))?;
        if seats > showing.capacity {
            return Err(CoreError::ValidationError(format!(
                "{} seats exceed capacity {}",
                seats, showing.capacity
            )));
        }
        showing.seats_reserved = seats;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_duplicate_movie_is_conflict() {
        let repo = InMemoryCatalogRepository::new();
        let movie = Movie::new("Arrival".to_string(), 2016, 116, String::new(), 1100).unwrap();
        repo.create_movie(&movie).await.unwrap();

        let again = Movie::new("arrival".to_string(), 2016, 116, String::new(), 900).unwrap();
        assert!(matches!(repo.create_movie(&again).await, Err(CoreError::Conflict(_))));

        let recut = Movie::new("Arrival".to_string(), 2016, 130, String::new(), 900).unwrap();
        repo.create_movie(&recut).await.unwrap();
        assert_eq!(repo.list_movies(&MovieQuery::default()).await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn test_movie_list_pages_and_filters_by_year() {
        let repo = InMemoryCatalogRepository::new();
        let titles = [
            ("Alien", 1979),
            ("Blade Runner", 1982),
            ("Chinatown", 1974),
            ("Dune", 2021),
            ("E.T.", 1982),
        ];
        for (name, year) in titles {
            let movie = Movie::new(name.to_string(), year, 110, String::new(), 1000).unwrap();
            repo.create_movie(&movie).await.unwrap();
        }

        let query = MovieQuery { page: 2, per_page: 2, year: None };
        let page = repo.list_movies(&query).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages(query.per_page), 3);
        let names: Vec<&str> = page.movies.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Chinatown", "Dune"]);

        let past_end = repo
            .list_movies(&MovieQuery { page: 4, per_page: 2, year: None })
            .await
            .unwrap();
        assert!(past_end.movies.is_empty());

        let eighties = repo
            .list_movies(&MovieQuery { page: 1, per_page: 10, year: Some(1982) })
            .await
            .unwrap();
        assert_eq!(eighties.total, 2);
        assert!(eighties.movies.iter().all(|m| m.year == 1982));
    }

    #[tokio::test]
    async fn test_showings_filtered_by_movie() {
        let repo = InMemoryCatalogRepository::new();
        let a = Movie::new("Ran".to_string(), 1985, 162, String::new(), 900).unwrap();
        let b = Movie::new("Ikiru".to_string(), 1952, 143, String::new(), 900).unwrap();
        repo.create_movie(&a).await.unwrap();
        repo.create_movie(&b).await.unwrap();

        let showing = Showing::new(&a, Utc::now(), 40, None).unwrap();
        repo.create_showing(&showing).await.unwrap();
        repo.create_showing(&Showing::new(&b, Utc::now(), 40, None).unwrap()).await.unwrap();

        assert_eq!(repo.list_showings(Some(a.id)).await.unwrap().len(), 1);
        assert_eq!(repo.list_showings(None).await.unwrap().len(), 2);

        repo.set_seats_reserved(showing.id, 12).await.unwrap();
        assert_eq!(repo.get_showing(showing.id).await.unwrap().unwrap().seats_reserved, 12);
        assert!(repo.set_seats_reserved(showing.id, 41).await.is_err());
    }
}
