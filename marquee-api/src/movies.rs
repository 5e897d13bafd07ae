use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use marquee_catalog::{Availability, CatalogError, Movie, MovieQuery, Showing};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateMovieRequest {
    pub name: String,
    pub year: i32,
    pub duration_minutes: i32,
    pub imdb_rating: Option<f64>,
    #[serde(default)]
    pub description: String,
    pub price_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateShowingRequest {
    pub movie_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub capacity: u32,
    /// Falls back to the movie's ticket price.
    pub price_cents: Option<i64>,
}

const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct ListMoviesParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub year: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct MovieListResponse {
    pub movies: Vec<Movie>,
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u64,
    pub prev_page: Option<String>,
    pub next_page: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ShowingResponse {
    #[serde(flatten)]
    pub showing: Showing,
    pub availability: Availability,
}

// ============================================================================
// Public catalog
// ============================================================================

/// GET /v1/movies?page=&per_page=&year=
pub async fn list_movies(
    State(state): State<AppState>,
    Query(params): Query<ListMoviesParams>,
) -> Result<Json<MovieListResponse>, AppError> {
    let defaults = MovieQuery::default();
    let query = MovieQuery {
        page: params.page.unwrap_or(defaults.page),
        per_page: params.per_page.unwrap_or(defaults.per_page),
        year: params.year,
    };
    if query.page == 0 {
        return Err(AppError::Validation("page starts at 1".to_string()));
    }
    if !(1..=MAX_PER_PAGE).contains(&query.per_page) {
        return Err(AppError::Validation(format!("per_page must be between 1 and {}", MAX_PER_PAGE)));
    }

    let page = state.catalog.list_movies(&query).await?;
    let total_pages = page.total_pages(query.per_page);
    let link = |n: u32| {
        let mut url = format!("/v1/movies?page={}&per_page={}", n, query.per_page);
        if let Some(year) = query.year {
            url.push_str(&format!("&year={}", year));
        }
        url
    };

    Ok(Json(MovieListResponse {
        prev_page: (query.page > 1).then(|| link(query.page - 1)),
        next_page: (u64::from(query.page) < total_pages).then(|| link(query.page + 1)),
        total_items: page.total,
        total_pages,
        page: query.page,
        per_page: query.per_page,
        movies: page.movies,
    }))
}

/// GET /v1/movies/{id}/showings
pub async fn list_showings(
    State(state): State<AppState>,
    Path(movie_id): Path<Uuid>,
) -> Result<Json<Vec<ShowingResponse>>, AppError> {
    state
        .catalog
        .get_movie(movie_id)
        .await?
        .ok_or(CatalogError::MovieNotFound(movie_id))?;

    let showings = state.catalog.list_showings(Some(movie_id)).await?;
    let mut response = Vec::with_capacity(showings.len());
    for showing in showings {
        response.push(with_availability(&state, showing).await?);
    }
    Ok(Json(response))
}

/// GET /v1/showings/{id}
pub async fn get_showing(
    State(state): State<AppState>,
    Path(showing_id): Path<Uuid>,
) -> Result<Json<ShowingResponse>, AppError> {
    let showing = state
        .catalog
        .get_showing(showing_id)
        .await?
        .ok_or(CatalogError::ShowingNotFound(showing_id))?;

    Ok(Json(with_availability(&state, showing).await?))
}

async fn with_availability(state: &AppState, showing: Showing) -> Result<ShowingResponse, AppError> {
    let availability = state.ledger.availability(showing.id).await?;
    Ok(ShowingResponse { showing, availability })
}

// ============================================================================
// Catalog management (moderators)
// ============================================================================

/// POST /v1/admin/movies
pub async fn create_movie(
    State(state): State<AppState>,
    Json(req): Json<CreateMovieRequest>,
) -> Result<(StatusCode, Json<Movie>), AppError> {
    let mut movie = Movie::new(req.name, req.year, req.duration_minutes, req.description, req.price_cents)?;
    movie.imdb_rating = req.imdb_rating;
    movie.validate()?;

    state.catalog.create_movie(&movie).await?;
    tracing::info!(movie_id = %movie.id, name = %movie.name, "Movie created");

    Ok((StatusCode::CREATED, Json(movie)))
}

/// POST /v1/admin/showings
pub async fn create_showing(
    State(state): State<AppState>,
    Json(req): Json<CreateShowingRequest>,
) -> Result<(StatusCode, Json<ShowingResponse>), AppError> {
    let movie = state
        .catalog
        .get_movie(req.movie_id)
        .await?
        .ok_or(CatalogError::MovieNotFound(req.movie_id))?;

    let showing = Showing::new(&movie, req.starts_at, req.capacity, req.price_cents)?;
    state.catalog.create_showing(&showing).await?;
    state
        .ledger
        .register_showing(showing.id, showing.capacity, showing.seats_reserved)
        .await?;
    tracing::info!(showing_id = %showing.id, movie_id = %movie.id, capacity = showing.capacity, "Showing scheduled");

    Ok((StatusCode::CREATED, Json(with_availability(&state, showing).await?)))
}
