use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marquee_catalog::{CatalogRepository, Movie, MoviePage, MovieQuery, Showing};
use marquee_core::{CoreError, CoreResult};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::{storage_error, to_i32, to_u32};

pub struct PgCatalogRepository {
    pool: PgPool,
}

impl PgCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct MovieRow {
    id: Uuid,
    name: String,
    year: i32,
    duration_minutes: i32,
    imdb_rating: Option<f64>,
    description: String,
    price_cents: i64,
    created_at: DateTime<Utc>,
}

impl From<MovieRow> for Movie {
    fn from(row: MovieRow) -> Self {
        Movie {
            id: row.id,
            name: row.name,
            year: row.year,
            duration_minutes: row.duration_minutes,
            imdb_rating: row.imdb_rating,
            description: row.description,
            price_cents: row.price_cents,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ShowingRow {
    id: Uuid,
    movie_id: Uuid,
    starts_at: DateTime<Utc>,
    capacity: i32,
    seats_reserved: i32,
    price_cents: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<ShowingRow> for Showing {
    type Error = CoreError;

    fn try_from(row: ShowingRow) -> Result<Self, Self::Error> {
        Ok(Showing {
            id: row.id,
            movie_id: row.movie_id,
            starts_at: row.starts_at,
            capacity: to_u32(row.capacity, "capacity")?,
            seats_reserved: to_u32(row.seats_reserved, "seats_reserved")?,
            price_cents: row.price_cents,
            created_at: row.created_at,
        })
    }
}

const MOVIE_COLUMNS: &str = "id, name, year, duration_minutes, imdb_rating, description, price_cents, created_at";
const SHOWING_COLUMNS: &str = "id, movie_id, starts_at, capacity, seats_reserved, price_cents, created_at";

#[async_trait]
impl CatalogRepository for PgCatalogRepository {
    async fn create_movie(&self, movie: &Movie) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO movies (id, name, year, duration_minutes, imdb_rating, description, price_cents, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(movie.id)
        .bind(&movie.name)
        .bind(movie.year)
        .bind(movie.duration_minutes)
        .bind(movie.imdb_rating)
        .bind(&movie.description)
        .bind(movie.price_cents)
        .bind(movie.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    async fn get_movie(&self, id: Uuid) -> CoreResult<Option<Movie>> {
        let row: Option<MovieRow> = sqlx::query_as(&format!("SELECT {} FROM movies WHERE id = $1", MOVIE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(row.map(Movie::from))
    }

    async fn list_movies(&self, query: &MovieQuery) -> CoreResult<MoviePage> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movies WHERE ($1::int IS NULL OR year = $1)")
            .bind(query.year)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

        let offset = i64::try_from(query.offset())
            .map_err(|_| CoreError::ValidationError(format!("page {} out of range", query.page)))?;
        let rows: Vec<MovieRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM movies
            WHERE ($1::int IS NULL OR year = $1)
            ORDER BY name, year, id
            LIMIT $2 OFFSET $3
            "#,
            MOVIE_COLUMNS
        ))
        .bind(query.year)
        .bind(i64::from(query.per_page))
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(MoviePage {
            movies: rows.into_iter().map(Movie::from).collect(),
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn create_showing(&self, showing: &Showing) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO showings (id, movie_id, starts_at, capacity, seats_reserved, price_cents, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(showing.id)
        .bind(showing.movie_id)
        .bind(showing.starts_at)
        .bind(to_i32(showing.capacity, "capacity")?)
        .bind(to_i32(showing.seats_reserved, "seats_reserved")?)
        .bind(showing.price_cents)
        .bind(showing.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    async fn get_showing(&self, id: Uuid) -> CoreResult<Option<Showing>> {
        let row: Option<ShowingRow> =
            sqlx::query_as(&format!("SELECT {} FROM showings WHERE id = $1", SHOWING_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;

        row.map(Showing::try_from).transpose()
    }

    async fn list_showings(&self, movie_id: Option<Uuid>) -> CoreResult<Vec<Showing>> {
        let rows: Vec<ShowingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM showings WHERE ($1::uuid IS NULL OR movie_id = $1) ORDER BY starts_at",
            SHOWING_COLUMNS
        ))
        .bind(movie_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.into_iter().map(Showing::try_from).collect()
    }

    async fn set_seats_reserved(&self, showing_id: Uuid, seats: u32) -> CoreResult<()> {
        let result = sqlx::query("UPDATE showings SET seats_reserved = $2 WHERE id = $1 AND capacity >= $2")
            .bind(showing_id)
            .bind(to_i32(seats, "seats_reserved")?)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return match self.get_showing(showing_id).await? {
                Some(showing) => Err(CoreError::ValidationError(format!(
                    "{} seats exceed capacity {} of showing {}",
                    seats, showing.capacity, showing_id
                ))),
                None => Err(CoreError::NotFound(format!("showing {}", showing_id))),
            };
        }
        Ok(())
    }
}
