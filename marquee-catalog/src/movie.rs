use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A film in the catalog. `price_cents` is the default ticket price for its showings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Movie {
    pub id: Uuid,
    pub name: String,
    pub year: i32,
    pub duration_minutes: i32,
    pub imdb_rating: Option<f64>,
    pub description: String,
    pub price_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl Movie {
    pub fn new(
        name: String,
        year: i32,
        duration_minutes: i32,
        description: String,
        price_cents: i64,
    ) -> Result<Self, CatalogError> {
        let movie = Self {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            year,
            duration_minutes,
            imdb_rating: None,
            description,
            price_cents,
            created_at: Utc::now(),
        };
        movie.validate()?;
        Ok(movie)
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.name.is_empty() {
            return Err(CatalogError::Invalid("movie name must not be empty".to_string()));
        }
        if !(1888..=2100).contains(&self.year) {
            return Err(CatalogError::Invalid(format!("implausible release year {}", self.year)));
        }
        if self.duration_minutes <= 0 {
            return Err(CatalogError::Invalid("duration must be positive".to_string()));
        }
        if self.price_cents < 0 {
            return Err(CatalogError::Invalid("price must not be negative".to_string()));
        }
        if let Some(rating) = self.imdb_rating {
            if !(0.0..=10.0).contains(&rating) {
                return Err(CatalogError::Invalid("imdb rating must be within 0..=10".to_string()));
            }
        }
        Ok(())
    }

    /// Catalog uniqueness key: the same title may be re-released in another
    /// year or cut, but not twice with the same year and running time.
    pub fn identity_key(&self) -> (String, i32, i32) {
        (self.name.to_lowercase(), self.year, self.duration_minutes)
    }
}

/// A scheduled screening of a movie with a fixed number of seats.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Showing {
    pub id: Uuid,
    pub movie_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub capacity: u32,
    /// Seats permanently sold (committed). Never exceeds `capacity`.
    pub seats_reserved: u32,
    pub price_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl Showing {
    pub fn new(
        movie: &Movie,
        starts_at: DateTime<Utc>,
        capacity: u32,
        price_cents: Option<i64>,
    ) -> Result<Self, CatalogError> {
        if capacity == 0 {
            return Err(CatalogError::Invalid("capacity must be at least one seat".to_string()));
        }
        let price_cents = price_cents.unwrap_or(movie.price_cents);
        if price_cents < 0 {
            return Err(CatalogError::Invalid("price must not be negative".to_string()));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            movie_id: movie.id,
            starts_at,
            capacity,
            seats_reserved: 0,
            price_cents,
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Invalid catalog entry: {0}")]
    Invalid(String),

    #[error("Movie not found: {0}")]
    MovieNotFound(Uuid),

    #[error("Showing not found: {0}")]
    ShowingNotFound(Uuid),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie() -> Movie {
        Movie::new("Metropolis".to_string(), 1927, 153, "Silent sci-fi".to_string(), 900).unwrap()
    }

    #[test]
    fn test_movie_validation() {
        assert!(Movie::new("".to_string(), 1999, 120, String::new(), 500).is_err());
        assert!(Movie::new("Heat".to_string(), 1995, 0, String::new(), 500).is_err());
        assert!(Movie::new("Heat".to_string(), 1995, 170, String::new(), -1).is_err());
        assert!(Movie::new("  Heat ".to_string(), 1995, 170, String::new(), 500).is_ok());
    }

    #[test]
    fn test_identity_key_ignores_case() {
        let a = movie();
        let mut b = movie();
        b.name = "METROPOLIS".to_string();
        assert_eq!(a.identity_key(), b.identity_key());
    }

    #[test]
    fn test_showing_inherits_movie_price() {
        let m = movie();
        let showing = Showing::new(&m, Utc::now(), 80, None).unwrap();
        assert_eq!(showing.price_cents, 900);
        assert_eq!(showing.seats_reserved, 0);

        let matinee = Showing::new(&m, Utc::now(), 80, Some(650)).unwrap();
        assert_eq!(matinee.price_cents, 650);

        assert!(Showing::new(&m, Utc::now(), 0, None).is_err());
    }
}
