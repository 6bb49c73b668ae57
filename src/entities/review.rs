use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{invalid_input_error, invalid_rating_error, Error};

const MAX_COMMENT_LEN: usize = 500;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Review {
    pub trip_id: Uuid,
    pub reviewer_id: Uuid,
    pub driver_id: Uuid,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DriverRating {
    pub driver_id: Uuid,
    pub average: Option<f64>,
    pub count: usize,
}

impl Review {
    pub fn new(
        trip_id: Uuid,
        reviewer_id: Uuid,
        driver_id: Uuid,
        rating: u8,
        comment: Option<String>,
    ) -> Result<Self, Error> {
        if !(1..=5).contains(&rating) {
            return Err(invalid_rating_error());
        }

        let comment = comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        if comment.as_ref().map_or(false, |c| c.chars().count() > MAX_COMMENT_LEN) {
            return Err(invalid_input_error());
        }

        Ok(Self {
            trip_id,
            reviewer_id,
            driver_id,
            rating,
            comment,
            created_at: Utc::now(),
        })
    }
}

impl DriverRating {
    pub fn from_reviews(driver_id: Uuid, reviews: &[Review]) -> Self {
        let count = reviews.len();
        let average = match count {
            0 => None,
            _ => Some(reviews.iter().map(|r| r.rating as f64).sum::<f64>() / count as f64),
        };

        Self {
            driver_id,
            average,
            count,
        }
    }
}
