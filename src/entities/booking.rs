use chrono::{DateTime, Utc};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{invalid_seats_error, invalid_state_error, Error};

#[derive(Clone, Debug, Serialize, Deserialize, PolarClass)]
pub struct Booking {
    #[polar(attribute)]
    pub id: Uuid,
    #[polar(attribute)]
    pub trip_id: Uuid,
    #[polar(attribute)]
    pub passenger_id: Uuid,
    #[polar(attribute)]
    pub driver_id: Uuid,
    pub seats_requested: i32,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl Status {
    pub fn name(&self) -> String {
        match self {
            Self::Pending => "pending".into(),
            Self::Approved => "approved".into(),
            Self::Rejected => "rejected".into(),
            Self::Cancelled => "cancelled".into(),
        }
    }

    /// Pending and approved bookings hold seats on their trip.
    pub fn holds_seats(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Booking {
    pub fn new(trip_id: Uuid, driver_id: Uuid, passenger_id: Uuid, seats: i32) -> Result<Self, Error> {
        if seats < 1 {
            return Err(invalid_seats_error());
        }

        Ok(Self {
            id: Uuid::new_v4(),
            trip_id,
            passenger_id,
            driver_id,
            seats_requested: seats,
            status: Status::Pending,
            created_at: Utc::now(),
            decided_at: None,
        })
    }

    /// Applies the driver's decision. Returns the number of seats to hand back to the trip.
    #[tracing::instrument(skip(self), fields(booking_id = %self.id))]
    pub fn decide(&mut self, decision: Decision) -> Result<i32, Error> {
        if self.status != Status::Pending {
            return Err(invalid_state_error());
        }

        self.decided_at = Some(Utc::now());

        match decision {
            Decision::Approve => {
                self.status = Status::Approved;
                Ok(0)
            }
            Decision::Reject => {
                self.status = Status::Rejected;
                Ok(self.seats_requested)
            }
        }
    }

    /// Cancels a seat-holding booking. Returns the seats to release.
    #[tracing::instrument(skip(self), fields(booking_id = %self.id))]
    pub fn cancel(&mut self) -> Result<i32, Error> {
        if !self.status.holds_seats() {
            return Err(invalid_state_error());
        }

        self.status = Status::Cancelled;
        self.decided_at = Some(Utc::now());

        Ok(self.seats_requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(seats: i32) -> Booking {
        Booking::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), seats).unwrap()
    }

    #[test]
    fn needs_at_least_one_seat() {
        assert_eq!(
            Booking::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 0).unwrap_err(),
            invalid_seats_error()
        );
    }

    #[test]
    fn decision_happens_once() {
        let mut approved = booking(2);
        assert_eq!(approved.decide(Decision::Approve).unwrap(), 0);
        assert_eq!(approved.decide(Decision::Reject).unwrap_err(), invalid_state_error());

        let mut rejected = booking(2);
        assert_eq!(rejected.decide(Decision::Reject).unwrap(), 2);
        assert_eq!(rejected.status, Status::Rejected);
        assert!(!rejected.status.holds_seats());
    }

    #[test]
    fn cancel_releases_held_seats() {
        let mut pending = booking(1);
        assert_eq!(pending.cancel().unwrap(), 1);

        let mut approved = booking(3);
        approved.decide(Decision::Approve).unwrap();
        assert_eq!(approved.cancel().unwrap(), 3);
        assert_eq!(approved.cancel().unwrap_err(), invalid_state_error());
    }
}
