use chrono::{DateTime, Duration, Utc};
use oso::PolarClass;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{
    amount_overflow_error, capacity_exceeded_error, invalid_input_error, invalid_otp_error,
    invalid_otp_format_error, invalid_seats_error, invalid_state_error, not_startable_error,
    seats_unavailable_error, too_many_attempts_error, Error,
};

/// Upper bound on the price of one seat, keeping every fare well inside `Decimal`'s range.
pub const MAX_PRICE_PER_SEAT: Decimal = Decimal::from_parts(100_000, 0, 0, false, 0);

#[derive(Clone, Debug, Serialize, Deserialize, PolarClass)]
pub struct Trip {
    #[polar(attribute)]
    pub id: Uuid,
    #[polar(attribute)]
    pub driver_id: Uuid,
    pub details: TripDetails,
    pub seat_capacity: i32,
    pub seats_reserved: i32,
    pub status: Status,
    pub otp: Option<Otp>,
    pub scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TripDetails {
    pub origin: String,
    pub destination: String,
    pub vehicle_type: VehicleType,
    pub price_per_seat: Decimal,
    #[serde(default)]
    pub ladies_only: bool,
    #[serde(default)]
    pub no_smoking: bool,
    #[serde(default)]
    pub pet_friendly: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Car,
    Bike,
}

impl VehicleType {
    pub fn max_seats(&self) -> i32 {
        match self {
            Self::Car => 6,
            Self::Bike => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Active,
    Full,
    InProgress,
    Completed,
    Cancelled,
}

impl Status {
    pub fn name(&self) -> String {
        match self {
            Self::Active => "active".into(),
            Self::Full => "full".into(),
            Self::InProgress => "in_progress".into(),
            Self::Completed => "completed".into(),
            Self::Cancelled => "cancelled".into(),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Active | Self::Full)
    }
}

/// One-time code gating the transition into `in_progress`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Otp {
    pub code: String,
    pub issued_at: DateTime<Utc>,
    #[serde(default)]
    pub failed_attempts: u32,
}

impl Otp {
    pub fn generate(now: DateTime<Utc>) -> Self {
        let code: u16 = rand::thread_rng().gen_range(1000..10000);

        Self {
            code: code.to_string(),
            issued_at: now,
            failed_attempts: 0,
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, validity: Duration) -> bool {
        now >= self.issued_at && now - self.issued_at <= validity
    }
}

/// Result of an OTP check. A rejected attempt is still a state change (the failure counter).
#[derive(Debug, PartialEq, Eq)]
pub enum OtpCheck {
    Accepted,
    Rejected,
    Locked,
}

#[derive(Clone, Copy, Debug)]
pub struct Windows {
    pub otp_validity: Duration,
    pub start_window: Duration,
    pub otp_max_attempts: u32,
}

impl Default for Windows {
    fn default() -> Self {
        Self {
            otp_validity: Duration::hours(24),
            start_window: Duration::minutes(30),
            otp_max_attempts: 5,
        }
    }
}

impl TripDetails {
    pub fn validate(&self, seat_capacity: i32) -> Result<(), Error> {
        if self.origin.trim().is_empty() || self.destination.trim().is_empty() {
            return Err(invalid_input_error());
        }

        if self.price_per_seat.is_sign_negative() || self.price_per_seat > MAX_PRICE_PER_SEAT {
            return Err(invalid_input_error());
        }

        if seat_capacity < 1 || seat_capacity > self.vehicle_type.max_seats() {
            return Err(invalid_seats_error());
        }

        Ok(())
    }

    fn normalized(mut self) -> Self {
        self.origin = self.origin.trim().to_string();
        self.destination = self.destination.trim().to_string();
        self
    }
}

impl Trip {
    pub fn new(
        driver_id: Uuid,
        details: TripDetails,
        seat_capacity: i32,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Self, Error> {
        details.validate(seat_capacity)?;

        Ok(Self {
            id: Uuid::new_v4(),
            driver_id,
            details: details.normalized(),
            seat_capacity,
            seats_reserved: 0,
            status: Status::Active,
            otp: None,
            scheduled_at,
            created_at: Utc::now(),
        })
    }

    pub fn free_seats(&self) -> i32 {
        self.seat_capacity - self.seats_reserved
    }

    /// Seat counters must stay within `0..=seat_capacity`; anything else is corrupted storage.
    pub fn check_integrity(&self) -> Result<(), Error> {
        if self.seats_reserved < 0 || self.seats_reserved > self.seat_capacity {
            tracing::error!(
                trip_id = %self.id,
                seats_reserved = self.seats_reserved,
                seat_capacity = self.seat_capacity,
                "seat inventory corrupted"
            );
            return Err(capacity_exceeded_error());
        }

        Ok(())
    }

    /// Admission critical section. Returns true when this reservation filled the trip.
    #[tracing::instrument(skip(self), fields(trip_id = %self.id))]
    pub fn reserve_seats(&mut self, seats: i32) -> Result<bool, Error> {
        if seats < 1 {
            return Err(invalid_seats_error());
        }

        if self.status != Status::Active {
            return Err(match self.status {
                Status::Full => seats_unavailable_error(),
                _ => invalid_state_error(),
            });
        }

        if seats > self.free_seats() {
            return Err(seats_unavailable_error());
        }

        self.seats_reserved += seats;

        if self.free_seats() == 0 {
            self.status = Status::Full;
            return Ok(true);
        }

        Ok(false)
    }

    /// Compensating action for a rejected or cancelled reservation. Returns true when the
    /// trip went from `full` back to `active`.
    #[tracing::instrument(skip(self), fields(trip_id = %self.id))]
    pub fn release_seats(&mut self, seats: i32) -> Result<bool, Error> {
        if seats < 1 || seats > self.seats_reserved {
            tracing::error!(seats, seats_reserved = self.seats_reserved, "release exceeds reservation");
            return Err(capacity_exceeded_error());
        }

        self.seats_reserved -= seats;

        if self.status == Status::Full && self.free_seats() > 0 {
            self.status = Status::Active;
            return Ok(true);
        }

        Ok(false)
    }

    pub fn can_issue_otp(&self, now: DateTime<Utc>, windows: &Windows) -> bool {
        let same_day = now.date_naive() == self.scheduled_at.date_naive();
        let in_window = self.in_start_window(now, windows);

        self.status.is_open() && (same_day || in_window)
    }

    pub fn in_start_window(&self, now: DateTime<Utc>, windows: &Windows) -> bool {
        now >= self.scheduled_at - windows.start_window && now <= self.scheduled_at
    }

    #[tracing::instrument(skip(self, windows), fields(trip_id = %self.id))]
    pub fn issue_otp(&mut self, now: DateTime<Utc>, windows: &Windows) -> Result<&Otp, Error> {
        if !self.can_issue_otp(now, windows) {
            return Err(not_startable_error());
        }

        Ok(self.otp.insert(Otp::generate(now)))
    }

    /// Compares `code` against the issued OTP. The caller persists the trip in every outcome
    /// except a validation error, since a rejection bumps the failure counter.
    #[tracing::instrument(skip(self, code, windows), fields(trip_id = %self.id))]
    pub fn check_otp(
        &mut self,
        code: &str,
        now: DateTime<Utc>,
        windows: &Windows,
    ) -> Result<OtpCheck, Error> {
        let code = code.trim();
        if code.len() != 4 || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid_otp_format_error());
        }

        if !self.status.is_open() {
            return Err(invalid_state_error());
        }

        if !self.in_start_window(now, windows) {
            return Err(not_startable_error());
        }

        let otp = match self.otp.as_mut() {
            Some(otp) => otp,
            None => return Ok(OtpCheck::Rejected),
        };

        if otp.failed_attempts >= windows.otp_max_attempts {
            return Ok(OtpCheck::Locked);
        }

        if otp.code != code || !otp.is_fresh(now, windows.otp_validity) {
            otp.failed_attempts += 1;
            return Ok(OtpCheck::Rejected);
        }

        self.status = Status::InProgress;
        self.otp = None;

        Ok(OtpCheck::Accepted)
    }

    /// Convenience wrapper turning a rejected check into its error.
    pub fn start(&mut self, code: &str, now: DateTime<Utc>, windows: &Windows) -> Result<(), Error> {
        match self.check_otp(code, now, windows)? {
            OtpCheck::Accepted => Ok(()),
            OtpCheck::Rejected => Err(invalid_otp_error()),
            OtpCheck::Locked => Err(too_many_attempts_error()),
        }
    }

    #[tracing::instrument(skip(self), fields(trip_id = %self.id))]
    pub fn finish(&mut self) -> Result<(), Error> {
        match self.status {
            Status::InProgress => {
                self.status = Status::Completed;
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }

    #[tracing::instrument(skip(self), fields(trip_id = %self.id))]
    pub fn cancel(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Active | Status::Full => {
                self.status = Status::Cancelled;
                self.otp = None;
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }

    pub fn fare(&self, approved_seats: i32) -> Result<Decimal, Error> {
        self.details
            .price_per_seat
            .checked_mul(Decimal::from(approved_seats))
            .ok_or_else(amount_overflow_error)
    }

    /// The listing shape: the OTP is only ever shown to the trip's approved passengers.
    pub fn redacted(mut self) -> Self {
        self.otp = None;
        self
    }
}
