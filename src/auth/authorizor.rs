use oso::{Oso, OsoError, PolarClass};

use crate::auth::{Account, Platform, User};
use crate::entities::{Booking, Trip, Withdrawal};

pub fn new() -> Result<Oso, OsoError> {
    let mut o = Oso::new();

    o.register_class(Platform::get_polar_class())?;
    o.register_class(Account::get_polar_class())?;
    o.register_class(User::get_polar_class())?;
    o.register_class(Trip::get_polar_class())?;
    o.register_class(Booking::get_polar_class())?;
    o.register_class(Withdrawal::get_polar_class())?;

    o.load_str(include_str!("rules.polar"))?;

    Ok(o)
}

#[cfg(test)]
fn sample_trip(driver_id: uuid::Uuid) -> Trip {
    use crate::entities::{TripDetails, VehicleType};
    use chrono::{Duration, Utc};

    let details = TripDetails {
        origin: "Pune".into(),
        destination: "Mumbai".into(),
        vehicle_type: VehicleType::Car,
        price_per_seat: rust_decimal::Decimal::from(200),
        ladies_only: false,
        no_smoking: false,
        pet_friendly: false,
    };

    Trip::new(driver_id, details, 3, Utc::now() + Duration::hours(4)).unwrap()
}

#[test]
fn platform_role_test() {
    use uuid::Uuid;

    let authorizor = new().unwrap();

    let driver = User::driver(Uuid::new_v4());
    let passenger = User::passenger(Uuid::new_v4());
    let admin = User::admin(Uuid::new_v4());

    let allowed = |user: &User, action: &str| {
        authorizor
            .is_allowed(user.clone(), action, Platform::default())
            .unwrap()
    };

    assert!(allowed(&driver, "publish_trip"));
    assert!(!allowed(&passenger, "publish_trip"));

    assert!(allowed(&passenger, "request_seats"));
    assert!(!allowed(&driver, "request_seats"));

    assert!(allowed(&admin, "administer"));
    assert!(!allowed(&driver, "administer"));
}

#[test]
fn trip_driver_role_test() {
    use uuid::Uuid;

    let authorizor = new().unwrap();

    let driver = User::driver(Uuid::new_v4());
    let other_driver = User::driver(Uuid::new_v4());
    let passenger = User::passenger(Uuid::new_v4());
    let trip = sample_trip(driver.id);

    for action in ["read_bookings", "issue_otp", "start", "finish", "cancel"] {
        let result = authorizor.is_allowed(driver.clone(), action, trip.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(other_driver.clone(), action, trip.clone());
        assert_eq!(result.unwrap(), false);

        let result = authorizor.is_allowed(passenger.clone(), action, trip.clone());
        assert_eq!(result.unwrap(), false);
    }

    let result = authorizor.is_allowed(passenger.clone(), "read", trip.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(passenger.clone(), "review", trip.clone());
    assert_eq!(result.unwrap(), true);
}

#[test]
fn booking_party_role_test() {
    use uuid::Uuid;

    let authorizor = new().unwrap();

    let driver = User::driver(Uuid::new_v4());
    let passenger = User::passenger(Uuid::new_v4());
    let stranger = User::passenger(Uuid::new_v4());
    let trip = sample_trip(driver.id);
    let booking = Booking::new(trip.id, driver.id, passenger.id, 1).unwrap();

    let result = authorizor.is_allowed(passenger.clone(), "cancel", booking.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(passenger.clone(), "decide", booking.clone());
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(driver.clone(), "decide", booking.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(driver.clone(), "cancel", booking.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(stranger.clone(), "read", booking.clone());
    assert_eq!(result.unwrap(), false);
}

#[test]
fn wallet_owner_and_admin_role_test() {
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use crate::entities::PayoutMethod;

    let authorizor = new().unwrap();

    let driver = User::driver(Uuid::new_v4());
    let other_driver = User::driver(Uuid::new_v4());
    let admin = User::admin(Uuid::new_v4());
    let account = Account::new(driver.id);

    let result = authorizor.is_allowed(driver.clone(), "request_withdrawal", account.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(other_driver.clone(), "read", account.clone());
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(admin.clone(), "read", account.clone());
    assert_eq!(result.unwrap(), true);

    let withdrawal = Withdrawal::new(
        driver.id,
        dec!(50),
        PayoutMethod::Upi {
            upi_id: "driver@upi".into(),
        },
    )
    .unwrap();

    let result = authorizor.is_allowed(driver.clone(), "read", withdrawal.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(driver.clone(), "approve", withdrawal.clone());
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(admin.clone(), "approve", withdrawal.clone());
    assert_eq!(result.unwrap(), true);
}
