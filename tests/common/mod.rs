#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_channel::Receiver;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use seatshare::api::{NewAdjustment, NewTrip, TripAPI, WalletAPI};
use seatshare::auth::User;
use seatshare::config::Settings;
use seatshare::db::MemoryStore;
use seatshare::engine::Engine;
use seatshare::entities::{Trip, TripDetails, VehicleType};
use seatshare::notifier::{Event, Notifier};

pub struct Harness {
    pub engine: Arc<Engine<MemoryStore>>,
    pub events: Receiver<Event>,
    pub driver: User,
    pub admin: User,
}

pub fn harness() -> Harness {
    harness_with(Settings::default())
}

pub fn harness_with(settings: Settings) -> Harness {
    let (notifier, events) = Notifier::new(1024);
    let store = MemoryStore::new(settings.lock_timeout);

    Harness {
        engine: Arc::new(Engine::new(store, notifier, settings).unwrap()),
        events,
        driver: User::driver(Uuid::new_v4()),
        admin: User::admin(Uuid::new_v4()),
    }
}

pub fn short_lock_settings() -> Settings {
    Settings {
        lock_timeout: StdDuration::from_millis(50),
        ..Settings::default()
    }
}

pub fn passenger() -> User {
    User::passenger(Uuid::new_v4())
}

pub fn details(price_per_seat: Decimal) -> TripDetails {
    TripDetails {
        origin: "Pune".into(),
        destination: "Mumbai".into(),
        vehicle_type: VehicleType::Car,
        price_per_seat,
        ladies_only: false,
        no_smoking: true,
        pet_friendly: false,
    }
}

/// A trip departing within the start window, so the OTP can be issued and checked right away.
pub fn departing_soon() -> DateTime<Utc> {
    Utc::now() + Duration::minutes(10)
}

impl Harness {
    pub async fn publish(
        &self,
        seat_capacity: i32,
        price_per_seat: Decimal,
        scheduled_at: DateTime<Utc>,
    ) -> Trip {
        let params = NewTrip {
            details: details(price_per_seat),
            seat_capacity,
            scheduled_at,
            recurring: false,
        };

        let mut trips = self
            .engine
            .publish_trip(self.driver.clone(), params)
            .await
            .unwrap();

        trips.remove(0)
    }

    pub async fn fund(&self, account_id: Uuid, amount: Decimal) {
        let params = NewAdjustment {
            amount,
            reference_id: Uuid::new_v4(),
            note: "opening balance".into(),
        };

        self.engine
            .post_adjustment(self.admin.clone(), account_id, params)
            .await
            .unwrap();
    }

    pub async fn balance(&self, account_id: Uuid) -> Decimal {
        self.engine
            .find_wallet(self.admin.clone(), account_id)
            .await
            .unwrap()
            .balance
    }

    pub fn drain_events(&self) -> Vec<Event> {
        let mut events = vec![];
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub async fn current_trip(&self, id: Uuid) -> Trip {
        self.engine
            .find_trip(self.driver.clone(), id)
            .await
            .unwrap()
    }
}
