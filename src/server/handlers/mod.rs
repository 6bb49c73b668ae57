pub mod bookings;
pub mod reviews;
pub mod trips;
pub mod wallets;
pub mod withdrawals;
