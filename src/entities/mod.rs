mod booking;
mod ledger;
mod review;
mod trip;
mod wallet;
mod withdrawal;

pub use booking::{Booking, Decision, Status as BookingStatus};
pub use ledger::{Kind as LedgerKind, LedgerEntry, Posting, MAX_POSTING};
pub use review::{DriverRating, Review};
pub use trip::{
    Otp, OtpCheck, Status as TripStatus, Trip, TripDetails, VehicleType, Windows,
    MAX_PRICE_PER_SEAT,
};
pub use wallet::{sum as ledger_sum, Standing, WalletAccount};
pub use withdrawal::{PayoutMethod, Status as WithdrawalStatus, Withdrawal};
