pub mod authorizor;
mod platform;
mod user;

pub use platform::{Account, Platform};
pub use user::{User, ADMIN, DRIVER, PASSENGER, USER_ID_HEADER, USER_ROLES_HEADER};
