//! Back-office entities as the API serves them.
//!
//! - `Tour`, `NewTour`: the catalogue and its create/update payload
//! - `User`, `Role`: staff accounts
//! - `ReservationStatus`: lifecycle of a booking

pub mod reservation;
pub mod tour;
pub mod user;

pub use reservation::ReservationStatus;
pub use tour::{format_price, NewTour, Tour};
pub use user::{Role, User};
