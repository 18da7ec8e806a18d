pub mod profile;
pub mod reservation;
pub mod venue;

pub use profile::{UserProfile, UserRole};
pub use reservation::Reservation;
pub use venue::Venue;
