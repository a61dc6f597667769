pub mod auth_jwt_claims;
pub mod authenticated_user;
pub mod catalog;
pub mod exchange_rate;
pub mod invoice;
pub mod network;
pub mod verification;
pub mod wash_event;

pub use auth_jwt_claims::*;
pub use authenticated_user::{AuthenticatedUser, UserRole};
pub use catalog::*;
pub use exchange_rate::*;
pub use invoice::*;
pub use network::*;
pub use verification::*;
pub use wash_event::*;
