//! PostgreSQL implementations of the store traits.

pub mod delivery;
pub mod destination;
pub mod notification;
pub mod project;
pub mod user;

pub use delivery::DeliveryQuotaRepository;
pub use destination::DestinationRepository;
pub use notification::NotificationRepository;
pub use project::ProjectRepository;
pub use user::UserRepository;
