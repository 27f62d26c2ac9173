pub mod cached_repository;
pub mod message_repository;
pub mod poll_repository;
pub mod profile_repository;
pub mod serie_repository;
pub mod streak_repository;

pub use cached_repository::{CachedRepository, EntityWatch};
pub use message_repository::MessageRepository;
pub use poll_repository::PollRepository;
pub use profile_repository::{ProfilePatch, ProfileRepository};
pub use serie_repository::{SeriePatch, SerieRepository};
pub use streak_repository::StreakRepository;
