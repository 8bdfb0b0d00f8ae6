pub mod app_config;
pub mod booking_repo;
pub mod broadcast;
pub mod database;
pub mod events;
pub mod memory;
pub mod obligation_repo;
pub mod payment_repo;
pub mod redis_repo;
pub mod trip_repo;

pub use booking_repo::StoreBookingRepository;
pub use broadcast::BroadcastEventSink;
pub use database::DbClient;
pub use events::{EventProducer, KafkaEventSink};
pub use obligation_repo::StoreObligationRepository;
pub use payment_repo::{StorePaymentMethodRepository, StoreTransactionRepository};
pub use redis_repo::RedisClient;
pub use trip_repo::StoreTripRepository;
