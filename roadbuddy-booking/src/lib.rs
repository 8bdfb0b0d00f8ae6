pub mod authorizer;
pub mod cancellation;
pub mod circuit_breaker;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod obligations;
pub mod queries;
pub mod reservation;
pub mod retry;
pub mod wallet;

#[cfg(test)]
mod testkit;

pub use authorizer::{AuthorizerConfig, PaymentAuthorizer, PaymentError};
pub use cancellation::CancellationCoordinator;
pub use engine::{Engine, EngineConfig, Stores};
pub use error::{CancellationError, ReservationError};
pub use gateway::SimulatedGateway;
pub use obligations::{ObligationLedger, ObligationSweeper};
pub use queries::{BookingQueries, BookingView, QueryError};
pub use reservation::{ReservationCoordinator, ReserveRequest};
pub use retry::RetryPolicy;
pub use wallet::{NewPaymentMethod, Wallet, WalletError};
