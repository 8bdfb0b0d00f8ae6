use roadbuddy_catalog::fare::FareConfig;
use roadbuddy_catalog::{FareCalculator, InventoryManager, TripCatalog};
use roadbuddy_core::payment::PaymentGateway;
use roadbuddy_core::repository::{
    BookingRepository, ObligationRepository, PaymentMethodRepository, TransactionRepository, TripRepository,
};
use roadbuddy_core::EventSink;
use std::sync::Arc;
use std::time::Duration;

use crate::authorizer::{AuthorizerConfig, PaymentAuthorizer};
use crate::cancellation::CancellationCoordinator;
use crate::obligations::{ObligationLedger, ObligationSweeper};
use crate::queries::BookingQueries;
use crate::reservation::ReservationCoordinator;
use crate::retry::RetryPolicy;
use crate::wallet::Wallet;

/// Storage backends the engine runs on.
#[derive(Clone)]
pub struct Stores {
    pub trips: Arc<dyn TripRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub methods: Arc<dyn PaymentMethodRepository>,
    pub obligations: Arc<dyn ObligationRepository>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub currency: String,
    pub fare: FareConfig,
    pub authorizer: AuthorizerConfig,
    pub retry: RetryPolicy,
    pub sweep_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            fare: FareConfig::default(),
            authorizer: AuthorizerConfig::default(),
            retry: RetryPolicy::default(),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// The wired-up reservation and settlement services.
#[derive(Clone)]
pub struct Engine {
    pub catalog: Arc<TripCatalog>,
    pub inventory: Arc<InventoryManager>,
    pub wallet: Arc<Wallet>,
    pub authorizer: Arc<PaymentAuthorizer>,
    pub reservations: Arc<ReservationCoordinator>,
    pub cancellations: Arc<CancellationCoordinator>,
    pub queries: Arc<BookingQueries>,
    pub ledger: Arc<ObligationLedger>,
    pub sweeper: Arc<ObligationSweeper>,
}

impl Engine {
    pub fn new(stores: Stores, gateway: Arc<dyn PaymentGateway>, events: Arc<dyn EventSink>, config: EngineConfig) -> Self {
        let inventory = Arc::new(InventoryManager::new(stores.trips.clone()));
        let catalog = Arc::new(TripCatalog::new(stores.trips.clone(), inventory.clone(), events.clone()));
        let wallet = Arc::new(Wallet::new(stores.methods.clone()));
        let authorizer = Arc::new(PaymentAuthorizer::new(
            gateway,
            stores.methods.clone(),
            stores.transactions.clone(),
            config.authorizer.clone(),
            config.retry.clone(),
        ));
        let ledger = Arc::new(ObligationLedger::new(stores.obligations.clone()));

        let reservations = Arc::new(ReservationCoordinator::new(
            FareCalculator::new(config.fare.clone()),
            inventory.clone(),
            authorizer.clone(),
            wallet.clone(),
            stores.trips.clone(),
            stores.bookings.clone(),
            ledger.clone(),
            events.clone(),
            config.retry.clone(),
            config.currency.clone(),
        ));
        let cancellations = Arc::new(CancellationCoordinator::new(
            inventory.clone(),
            authorizer.clone(),
            stores.bookings.clone(),
            ledger.clone(),
            events,
            config.retry.clone(),
        ));
        let queries = Arc::new(BookingQueries::new(stores.bookings.clone(), stores.trips.clone()));
        let sweeper = Arc::new(ObligationSweeper::new(
            ledger.clone(),
            inventory.clone(),
            authorizer.clone(),
            cancellations.clone(),
            config.sweep_interval,
        ));

        Self {
            catalog,
            inventory,
            wallet,
            authorizer,
            reservations,
            cancellations,
            queries,
            ledger,
            sweeper,
        }
    }
}
