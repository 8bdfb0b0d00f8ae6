pub mod fare;
pub mod inventory;
pub mod trips;

pub use fare::{FareCalculator, FareError};
pub use inventory::{InventoryError, InventoryManager, ReleaseOutcome};
pub use trips::{CatalogError, TripCatalog};
