pub mod availability;
pub mod catalog;
pub mod checkout;
pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod locks;
pub mod manager;
pub mod models;
pub mod sweeper;

pub use catalog::{Catalog, InMemoryCatalog};
pub use checkout::CheckoutOrchestrator;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::InventoryConfig;
pub use error::{InventoryError, Result};
pub use manager::ReservationManager;
pub use models::{ConfirmFailure, ConfirmReport, StockLevel, SweepReport, VariantStock};
pub use sweeper::ExpirySweeper;
