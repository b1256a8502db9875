//! Services layer for the identity service.
//!
//! Auth operations flow resolver → executor → reconciliation, all behind the
//! [`AuthService`] facade. Persistence sits behind the [`IdentityStore`] seam
//! with a Postgres implementation and an in-memory one for tests.

mod auth;
mod database;
pub mod error;
mod executor;
pub mod metrics;
mod reconciliation;
mod resolver;
pub mod store;

pub use auth::AuthService;
pub use database::PostgresStore;
pub use error::ServiceError;
pub use executor::{AuthOperationExecutor, ExecutedAuth};
pub use reconciliation::ReconciliationService;
pub use resolver::{ProviderResolver, ResolvedProvider};
pub use store::{IdentityStore, MemoryStore, StoreError};
