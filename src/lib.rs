pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod service;
pub mod state;
pub mod store;
pub mod validation;

pub use config::Config;
pub use error::{ServiceError, StorageError, ValidationError};
pub use models::{Marker, MarkerCollection, MarkerInput, MarkerType, Stats};
pub use routes::{cors_layer, create_router};
pub use service::MarkerService;
pub use state::AppState;
pub use store::{JsonFileStore, RecordStore};
pub use validation::Validator;
