mod app;
mod config;
mod load;
mod registry;
mod request;
mod transport;
mod validation;

pub use app::{AppError, AppResult};
pub use config::ConfigError;
pub use load::LoadError;
pub use registry::RegistryError;
pub use request::RequestError;
pub use transport::TransportError;
pub use validation::ValidationError;
