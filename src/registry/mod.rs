pub mod config;
pub mod forwarder;
pub mod service;
pub mod view;

pub use config::{FeatureFlags, RegistryConfig};
pub use forwarder::{InMemoryRegistryForwarder, RegistryForwarder};
pub use service::RegistryService;
pub use view::DefaultsView;
