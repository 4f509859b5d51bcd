pub mod engine;
pub mod memory;
pub mod persistence;

pub use engine::{DefaultsStore, DurabilityContract, DurabilityLevel, majority_of};
pub use memory::InMemoryDefaultsStore;
pub use persistence::FileDefaultsStore;
