pub mod error;
pub mod types;

pub use error::{Result, RwcError};
pub use types::{
    ConcernSource, DEFAULTS_DOCUMENT_ID, OpTime, ReadConcern, ReadConcernLevel,
    RwDefaultsDocument, WriteAcknowledgment, WriteConcern,
};
