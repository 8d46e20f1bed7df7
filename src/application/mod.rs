// Application layer - the ledger engine and the shapes it exposes to boundaries.

pub mod error;
mod locks;
pub mod responses;
mod service;

pub use error::*;
pub use locks::*;
pub use responses::*;
pub use service::*;
