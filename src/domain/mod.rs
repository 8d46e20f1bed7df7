mod customer;
mod money;
mod page;
mod transaction;

pub use customer::*;
pub use money::*;
pub use page::*;
pub use transaction::*;
