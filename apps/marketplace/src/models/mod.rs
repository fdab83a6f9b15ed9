// apps/marketplace/src/models/mod.rs

//! App-side records. RFQs, quotes and orders are the `tradeflow` lifecycle
//! entities themselves; only the catalogue and address book live here.

pub mod actor;
pub mod address;
pub mod product;

pub use actor::{Actor, Role};
pub use address::{Address, AddressInput};
pub use product::{Product, ProductInput};
