pub mod actor;
pub mod store;

pub use actor::StoreHandle;
pub use store::{ChatStore, StoreError};
