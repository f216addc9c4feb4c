use parley_core::Config;
use parley_store::StoreHandle;

use crate::session::registry::SessionRegistry;

/// Shared application state handed to every handler.
pub struct AppState {
    pub config: Config,
    pub store: StoreHandle,
    pub registry: SessionRegistry,
}
