use std::sync::Arc;

use crate::{config::Config, registry::Registry, store::Store, sync::SyncHub};

/* ------------ 共享狀態：由 main 建立後注入路由 ------------ */
#[derive(Clone)]
pub struct AppState {
    pub hub:    SyncHub,
    pub store:  Store,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Store, config: Config) -> Self {
        Self {
            hub: SyncHub::new(Registry::default(), store.clone()),
            store,
            config: Arc::new(config),
        }
    }
}
