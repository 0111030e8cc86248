use thiserror::Error;

use crate::store::StoreId;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Store {0} already registered")]
    DuplicateStore(StoreId),

    #[error("Cycle detected in store dependencies: {}", join_cycle(.stores))]
    CycleDetected { stores: Vec<StoreId> },

    #[error("Store {dependent} depends on unregistered store {store}")]
    UnknownStore { store: StoreId, dependent: StoreId },

    #[error("Configuration error: {0}")]
    Config(String),
}

fn join_cycle(stores: &[StoreId]) -> String {
    stores
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(" > ")
}

pub type Result<T, E = DispatchError> = std::result::Result<T, E>;
