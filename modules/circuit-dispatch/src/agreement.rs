use std::collections::BTreeSet;

use crate::store::StoreId;

/// A store's vote on one action: whether it wants to process it, and which
/// stores must finish processing it first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Agreement {
    approved: bool,
    dependencies: BTreeSet<StoreId>,
}

impl Agreement {
    /// Not interested in the action.
    pub fn none() -> Self {
        Self::default()
    }

    /// Interested, with no ordering constraints.
    pub fn approved() -> Self {
        Self {
            approved: true,
            dependencies: BTreeSet::new(),
        }
    }

    /// Interested, but only after every listed store has processed the action.
    pub fn depends_on(dependencies: impl IntoIterator<Item = StoreId>) -> Self {
        Self {
            approved: true,
            dependencies: dependencies.into_iter().collect(),
        }
    }

    pub fn is_approved(&self) -> bool {
        self.approved
    }

    pub fn dependencies(&self) -> &BTreeSet<StoreId> {
        &self.dependencies
    }
}
