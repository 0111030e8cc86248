//! Actions flowing through the dispatcher.

use std::fmt::Debug;

/// Actions carry a type discriminator used for logging and diagnostics.
///
/// Model actions as an enum and return a stable name per variant. The payload
/// is whatever the variant holds; the dispatcher never looks inside it.
pub trait ActionLike: Debug + Send + Sync + 'static {
    fn action_type(&self) -> &'static str;
}
