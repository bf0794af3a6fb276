//! Built-in operator set.

mod arithmetic;

use crate::registry::OperatorRegistry;

pub(crate) fn register_standard(registry: &mut OperatorRegistry) {
    arithmetic::register(registry);
}
