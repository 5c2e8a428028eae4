pub mod catalog;
pub mod loans;
pub mod selection;

use libris_kernel::ModuleRegistry;

use crate::state::AppState;

/// Register all project-specific modules with the registry
pub fn register_all(registry: &mut ModuleRegistry, state: &AppState) {
    registry.register_custom(catalog::create_module(state.clone()));
    registry.register_custom(selection::create_module(state.clone()));
    registry.register_custom(loans::create_module(state.clone()));
}
