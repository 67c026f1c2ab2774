use std::sync::Arc;

use log::info;

use crate::{
    model::Module,
    process::{measure, CommandRunner},
    state::SetupState,
};

/// Runs every module's setup in `order`, recording each completed module.
///
/// Modules without a setup hook are recorded straight away. The state
/// directory stays locked for the whole stage.
pub fn run_setup(
    order: &[Arc<Module>],
    runner: &dyn CommandRunner,
    state: &SetupState,
) -> anyhow::Result<()> {
    let _lock = state.lock()?;
    measure("setup", || -> anyhow::Result<()> {
        for module in order {
            if let Some(hook) = module.setup_hook() {
                info!("Setting up {}", module);
                measure(&format!("setup {}", module), || hook.setup(runner))?;
            }
            state.mark_setup(module.name())?;
        }
        Ok(())
    })
}
