use anyhow::Context;
use std::sync::Arc;

use crate::module::{InitCtx, Migration, Module};

/// Core module lifecycle order; the HTTP server is started separately once
/// every module is up.
const CORE_MODULE_ORDER: &[&str] = &[
    "db",    // Connection pool, must outlive everything else
    "authz", // Staff guard
];

/// Module registry for managing module lifecycle with core/custom separation
pub struct ModuleRegistry {
    core_modules: Vec<Arc<dyn Module>>,
    custom_modules: Vec<Arc<dyn Module>>,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Init,
    Start,
}

impl Phase {
    fn verb(self) -> &'static str {
        match self {
            Phase::Init => "initialize",
            Phase::Start => "start",
        }
    }
}

impl ModuleRegistry {
    /// Create a new module registry
    pub fn new() -> Self {
        Self {
            core_modules: Vec::new(),
            custom_modules: Vec::new(),
        }
    }

    /// Register a core module with the registry
    pub fn register_core(&mut self, module: Arc<dyn Module>) {
        self.core_modules.push(module);
    }

    /// Register a custom module with the registry
    pub fn register_custom(&mut self, module: Arc<dyn Module>) {
        self.custom_modules.push(module);
    }

    /// All registered modules, core first
    pub fn modules(&self) -> Vec<&Arc<dyn Module>> {
        self.core_modules
            .iter()
            .chain(self.custom_modules.iter())
            .collect()
    }

    /// Get a module by name (searches both core and custom modules)
    pub fn get_module(&self, name: &str) -> Option<&Arc<dyn Module>> {
        self.core_modules
            .iter()
            .chain(self.custom_modules.iter())
            .find(|module| module.name() == name)
    }

    pub fn core_module_count(&self) -> usize {
        self.core_modules.len()
    }

    pub fn custom_module_count(&self) -> usize {
        self.custom_modules.len()
    }

    /// Core modules in `CORE_MODULE_ORDER`; unknown core modules follow in
    /// registration order.
    fn ordered_core(&self) -> Vec<&Arc<dyn Module>> {
        let mut ordered: Vec<&Arc<dyn Module>> = CORE_MODULE_ORDER
            .iter()
            .filter_map(|name| self.core_modules.iter().find(|m| m.name() == *name))
            .collect();
        ordered.extend(
            self.core_modules
                .iter()
                .filter(|m| !CORE_MODULE_ORDER.contains(&m.name())),
        );
        ordered
    }

    async fn run_phase(
        modules: &[&Arc<dyn Module>],
        phase: Phase,
        kind: &str,
        ctx: &InitCtx<'_>,
    ) -> anyhow::Result<()> {
        for module in modules {
            tracing::info!(module = module.name(), kind, "{} module", phase.verb());

            let result = match phase {
                Phase::Init => module.init(ctx).await,
                Phase::Start => module.start(ctx).await,
            };
            result.with_context(|| {
                format!(
                    "failed to {} {} module '{}'",
                    phase.verb(),
                    kind,
                    module.name()
                )
            })?;
        }
        Ok(())
    }

    /// Initialize core modules in the correct order
    pub async fn init_core_modules(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        Self::run_phase(&self.ordered_core(), Phase::Init, "core", ctx).await
    }

    /// Initialize custom modules in registration order
    pub async fn init_custom_modules(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        let modules: Vec<_> = self.custom_modules.iter().collect();
        Self::run_phase(&modules, Phase::Init, "custom", ctx).await
    }

    /// Start core modules in the correct order
    pub async fn start_core_modules(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        Self::run_phase(&self.ordered_core(), Phase::Start, "core", ctx).await
    }

    /// Start custom modules in registration order
    pub async fn start_custom_modules(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        let modules: Vec<_> = self.custom_modules.iter().collect();
        Self::run_phase(&modules, Phase::Start, "custom", ctx).await
    }

    /// Stop custom modules first (reverse order)
    pub async fn stop_custom_modules(&self) -> anyhow::Result<()> {
        for module in self.custom_modules.iter().rev() {
            tracing::info!(module = module.name(), "stopping custom module");
            module
                .stop()
                .await
                .with_context(|| format!("failed to stop custom module '{}'", module.name()))?;
        }
        Ok(())
    }

    /// Stop core modules in reverse lifecycle order
    pub async fn stop_core_modules(&self) -> anyhow::Result<()> {
        for module in self.ordered_core().into_iter().rev() {
            tracing::info!(module = module.name(), "stopping core module");
            module
                .stop()
                .await
                .with_context(|| format!("failed to stop core module '{}'", module.name()))?;
        }
        Ok(())
    }

    /// Collect all migrations, sorted by module name then migration id
    pub fn collect_migrations(&self) -> Vec<(String, Migration)> {
        let mut migrations: Vec<(String, Migration)> = self
            .modules()
            .into_iter()
            .flat_map(|module| {
                module
                    .migrations()
                    .into_iter()
                    .map(move |migration| (module.name().to_string(), migration))
            })
            .collect();

        migrations.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(b.1.id)));
        migrations
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
