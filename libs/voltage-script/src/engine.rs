//! Script engine
//!
//! Owns the compiled integration and output registries, the channel table,
//! the solar provider and one accumulation log per integration script.

use crate::accumulation::MemoryAccumulationLog;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::evaluator::evaluate;
use crate::providers::{AccumulationLog, EvalContext, NoSolar, SolarProvider};
use crate::registry::ScriptRegistry;
use crate::sample::{ChannelTable, LogRecord};
use crate::script::Script;
use crate::units::Unit;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ScriptEngine {
    integrations: ScriptRegistry,
    outputs: ScriptRegistry,
    channels: ChannelTable,
    solar: Box<dyn SolarProvider>,
    /// Index-aligned with `integrations`
    logs: Vec<Arc<MemoryAccumulationLog>>,
}

impl ScriptEngine {
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let integrations =
            ScriptRegistry::compile_integrations(&config.integrations, &config.compiler)?;

        let logs = integrations
            .iter()
            .map(|script| {
                let log = Arc::new(MemoryAccumulationLog::new());
                let shared: Arc<dyn AccumulationLog> = log.clone();
                if !script.attach_integrator(shared) {
                    warn!(integration = script.name(), "Integrator already attached");
                }
                log
            })
            .collect();

        let outputs =
            ScriptRegistry::compile_all(&config.outputs, &integrations, &config.compiler)?;

        let solar: Box<dyn SolarProvider> = match config.solar {
            Some(solar) => Box::new(solar),
            None => Box::new(NoSolar),
        };

        info!(
            "Script engine ready: {} integrations, {} outputs",
            integrations.len(),
            outputs.len()
        );

        Ok(Self {
            integrations,
            outputs,
            channels: config.channels.clone(),
            solar,
            logs,
        })
    }

    pub fn context(&self) -> EvalContext<'_> {
        EvalContext::new(&self.integrations, &self.channels, self.solar.as_ref())
    }

    /// Find a script by name, outputs first
    pub fn script(&self, name: &str) -> Option<&Script> {
        self.outputs
            .lookup(name)
            .or_else(|| self.integrations.lookup(name))
    }

    /// Evaluate a named script; `unit` defaults to the script's own
    pub fn evaluate(
        &self,
        name: &str,
        old: Option<&LogRecord>,
        new: &LogRecord,
        unit: Option<Unit>,
    ) -> Option<f64> {
        let script = self.script(name)?;
        let unit = unit.unwrap_or(script.unit());
        Some(evaluate(script, old, new, unit, &self.context()))
    }

    /// Feed one logging interval into every integration's accumulation log
    pub fn record_interval(&self, old: &LogRecord, new: &LogRecord) {
        let ctx = self.context();
        for (script, log) in self.integrations.iter().zip(&self.logs) {
            let positive = log.integrate(script, old, new, &ctx);
            debug!(integration = script.name(), positive, "Recorded interval");
        }
    }

    pub fn integrations(&self) -> &ScriptRegistry {
        &self.integrations
    }

    pub fn outputs(&self) -> &ScriptRegistry {
        &self.outputs
    }

    pub fn channels(&self) -> &ChannelTable {
        &self.channels
    }

    /// Accumulation log of the integration at `index`
    pub fn log(&self, index: usize) -> Option<&MemoryAccumulationLog> {
        self.logs.get(index).map(Arc::as_ref)
    }
}
