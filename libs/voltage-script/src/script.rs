//! Compiled script
//!
//! A [`Script`] is immutable once compiled, except for the integrator slot
//! which can be filled once afterwards.

use crate::providers::AccumulationLog;
use crate::registry::ScriptRegistry;
use crate::token::{IntegrationMode, Token, SENTINEL};
use crate::units::Unit;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// A compiled metering formula
pub struct Script {
    name: String,
    unit: Unit,
    /// Token stream, always terminated by [`SENTINEL`]
    bytecode: Box<[u8]>,
    /// Constant pool, indexed by constant token payloads
    constants: Box<[f32]>,
    /// Longest chain of integration references below this script
    integration_depth: usize,
    integrator: OnceLock<Arc<dyn AccumulationLog>>,
}

impl Script {
    pub(crate) fn new(
        name: String,
        unit: Unit,
        bytecode: Vec<u8>,
        constants: Vec<f32>,
        integration_depth: usize,
    ) -> Self {
        debug_assert_eq!(bytecode.last(), Some(&SENTINEL));
        Self {
            name,
            unit,
            bytecode: bytecode.into_boxed_slice(),
            constants: constants.into_boxed_slice(),
            integration_depth,
            integrator: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default reporting unit
    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn precision(&self) -> u8 {
        self.unit.precision()
    }

    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }

    pub fn constants(&self) -> &[f32] {
        &self.constants
    }

    /// 0 without integration references, else one more than the deepest target
    pub fn integration_depth(&self) -> usize {
        self.integration_depth
    }

    /// Attach the accumulation log backing this integration
    ///
    /// Returns `false` if a log was already attached; the first one is kept.
    pub fn attach_integrator(&self, log: Arc<dyn AccumulationLog>) -> bool {
        self.integrator.set(log).is_ok()
    }

    pub fn integrator(&self) -> Option<&Arc<dyn AccumulationLog>> {
        self.integrator.get()
    }

    /// Render the bytecode back to formula text
    ///
    /// Integration references are shown by name when `integrations` resolves
    /// them, otherwise as `G@<index>`.
    pub fn formula_text(&self, integrations: Option<&ScriptRegistry>) -> String {
        let mut text = String::new();
        let mut pos = 0;
        while pos < self.bytecode.len() && self.bytecode[pos] != SENTINEL {
            match Token::decode(self.bytecode[pos]) {
                Some(Token::Op(op)) => text.push(op.as_char()),
                Some(Token::Input(n)) => text.push_str(&format!("I{}", n)),
                Some(Token::Virtual(n)) => text.push_str(&format!("V{}", n)),
                Some(Token::Constant(n)) => {
                    let value = self.constants.get(n as usize).copied().unwrap_or(0.0);
                    text.push('C');
                    text.push_str(&format_constant(value));
                },
                Some(Token::Integration(n)) => {
                    pos += 1;
                    let mode = self
                        .bytecode
                        .get(pos)
                        .map(|&b| IntegrationMode::from_byte(b))
                        .unwrap_or_default();
                    text.push('G');
                    text.push_str(mode.sigil());
                    match integrations.and_then(|r| r.get(n as usize)) {
                        Some(target) => text.push_str(target.name()),
                        None => text.push_str(&format!("@{}", n)),
                    }
                },
                None => text.push_str(&format!("token({:#04x})", self.bytecode[pos])),
            }
            pos += 1;
        }
        text
    }
}

/// Four decimals, trailing zeros trimmed, at least one fractional digit
fn format_constant(value: f32) -> String {
    let mut s = format!("{:.4}", value as f64);
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.push('0');
    }
    s
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("name", &self.name)
            .field("unit", &self.unit)
            .field("bytecode", &self.bytecode)
            .field("constants", &self.constants)
            .field("integration_depth", &self.integration_depth)
            .field("integrator", &self.integrator.get().is_some())
            .finish()
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Script:{},units:{} {}",
            self.name,
            self.unit,
            self.formula_text(None)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_constant() {
        assert_eq!(format_constant(2.0), "2.0");
        assert_eq!(format_constant(0.1), "0.1");
        assert_eq!(format_constant(-1.25), "-1.25");
        assert_eq!(format_constant(1.23456), "1.2346");
    }
}
