//! voltage-script - Metering script engine for VoltageEMS
//!
//! Compiles small formulas over input channels, constants, virtual channels
//! and other named scripts into compact bytecode, then evaluates them over a
//! pair of log records in any supported unit.
//!
//! # Features
//!
//! - **Two-pass compiler**: exact-size token buffer and constant pool
//! - **Unit derivation**: Watts, Volts, Amps, VA, VAh, Hz, Wh, kWh, PF, VAR, VARh
//! - **Integrations**: scripts referencing other scripts, split into positive
//!   and negative components through an accumulation log
//! - **Fail-soft evaluation**: numeric trouble yields 0, never an error
//!
//! # Example
//!
//! ```rust
//! use voltage_script::{compile, evaluate, ChannelTable, EvalContext, LogRecord, NoSolar, ScriptRegistry, Unit};
//!
//! let integrations = ScriptRegistry::new();
//! let script = compile(&integrations, "mains", "Watts", "(I0+I1)*C2").unwrap();
//!
//! let old = LogRecord::new(0).with_channel(0, 0.0, 0.0).with_channel(1, 0.0, 0.0);
//! let new = LogRecord::new(3600).with_channel(0, 30.0, 0.0).with_channel(1, 20.0, 0.0);
//!
//! let channels = ChannelTable::default();
//! let ctx = EvalContext::new(&integrations, &channels, &NoSolar);
//! assert_eq!(evaluate(&script, Some(&old), &new, Unit::Watts, &ctx), 100.0);
//! ```
//!
//! # Formula tokens
//!
//! | Token | Meaning |
//! |-------|---------|
//! | `C<float>` | constant |
//! | `I<n>` | input channel |
//! | `V<n>` | virtual channel (0 is simulated solar) |
//! | `G[+\|-]<name>` | integration reference |
//! | `+ - * / < >` | arithmetic, min, max |
//! | `\|` | absolute value |
//! | `( ) =` | grouping and end |

pub mod accumulation;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod providers;
pub mod registry;
pub mod sample;
pub mod script;
pub mod solar;
pub mod token;
pub mod units;

// Re-exports for convenience
pub use accumulation::MemoryAccumulationLog;
pub use compiler::{compile, compile_with_options, CompileOptions};
pub use config::{EngineConfig, ScriptConfig};
pub use engine::ScriptEngine;
pub use error::{Result, ScriptError};
pub use evaluator::{evaluate, evaluate_default, evaluate_with_unit_str, MAX_INTEGRATION_DEPTH};
pub use providers::{AccumulationLog, EvalContext, NoSolar, SolarProvider};
pub use registry::ScriptRegistry;
pub use sample::{ChannelConfig, ChannelTable, LogRecord, SamplePair};
pub use script::Script;
pub use solar::SimulatedSolar;
pub use token::{IntegrationMode, Operator, Token};
pub use units::Unit;
