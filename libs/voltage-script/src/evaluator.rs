//! Bytecode evaluator
//!
//! Runs a compiled [`Script`] over a pair of log records.
//!
//! - Base units (Watts, Volts, Amps, Hz, Wh, VAR, VARh) scan the bytecode directly
//! - VA, VAh, kWh and PF are derived from base-unit scans
//! - Numeric trouble never raises: non-finite results come back as 0
//!
//! The scan keeps a running `result`, the `pending` operator and the current
//! `operand`. Each arithmetic operator folds the pending one into the
//! result; `(` recurses, `)` and `=` fold and return.

use crate::providers::EvalContext;
use crate::sample::{elapsed_hours, ChannelDelta, LogRecord};
use crate::script::Script;
use crate::token::{IntegrationMode, Operator, Token};
use crate::units::Unit;
use tracing::{debug, trace, warn};

/// Deepest chain of integration references
///
/// The compiler rejects longer chains. The evaluator stops at the same depth
/// when a script is run against a registry it was not compiled for.
pub const MAX_INTEGRATION_DEPTH: usize = 8;

/// Evaluate `script` in `unit` over `[old, new]`
///
/// With no old record the call is an instantaneous read: deltas are the new
/// accumulator values on a one-hour basis.
pub fn evaluate(
    script: &Script,
    old: Option<&LogRecord>,
    new: &LogRecord,
    unit: Unit,
    ctx: &EvalContext<'_>,
) -> f64 {
    Evaluator {
        ctx: *ctx,
        old,
        new,
        depth: 0,
    }
    .run(script, unit)
}

/// Evaluate in the script's own unit
pub fn evaluate_default(
    script: &Script,
    old: Option<&LogRecord>,
    new: &LogRecord,
    ctx: &EvalContext<'_>,
) -> f64 {
    evaluate(script, old, new, script.unit(), ctx)
}

/// Evaluate in a unit given by name; unknown names yield 0
pub fn evaluate_with_unit_str(
    script: &Script,
    old: Option<&LogRecord>,
    new: &LogRecord,
    unit: &str,
    ctx: &EvalContext<'_>,
) -> f64 {
    match Unit::from_name(unit.trim()) {
        Some(unit) => evaluate(script, old, new, unit, ctx),
        None => {
            debug!(script = script.name(), unit, "Unknown unit requested");
            0.0
        },
    }
}

#[derive(Clone, Copy)]
struct Evaluator<'a> {
    ctx: EvalContext<'a>,
    old: Option<&'a LogRecord>,
    new: &'a LogRecord,
    depth: usize,
}

impl<'a> Evaluator<'a> {
    fn run(&self, script: &Script, unit: Unit) -> f64 {
        let result = match unit {
            Unit::VA => {
                let var = self.scan_all(script, Unit::VAR);
                let watts = self.scan_all(script, Unit::Watts);
                (var * var + watts * watts).sqrt()
            },
            Unit::VAh => {
                let varh = self.scan_all(script, Unit::VARh);
                let wh = self.scan_all(script, Unit::Wh);
                (varh * varh + wh * wh).sqrt()
            },
            Unit::KWh => self.scan_all(script, Unit::Wh) / 1000.0,
            Unit::PF => {
                let watts = self.scan_all(script, Unit::Watts);
                let va = self.scan_all(script, Unit::VA);
                watts / va
            },
            _ => self.scan_all(script, unit),
        };

        if result.is_finite() {
            result
        } else {
            trace!(script = script.name(), %unit, "Non-finite result");
            0.0
        }
    }

    fn scan_all(&self, script: &Script, unit: Unit) -> f64 {
        let mut pos = 0;
        self.scan(script, &mut pos, unit)
    }

    /// Scan one nesting level starting at `pos`, leaving `pos` past its end
    fn scan(&self, script: &Script, pos: &mut usize, unit: Unit) -> f64 {
        let bytecode = script.bytecode();
        let mut result = 0.0;
        let mut pending = Operator::Add;
        let mut operand = 0.0;

        while *pos < bytecode.len() {
            let byte = bytecode[*pos];
            *pos += 1;

            // Sentinel (or anything undecodable) ends the formula
            let Some(token) = Token::decode(byte) else {
                return pending.apply(result, operand);
            };

            match token {
                Token::Op(op) => match op {
                    Operator::End | Operator::Pop => return pending.apply(result, operand),
                    Operator::Abs => operand = operand.abs(),
                    Operator::Push => operand = self.scan(script, pos, unit),
                    _ => {
                        result = pending.apply(result, operand);
                        pending = op;
                        operand = op.identity();
                    },
                },
                Token::Constant(index) => {
                    operand = script
                        .constants()
                        .get(index as usize)
                        .map_or(0.0, |&c| c as f64);
                },
                Token::Input(channel) => operand = self.input(channel as usize, unit),
                Token::Virtual(channel) => operand = self.virtual_channel(channel, unit),
                Token::Integration(index) => {
                    let mode = bytecode
                        .get(*pos)
                        .map(|&b| IntegrationMode::from_byte(b))
                        .unwrap_or_default();
                    *pos += 1;
                    match self.integration(index as usize, mode, unit) {
                        Some(value) => operand = value,
                        None => {
                            skip_level(bytecode, pos);
                            return 0.0;
                        },
                    }
                },
            }
        }

        pending.apply(result, operand)
    }

    fn input(&self, input: usize, unit: Unit) -> f64 {
        let hours = elapsed_hours(self.old, self.new);
        let delta = ChannelDelta::between(self.old, self.new, input);
        let channel = self.ctx.channels.get(input);
        let reference = ChannelDelta::between(self.old, self.new, channel.vchannel);
        let volts = reference.accum1 * channel.vmult;
        let hz = reference.accum2;

        match unit {
            Unit::Watts => delta.accum1 / hours,
            Unit::Volts => volts / hours,
            Unit::Amps => {
                let va = delta.accum2 / hours;
                let volts = volts / hours;
                if volts != 0.0 {
                    va / volts
                } else {
                    0.0
                }
            },
            Unit::VA => delta.accum2 / hours,
            Unit::VAh => delta.accum2,
            Unit::Hz => hz / hours,
            Unit::Wh => delta.accum1,
            // Negative radicands (VA < W on non-ideal loads) give NaN,
            // which the top level turns into 0
            Unit::VAR => {
                let va = delta.accum2 / hours;
                let watts = delta.accum1 / hours;
                (va * va - watts * watts).sqrt()
            },
            Unit::VARh => {
                let vah = delta.accum2;
                let wh = delta.accum1;
                (vah * vah - wh * wh).sqrt()
            },
            Unit::KWh | Unit::PF => 0.0,
        }
    }

    /// Virtual channel 0 is the simulated solar array
    fn virtual_channel(&self, channel: u8, unit: Unit) -> f64 {
        if channel != 0 {
            return 0.0;
        }
        let solar = self.ctx.solar;
        match (unit, self.old) {
            (Unit::Watts, _) | (Unit::Wh, None) => solar.instantaneous_power(self.new.unix_time),
            (Unit::Wh, Some(old)) => solar.integrated_energy(old.unix_time, self.new.unix_time),
            _ => 0.0,
        }
    }

    /// Value of an integration reference; `None` when the index does not
    /// resolve
    fn integration(&self, index: usize, mode: IntegrationMode, unit: Unit) -> Option<f64> {
        let Some(target) = self.ctx.integrations.get(index) else {
            warn!(index, "Integration index does not resolve");
            return None;
        };

        let Some(old) = self.old else {
            let watts = self.nested(target, Unit::Watts);
            return Some(match mode {
                IntegrationMode::Positive if watts < 0.0 => 0.0,
                IntegrationMode::Negative if watts > 0.0 => 0.0,
                _ => watts,
            });
        };

        if mode == IntegrationMode::Net {
            return Some(self.nested(target, unit));
        }

        let log = match target.integrator() {
            Some(log) if log.covers(old, self.new) => log,
            Some(_) => {
                debug!(
                    integration = target.name(),
                    from = old.unix_time,
                    to = self.new.unix_time,
                    "Interval outside accumulation log, using net"
                );
                return Some(self.nested(target, unit));
            },
            None => {
                debug!(
                    integration = target.name(),
                    "No accumulation log attached, using net"
                );
                return Some(self.nested(target, unit));
            },
        };

        let positive = log.positive_sum(old, self.new, unit);
        Some(match mode {
            IntegrationMode::Positive => positive,
            // The negative component is net minus positive, never above 0
            _ => (self.nested(target, target.unit()) - positive).min(0.0),
        })
    }

    fn nested(&self, target: &Script, unit: Unit) -> f64 {
        if self.depth + 1 > MAX_INTEGRATION_DEPTH {
            warn!(
                integration = target.name(),
                depth = self.depth + 1,
                "Integration chain too deep"
            );
            return 0.0;
        }
        Evaluator {
            depth: self.depth + 1,
            ..*self
        }
        .run(target, unit)
    }
}

/// Advance `pos` past the `)` or `=` closing the current level
fn skip_level(bytecode: &[u8], pos: &mut usize) {
    let mut depth = 0usize;
    while *pos < bytecode.len() {
        let byte = bytecode[*pos];
        *pos += 1;
        match Token::decode(byte) {
            None => return,
            Some(Token::Op(Operator::Push)) => depth += 1,
            Some(Token::Op(Operator::Pop)) | Some(Token::Op(Operator::End)) => {
                if depth == 0 {
                    return;
                }
                depth -= 1;
            },
            Some(Token::Integration(_)) => *pos += 1,
            Some(_) => {},
        }
    }
}
