//! Formula compiler
//!
//! Turns formula text into a [`Script`]: a sentinel-terminated token buffer
//! plus a constant pool.
//!
//! ## Grammar
//!
//! | Text | Meaning |
//! |------|---------|
//! | `C<float>` | constant |
//! | `I<n>` | input channel `n` |
//! | `V<n>` | virtual channel `n` |
//! | `G[+\|-]<name>` | integration reference (positive, negative or net) |
//! | `+ - * /` | arithmetic |
//! | `< >` | min, max |
//! | `\|` | absolute value of the current operand |
//! | `( )` | sub-expression |
//! | `=` | end of formula |
//!
//! Operators fold strictly left to right; there is no precedence other
//! than parentheses. Integration names run to the next operator character.
//!
//! Integration references may chain at most [`MAX_INTEGRATION_DEPTH`]
//! scripts deep; a longer chain is a compile error.
//!
//! Compilation is two passes. The first lexes and validates the whole text
//! and counts tokens and constants; the second allocates both buffers at
//! exactly that size and encodes. Constants are numbered back to front: the
//! last literal in the text gets pool index 0.

use crate::error::{Result, ScriptError};
use crate::evaluator::MAX_INTEGRATION_DEPTH;
use crate::registry::ScriptRegistry;
use crate::script::Script;
use crate::token::{IntegrationMode, Operator, Token, TokenKind, MAX_PAYLOAD, OP_CHARS, SENTINEL};
use crate::units::Unit;
use serde::{Deserialize, Serialize};
use tracing::debug;

const CHAR_CONSTANT: u8 = b'C';
const CHAR_INPUT: u8 = b'I';
const CHAR_VIRTUAL: u8 = b'V';
const CHAR_INTEGRATION: u8 = b'G';

/// Compiler limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOptions {
    /// Deepest parenthesis nesting accepted
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,
}

fn default_max_nesting_depth() -> usize {
    8
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            max_nesting_depth: default_max_nesting_depth(),
        }
    }
}

/// Compile with default limits
pub fn compile(
    integrations: &ScriptRegistry,
    name: &str,
    unit: &str,
    formula: &str,
) -> Result<Script> {
    compile_with_options(integrations, name, unit, formula, &CompileOptions::default())
}

/// Compile `formula` into a script named `name`
///
/// Integration references resolve against `integrations` by exact name;
/// only scripts already registered can be referenced. An unknown or empty
/// `unit` falls back to Watts.
pub fn compile_with_options(
    integrations: &ScriptRegistry,
    name: &str,
    unit: &str,
    formula: &str,
    options: &CompileOptions,
) -> Result<Script> {
    let unit = Unit::parse_or_default(unit);

    // Pass 1: lex and size
    let lexed = Lexer::new(name, formula, options).run()?;

    // Pass 2: encode
    let mut bytecode = Vec::with_capacity(lexed.token_bytes + 1);
    let mut constants = vec![0.0f32; lexed.constants];
    let mut next_constant = lexed.constants;
    let mut integration_depth = 0;

    for lexeme in &lexed.lexemes {
        match *lexeme {
            Lexeme::Op(op) => bytecode.push(Token::encode(TokenKind::Operator, op as u8)),
            Lexeme::Input(n) => bytecode.push(Token::encode(TokenKind::Input, n)),
            Lexeme::Virtual(n) => bytecode.push(Token::encode(TokenKind::Virtual, n)),
            Lexeme::Constant(value) => {
                next_constant -= 1;
                constants[next_constant] = value;
                bytecode.push(Token::encode(TokenKind::Constant, next_constant as u8));
            },
            Lexeme::Integration { name: target, mode } => {
                let index = integrations
                    .position(target)
                    .ok_or_else(|| ScriptError::unresolved(name, target))?;
                if index > MAX_PAYLOAD {
                    return Err(ScriptError::PayloadOverflow {
                        script: name.to_string(),
                        kind: TokenKind::Integration.label(),
                        value: index,
                        max: MAX_PAYLOAD,
                    });
                }
                let depth = integrations
                    .get(index)
                    .map_or(1, |dep| dep.integration_depth() + 1);
                if depth > MAX_INTEGRATION_DEPTH {
                    return Err(ScriptError::IntegrationTooDeep {
                        script: name.to_string(),
                        depth,
                        max: MAX_INTEGRATION_DEPTH,
                    });
                }
                integration_depth = integration_depth.max(depth);
                bytecode.push(Token::encode(TokenKind::Integration, index as u8));
                bytecode.push(mode.to_byte());
            },
        }
    }
    bytecode.push(SENTINEL);
    debug_assert_eq!(bytecode.len(), lexed.token_bytes + 1);

    // Compiled positions stay valid only while the registry keeps its order
    if integration_depth > 0 {
        integrations.pin();
    }

    debug!(
        script = name,
        unit = %unit,
        tokens = bytecode.len() - 1,
        constants = constants.len(),
        "Script compiled"
    );

    Ok(Script::new(
        name.to_string(),
        unit,
        bytecode,
        constants,
        integration_depth,
    ))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Lexeme<'a> {
    Op(Operator),
    Constant(f32),
    Input(u8),
    Virtual(u8),
    Integration { name: &'a str, mode: IntegrationMode },
}

struct Lexed<'a> {
    lexemes: Vec<Lexeme<'a>>,
    /// Encoded size, excluding the sentinel
    token_bytes: usize,
    constants: usize,
}

struct Lexer<'a> {
    script: &'a str,
    text: &'a str,
    pos: usize,
    max_depth: usize,
}

impl<'a> Lexer<'a> {
    fn new(script: &'a str, text: &'a str, options: &CompileOptions) -> Self {
        Self {
            script,
            text,
            pos: 0,
            max_depth: options.max_nesting_depth,
        }
    }

    fn run(mut self) -> Result<Lexed<'a>> {
        let text = self.text;
        let bytes = text.as_bytes();
        let mut lexemes = Vec::new();
        let mut token_bytes = 0;
        let mut constants = 0;
        let mut depth = 0usize;

        while self.pos < bytes.len() {
            let start = self.pos;
            let c = bytes[start];
            self.pos += 1;

            let lexeme = match c {
                c if c.is_ascii_whitespace() => continue,
                CHAR_CONSTANT => {
                    constants += 1;
                    Lexeme::Constant(self.number(start)?)
                },
                CHAR_INPUT => Lexeme::Input(self.index(start, TokenKind::Input)?),
                CHAR_VIRTUAL => Lexeme::Virtual(self.index(start, TokenKind::Virtual)?),
                CHAR_INTEGRATION => self.integration(start)?,
                _ => {
                    let op = Operator::from_char(c as char).ok_or_else(|| {
                        ScriptError::UnexpectedChar {
                            script: self.script.to_string(),
                            ch: text[start..].chars().next().unwrap_or('?'),
                            offset: start,
                        }
                    })?;
                    match op {
                        Operator::Push => {
                            depth += 1;
                            if depth > self.max_depth {
                                return Err(ScriptError::NestingTooDeep {
                                    script: self.script.to_string(),
                                    depth,
                                    max: self.max_depth,
                                });
                            }
                        },
                        Operator::Pop => {
                            depth = depth.checked_sub(1).ok_or_else(|| {
                                ScriptError::UnbalancedParens {
                                    script: self.script.to_string(),
                                }
                            })?;
                        },
                        _ => {},
                    }
                    Lexeme::Op(op)
                },
            };

            token_bytes += match lexeme {
                Lexeme::Integration { .. } => 2,
                _ => 1,
            };
            lexemes.push(lexeme);
        }

        if depth != 0 {
            return Err(ScriptError::UnbalancedParens {
                script: self.script.to_string(),
            });
        }
        if constants > MAX_PAYLOAD + 1 {
            return Err(ScriptError::PayloadOverflow {
                script: self.script.to_string(),
                kind: TokenKind::Constant.label(),
                value: constants - 1,
                max: MAX_PAYLOAD,
            });
        }

        Ok(Lexed {
            lexemes,
            token_bytes,
            constants,
        })
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let text = self.text;
        let bytes = text.as_bytes();
        let start = self.pos;
        while self.pos < bytes.len() && pred(bytes[self.pos]) {
            self.pos += 1;
        }
        &text[start..self.pos]
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    /// `[+-]digits[.digits][e[+-]digits]`
    fn number(&mut self, sigil: usize) -> Result<f32> {
        let start = self.pos;
        if matches!(self.peek(), Some(b'+' | b'-')) {
            self.pos += 1;
        }
        let int = self.take_while(|b| b.is_ascii_digit()).len();
        let mut frac = 0;
        if self.peek() == Some(b'.') {
            self.pos += 1;
            frac = self.take_while(|b| b.is_ascii_digit()).len();
        }
        if int + frac == 0 {
            return Err(ScriptError::InvalidNumber {
                script: self.script.to_string(),
                offset: sigil,
            });
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let mark = self.pos;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if self.take_while(|b| b.is_ascii_digit()).is_empty() {
                self.pos = mark;
            }
        }
        self.text[start..self.pos]
            .parse::<f32>()
            .map_err(|_| ScriptError::InvalidNumber {
                script: self.script.to_string(),
                offset: sigil,
            })
    }

    fn index(&mut self, sigil: usize, kind: TokenKind) -> Result<u8> {
        let digits = self.take_while(|b| b.is_ascii_digit());
        if digits.is_empty() {
            return Err(ScriptError::InvalidNumber {
                script: self.script.to_string(),
                offset: sigil,
            });
        }
        let value = digits.parse::<usize>().unwrap_or(usize::MAX);
        if value > MAX_PAYLOAD {
            return Err(ScriptError::PayloadOverflow {
                script: self.script.to_string(),
                kind: kind.label(),
                value,
                max: MAX_PAYLOAD,
            });
        }
        Ok(value as u8)
    }

    fn integration(&mut self, sigil: usize) -> Result<Lexeme<'a>> {
        let mode = match self.peek() {
            Some(b'+') => IntegrationMode::Positive,
            Some(b'-') => IntegrationMode::Negative,
            _ => IntegrationMode::Net,
        };
        if mode != IntegrationMode::Net {
            self.pos += 1;
        }
        let name = self.take_while(|b| !OP_CHARS.contains(&b)).trim();
        if name.is_empty() {
            return Err(ScriptError::EmptyIntegrationName {
                script: self.script.to_string(),
                offset: sigil,
            });
        }
        Ok(Lexeme::Integration { name, mode })
    }
}
