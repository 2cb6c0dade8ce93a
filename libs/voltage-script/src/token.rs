//! Bytecode token encoding
//!
//! Each token is one byte: the kind lives in the top three bits and the
//! payload in the low five. Integration tokens are followed by one raw
//! mode byte. A buffer always ends with [`SENTINEL`], which no token kind
//! can encode to.

/// Terminates every bytecode buffer
pub const SENTINEL: u8 = 0x00;

/// Mask selecting the kind bits of a token byte
pub const KIND_MASK: u8 = 0xE0;

/// Largest payload a token can carry
pub const MAX_PAYLOAD: usize = 0x1F;

/// Operator characters, in payload order
pub const OP_CHARS: &[u8; 10] = b"=+-*/<>|()";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TokenKind {
    Operator = 0x20,
    Constant = 0x40,
    Input = 0x60,
    Virtual = 0x80,
    Integration = 0xA0,
}

impl TokenKind {
    fn from_bits(bits: u8) -> Option<TokenKind> {
        match bits {
            0x20 => Some(TokenKind::Operator),
            0x40 => Some(TokenKind::Constant),
            0x60 => Some(TokenKind::Input),
            0x80 => Some(TokenKind::Virtual),
            0xA0 => Some(TokenKind::Integration),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TokenKind::Operator => "operator",
            TokenKind::Constant => "constant",
            TokenKind::Input => "input",
            TokenKind::Virtual => "virtual",
            TokenKind::Integration => "integration",
        }
    }
}

/// Operators, numbered by their position in [`OP_CHARS`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Operator {
    End = 0,
    Add,
    Sub,
    Mult,
    Div,
    Min,
    Max,
    Abs,
    Push,
    Pop,
}

impl Operator {
    const ALL: [Operator; 10] = [
        Operator::End,
        Operator::Add,
        Operator::Sub,
        Operator::Mult,
        Operator::Div,
        Operator::Min,
        Operator::Max,
        Operator::Abs,
        Operator::Push,
        Operator::Pop,
    ];

    pub fn from_char(ch: char) -> Option<Operator> {
        OP_CHARS
            .iter()
            .position(|&c| c as char == ch)
            .map(|i| Operator::ALL[i])
    }

    pub fn from_payload(payload: u8) -> Option<Operator> {
        Operator::ALL.get(payload as usize).copied()
    }

    pub fn as_char(self) -> char {
        OP_CHARS[self as usize] as char
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            Operator::Add
                | Operator::Sub
                | Operator::Mult
                | Operator::Div
                | Operator::Min
                | Operator::Max
        )
    }

    /// Operand value a pending operator starts from
    pub fn identity(self) -> f64 {
        match self {
            Operator::Mult | Operator::Div => 1.0,
            _ => 0.0,
        }
    }

    /// Fold `operand` into `result` with this operator
    ///
    /// Division by zero yields 0.
    pub fn apply(self, result: f64, operand: f64) -> f64 {
        match self {
            Operator::Add => result + operand,
            Operator::Sub => result - operand,
            Operator::Mult => result * operand,
            Operator::Div => {
                if operand == 0.0 {
                    0.0
                } else {
                    result / operand
                }
            },
            Operator::Min => {
                if result < operand {
                    result
                } else {
                    operand
                }
            },
            Operator::Max => {
                if result > operand {
                    result
                } else {
                    operand
                }
            },
            _ => 0.0,
        }
    }
}

/// How an integration reference contributes to a formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrationMode {
    Positive,
    Negative,
    #[default]
    Net,
}

impl IntegrationMode {
    pub fn to_byte(self) -> u8 {
        match self {
            IntegrationMode::Positive => b'+',
            IntegrationMode::Negative => b'-',
            IntegrationMode::Net => b'N',
        }
    }

    /// Unrecognised bytes decode as Net
    pub fn from_byte(byte: u8) -> IntegrationMode {
        match byte {
            b'+' => IntegrationMode::Positive,
            b'-' => IntegrationMode::Negative,
            _ => IntegrationMode::Net,
        }
    }

    /// Sign character as written in formula text (empty for Net)
    pub fn sigil(self) -> &'static str {
        match self {
            IntegrationMode::Positive => "+",
            IntegrationMode::Negative => "-",
            IntegrationMode::Net => "",
        }
    }
}

/// A decoded token byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Op(Operator),
    Constant(u8),
    Input(u8),
    Virtual(u8),
    Integration(u8),
}

impl Token {
    /// Encode a token byte. Callers guarantee `payload <= MAX_PAYLOAD`.
    pub fn encode(kind: TokenKind, payload: u8) -> u8 {
        debug_assert!(payload as usize <= MAX_PAYLOAD);
        kind as u8 | (payload & !KIND_MASK)
    }

    /// Decode a token byte; the sentinel and unknown kinds yield `None`
    pub fn decode(byte: u8) -> Option<Token> {
        let payload = byte & !KIND_MASK;
        match TokenKind::from_bits(byte & KIND_MASK)? {
            TokenKind::Operator => Operator::from_payload(payload).map(Token::Op),
            TokenKind::Constant => Some(Token::Constant(payload)),
            TokenKind::Input => Some(Token::Input(payload)),
            TokenKind::Virtual => Some(Token::Virtual(payload)),
            TokenKind::Integration => Some(Token::Integration(payload)),
        }
    }
}
