use thiserror::Error;
use tracing::debug;

use crate::calculator::{Calculator, CalculatorError, Event};
use crate::stack::{BinaryOp, UnaryOp};

/// Physical keys. Operator keys carry two legends and act as unary
/// operators while the register holds no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Digit(char),
    Add,
    Sub,
    Mul,
    Div,
    Clear,
    Execute,
}

/// Operator row, in display order.
pub const OPERATOR_KEYS: [Key; 6] = [
    Key::Clear,
    Key::Div,
    Key::Mul,
    Key::Sub,
    Key::Add,
    Key::Execute,
];

impl Key {
    /// Map a typed character to a key. Whitespace maps to no key.
    pub fn from_char(c: char) -> Result<Option<Key>, KeypadError> {
        let key = match c {
            '0'..='9' | '.' => Key::Digit(c),
            '+' => Key::Add,
            '-' => Key::Sub,
            // `s` and `(` are the no-value legends of `*` and `/`
            '*' | 's' => Key::Mul,
            '/' | '(' => Key::Div,
            'c' | 'C' | '<' | '\u{8}' | '\u{7f}' => Key::Clear,
            '=' | ')' => Key::Execute,
            _ if c.is_whitespace() => return Ok(None),
            _ => return Err(KeypadError::UnexpectedCharacter(c)),
        };
        Ok(Some(key))
    }

    /// The event this key stands for in the current register mode, if any.
    pub fn route(self, has_value: bool) -> Option<Event> {
        let event = match (self, has_value) {
            (Key::Digit(d), _) => Event::Digit(d),
            (Key::Clear, _) => Event::Clear,
            (Key::Add, true) => Event::Binary(BinaryOp::Add),
            (Key::Sub, true) => Event::Binary(BinaryOp::Sub),
            (Key::Mul, true) => Event::Binary(BinaryOp::Mul),
            (Key::Div, true) => Event::Binary(BinaryOp::Div),
            (Key::Execute, true) => Event::Execute,
            (Key::Sub, false) => Event::Minus,
            (Key::Mul, false) => Event::Unary(UnaryOp::Sqrt),
            (Key::Div, false) => Event::Unary(UnaryOp::Group),
            (Key::Add | Key::Execute, false) => return None,
        };
        Some(event)
    }

    /// Legend shown on the key for the current calculator state.
    pub fn legend(self, calculator: &Calculator) -> String {
        match (self, calculator.has_value()) {
            (Key::Digit(d), _) => d.to_string(),
            (Key::Clear, _) => "C".to_owned(),
            (Key::Add, _) => "+".to_owned(),
            (Key::Sub, _) => "-".to_owned(),
            (Key::Mul, true) => "*".to_owned(),
            (Key::Mul, false) => "sqrt".to_owned(),
            (Key::Div, true) => "/".to_owned(),
            (Key::Div, false) => "(".to_owned(),
            (Key::Execute, _) if calculator.has_pending_group() => ")".to_owned(),
            (Key::Execute, _) => "=".to_owned(),
        }
    }
}

/// Route `key` and hand the resulting event to `calculator`.
pub fn press(calculator: &mut Calculator, key: Key) -> Result<(), CalculatorError> {
    match key.route(calculator.has_value()) {
        Some(event) => calculator.handle_event(event),
        None => {
            debug!(?key, "key has no function without a value");
            Ok(())
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum KeypadError {
    #[error("Unexpected character: {0:?}")]
    UnexpectedCharacter(char),
}
