use compact_str::{format_compact, CompactString};
use thiserror::Error;
use tracing::{debug, warn};

use crate::format::format_value;
use crate::stack::{BinaryOp, EvalError, OperationStack, UnaryOp, Value, LABEL_DIGITS};

/// Widths used when rendering the register and the stack labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayConfig {
    pub result_digits: usize,
    pub label_digits: usize,
    pub max_input_len: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            result_digits: 11,
            label_digits: LABEL_DIGITS,
            max_input_len: 12,
        }
    }
}

/// Input delivered by the shell, already routed by [`Calculator::has_value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// `0`-`9` or `.`
    Digit(char),
    Binary(BinaryOp),
    Unary(UnaryOp),
    /// Subtract pressed while no value is held.
    Minus,
    Clear,
    Execute,
}

#[derive(Debug, Default, Clone, PartialEq)]
enum Register {
    #[default]
    Empty,
    MinusPending,
    Input {
        text: CompactString,
        value: Value,
    },
    Result(Value),
}

impl Register {
    fn input(text: &str) -> Option<Register> {
        let value = text.parse().ok()?;
        Some(Register::Input {
            text: text.into(),
            value,
        })
    }

    fn value(&self) -> Option<Value> {
        match self {
            Register::Input { value, .. } | Register::Result(value) => Some(*value),
            Register::Empty | Register::MinusPending => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Calculator {
    register: Register,
    stack: OperationStack,
    config: DisplayConfig,
}

impl Calculator {
    pub fn new(config: DisplayConfig) -> Self {
        Self {
            register: Register::Empty,
            stack: OperationStack::new(config.label_digits),
            config,
        }
    }

    /// Apply one event.
    ///
    /// Invalid keystrokes are ignored. On [`CalculatorError::NumericFault`]
    /// the calculator has already been reset to its idle state.
    pub fn handle_event(&mut self, event: Event) -> Result<(), CalculatorError> {
        match self.transition(event) {
            Ok(Some(next)) => {
                debug!(?event, from = ?self.register, to = ?next, "transition");
                debug_assert!(!self.stack.is_faulted());
                self.register = next;
                Ok(())
            }
            Ok(None) => {
                debug!(?event, register = ?self.register, "ignored");
                Ok(())
            }
            Err(CalculatorError::NumericFault(err)) => {
                warn!(?event, "{err}, discarding calculation");
                self.reset();
                Err(CalculatorError::NumericFault(err))
            }
            Err(err) => Err(err),
        }
    }

    fn transition(&mut self, event: Event) -> Result<Option<Register>, CalculatorError> {
        use Event::*;
        use Register::*;

        let next = match (&self.register, event) {
            (Input { text, .. }, Digit(d)) => self.append(text, d),
            (MinusPending, Digit(d)) => self.append("-", d),
            // A finished result is replaced, not extended
            (Empty | Result(_), Digit(d)) => self.append("", d),

            (Empty, Minus) => Some(MinusPending),
            // Double minus cancels out
            (MinusPending, Minus) => Some(Empty),
            (Input { .. } | Result(_), Minus) => return Err(CalculatorError::OperationExpected),

            (Empty, Clear) => {
                self.stack.cancel_top();
                Some(Empty)
            }
            (Input { text, .. }, Clear) => Some(Self::backspace(text)),
            (MinusPending | Result(_), Clear) => Some(Empty),

            (Empty | MinusPending, Binary(_)) => return Err(CalculatorError::NumberExpected),
            (Input { value, .. } | Result(value), Binary(op)) => {
                self.stack.push_binary(op, *value)?;
                Some(Empty)
            }

            (Empty, Unary(op)) => {
                self.stack.push_unary(op);
                Some(Empty)
            }
            (MinusPending, Unary(op)) => {
                self.stack.push_unary_negated(op);
                Some(Empty)
            }
            (Input { .. } | Result(_), Unary(_)) => return Err(CalculatorError::OperationExpected),

            (Empty | MinusPending, Execute) => None,
            (Input { value, .. } | Result(value), Execute) => {
                Some(Result(self.stack.execute(*value)?))
            }
        };

        Ok(next)
    }

    fn append(&self, text: &str, d: char) -> Option<Register> {
        if !(d.is_ascii_digit() || d == '.') || text.len() >= self.config.max_input_len {
            return None;
        }
        if d == '0' && matches!(text, "0" | "-0") {
            return None;
        }
        Register::input(&format_compact!("{}{}", text, d))
    }

    fn backspace(text: &str) -> Register {
        let len = text.len();
        if len <= 2 && text.starts_with('-') {
            Register::MinusPending
        } else if len <= 1 {
            Register::Empty
        } else {
            Register::input(&text[..len - 1]).unwrap_or_default()
        }
    }

    /// Discard the register and every pending operation.
    pub fn reset(&mut self) {
        self.stack.reset();
        self.register = Register::Empty;
    }

    /// True when the register holds an operand, so operator keys act as
    /// binary operators.
    pub fn has_value(&self) -> bool {
        self.register.value().is_some()
    }

    pub fn has_pending_group(&self) -> bool {
        self.stack.has_open_group()
    }

    pub fn stack(&self) -> &OperationStack {
        &self.stack
    }

    pub fn display(&self) -> CompactString {
        match &self.register {
            Register::Empty => self.stack.top_label().unwrap_or("ready").into(),
            Register::MinusPending => CompactString::new("-"),
            Register::Input { text, .. } => text.clone(),
            Register::Result(value) => {
                let prefix = if self.stack.is_empty() { "=" } else { ")=" };
                format_compact!("{}{}", prefix, format_value(*value, self.config.result_digits))
            }
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CalculatorError {
    #[error("Number expected")]
    NumberExpected,
    #[error("Operation expected")]
    OperationExpected,
    #[error("Calculation failed: {0}")]
    NumericFault(#[from] EvalError),
}
