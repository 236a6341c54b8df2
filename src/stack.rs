use std::fmt;

use compact_str::{format_compact, CompactString};
use thiserror::Error;
use tracing::{trace, warn};

use crate::format::format_value;

pub type Value = f64;

/// Precision used for the operand shown in a binary entry label.
pub const LABEL_DIGITS: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(self) -> char {
        match self {
            BinaryOp::Add => '+',
            BinaryOp::Sub => '-',
            BinaryOp::Mul => '*',
            BinaryOp::Div => '/',
        }
    }

    /// Higher binds tighter. Zero is reserved for group markers.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Add | BinaryOp::Sub => 1,
            BinaryOp::Mul | BinaryOp::Div => 2,
        }
    }

    fn apply(self, l: Value, r: Value) -> Value {
        match self {
            BinaryOp::Add => l + r,
            BinaryOp::Sub => l - r,
            BinaryOp::Mul => l * r,
            BinaryOp::Div => l / r,
        }
    }
}

/// Operators that open a group and wait for it to be closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Group,
    Sqrt,
}

impl UnaryOp {
    pub fn label(self) -> &'static str {
        match self {
            UnaryOp::Group => "(",
            UnaryOp::Sqrt => "sqrt(",
        }
    }

    fn apply(self, v: Value) -> Value {
        match self {
            UnaryOp::Group => v,
            UnaryOp::Sqrt => v.sqrt(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    /// Binary operator holding its left operand.
    Binary { l: Value, op: BinaryOp },
    Unary { op: UnaryOp, negated: bool },
}

impl Operation {
    fn execute(self, r: Value) -> Value {
        match self {
            Operation::Binary { l, op } => op.apply(l, r),
            Operation::Unary { op, negated: false } => op.apply(r),
            Operation::Unary { op, negated: true } => -op.apply(r),
        }
    }

    fn precedence(self) -> u8 {
        match self {
            Operation::Binary { op, .. } => op.precedence(),
            Operation::Unary { .. } => 0,
        }
    }

    /// Negated unary entries replace a pending minus sign and are not
    /// counted as open groups.
    fn opens_group(self) -> bool {
        matches!(self, Operation::Unary { negated: false, .. })
    }
}

#[derive(Debug)]
struct Entry {
    label: CompactString,
    operation: Operation,
}

/// How far a fold is allowed to go.
#[derive(Debug, Clone, Copy)]
enum Fold {
    /// Stop before the first entry binding looser than this.
    Precedence(u8),
    /// Fold down to and including the innermost group marker.
    Group,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalError {
    #[error("Result is not a finite number")]
    NonFinite,
}

/// Pending operators, resolved by precedence as operands arrive.
#[derive(Debug)]
pub struct OperationStack {
    entries: Vec<Entry>,
    group_depth: usize,
    faulted: bool,
    label_digits: usize,
}

impl Default for OperationStack {
    fn default() -> Self {
        Self::new(LABEL_DIGITS)
    }
}

impl OperationStack {
    pub fn new(label_digits: usize) -> Self {
        Self {
            entries: Vec::new(),
            group_depth: 0,
            faulted: false,
            label_digits,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_open_group(&self) -> bool {
        self.group_depth > 0
    }

    /// Set when a fold produced a non-finite value; cleared by [`reset`](Self::reset).
    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    pub fn top_label(&self) -> Option<&str> {
        self.entries.last().map(|entry| entry.label.as_str())
    }

    /// Labels of all pending entries, oldest first.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.label.as_str())
    }

    pub fn push_unary(&mut self, op: UnaryOp) {
        self.push(op.label().into(), Operation::Unary { op, negated: false });
    }

    pub fn push_unary_negated(&mut self, op: UnaryOp) {
        let label = format_compact!("-{}", op.label());
        self.push(label, Operation::Unary { op, negated: true });
    }

    /// Fold everything binding at least as tight as `op` into `operand`, then
    /// push `op` with the folded value as its left operand.
    pub fn push_binary(&mut self, op: BinaryOp, operand: Value) -> Result<(), EvalError> {
        let l = self.fold(Fold::Precedence(op.precedence()), operand)?;
        let label = format_compact!("{} {}", format_value(l, self.label_digits), op.symbol());
        self.push(label, Operation::Binary { l, op });
        Ok(())
    }

    /// Drop the top entry without evaluating it.
    pub fn cancel_top(&mut self) {
        if let Some(entry) = self.pop() {
            trace!(label = %entry.label, "cancelled");
        }
    }

    /// Close the innermost group, or evaluate everything when none is open.
    pub fn execute(&mut self, operand: Value) -> Result<Value, EvalError> {
        self.fold(Fold::Group, operand)
    }

    pub fn reset(&mut self) {
        self.faulted = false;
        while !self.is_empty() {
            self.cancel_top();
        }
    }

    fn push(&mut self, label: CompactString, operation: Operation) {
        if operation.opens_group() {
            self.group_depth += 1;
        }
        trace!(%label, depth = self.group_depth, "push");
        self.entries.push(Entry { label, operation });
    }

    fn pop(&mut self) -> Option<Entry> {
        let entry = self.entries.pop()?;
        if entry.operation.opens_group() {
            self.group_depth -= 1;
        }
        Some(entry)
    }

    fn fold(&mut self, limit: Fold, mut value: Value) -> Result<Value, EvalError> {
        while let Some(top) = self.entries.last() {
            let precedence = top.operation.precedence();
            let closes_group = match limit {
                Fold::Group => precedence == 0,
                Fold::Precedence(p) if precedence >= p => false,
                Fold::Precedence(_) => break,
            };
            let Some(entry) = self.pop() else { break };

            value = entry.operation.execute(value);
            trace!(label = %entry.label, value, "fold");
            if !value.is_finite() {
                warn!(label = %entry.label, "fold produced a non-finite value");
                self.faulted = true;
                return Err(EvalError::NonFinite);
            }
            if closes_group {
                break;
            }
        }
        Ok(value)
    }
}

impl fmt::Display for OperationStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for label in self.labels() {
            writeln!(f, "{}", label)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiplication_before_subtraction() {
        let mut stack = OperationStack::default();
        stack.push_binary(BinaryOp::Sub, 2.0).unwrap();
        stack.push_binary(BinaryOp::Mul, 3.0).unwrap();
        assert_eq!(stack.top_label(), Some("3 *"));
        assert_eq!(stack.execute(4.0), Ok(-10.0));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_equal_precedence_left_to_right() {
        let mut stack = OperationStack::default();
        stack.push_binary(BinaryOp::Sub, 10.0).unwrap();
        stack.push_binary(BinaryOp::Sub, 3.0).unwrap();
        assert_eq!(stack.top_label(), Some("7 -"));
        assert_eq!(stack.execute(2.0), Ok(5.0));
    }

    #[test]
    fn test_group_closes_then_continues() {
        let mut stack = OperationStack::default();
        stack.push_unary(UnaryOp::Group);
        assert!(stack.has_open_group());
        stack.push_binary(BinaryOp::Add, 2.0).unwrap();
        assert_eq!(stack.execute(3.0), Ok(5.0));
        assert!(!stack.has_open_group());
        assert!(stack.is_empty());

        stack.push_binary(BinaryOp::Mul, 5.0).unwrap();
        assert_eq!(stack.execute(10.0), Ok(50.0));
    }

    #[test]
    fn test_group_shields_outer_operator() {
        let mut stack = OperationStack::default();
        stack.push_binary(BinaryOp::Mul, 2.0).unwrap();
        stack.push_unary(UnaryOp::Group);
        stack.push_binary(BinaryOp::Add, 3.0).unwrap();
        assert_eq!(stack.labels().collect::<Vec<_>>(), ["2 *", "(", "3 +"]);

        assert_eq!(stack.execute(4.0), Ok(7.0));
        assert_eq!(stack.top_label(), Some("2 *"));
        assert_eq!(stack.execute(7.0), Ok(14.0));
    }

    #[test]
    fn test_execute_empty_is_identity() {
        let mut stack = OperationStack::default();
        assert_eq!(stack.execute(42.5), Ok(42.5));
        assert_eq!(stack.top_label(), None);
    }

    #[test]
    fn test_sqrt_and_negated_sqrt() {
        let mut stack = OperationStack::default();
        stack.push_unary(UnaryOp::Sqrt);
        assert_eq!(stack.top_label(), Some("sqrt("));
        assert_eq!(stack.execute(16.0), Ok(4.0));

        stack.push_unary_negated(UnaryOp::Sqrt);
        assert_eq!(stack.top_label(), Some("-sqrt("));
        assert!(!stack.has_open_group());
        assert_eq!(stack.execute(9.0), Ok(-3.0));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_cancel_top() {
        let mut stack = OperationStack::default();
        stack.cancel_top();
        stack.push_binary(BinaryOp::Add, 1.0).unwrap();
        stack.push_unary(UnaryOp::Group);
        stack.cancel_top();
        assert!(!stack.has_open_group());
        assert_eq!(stack.top_label(), Some("1 +"));
    }

    #[test]
    fn test_division_by_zero_faults() {
        let mut stack = OperationStack::default();
        stack.push_binary(BinaryOp::Div, 5.0).unwrap();
        assert_eq!(stack.execute(0.0), Err(EvalError::NonFinite));
        assert!(stack.is_faulted());

        stack.reset();
        assert!(!stack.is_faulted());
        assert!(stack.is_empty());
    }

    #[test]
    fn test_fault_while_pushing() {
        let mut stack = OperationStack::default();
        stack.push_unary(UnaryOp::Sqrt);
        stack.push_binary(BinaryOp::Div, 1.0).unwrap();
        assert_eq!(stack.push_binary(BinaryOp::Add, 0.0), Err(EvalError::NonFinite));
        assert!(stack.is_faulted());

        stack.reset();
        assert!(!stack.has_open_group());
        assert!(stack.is_empty());
    }

    #[test]
    fn test_display_lists_labels() {
        let mut stack = OperationStack::default();
        stack.push_unary(UnaryOp::Group);
        stack.push_binary(BinaryOp::Div, 0.5).unwrap();
        assert_eq!(stack.to_string(), "(\n0.5 /\n");
    }
}
