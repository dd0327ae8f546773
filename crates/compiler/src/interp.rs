//! Constant-expression interpreter
//!
//! Evaluates literal expressions to a tagged [`Value`] for compile-time
//! checks. Evaluation is deterministic and side-effect free; anything the
//! interpreter does not understand comes back as `Indeterminate`. `&&` and
//! `||` short-circuit: the right operand is only evaluated when the left one
//! does not decide the result.

use crate::ast::{BinaryOp, CastKind, Expr, ExprKind, UnaryOp};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    None,
    Indeterminate,
    Bool(bool),
    Integer(i64),
    Float(f64),
}

impl Value {
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, Value::Indeterminate)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            Value::Integer(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match *self {
            Value::Float(v) => Some(v),
            _ => None,
        }
    }

    fn into_integer(self) -> Value {
        match self {
            Value::Bool(v) => Value::Integer(v as i64),
            Value::Integer(_) => self,
            Value::Float(v) => Value::Integer(v as i64),
            _ => Value::Indeterminate,
        }
    }

    fn into_float(self) -> Value {
        match self {
            Value::Bool(v) => Value::Float(v as u8 as f64),
            Value::Integer(v) => Value::Float(v as f64),
            Value::Float(_) => self,
            _ => Value::Indeterminate,
        }
    }

    fn neg(self) -> Value {
        match self {
            Value::Integer(v) => Value::Integer(v.wrapping_neg()),
            Value::Float(v) => Value::Float(-v),
            _ => Value::Indeterminate,
        }
    }

    fn not(self) -> Value {
        match self {
            Value::Bool(v) => Value::Bool(!v),
            _ => Value::Indeterminate,
        }
    }
}

/// Applies an arithmetic/bitwise binary operator to two like-kinded values.
/// Mixed kinds, unsupported operators and division by zero are
/// `Indeterminate`.
fn apply_binop(op: BinaryOp, lhs: Value, rhs: Value) -> Value {
    match (lhs, rhs) {
        (Value::Integer(a), Value::Integer(b)) => {
            let result = match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Sub => a.wrapping_sub(b),
                BinaryOp::Mul => a.wrapping_mul(b),
                BinaryOp::Div => match a.checked_div(b) {
                    Some(v) => v,
                    None => return Value::Indeterminate,
                },
                BinaryOp::Mod => match a.checked_rem(b) {
                    Some(v) => v,
                    None => return Value::Indeterminate,
                },
                BinaryOp::Shl => a.wrapping_shl(b as u32),
                BinaryOp::Shr => a.wrapping_shr(b as u32),
                BinaryOp::BitAnd => a & b,
                BinaryOp::BitOr => a | b,
                BinaryOp::BitXor => a ^ b,
                _ => return Value::Indeterminate,
            };
            Value::Integer(result)
        }
        (Value::Float(a), Value::Float(b)) => {
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                // Modulus on floats is the IEEE remainder of the division.
                BinaryOp::Mod => a % b,
                _ => return Value::Indeterminate,
            };
            Value::Float(result)
        }
        _ => Value::Indeterminate,
    }
}

/// The evaluator itself. Stateless between calls.
#[derive(Default)]
pub struct Interpreter;

impl Interpreter {
    pub fn new() -> Self {
        Interpreter
    }

    pub fn eval(&self, expr: Option<&Expr<'_>>) -> Value {
        match expr {
            Some(expr) => self.eval_expr(expr),
            None => Value::Indeterminate,
        }
    }

    pub fn eval_as_bool(&self, expr: Option<&Expr<'_>>) -> Option<bool> {
        self.eval(expr).as_bool()
    }

    pub fn eval_as_int(&self, expr: Option<&Expr<'_>>) -> Option<i64> {
        self.eval(expr).as_integer()
    }

    pub fn eval_as_float(&self, expr: Option<&Expr<'_>>) -> Option<f64> {
        self.eval(expr).as_float()
    }

    fn eval_expr(&self, expr: &Expr<'_>) -> Value {
        match &expr.kind {
            ExprKind::BoolLiteral(value) => Value::Bool(*value),
            ExprKind::IntLiteral(value) => Value::Integer(*value as i64),
            ExprKind::FloatLiteral(value) => Value::Float(*value),
            ExprKind::Paren(sub) => self.eval_expr(sub),
            ExprKind::Unary { op, sub, .. } => {
                let value = self.eval_expr(sub);
                match op {
                    UnaryOp::Neg => value.neg(),
                    UnaryOp::Not => {
                        if sub.ty.is_int() {
                            // Bitwise not would need the integer's width.
                            Value::Indeterminate
                        } else {
                            value.not()
                        }
                    }
                    UnaryOp::AddressOf | UnaryOp::Deref => Value::Indeterminate,
                }
            }
            ExprKind::Binary { op, lhs, rhs, .. } => self.eval_binary(*op, lhs, rhs),
            ExprKind::Cast { sub, cast_kind } => {
                let value = self.eval_expr(sub);
                match cast_kind {
                    CastKind::Noop | CastKind::IntToInt | CastKind::FloatToFloat => value,
                    CastKind::BoolToInt | CastKind::FloatToInt => value.into_integer(),
                    CastKind::BoolToFloat | CastKind::IntToFloat => value.into_float(),
                    CastKind::Invalid => Value::Indeterminate,
                }
            }
            _ => Value::Indeterminate,
        }
    }

    fn eval_binary(&self, op: BinaryOp, lhs: &Expr<'_>, rhs: &Expr<'_>) -> Value {
        // `&&` and `||` are lazy; everything else evaluates both sides.
        if op == BinaryOp::LogAnd || op == BinaryOp::LogOr {
            let lhs = self.eval_expr(lhs);
            let Some(lhs_value) = lhs.as_bool() else {
                return Value::Indeterminate;
            };

            return match op {
                BinaryOp::LogAnd => {
                    if lhs_value {
                        self.eval_expr(rhs)
                    } else {
                        Value::Bool(false)
                    }
                }
                _ => {
                    if lhs_value {
                        Value::Bool(true)
                    } else {
                        self.eval_expr(rhs)
                    }
                }
            };
        }

        let lhs = self.eval_expr(lhs);
        let rhs = self.eval_expr(rhs);
        apply_binop(op, lhs, rhs)
    }
}
