//! The rule evaluator contract and the built-in expression engine.
//!
//! Supported syntax:
//! - logical `||`, `&&`, `!` and parentheses
//! - comparisons `==`, `!=`, `===`, `!==`, `>`, `>=`, `<`, `<=`
//! - literals: numbers, `'text'`, `"text"`, `true`, `false`, `null`
//! - field references: `_budget`, `workitem._budget`, `workitem._budget[1]`,
//!   `workitem['_budget']`
//! - accessors: `workitem.getItemValueString('name')` and its `Integer`,
//!   `Long`, `Double`, `Float`, `Boolean` siblings, `workitem.getItemValue`,
//!   `workitem.hasItem`, `workitem.isItemEmpty`
//!
//! Result scripts are `;`-separated assignments of the form
//! `result.<field> = <expression>` or `result.<field> = [<expr>, ...]`.

use crate::error::RuleError;
use crate::syntax::{
    find_assignment, find_top_level_operator, split_expression, split_top_level,
    strip_leading_negations, strip_outer_parens,
};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::LazyLock;
use waymark_core::Workitem;

/// Evaluates scripts against a workitem's fields.
///
/// Implementations are stateless and shared between kernels.
pub trait RuleEvaluator: Send + Sync {
    /// Evaluates a boolean expression. An empty script is `false`.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidScript`] if the script cannot be parsed.
    fn evaluate_boolean(&self, script: &str, workitem: &Workitem) -> Result<bool, RuleError>;

    /// Evaluates a result script and returns the assigned fields.
    ///
    /// Returns `None` when the script assigns nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if a statement cannot be parsed or does not assign a
    /// `result` field.
    fn evaluate_result(&self, script: &str, workitem: &Workitem)
    -> Result<Option<Workitem>, RuleError>;
}

static METHOD_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^workitem\.(getItemValueString|getItemValueInteger|getItemValueLong|getItemValueDouble|getItemValueFloat|getItemValueBoolean|getItemValue|hasItem|isItemEmpty)\(\s*(?:'([^']*)'|"([^"]*)")\s*\)$"#,
    )
    .expect("method call pattern is valid")
});

static FIELD_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:workitem\.)?([A-Za-z_$][\w$.]*)(?:\[(\d+)\])?$")
        .expect("field path pattern is valid")
});

static FIELD_BRACKET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^workitem\[\s*(?:'([^']*)'|"([^"]*)")\s*\](?:\[(\d+)\])?$"#)
        .expect("field bracket pattern is valid")
});

static RESULT_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^result(?:\.([A-Za-z_$][\w$.]*)|\[\s*(?:'([^']*)'|"([^"]*)")\s*\])$"#)
        .expect("result target pattern is valid")
});

static RESULT_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:var|let|const)\s+)?result\s*=\s*(?:\{\s*\}|new\s+Object\(\s*\))$")
        .expect("result declaration pattern is valid")
});

const COMPARISONS: [(&str, Comparison); 8] = [
    ("===", Comparison::Eq),
    ("!==", Comparison::Ne),
    ("==", Comparison::Eq),
    ("!=", Comparison::Ne),
    (">=", Comparison::Ge),
    ("<=", Comparison::Le),
    (">", Comparison::Gt),
    ("<", Comparison::Lt),
];

/// A stateless evaluator for the expression syntax described above.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionEngine;

impl ExpressionEngine {
    /// Creates a new engine.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn evaluate(&self, expression: &str, workitem: &Workitem) -> Result<Scalar, String> {
        let expression = strip_outer_parens(expression);
        if expression.is_empty() {
            return Err("empty expression".to_string());
        }

        if let Some(parts) = split_expression(expression, "||") {
            for part in parts {
                if self.evaluate(part, workitem)?.truthy() {
                    return Ok(Scalar::Bool(true));
                }
            }
            return Ok(Scalar::Bool(false));
        }
        if let Some(parts) = split_expression(expression, "&&") {
            for part in parts {
                if !self.evaluate(part, workitem)?.truthy() {
                    return Ok(Scalar::Bool(false));
                }
            }
            return Ok(Scalar::Bool(true));
        }

        let (negations, inner) = strip_leading_negations(expression);
        if negations > 0 {
            let value = self.evaluate(inner, workitem)?.truthy();
            return Ok(Scalar::Bool(if negations % 2 == 1 { !value } else { value }));
        }

        for (token, comparison) in COMPARISONS {
            if let Some(position) = find_top_level_operator(expression, token) {
                let left = expression[..position].trim();
                let right = expression[position + token.len()..].trim();
                if left.is_empty() || right.is_empty() {
                    return Err(format!("comparison '{token}' is missing an operand"));
                }
                let left = self.evaluate(left, workitem)?;
                let right = self.evaluate(right, workitem)?;
                return Ok(Scalar::Bool(comparison.apply(&left, &right)));
            }
        }

        operand(expression, workitem)
    }

    fn evaluate_values(&self, expression: &str, workitem: &Workitem) -> Result<Vec<Value>, String> {
        let expression = expression.trim();
        if let Some(inner) = expression
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        {
            return split_top_level(inner, ",")
                .into_iter()
                .filter(|part| !part.is_empty())
                .map(|part| self.evaluate(part, workitem).map(Scalar::into_json))
                .collect();
        }
        Ok(vec![self.evaluate(expression, workitem)?.into_json()])
    }
}

impl RuleEvaluator for ExpressionEngine {
    fn evaluate_boolean(&self, script: &str, workitem: &Workitem) -> Result<bool, RuleError> {
        let expression = script.trim().trim_end_matches(';').trim();
        if expression.is_empty() {
            return Ok(false);
        }

        let value = self
            .evaluate(expression, workitem)
            .map_err(|reason| RuleError::InvalidScript {
                script: script.to_string(),
                reason,
            })?
            .truthy();
        tracing::trace!(script = expression, value, "evaluated boolean expression");
        Ok(value)
    }

    fn evaluate_result(
        &self,
        script: &str,
        workitem: &Workitem,
    ) -> Result<Option<Workitem>, RuleError> {
        let mut result = Workitem::new();
        let mut assigned = false;

        for statement in split_top_level(script, ";") {
            if statement.is_empty() || RESULT_DECLARATION.is_match(statement) {
                continue;
            }
            let invalid = || RuleError::InvalidAssignment {
                statement: statement.to_string(),
            };

            let position = find_assignment(statement).ok_or_else(invalid)?;
            let field = result_field(statement[..position].trim()).ok_or_else(invalid)?;
            let values = self
                .evaluate_values(&statement[position + 1..], workitem)
                .map_err(|reason| RuleError::InvalidScript {
                    script: script.to_string(),
                    reason,
                })?;
            result.set_item_values(field, values);
            assigned = true;
        }

        Ok(assigned.then_some(result))
    }
}

#[derive(Debug, Clone, Copy)]
enum Comparison {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparison {
    fn apply(self, left: &Scalar, right: &Scalar) -> bool {
        match self {
            Self::Eq => left.loose_eq(right),
            Self::Ne => !left.loose_eq(right),
            Self::Gt => left.order(right) == Some(Ordering::Greater),
            Self::Ge => matches!(left.order(right), Some(Ordering::Greater | Ordering::Equal)),
            Self::Lt => left.order(right) == Some(Ordering::Less),
            Self::Le => matches!(left.order(right), Some(Ordering::Less | Ordering::Equal)),
        }
    }
}

/// A single evaluated value.
#[derive(Debug, Clone, PartialEq)]
enum Scalar {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Scalar {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }

    fn into_json(self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(b),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
                Value::from(n as i64)
            }
            Self::Number(n) => serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number),
            Self::Text(s) => Value::String(s),
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Text(s) => !s.is_empty(),
        }
    }

    /// Numeric view; missing values have none, so they never order.
    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Null, _) | (_, Self::Null) => false,
            (Self::Text(a), Self::Text(b)) => a == b,
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }

    fn order(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (a, b) => a.as_number()?.partial_cmp(&b.as_number()?),
        }
    }
}

fn operand(expression: &str, workitem: &Workitem) -> Result<Scalar, String> {
    match expression {
        "true" => return Ok(Scalar::Bool(true)),
        "false" => return Ok(Scalar::Bool(false)),
        "null" | "undefined" => return Ok(Scalar::Null),
        _ => {}
    }

    if let Some(text) = quoted(expression) {
        return Ok(Scalar::Text(text.to_string()));
    }

    if expression.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.') {
        return expression
            .parse()
            .map(Scalar::Number)
            .map_err(|_| format!("invalid number '{expression}'"));
    }

    if let Some(captures) = METHOD_CALL.captures(expression) {
        let name = captures
            .get(2)
            .or_else(|| captures.get(3))
            .map_or("", |m| m.as_str());
        return Ok(match &captures[1] {
            "getItemValueString" => Scalar::Text(workitem.item_value_string(name)),
            "getItemValueInteger" | "getItemValueLong" => {
                Scalar::Number(workitem.item_value_integer(name) as f64)
            }
            "getItemValueDouble" | "getItemValueFloat" => {
                Scalar::Number(workitem.item_value_double(name))
            }
            "getItemValueBoolean" => Scalar::Bool(workitem.item_value_bool(name)),
            "hasItem" => Scalar::Bool(workitem.has_item(name)),
            "isItemEmpty" => Scalar::Bool(
                workitem
                    .item_value(name)
                    .is_none_or(|value| !Scalar::from_json(value).truthy()),
            ),
            _ => field_value(workitem, name, 0),
        });
    }

    if let Some(captures) = FIELD_BRACKET.captures(expression) {
        let name = captures
            .get(1)
            .or_else(|| captures.get(2))
            .map_or("", |m| m.as_str());
        let index = captures.get(3).map_or(Ok(0), |m| m.as_str().parse());
        let index = index.map_err(|_| format!("invalid index in '{expression}'"))?;
        return Ok(field_value(workitem, name, index));
    }

    if let Some(captures) = FIELD_PATH.captures(expression) {
        let index = captures.get(2).map_or(Ok(0), |m| m.as_str().parse());
        let index = index.map_err(|_| format!("invalid index in '{expression}'"))?;
        return Ok(field_value(workitem, &captures[1], index));
    }

    Err(format!("unsupported operand '{expression}'"))
}

fn field_value(workitem: &Workitem, name: &str, index: usize) -> Scalar {
    workitem
        .item_values(name)
        .get(index)
        .map_or(Scalar::Null, Scalar::from_json)
}

fn quoted(expression: &str) -> Option<&str> {
    ['\'', '"'].into_iter().find_map(|quote| {
        expression
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
    })
}

fn result_field(target: &str) -> Option<&str> {
    let captures = RESULT_TARGET.captures(target)?;
    let field = captures
        .get(1)
        .or_else(|| captures.get(2))
        .or_else(|| captures.get(3))?;
    Some(field.as_str()).filter(|name| !name.is_empty())
}
