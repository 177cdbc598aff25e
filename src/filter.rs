//! Filter model: typed predicate tree, validated against table settings and
//! compiled to a parameterized WHERE clause.

use crate::config::{ColumnDescriptor, ColumnType, TableSettings};
use crate::error::AppError;
use crate::sql::quoted;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    #[default]
    #[serde(alias = "=")]
    Eq,
    #[serde(alias = "!=", alias = "<>")]
    Ne,
    #[serde(alias = "<")]
    Lt,
    #[serde(alias = "<=")]
    Lte,
    #[serde(alias = ">")]
    Gt,
    #[serde(alias = ">=")]
    Gte,
    Like,
    In,
    Between,
    #[serde(alias = "isnull")]
    Null,
    #[serde(alias = "not_null")]
    Notnull,
}

impl Operator {
    /// Whether the operator is meaningful for a column of type `ty`.
    pub fn compatible_with(self, ty: ColumnType) -> bool {
        use Operator::*;
        match self {
            Null | Notnull => true,
            Eq | Ne => ty != ColumnType::Json,
            In => !matches!(ty, ColumnType::Json | ColumnType::Boolean),
            Lt | Lte | Gt | Gte | Between => ty.is_numeric() || ty.is_temporal() || ty.is_textual(),
            Like => ty.is_textual(),
        }
    }

    fn comparison_sql(self) -> Option<&'static str> {
        match self {
            Operator::Eq => Some("="),
            Operator::Ne => Some("<>"),
            Operator::Lt => Some("<"),
            Operator::Lte => Some("<="),
            Operator::Gt => Some(">"),
            Operator::Gte => Some(">="),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connective {
    #[default]
    And,
    Or,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterCondition {
    pub column: String,
    #[serde(default, alias = "op")]
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
}

impl FilterCondition {
    pub fn new(column: impl Into<String>, operator: Operator, value: Value) -> Self {
        FilterCondition {
            column: column.into(),
            operator,
            value,
        }
    }

    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Self::new(column, Operator::Eq, value)
    }
}

/// A node is either a nested group or a leaf condition. Groups are tried
/// first; both reject unknown keys, so a malformed node never parses as an
/// empty group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterNode {
    Group(FilterGroup),
    Condition(FilterCondition),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterGroup {
    #[serde(default)]
    pub connective: Connective,
    #[serde(default, alias = "wheres")]
    pub conditions: Vec<FilterNode>,
}

impl FilterGroup {
    pub fn and(conditions: Vec<FilterNode>) -> Self {
        FilterGroup {
            connective: Connective::And,
            conditions,
        }
    }

    pub fn or(conditions: Vec<FilterNode>) -> Self {
        FilterGroup {
            connective: Connective::Or,
            conditions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

impl From<FilterCondition> for FilterNode {
    fn from(c: FilterCondition) -> Self {
        FilterNode::Condition(c)
    }
}

impl From<FilterGroup> for FilterNode {
    fn from(g: FilterGroup) -> Self {
        FilterNode::Group(g)
    }
}

/// Compiled WHERE clause with `$1..$n` placeholders and the values to bind.
/// `clause` is `None` when the filter matches every row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Predicate {
    pub clause: Option<String>,
    pub params: Vec<Value>,
}

/// Check every condition against the table's filter descriptors.
pub fn validate(settings: &TableSettings, group: &FilterGroup) -> Result<(), AppError> {
    for node in &group.conditions {
        match node {
            FilterNode::Group(g) => validate(settings, g)?,
            FilterNode::Condition(c) => validate_condition(settings, c)?,
        }
    }
    Ok(())
}

fn validate_condition(settings: &TableSettings, cond: &FilterCondition) -> Result<(), AppError> {
    let descriptor = settings
        .filter_for_column(&cond.column)
        .ok_or_else(|| AppError::validation(format!("unknown filter column '{}'", cond.column)))?;
    let column = settings
        .column(descriptor.column_name())
        .ok_or_else(|| AppError::validation(format!("unknown column '{}'", cond.column)))?;

    if !cond.operator.compatible_with(column.type_) {
        return Err(AppError::validation(format!(
            "operator {:?} not supported for {:?} column '{}'",
            cond.operator, column.type_, column.name
        )));
    }
    if let Some(allowed) = &descriptor.operators {
        if !allowed.contains(&cond.operator) {
            return Err(AppError::validation(format!(
                "operator {:?} not allowed for filter '{}'",
                cond.operator, descriptor.name
            )));
        }
    }

    match cond.operator {
        Operator::Null | Operator::Notnull => Ok(()),
        Operator::Like => match &cond.value {
            Value::String(_) => Ok(()),
            _ => Err(AppError::validation(format!("like on '{}' requires a string pattern", column.name))),
        },
        Operator::In => {
            let items = cond
                .value
                .as_array()
                .filter(|a| !a.is_empty())
                .ok_or_else(|| AppError::validation(format!("in on '{}' requires a non-empty array", column.name)))?;
            items.iter().try_for_each(|v| check_scalar(column, v))
        }
        Operator::Between => match cond.value.as_array().map(Vec::as_slice) {
            Some([low, high]) => {
                check_scalar(column, low)?;
                check_scalar(column, high)
            }
            _ => Err(AppError::validation(format!(
                "between on '{}' requires exactly two values",
                column.name
            ))),
        },
        _ => check_scalar(column, &cond.value),
    }
}

fn check_scalar(column: &ColumnDescriptor, v: &Value) -> Result<(), AppError> {
    let bad = |what: &str| AppError::validation(format!("column '{}' {}", column.name, what));
    match v {
        Value::Null => Err(bad("requires a value (use null/notnull to test for NULL)")),
        Value::Array(_) | Value::Object(_) => Err(bad("requires a scalar value")),
        Value::Bool(_) if column.type_ == ColumnType::Boolean => Ok(()),
        _ if column.type_ == ColumnType::Boolean => Err(bad("requires a boolean")),
        Value::Number(n) if column.type_.is_integer() && !(n.is_i64() || n.is_u64()) => Err(bad("requires an integer")),
        Value::String(s) if column.type_.is_integer() && s.trim().parse::<i64>().is_err() => {
            Err(bad("requires an integer"))
        }
        Value::String(s) if column.type_.is_numeric() && s.trim().parse::<f64>().is_err() => Err(bad("requires a number")),
        Value::String(s) if column.type_ == ColumnType::Uuid && uuid::Uuid::parse_str(s).is_err() => {
            Err(bad("requires a uuid"))
        }
        Value::Number(_) if column.type_ == ColumnType::Uuid => Err(bad("requires a uuid")),
        Value::Number(_) if column.type_.is_temporal() => Err(bad("requires a date/time string")),
        Value::Bool(_) => Err(bad("does not accept a boolean")),
        _ => Ok(()),
    }
}

/// Lower the tree into SQL, numbering placeholders from `$1`.
/// Expects a group that passed [`validate`]; unknown columns still fail here.
pub fn compile(settings: &TableSettings, group: &FilterGroup) -> Result<Predicate, AppError> {
    if group.is_empty() {
        return Ok(Predicate::default());
    }
    let mut params = Vec::new();
    let clause = compile_group(settings, group, &mut params)?;
    Ok(Predicate {
        clause: Some(clause),
        params,
    })
}

fn compile_group(settings: &TableSettings, group: &FilterGroup, params: &mut Vec<Value>) -> Result<String, AppError> {
    if group.is_empty() {
        return Ok("TRUE".into());
    }
    let joiner = match group.connective {
        Connective::And => " AND ",
        Connective::Or => " OR ",
    };
    let mut parts = Vec::with_capacity(group.conditions.len());
    for node in &group.conditions {
        let part = match node {
            FilterNode::Group(g) => compile_group(settings, g, params)?,
            FilterNode::Condition(c) => compile_condition(settings, c, params)?,
        };
        parts.push(format!("({})", part));
    }
    Ok(parts.join(joiner))
}

fn compile_condition(settings: &TableSettings, cond: &FilterCondition, params: &mut Vec<Value>) -> Result<String, AppError> {
    let column_name = settings
        .filter_for_column(&cond.column)
        .map(|f| f.column_name())
        .ok_or_else(|| AppError::validation(format!("unknown filter column '{}'", cond.column)))?;
    let column = settings
        .column(column_name)
        .ok_or_else(|| AppError::validation(format!("unknown column '{}'", column_name)))?;
    let col = quoted(&column.name);
    let pg_type = column.type_.pg_type();
    let mut placeholder = |v: &Value| {
        params.push(v.clone());
        format!("${}::{}", params.len(), pg_type)
    };

    Ok(match cond.operator {
        Operator::Null => format!("{} IS NULL", col),
        Operator::Notnull => format!("{} IS NOT NULL", col),
        Operator::Like => format!("{}::text LIKE {}", col, placeholder(&cond.value)),
        Operator::In => {
            let items = cond.value.as_array().filter(|a| !a.is_empty()).ok_or_else(|| {
                AppError::validation(format!("in on '{}' requires a non-empty array", column.name))
            })?;
            let list: Vec<String> = items.iter().map(&mut placeholder).collect();
            format!("{} IN ({})", col, list.join(", "))
        }
        Operator::Between => match cond.value.as_array().map(Vec::as_slice) {
            Some([low, high]) => {
                let low = placeholder(low);
                let high = placeholder(high);
                format!("{} BETWEEN {} AND {}", col, low, high)
            }
            _ => {
                return Err(AppError::validation(format!(
                    "between on '{}' requires exactly two values",
                    column.name
                )))
            }
        },
        op => {
            let sql_op = op.comparison_sql().unwrap_or("=");
            format!("{} {} {}", col, sql_op, placeholder(&cond.value))
        }
    })
}
