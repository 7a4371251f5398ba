//! Static evaluation of macro predicates and literal expressions.
//!
//! The evaluator reduces an expression to a statically-known value when the
//! build snapshots allow it. `Ok(None)` means "not statically known" - the
//! expander decides whether that defers to runtime or fails the file.

use gantry_core::{BuildConfig, VersionGraph};
use serde_json::Value;

use crate::ast::{
    BinaryOperator, Expression, Literal, MemberProperty, ObjectExpression, Property,
    UnaryOperator,
};
use crate::error::{ExpandError, Result};

/// A statically-known value produced by the evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum StaticValue {
    /// Boolean value
    Boolean(bool),
    /// Numeric value
    Number(f64),
    /// String value
    String(String),
    /// null
    Null,
    /// undefined
    Undefined,
    /// Array of known values
    Array(Vec<StaticValue>),
    /// Object of known values, insertion-ordered
    Object(Vec<(String, StaticValue)>),
}

impl StaticValue {
    /// JavaScript truthiness.
    pub fn truthy(&self) -> bool {
        match self {
            StaticValue::Boolean(b) => *b,
            StaticValue::Number(n) => *n != 0.0 && !n.is_nan(),
            StaticValue::String(s) => !s.is_empty(),
            StaticValue::Null | StaticValue::Undefined => false,
            StaticValue::Array(_) | StaticValue::Object(_) => true,
        }
    }

    /// Convert a JSON configuration value into a static value.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => StaticValue::Null,
            Value::Bool(b) => StaticValue::Boolean(*b),
            Value::Number(n) => StaticValue::Number(n.as_f64().unwrap_or_default()),
            Value::String(s) => StaticValue::String(s.clone()),
            Value::Array(items) => {
                StaticValue::Array(items.iter().map(StaticValue::from_json).collect())
            }
            Value::Object(map) => StaticValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), StaticValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert a static value back into a literal expression tree.
    pub fn to_expression(&self) -> Expression {
        match self {
            StaticValue::Boolean(b) => Expression::Literal(Literal::Boolean(*b)),
            StaticValue::Number(n) => Expression::Literal(Literal::Number(*n)),
            StaticValue::String(s) => Expression::Literal(Literal::String(s.clone())),
            StaticValue::Null => Expression::Literal(Literal::Null),
            StaticValue::Undefined => Expression::Literal(Literal::Undefined),
            StaticValue::Array(items) => Expression::Array(crate::ast::ArrayExpression {
                elements: items.iter().map(StaticValue::to_expression).collect(),
            }),
            StaticValue::Object(pairs) => Expression::Object(ObjectExpression {
                properties: pairs
                    .iter()
                    .map(|(key, value)| Property {
                        key: key.clone(),
                        value: value.to_expression(),
                    })
                    .collect(),
            }),
        }
    }

    fn strict_equals(&self, other: &StaticValue) -> bool {
        match (self, other) {
            (StaticValue::Boolean(a), StaticValue::Boolean(b)) => a == b,
            (StaticValue::Number(a), StaticValue::Number(b)) => a == b,
            (StaticValue::String(a), StaticValue::String(b)) => a == b,
            (StaticValue::Null, StaticValue::Null) => true,
            (StaticValue::Undefined, StaticValue::Undefined) => true,
            // Two distinct literals are never reference-equal.
            _ => false,
        }
    }

    fn loose_equals(&self, other: &StaticValue) -> bool {
        match (self, other) {
            (StaticValue::Null, StaticValue::Undefined)
            | (StaticValue::Undefined, StaticValue::Null) => true,
            _ => self.strict_equals(other),
        }
    }

    fn type_of(&self) -> &'static str {
        match self {
            StaticValue::Boolean(_) => "boolean",
            StaticValue::Number(_) => "number",
            StaticValue::String(_) => "string",
            StaticValue::Undefined => "undefined",
            StaticValue::Null | StaticValue::Array(_) | StaticValue::Object(_) => "object",
        }
    }
}

/// Expression reducer bound to one file's expansion context.
pub(crate) struct Evaluator<'a> {
    pub config: &'a BuildConfig,
    pub versions: &'a VersionGraph,
    pub own_package: &'a str,
    pub file: &'a str,
}

impl Evaluator<'_> {
    /// Try to reduce an expression to a statically-known value.
    pub fn reduce(&self, expr: &Expression) -> Result<Option<StaticValue>> {
        match expr {
            Expression::Literal(lit) => Ok(Some(literal_value(lit))),
            Expression::Array(array) => {
                let mut items = Vec::with_capacity(array.elements.len());
                for element in &array.elements {
                    match self.reduce(element)? {
                        Some(value) => items.push(value),
                        None => return Ok(None),
                    }
                }
                Ok(Some(StaticValue::Array(items)))
            }
            Expression::Object(object) => {
                let mut pairs = Vec::with_capacity(object.properties.len());
                for property in &object.properties {
                    match self.reduce(&property.value)? {
                        Some(value) => pairs.push((property.key.clone(), value)),
                        None => return Ok(None),
                    }
                }
                Ok(Some(StaticValue::Object(pairs)))
            }
            Expression::Unary(unary) => {
                let Some(value) = self.reduce(&unary.argument)? else {
                    return Ok(None);
                };
                Ok(match unary.operator {
                    UnaryOperator::LogicalNot => Some(StaticValue::Boolean(!value.truthy())),
                    UnaryOperator::Minus => match value {
                        StaticValue::Number(n) => Some(StaticValue::Number(-n)),
                        _ => None,
                    },
                    UnaryOperator::Typeof => {
                        Some(StaticValue::String(value.type_of().to_string()))
                    }
                    UnaryOperator::Void => Some(StaticValue::Undefined),
                })
            }
            Expression::Binary(binary) => self.reduce_binary(binary),
            Expression::Conditional(cond) => match self.reduce(&cond.test)? {
                Some(test) if test.truthy() => self.reduce(&cond.consequent),
                Some(_) => self.reduce(&cond.alternate),
                None => Ok(None),
            },
            Expression::Member(member) => self.reduce_member(member),
            Expression::Call(call) => self.reduce_macro_call(call),
            Expression::Identifier(_)
            | Expression::New(_)
            | Expression::Arrow(_) => Ok(None),
        }
    }

    fn reduce_binary(&self, binary: &crate::ast::BinaryExpression) -> Result<Option<StaticValue>> {
        // Logical operators keep JavaScript operand semantics: the chosen
        // operand's value is the result, not a coerced boolean.
        match binary.operator {
            BinaryOperator::LogicalAnd => {
                return Ok(match self.reduce(&binary.left)? {
                    Some(left) if !left.truthy() => Some(left),
                    Some(_) => self.reduce(&binary.right)?,
                    None => None,
                });
            }
            BinaryOperator::LogicalOr => {
                return Ok(match self.reduce(&binary.left)? {
                    Some(left) if left.truthy() => Some(left),
                    Some(_) => self.reduce(&binary.right)?,
                    None => None,
                });
            }
            _ => {}
        }

        let (Some(left), Some(right)) =
            (self.reduce(&binary.left)?, self.reduce(&binary.right)?)
        else {
            return Ok(None);
        };
        let result = match binary.operator {
            BinaryOperator::StrictEqual => left.strict_equals(&right),
            BinaryOperator::StrictNotEqual => !left.strict_equals(&right),
            BinaryOperator::Equal => left.loose_equals(&right),
            BinaryOperator::NotEqual => !left.loose_equals(&right),
            BinaryOperator::LogicalAnd | BinaryOperator::LogicalOr => unreachable!(),
        };
        Ok(Some(StaticValue::Boolean(result)))
    }

    fn reduce_member(&self, member: &crate::ast::MemberExpression) -> Result<Option<StaticValue>> {
        let Some(object) = self.reduce(&member.object)? else {
            return Ok(None);
        };
        let key = match &member.property {
            MemberProperty::Identifier(ident) => StaticValue::String(ident.name.clone()),
            MemberProperty::Computed(expr) => match self.reduce(expr)? {
                Some(key) => key,
                None => return Ok(None),
            },
        };
        Ok(Some(lookup_member(&object, &key)))
    }

    fn reduce_macro_call(&self, call: &crate::ast::CallExpression) -> Result<Option<StaticValue>> {
        let Expression::Identifier(callee) = call.callee.as_ref() else {
            return Ok(None);
        };
        match callee.name.as_str() {
            "dependencySatisfies" => {
                let (package, range) = match (
                    call.arguments.first().map(|a| self.reduce(a)).transpose()?,
                    call.arguments.get(1).map(|a| self.reduce(a)).transpose()?,
                ) {
                    (
                        Some(Some(StaticValue::String(package))),
                        Some(Some(StaticValue::String(range))),
                    ) => (package, range),
                    _ => {
                        return Err(ExpandError::static_eval(
                            self.file,
                            call.span,
                            "dependencySatisfies requires literal package and range arguments",
                        ));
                    }
                };
                let satisfied = self
                    .versions
                    .satisfies(&package, &range)
                    .map_err(|e| ExpandError::static_eval(self.file, call.span, e.to_string()))?;
                Ok(Some(StaticValue::Boolean(satisfied)))
            }
            "getConfig" => {
                let Some(Some(StaticValue::String(package))) =
                    call.arguments.first().map(|a| self.reduce(a)).transpose()?
                else {
                    return Err(ExpandError::static_eval(
                        self.file,
                        call.span,
                        "getConfig requires a literal package name",
                    ));
                };
                Ok(self
                    .config
                    .package_config(&package)
                    .map(StaticValue::from_json))
            }
            "getOwnConfig" => Ok(self
                .config
                .package_config(self.own_package)
                .map(StaticValue::from_json)),
            "isTesting" => Ok(self.config.is_testing().map(StaticValue::Boolean)),
            "isDevelopingApp" => Ok(self.config.is_developing_app().map(StaticValue::Boolean)),
            _ => Ok(None),
        }
    }
}

fn literal_value(lit: &Literal) -> StaticValue {
    match lit {
        Literal::Number(n) => StaticValue::Number(*n),
        Literal::String(s) => StaticValue::String(s.clone()),
        Literal::Boolean(b) => StaticValue::Boolean(*b),
        Literal::Null => StaticValue::Null,
        Literal::Undefined => StaticValue::Undefined,
    }
}

fn lookup_member(object: &StaticValue, key: &StaticValue) -> StaticValue {
    match (object, key) {
        (StaticValue::Object(pairs), StaticValue::String(name)) => pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .unwrap_or(StaticValue::Undefined),
        (StaticValue::Array(items), StaticValue::Number(index)) => items
            .get(*index as usize)
            .cloned()
            .unwrap_or(StaticValue::Undefined),
        (StaticValue::Array(items), StaticValue::String(name)) if name == "length" => {
            StaticValue::Number(items.len() as f64)
        }
        (StaticValue::String(s), StaticValue::String(name)) if name == "length" => {
            StaticValue::Number(s.len() as f64)
        }
        _ => StaticValue::Undefined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build;
    use serde_json::json;

    fn fixtures() -> (BuildConfig, VersionGraph) {
        let mut config = BuildConfig::new();
        config.insert_package_config("addon-x", json!({ "mode": "fast", "retries": 3 }));
        config.set_testing(false);
        let mut versions = VersionGraph::new();
        versions.insert("lib-a", "1.2.0").unwrap();
        (config, versions)
    }

    fn reduce(expr: &Expression) -> Option<StaticValue> {
        let (config, versions) = fixtures();
        let evaluator = Evaluator {
            config: &config,
            versions: &versions,
            own_package: "addon-x",
            file: "addon-x/index.js",
        };
        evaluator.reduce(expr).unwrap()
    }

    #[test]
    fn test_logical_operators_keep_operand_values() {
        let expr = Expression::Binary(crate::ast::BinaryExpression {
            operator: BinaryOperator::LogicalOr,
            left: Box::new(build::string("")),
            right: Box::new(build::string("fallback")),
        });
        assert_eq!(reduce(&expr), Some(StaticValue::String("fallback".into())));
    }

    #[test]
    fn test_member_access_on_config_object() {
        let expr = build::member(build::call("getOwnConfig", vec![]), "mode");
        assert_eq!(reduce(&expr), Some(StaticValue::String("fast".into())));

        let expr = build::member(
            build::call("getConfig", vec![build::string("addon-x")]),
            "missing",
        );
        assert_eq!(reduce(&expr), Some(StaticValue::Undefined));
    }

    #[test]
    fn test_dependency_satisfies_reduces() {
        let expr = build::call(
            "dependencySatisfies",
            vec![build::string("lib-a"), build::string("^1.0.0")],
        );
        assert_eq!(reduce(&expr), Some(StaticValue::Boolean(true)));

        let expr = build::call(
            "dependencySatisfies",
            vec![build::string("lib-b"), build::string("^1.0.0")],
        );
        assert_eq!(reduce(&expr), Some(StaticValue::Boolean(false)));
    }

    #[test]
    fn test_unknown_config_defers() {
        let expr = build::call("getConfig", vec![build::string("addon-unconfigured")]);
        assert_eq!(reduce(&expr), None);
    }

    #[test]
    fn test_json_roundtrips_to_expression() {
        let value = StaticValue::from_json(&json!({ "mode": "fast", "flags": [1, true, null] }));
        let expr = value.to_expression();
        let Expression::Object(object) = &expr else {
            panic!("expected object literal");
        };
        assert_eq!(object.properties.len(), 2);
    }
}
