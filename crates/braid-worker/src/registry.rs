//! Named functions a worker can call.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Resolved arguments of a job, by slot.
pub type Arguments = BTreeMap<String, Value>;

/// A callable job function. Errors are reported as plain messages.
pub type Function = Arc<dyn Fn(&Arguments) -> Result<Value, String> + Send + Sync>;

/// Maps function names to implementations.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
  functions: HashMap<String, Function>,
}

impl fmt::Debug for FunctionRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut names = self.names();
    names.sort_unstable();
    f.debug_struct("FunctionRegistry")
      .field("functions", &names)
      .finish()
  }
}

impl FunctionRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry holding the builtin arithmetic functions:
  /// `add`, `sub`, `mul`, `accumulate`, `log_add` and `fail`.
  pub fn builtin() -> Self {
    let mut registry = Self::new();
    registry.register("add", |args| arith(args, "x", "y", i64::checked_add, |a, b| a + b));
    registry.register("sub", |args| arith(args, "x", "y", i64::checked_sub, |a, b| a - b));
    registry.register("mul", |args| arith(args, "x", "y", i64::checked_mul, |a, b| a * b));
    registry.register("log_add", |args| {
      arith(args, "a", "b", i64::checked_add, |a, b| a + b)
    });
    registry.register("accumulate", accumulate);
    registry.register("fail", |args| {
      let message = args
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("job failed on purpose");
      Err(message.to_string())
    });
    registry
  }

  /// Register a function, replacing any previous one with the same name.
  pub fn register<F>(&mut self, name: impl Into<String>, function: F)
  where
    F: Fn(&Arguments) -> Result<Value, String> + Send + Sync + 'static,
  {
    self.functions.insert(name.into(), Arc::new(function));
  }

  pub fn get(&self, name: &str) -> Option<Function> {
    self.functions.get(name).cloned()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.functions.contains_key(name)
  }

  pub fn names(&self) -> Vec<&str> {
    self.functions.keys().map(String::as_str).collect()
  }
}

fn argument<'a>(args: &'a Arguments, slot: &str) -> Result<&'a Value, String> {
  args
    .get(slot)
    .ok_or_else(|| format!("missing argument '{}'", slot))
}

fn number(value: &Value, slot: &str) -> Result<f64, String> {
  value
    .as_f64()
    .ok_or_else(|| format!("argument '{}' is not a number: {}", slot, value))
}

/// Binary arithmetic that stays in integers while both sides are integers
/// and the result fits.
fn arith(
  args: &Arguments,
  left: &str,
  right: &str,
  int_op: fn(i64, i64) -> Option<i64>,
  float_op: fn(f64, f64) -> f64,
) -> Result<Value, String> {
  let a = argument(args, left)?;
  let b = argument(args, right)?;

  if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
    if let Some(v) = int_op(x, y) {
      return Ok(Value::from(v));
    }
  }

  let v = float_op(number(a, left)?, number(b, right)?);
  // JSON has no encoding for infinities or NaN.
  if !v.is_finite() {
    return Err(format!("result is not a finite number: {}", v));
  }
  Ok(Value::from(v))
}

/// Sum of `lst`, plus `start` (default 0).
fn accumulate(args: &Arguments) -> Result<Value, String> {
  let items = argument(args, "lst")?
    .as_array()
    .ok_or_else(|| "argument 'lst' is not a list".to_string())?;
  let start = args.get("start").cloned().unwrap_or(Value::from(0));

  let mut total = Arguments::new();
  total.insert("x".to_string(), start);
  for item in items {
    total.insert("y".to_string(), item.clone());
    let sum = arith(&total, "x", "y", i64::checked_add, |a, b| a + b)?;
    total.insert("x".to_string(), sum);
  }

  Ok(total.remove("x").unwrap_or(Value::from(0)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn call(name: &str, args: Value) -> Result<Value, String> {
    let registry = FunctionRegistry::builtin();
    let function = registry.get(name).unwrap();
    let args: Arguments = serde_json::from_value(args).unwrap();
    function(&args)
  }

  #[test]
  fn test_arithmetic() {
    assert_eq!(call("add", json!({"x": 1, "y": 1})).unwrap(), json!(2));
    assert_eq!(call("sub", json!({"x": 1, "y": 1})).unwrap(), json!(0));
    assert_eq!(call("mul", json!({"x": 6, "y": 7})).unwrap(), json!(42));
    assert_eq!(call("log_add", json!({"a": 2, "b": 3})).unwrap(), json!(5));
    assert_eq!(call("add", json!({"x": 0.5, "y": 1})).unwrap(), json!(1.5));
  }

  #[test]
  fn test_accumulate() {
    assert_eq!(call("accumulate", json!({"lst": [1, 2, 3]})).unwrap(), json!(6));
    assert_eq!(
      call("accumulate", json!({"lst": [1, 2], "start": 10})).unwrap(),
      json!(13)
    );
    assert_eq!(call("accumulate", json!({"lst": []})).unwrap(), json!(0));
  }

  #[test]
  fn test_bad_arguments() {
    let err = call("add", json!({"x": 1})).unwrap_err();
    assert!(err.contains("missing argument 'y'"));

    let err = call("add", json!({"x": 1, "y": "one"})).unwrap_err();
    assert!(err.contains("not a number"));

    assert_eq!(
      call("fail", json!({"message": "nope"})).unwrap_err(),
      "nope"
    );
  }

  #[test]
  fn test_overflow_to_infinity_fails() {
    let err = call("add", json!({"x": 1e308, "y": 1e308})).unwrap_err();
    assert!(err.contains("not a finite number"));

    let err = call("mul", json!({"x": -1e200, "y": 1e200})).unwrap_err();
    assert!(err.contains("not a finite number"));

    let err = call("accumulate", json!({"lst": [1.7e308, 1.7e308]})).unwrap_err();
    assert!(err.contains("not a finite number"));

    // Integer overflow still falls back to a finite float.
    let v = call("add", json!({"x": i64::MAX, "y": 1})).unwrap();
    assert!(v.as_f64().unwrap().is_finite());
  }

  #[test]
  fn test_register_replaces() {
    let mut registry = FunctionRegistry::builtin();
    registry.register("add", |_| Ok(json!("custom")));
    let add = registry.get("add").unwrap();
    assert_eq!(add(&Arguments::new()).unwrap(), json!("custom"));
    assert!(!registry.contains("div"));
  }
}
