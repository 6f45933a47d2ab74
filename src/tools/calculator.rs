//! Calculator tool - basic arithmetic on two numbers

use super::{Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct CalculatorTool;

#[derive(Debug, Deserialize)]
struct CalculatorInput {
    first_num: f64,
    second_num: f64,
    operation: String,
}

fn evaluate(input: &CalculatorInput) -> Result<f64, String> {
    let (a, b) = (input.first_num, input.second_num);
    let result = match input.operation.as_str() {
        "add" => a + b,
        "sub" => a - b,
        "mul" => a * b,
        "div" if b == 0.0 => return Err("Division by zero is not allowed".to_string()),
        "div" => a / b,
        other => return Err(format!("Unsupported operation '{other}'")),
    };
    // JSON has no representation for infinities
    if result.is_finite() {
        Ok(result)
    } else {
        Err("Result is too large to represent".to_string())
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &'static str {
        "calculator"
    }

    fn description(&self) -> String {
        "Perform a basic arithmetic operation on two numbers. Supported operations: add, sub, mul, div.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["first_num", "second_num", "operation"],
            "properties": {
                "first_num": { "type": "number", "description": "Left operand" },
                "second_num": { "type": "number", "description": "Right operand" },
                "operation": {
                    "type": "string",
                    "enum": ["add", "sub", "mul", "div"],
                    "description": "The operation to perform"
                }
            }
        })
    }

    async fn run(&self, input: Value, _ctx: ToolContext) -> ToolOutput {
        let input: CalculatorInput = match serde_json::from_value(input) {
            Ok(i) => i,
            Err(e) => return ToolOutput::error_json(format!("Invalid input: {e}")),
        };

        match evaluate(&input) {
            Ok(result) => ToolOutput::success(
                json!({
                    "first_num": input.first_num,
                    "second_num": input.second_num,
                    "operation": input.operation,
                    "result": result
                })
                .to_string(),
            ),
            Err(message) => ToolOutput::error_json(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::test_context;

    async fn calc(input: Value) -> (ToolOutput, Value) {
        let output = CalculatorTool.run(input, test_context()).await;
        let parsed = serde_json::from_str(&output.output).unwrap();
        (output, parsed)
    }

    #[tokio::test]
    async fn test_multiply() {
        let (output, value) =
            calc(json!({"first_num": 6, "second_num": 3, "operation": "mul"})).await;
        assert!(output.success);
        assert_eq!(value["result"], json!(18.0));
        assert_eq!(value["operation"], "mul");
    }

    #[tokio::test]
    async fn test_add_sub_div() {
        let (_, v) = calc(json!({"first_num": 1.5, "second_num": 2, "operation": "add"})).await;
        assert_eq!(v["result"], json!(3.5));
        let (_, v) = calc(json!({"first_num": 1, "second_num": 4, "operation": "sub"})).await;
        assert_eq!(v["result"], json!(-3.0));
        let (_, v) = calc(json!({"first_num": 9, "second_num": 2, "operation": "div"})).await;
        assert_eq!(v["result"], json!(4.5));
    }

    #[tokio::test]
    async fn test_division_by_zero_is_error_value() {
        let (output, value) =
            calc(json!({"first_num": 5, "second_num": 0, "operation": "div"})).await;
        assert!(!output.success);
        assert!(value["error"].as_str().unwrap().contains("Division by zero"));
    }

    #[tokio::test]
    async fn test_overflow_is_error_value() {
        let (output, value) =
            calc(json!({"first_num": 1e308, "second_num": 10, "operation": "mul"})).await;
        assert!(!output.success);
        assert!(value["error"].as_str().unwrap().contains("too large"));

        let (output, _) =
            calc(json!({"first_num": -1e308, "second_num": 1e-10, "operation": "div"})).await;
        assert!(!output.success);
    }

    #[tokio::test]
    async fn test_unsupported_operation() {
        let (output, value) =
            calc(json!({"first_num": 2, "second_num": 8, "operation": "pow"})).await;
        assert!(!output.success);
        assert!(value["error"].as_str().unwrap().contains("pow"));
    }

    #[tokio::test]
    async fn test_missing_field() {
        let (output, value) = calc(json!({"first_num": 2})).await;
        assert!(!output.success);
        assert!(value["error"].as_str().unwrap().starts_with("Invalid input"));
    }
}
