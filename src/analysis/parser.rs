use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Response is not valid JSON: {0}")]
    SyntaxViolation(#[from] serde_json::Error),

    #[error("Response field '{field}' {reason}")]
    SchemaViolation { field: &'static str, reason: String },
}

/// The structured report returned by a successful analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub diagnosis: String,
    pub measures: Vec<String>,
    pub prevention: Vec<String>,
    pub diet: Vec<String>,
}

impl fmt::Display for AnalysisResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Diagnosis: {}", self.diagnosis)?;
        writeln!(f, "Immediate Measures: {}", self.measures.join(", "))?;
        writeln!(f, "Long-Term Prevention: {}", self.prevention.join(", "))?;
        write!(f, "Recommended Diet: {}", self.diet.join(", "))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResultParser;

impl ResultParser {
    /// Decode the whole response as one JSON object. Surrounding prose or
    /// markdown fences are a syntax violation, not something to strip.
    /// Unknown keys are ignored.
    pub fn parse(&self, raw: &str) -> Result<AnalysisResult, ParseError> {
        let value: Value = serde_json::from_str(raw)?;
        let object = value.as_object().ok_or_else(|| ParseError::SchemaViolation {
            field: "<root>",
            reason: format!("must be an object, got {}", type_name(&value)),
        })?;

        Ok(AnalysisResult {
            diagnosis: required_string(object, "diagnosis")?,
            measures: required_list(object, "measures")?,
            prevention: required_list(object, "prevention")?,
            diet: required_list(object, "diet")?,
        })
    }
}

fn required<'a>(object: &'a Map<String, Value>, field: &'static str) -> Result<&'a Value, ParseError> {
    object.get(field).ok_or_else(|| ParseError::SchemaViolation {
        field,
        reason: "is missing".to_string(),
    })
}

fn required_string(object: &Map<String, Value>, field: &'static str) -> Result<String, ParseError> {
    match required(object, field)? {
        Value::String(s) if !s.trim().is_empty() => Ok(s.clone()),
        Value::String(_) => Err(ParseError::SchemaViolation {
            field,
            reason: "must not be empty".to_string(),
        }),
        other => Err(ParseError::SchemaViolation {
            field,
            reason: format!("must be a string, got {}", type_name(other)),
        }),
    }
}

fn required_list(object: &Map<String, Value>, field: &'static str) -> Result<Vec<String>, ParseError> {
    let items = match required(object, field)? {
        Value::Array(items) => items,
        other => {
            return Err(ParseError::SchemaViolation {
                field,
                reason: format!("must be an array of strings, got {}", type_name(other)),
            })
        }
    };

    if items.is_empty() {
        return Err(ParseError::SchemaViolation {
            field,
            reason: "must not be empty".to_string(),
        });
    }

    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::String(s) if !s.trim().is_empty() => Ok(s.clone()),
            Value::String(_) => Err(ParseError::SchemaViolation {
                field,
                reason: format!("item {i} must not be empty"),
            }),
            other => Err(ParseError::SchemaViolation {
                field,
                reason: format!("item {i} must be a string, got {}", type_name(other)),
            }),
        })
        .collect()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn acne() -> Value {
        json!({
            "diagnosis": "Acne Vulgaris",
            "measures": ["Wash face twice daily", "Avoid touching face"],
            "prevention": ["Use non-comedogenic products", "Maintain hydration"],
            "diet": ["Leafy greens", "Foods rich in Omega-3"]
        })
    }

    fn schema_field(err: ParseError) -> &'static str {
        match err {
            ParseError::SchemaViolation { field, .. } => field,
            other => panic!("expected schema violation, got {other:?}"),
        }
    }

    #[test]
    fn test_parses_complete_response() {
        let result = ResultParser.parse(&acne().to_string()).unwrap();
        assert_eq!(result.diagnosis, "Acne Vulgaris");
        assert_eq!(result.measures, vec!["Wash face twice daily", "Avoid touching face"]);
        assert_eq!(result.diet[1], "Foods rich in Omega-3");
    }

    #[test]
    fn test_tolerates_surrounding_whitespace() {
        let raw = format!("\n  {}\n", acne());
        assert!(ResultParser.parse(&raw).is_ok());
    }

    #[test]
    fn test_ignores_extra_keys() {
        let mut value = acne();
        value["confidence"] = json!(0.8);
        assert!(ResultParser.parse(&value.to_string()).is_ok());
    }

    #[test]
    fn test_prose_prefix_is_syntax_violation() {
        let raw = format!("Sure! {}", acne());
        assert!(matches!(ResultParser.parse(&raw), Err(ParseError::SyntaxViolation(_))));
    }

    #[test]
    fn test_markdown_fence_is_syntax_violation() {
        let raw = format!("```json\n{}\n```", acne());
        assert!(matches!(ResultParser.parse(&raw), Err(ParseError::SyntaxViolation(_))));
    }

    #[test]
    fn test_trailing_commentary_is_syntax_violation() {
        let raw = format!("{} Hope this helps.", acne());
        assert!(matches!(ResultParser.parse(&raw), Err(ParseError::SyntaxViolation(_))));
    }

    #[test]
    fn test_non_object_root() {
        assert_eq!(schema_field(ResultParser.parse("[1, 2]").unwrap_err()), "<root>");
    }

    #[test]
    fn test_missing_each_field() {
        for field in ["diagnosis", "measures", "prevention", "diet"] {
            let mut value = acne();
            value.as_object_mut().unwrap().remove(field);
            assert_eq!(schema_field(ResultParser.parse(&value.to_string()).unwrap_err()), field);
        }
    }

    #[test]
    fn test_wrong_types() {
        let mut value = acne();
        value["diagnosis"] = json!(["Acne"]);
        assert_eq!(schema_field(ResultParser.parse(&value.to_string()).unwrap_err()), "diagnosis");

        let mut value = acne();
        value["measures"] = json!("Wash face");
        assert_eq!(schema_field(ResultParser.parse(&value.to_string()).unwrap_err()), "measures");

        let mut value = acne();
        value["diet"] = json!(["Leafy greens", 3]);
        assert_eq!(schema_field(ResultParser.parse(&value.to_string()).unwrap_err()), "diet");
    }

    #[test]
    fn test_empty_values() {
        let mut value = acne();
        value["diagnosis"] = json!("  ");
        assert_eq!(schema_field(ResultParser.parse(&value.to_string()).unwrap_err()), "diagnosis");

        let mut value = acne();
        value["prevention"] = json!([]);
        assert_eq!(schema_field(ResultParser.parse(&value.to_string()).unwrap_err()), "prevention");
    }

    #[test]
    fn test_display_matches_result_card() {
        let result = ResultParser.parse(&acne().to_string()).unwrap();
        let text = result.to_string();
        assert!(text.starts_with("Diagnosis: Acne Vulgaris\n"));
        assert!(text.contains("Immediate Measures: Wash face twice daily, Avoid touching face"));
        assert!(text.ends_with("Recommended Diet: Leafy greens, Foods rich in Omega-3"));
    }

    fn entry() -> impl Strategy<Value = String> {
        "[A-Za-z0-9 ,.'-]{0,24}[A-Za-z0-9]"
    }

    proptest! {
        #[test]
        fn prop_valid_response_parses_verbatim(
            diagnosis in entry(),
            measures in prop::collection::vec(entry(), 1..5),
            prevention in prop::collection::vec(entry(), 1..5),
            diet in prop::collection::vec(entry(), 1..5),
        ) {
            let raw = json!({
                "diagnosis": diagnosis,
                "measures": measures,
                "prevention": prevention,
                "diet": diet,
            })
            .to_string();

            let result = ResultParser.parse(&raw).unwrap();
            prop_assert_eq!(result.diagnosis, diagnosis);
            prop_assert_eq!(result.measures, measures);
            prop_assert_eq!(result.prevention, prevention);
            prop_assert_eq!(result.diet, diet);
        }

        #[test]
        fn prop_missing_field_never_partial(missing in 0usize..4) {
            let field = ["diagnosis", "measures", "prevention", "diet"][missing];
            let mut value = acne();
            value.as_object_mut().unwrap().remove(field);

            let is_schema_violation = matches!(
                ResultParser.parse(&value.to_string()),
                Err(ParseError::SchemaViolation { .. })
            );
            prop_assert!(is_schema_violation);
        }
    }
}
