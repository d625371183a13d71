use once_cell::sync::Lazy;

/// The static pieces the instruction payload is assembled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptSpec {
    pub system_framing: &'static str,
    pub output_schema_description: &'static str,
    pub worked_example: &'static str,
}

pub const PROMPT_SPEC: PromptSpec = PromptSpec {
    system_framing: SYSTEM_FRAMING,
    output_schema_description: OUTPUT_SCHEMA,
    worked_example: WORKED_EXAMPLE,
};

const SYSTEM_FRAMING: &str = "You are a medical assistant specializing in dermatology.
Always respond with structured, clear, and safe advice.";

const OUTPUT_SCHEMA: &str = r#"Analyze the image and return ONLY the following JSON structure:
{
  "diagnosis": "string",
  "measures": ["string", "string"],
  "prevention": ["string", "string"],
  "diet": ["string", "string"]
}
"diagnosis" must be a non-empty string. "measures", "prevention" and "diet" must each be a non-empty array of strings.
Do not add any other top-level keys and do not wrap the object in another shape."#;

const WORKED_EXAMPLE: &str = r#"Example:
{
  "diagnosis": "Acne Vulgaris",
  "measures": ["Wash face twice daily", "Avoid touching face"],
  "prevention": ["Use non-comedogenic products", "Maintain hydration"],
  "diet": ["Leafy greens", "Foods rich in Omega-3"]
}"#;

const OUTPUT_RULES: &str = "Now describe the user's skin condition in the same format.
Think through the steps internally before writing your final answer.
Your final answer must contain ONLY the JSON object: no reasoning, no markdown code fences, no text before or after it.";

static PROMPT: Lazy<String> = Lazy::new(|| PROMPT_SPEC.render());

impl PromptSpec {
    fn render(&self) -> String {
        [
            self.system_framing,
            self.output_schema_description,
            self.worked_example,
            OUTPUT_RULES,
        ]
        .join("\n\n")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    /// Rendered once per process.
    pub fn build(&self) -> &'static str {
        PROMPT.as_str()
    }
}
