//! The `explain` use case: look up reason code documentation.

use irrigation_types::ReasonCode;
use irrigation_types::explain::{self, Explanation};

/// Output from the explain use case.
#[derive(Clone, Debug)]
pub enum ExplainOutput {
    /// Found an explanation for the code.
    Found {
        code: ReasonCode,
        explanation: Explanation,
    },
    /// Unknown identifier; includes the available codes.
    NotFound {
        identifier: String,
        available_codes: &'static [ReasonCode],
    },
}

/// Look up an explanation for a reason code.
pub fn run_explain(identifier: &str) -> ExplainOutput {
    let code = ReasonCode::parse(&identifier.to_ascii_uppercase());
    match (code, explain::lookup_explanation(identifier)) {
        (Some(code), Some(explanation)) => ExplainOutput::Found { code, explanation },
        _ => ExplainOutput::NotFound {
            identifier: identifier.to_string(),
            available_codes: explain::all_codes(),
        },
    }
}

/// Format an explanation for terminal display.
pub fn format_explanation(code: ReasonCode, exp: &Explanation) -> String {
    let mut out = String::new();

    out.push_str(&format!("{} ({})\n", exp.title, code.as_str()));
    out.push_str(&"=".repeat(exp.title.len() + code.as_str().len() + 3));
    out.push_str("\n\n");
    out.push_str(&format!(
        "Stage: {:?}    Retryable: {}\n\n",
        code.stage(),
        if code.is_retryable() { "yes" } else { "no" }
    ));
    out.push_str(exp.description);
    out.push_str("\n\n");
    out.push_str("Remediation\n");
    out.push_str("-----------\n");
    out.push_str(exp.remediation);
    out.push_str("\n\n");
    out.push_str("Examples\n");
    out.push_str("--------\n\n");
    out.push_str("Before (rejected):\n");
    out.push_str("```json\n");
    out.push_str(exp.examples.before);
    out.push('\n');
    out.push_str("```\n\n");
    out.push_str("After (accepted):\n");
    out.push_str("```json\n");
    out.push_str(exp.examples.after);
    out.push('\n');
    out.push_str("```\n");

    out
}

/// Format the "not found" error message for terminal display.
pub fn format_not_found(identifier: &str, codes: &[ReasonCode]) -> String {
    let mut out = String::new();

    out.push_str(&format!("Unknown reason code: {}\n\n", identifier));
    out.push_str("Available codes:\n");
    for code in codes {
        out.push_str(&format!("  - {}\n", code.as_str()));
    }

    out
}
