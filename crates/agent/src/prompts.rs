//! Fixed message templates.
//!
//! These strings are compatibility-critical: downstream transcript consumers
//! match on them verbatim, so any wording change is a breaking change.

use readmit_core::oracle::PredictionResult;
use readmit_core::RiskLabel;

pub const GREETING: &str = "Hello! I'll analyze readmission risk. Let's start!";

pub const BATCH_COMPLETE: &str = "Batch predictions complete! ✅";

pub const CONVERSATION_COMPLETE: &str =
    "Conversation complete. Start a new session for another prediction.";

/// Input placeholder shown while waiting for the named field.
pub fn input_placeholder(field: &str) -> String {
    format!("Please provide **{field}**:")
}

/// Bot acknowledgement after recording a value, asking for the next field.
/// `missing_after` is the schema-ordered list of fields still unfilled once
/// the turn's value has been recorded; it must be non-empty (an empty list
/// means the completion turn, which has its own messages).
pub fn next_field_prompt(missing_after: &[&str]) -> String {
    let target = if missing_after.len() > 1 { missing_after[0] } else { "all remaining inputs" };
    format!("Got it! Now, please provide **{target}**.")
}

/// Completion-turn message for a single-row prediction. Probability is the
/// positive-class probability, rendered as a percentage with two decimals.
pub fn prediction_message(result: &PredictionResult) -> String {
    let percent = format_percent(result.probability);
    match result.label {
        RiskLabel::Readmitted => format!(
            "⚠️ **High readmission risk!** Probability: {percent}.\n\n\
             **Recommended Actions:**\n\
             - Schedule follow-up care 📅\n\
             - Monitor glucose and A1C levels 🩸\n\
             - Provide educational resources 📖"
        ),
        RiskLabel::NotReadmitted => format!(
            "✅ **Low readmission risk.** Probability: {percent}.\n\n\
             🎉 Patient has a low risk of readmission. Maintain current care practices!"
        ),
    }
}

fn format_percent(probability: f64) -> String {
    format!("{:.2}%", probability * 100.0)
}
