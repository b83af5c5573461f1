//! C3 — the Risk Classifier. Pure, stateless, no I/O.

use fathom_domain::research::RiskLevel;
use serde_json::Value;

const ESCALATION_SUBSTRINGS: &[&str] = &["/etc/shadow", "api_key", "secret", "credentials", "password"];

/// Static lookup table plus contextual escalation for `read_file`.
/// Unknown tools default to `Irreversible` — the conservative choice.
pub fn classify(tool_name: &str, parameters: &Value) -> RiskLevel {
    match tool_name {
        "web_search" | "search" | "search_memory" | "read_file" | "get_current_time" => {
            if tool_name == "read_file" && path_looks_sensitive(parameters) {
                RiskLevel::ReversibleWithDelay
            } else {
                RiskLevel::Reversible
            }
        }
        "send_email" | "create_calendar_event" | "schedule_task" => RiskLevel::ReversibleWithDelay,
        "delete_file" | "make_purchase" | "send_money" | "modify_production" => RiskLevel::Irreversible,
        _ => RiskLevel::Irreversible,
    }
}

fn path_looks_sensitive(parameters: &Value) -> bool {
    let Some(path) = parameters.get("path").and_then(|v| v.as_str()) else {
        return false;
    };
    let lower = path.to_lowercase();
    ESCALATION_SUBSTRINGS.iter().any(|needle| lower.contains(needle))
}

/// Whether a planned action of the given risk and confidence must go
/// through the approval gate.
pub fn requires_approval(risk: RiskLevel, confidence: f64) -> bool {
    match risk {
        RiskLevel::Irreversible => true,
        RiskLevel::ReversibleWithDelay => confidence < 0.85,
        RiskLevel::Reversible => false,
    }
}
