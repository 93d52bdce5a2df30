//! Mapping from raw chat inputs (slash commands, button callbacks) to the
//! trigger strings declared in the transition graph.

const CALLBACK_ALIASES: &[(&str, &str)] = &[
    ("consult:after_check", "consult:schedule"),
    ("consult:expert_vip", "consult:schedule"),
    ("consult:personal_strategy", "consult:schedule"),
    ("consult:offer", "consult:schedule"),
    ("consult:offer:vip", "consult:schedule"),
    ("consult:offer_payment", "offer:payment"),
    ("contact:quality", "manager:request"),
    ("send:documents", "manager:request"),
    ("strategy:explain", "strategy:discuss"),
    ("strategy:safety", "strategy:path:safety"),
    ("strategy:growth", "strategy:path:growth"),
    ("materials:all_cases", "materials:safety"),
    ("materials:beginners", "materials:safety"),
    ("materials:budget", "materials:safety"),
    ("bonus:get", "bonus:claim"),
    ("retry", "survey:start"),
    ("survey_start", "survey:start"),
    ("payment:crypto_elite", "offer:payment"),
    ("payment:vip_access", "offer:payment"),
    ("offer:course", "offer:payment"),
    ("manager:call", "manager:request"),
];

const TRIGGER_MAP: &[(&str, &str)] = &[
    ("survey:start", "callback:survey:start"),
    ("strategy:discuss", "callback:strategy:discuss"),
    ("strategy:path:safety", "callback:strategy:path:safety"),
    ("strategy:path:growth", "callback:strategy:path:growth"),
    ("consult:schedule", "callback:consult:schedule"),
    ("manager:request", "callback:manager:request"),
    ("offer:payment", "callback:offer:payment"),
    ("bonus:claim", "callback:bonus:claim"),
    ("materials:safety", "callback:strategy:path:safety"),
    ("materials:growth", "callback:strategy:path:growth"),
    ("materials:category:cases", "callback:strategy:path:growth"),
    ("materials:category:educational", "callback:strategy:path:safety"),
    ("products:safety", "callback:consult:schedule"),
    ("products:growth", "callback:consult:schedule"),
];

/// Callback values that are already graph triggers.
pub const PASSTHROUGH_PREFIXES: [&str; 9] = [
    "callback:",
    "cta:",
    "segment:",
    "survey_answer:",
    "payment_status:",
    "objection_",
    "consult_slot",
    "manager_",
    "followup_",
];

pub const SURVEY_ANSWER_TRIGGER: &str = "callback:survey_answer";

fn lookup(table: &'static [(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    table.iter().find(|(from, _)| *from == key).map(|(_, to)| *to)
}

/// `start` and `/start` both become `command:/start`.
pub fn command_trigger(command: &str) -> String {
    let command = command.trim();
    if command.starts_with('/') {
        format!("command:{command}")
    } else {
        format!("command:/{command}")
    }
}

/// Canonical callback value for a raw button payload.
pub fn normalize_callback(raw: &str) -> &str {
    lookup(CALLBACK_ALIASES, raw).unwrap_or(raw)
}

pub fn resolve_callback_trigger(raw: &str) -> Option<String> {
    let canonical = normalize_callback(raw);
    if PASSTHROUGH_PREFIXES.iter().any(|prefix| canonical.starts_with(prefix)) {
        return Some(canonical.to_string());
    }
    if canonical.starts_with("survey:q") {
        return Some(SURVEY_ANSWER_TRIGGER.to_string());
    }
    lookup(TRIGGER_MAP, canonical).map(str::to_string)
}
