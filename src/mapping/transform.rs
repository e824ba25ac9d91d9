use serde_json::Value;

/// Named value transforms usable from `func:` rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    SeverityLevel,
    UppercaseState,
    PriorityFromSeverity,
}

impl Transform {
    pub const ALL: [Transform; 3] = [
        Transform::SeverityLevel,
        Transform::UppercaseState,
        Transform::PriorityFromSeverity,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Transform::SeverityLevel => "severity_level",
            Transform::UppercaseState => "uppercase_state",
            Transform::PriorityFromSeverity => "priority_from_severity",
        }
    }

    /// Applies the transform. `None` means the source field was absent or null.
    pub fn apply(self, input: Option<&Value>) -> Value {
        let out = match self {
            Transform::SeverityLevel => {
                let level = match input.and_then(Value::as_f64) {
                    Some(sev) if sev == 5.0 => "CRITICAL",
                    _ => "WARNING",
                };
                level.to_string()
            }
            Transform::UppercaseState => scalar_text(input).to_uppercase(),
            Transform::PriorityFromSeverity => match input {
                None => String::new(),
                Some(v) => format!("PRIORITY_{}", scalar_text(Some(v))),
            },
        };
        Value::String(out)
    }
}

fn scalar_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn severity_level_maps_five_to_critical() {
        let t = Transform::SeverityLevel;
        assert_eq!(t.apply(Some(&json!(5))), json!("CRITICAL"));
        assert_eq!(t.apply(Some(&json!(5.0))), json!("CRITICAL"));
        assert_eq!(t.apply(Some(&json!(10))), json!("WARNING"));
        assert_eq!(t.apply(Some(&json!("5"))), json!("WARNING"));
        assert_eq!(t.apply(None), json!("WARNING"));
    }

    #[test]
    fn uppercase_state_is_total() {
        let t = Transform::UppercaseState;
        assert_eq!(t.apply(Some(&json!("open"))), json!("OPEN"));
        assert_eq!(t.apply(Some(&json!(true))), json!("TRUE"));
        assert_eq!(t.apply(None), json!(""));
    }

    #[test]
    fn priority_label_formats_numbers_without_quotes() {
        let t = Transform::PriorityFromSeverity;
        assert_eq!(t.apply(Some(&json!(10))), json!("PRIORITY_10"));
        assert_eq!(t.apply(Some(&json!("high"))), json!("PRIORITY_high"));
        assert_eq!(t.apply(None), json!(""));
    }

    #[test]
    fn names_round_trip() {
        for t in Transform::ALL {
            assert_eq!(Transform::from_name(t.name()), Some(t));
        }
        assert_eq!(Transform::from_name("doesnotexist"), None);
    }
}
