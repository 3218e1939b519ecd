//! The `Skill` data model shared between the Spoke's local catalog and the
//! Hub's aggregate store. Fields match the persisted-entity contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named capability exposed by a device.
///
/// Unique key: `(device_id, class_name, method_name)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Skill {
    pub device_id: String,
    pub class_name: String,
    pub method_name: String,
    pub signature: String,
    pub docstring: Option<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub last_heartbeat: DateTime<Utc>,
}

impl Skill {
    /// `"Class.method"`, the allow-list / gatekeeper path for a local
    /// invocation.
    pub fn path(&self) -> String {
        format!("{}.{}", self.class_name, self.method_name)
    }

    /// A skill is alive iff `now - last_heartbeat <= expiry`.
    pub fn is_alive(&self, now: DateTime<Utc>, expiry_secs: i64) -> bool {
        (now - self.last_heartbeat).num_seconds() <= expiry_secs
    }

    /// First line of the docstring, or empty string, used as the search
    /// result summary.
    pub fn summary(&self) -> String {
        self.docstring
            .as_deref()
            .and_then(|d| d.trim().lines().next())
            .unwrap_or("")
            .to_string()
    }
}

/// Builds a ready-to-copy call expression for `receiver.class_name.method_name`,
/// synthesizing one placeholder argument per parameter in `signature`
/// (`"name(params) -> ret"`), derived from each parameter's type hint. A
/// `None` default is replaced by a type-appropriate placeholder rather than
/// echoed literally, since `None` is rarely what a caller actually wants to
/// pass. Ported from the original `build_example_call`/`_placeholder_for_type`
/// helpers.
pub fn build_example_call(receiver: &str, class_name: &str, method_name: &str, signature: &str) -> String {
    let plain = format!("{receiver}.{class_name}.{method_name}()");
    let Some(open) = signature.find('(') else {
        return plain;
    };
    let Some(close_rel) = signature[open + 1..].find(')') else {
        return plain;
    };
    let params_str = signature[open + 1..open + 1 + close_rel].trim();
    if params_str.is_empty() {
        return plain;
    }

    let mut example_args = Vec::new();
    for param in params_str.split(',') {
        let param = param.trim();
        if param.is_empty() || param == "self" || param.starts_with("**") || param == "*" {
            continue;
        }
        let name = param.split(':').next().unwrap_or(param).split('=').next().unwrap_or(param).trim();

        if let Some(idx) = param.rfind('=') {
            let default = param[idx + 1..].trim();
            let value = if default == "None" {
                let type_hint = param
                    .split_once(':')
                    .map(|(_, rest)| rest.split('=').next().unwrap_or("").trim().to_lowercase())
                    .unwrap_or_default();
                placeholder_for_type(&type_hint).to_string()
            } else {
                default.to_string()
            };
            example_args.push(format!("{name}={value}"));
        } else {
            let type_hint = param
                .split_once(':')
                .map(|(_, rest)| rest.trim().to_lowercase())
                .unwrap_or_default();
            example_args.push(format!("{name}={}", placeholder_for_type(&type_hint)));
        }
    }
    format!("{receiver}.{class_name}.{method_name}({})", example_args.join(", "))
}

fn placeholder_for_type(type_hint: &str) -> &'static str {
    if type_hint.is_empty() {
        "..."
    } else if type_hint.contains("str") {
        "'...'"
    } else if type_hint.contains("int") {
        "0"
    } else if type_hint.contains("float") {
        "0.0"
    } else if type_hint.contains("bool") {
        "True"
    } else if type_hint.contains("list") {
        "[]"
    } else if type_hint.contains("dict") {
        "{}"
    } else {
        "..."
    }
}

/// The set of `"Class.method"` strings derived from the live local skill
/// catalog, rebuilt atomically whenever the catalog changes.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    paths: std::collections::HashSet<String>,
}

impl AllowList {
    pub fn from_skills<'a>(skills: impl IntoIterator<Item = &'a Skill>) -> Self {
        Self {
            paths: skills.into_iter().map(Skill::path).collect(),
        }
    }

    pub fn is_allowed(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.paths.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn skill(class: &str, method: &str, age_secs: i64) -> Skill {
        Skill {
            device_id: "dev1".into(),
            class_name: class.into(),
            method_name: method.into(),
            signature: format!("{method}()"),
            docstring: Some("Does a thing.\nMore detail.".into()),
            last_heartbeat: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[test]
    fn path_formats_class_dot_method() {
        assert_eq!(skill("TimeSkill", "get_current_time", 0).path(), "TimeSkill.get_current_time");
    }

    #[test]
    fn is_alive_respects_expiry() {
        let fresh = skill("A", "b", 5);
        let stale = skill("A", "b", 500);
        assert!(fresh.is_alive(Utc::now(), 60));
        assert!(!stale.is_alive(Utc::now(), 60));
    }

    #[test]
    fn allow_list_reflects_live_skills_only() {
        let skills = vec![skill("TimeSkill", "get_current_time", 0)];
        let allow = AllowList::from_skills(&skills);
        assert!(allow.is_allowed("TimeSkill.get_current_time"));
        assert!(!allow.is_allowed("TimeSkill.other"));
    }

    #[test]
    fn summary_takes_first_docstring_line() {
        assert_eq!(skill("A", "b", 0).summary(), "Does a thing.");
    }

    #[test]
    fn build_example_call_synthesizes_typed_placeholders() {
        let call = build_example_call("device", "CalcSkill", "add", "add(a: int, b: int) -> int");
        assert_eq!(call, "device.CalcSkill.add(a=0, b=0)");
    }

    #[test]
    fn build_example_call_replaces_none_default_with_type_placeholder() {
        let call = build_example_call("device", "WeatherSkill", "get", "get(city: str = None)");
        assert_eq!(call, "device.WeatherSkill.get(city='...')");
    }

    #[test]
    fn build_example_call_keeps_non_none_default_verbatim() {
        let call = build_example_call("device", "TimerSkill", "set", "set(minutes: int = 5)");
        assert_eq!(call, "device.TimerSkill.set(minutes=5)");
    }

    #[test]
    fn build_example_call_skips_self_and_kwargs() {
        let call = build_example_call("device", "TimeSkill", "echo", "echo(self, text: str, **kwargs)");
        assert_eq!(call, "device.TimeSkill.echo(text='...')");
    }

    #[test]
    fn build_example_call_with_no_params_is_bare_call() {
        let call = build_example_call("device", "TimeSkill", "now", "now()");
        assert_eq!(call, "device.TimeSkill.now()");
    }
}
