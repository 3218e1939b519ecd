//! System prompt generation for the agent loop, grounded in the same catalog
//! data `crate::skills::SkillRegistry` already assembles. Below
//! `prompt_embed_threshold` live skills, the prompt inlines a compact
//! catalog; above it, the prompt tells the model to call `search_skills`
//! instead of listing everything.

use crate::skills::SkillSearchResult;

/// Builds the Hub-connected system prompt (the Hub only ever runs in this
/// mode: it has no local skills of its own, only aggregated remote ones).
pub fn hub_system_prompt(
    total_skills: usize,
    embed_threshold: usize,
    connected_devices: &[String],
    catalog: &[SkillSearchResult],
) -> String {
    let mut out = String::new();
    out.push_str(
        "You control a set of connected devices. Use search_skills(query) and \
         describe_function(path) to discover what a device can do, and \
         python_exec(code) to act: inside it, call \
         devices.<device_name>.<SkillClass>.<method>(...) to invoke a skill on a \
         specific device.\n\n",
    );

    if connected_devices.is_empty() {
        out.push_str("No devices are currently connected.\n\n");
    } else {
        out.push_str("Connected devices:\n");
        for device in connected_devices {
            out.push_str(&format!("- devices.{device}\n"));
        }
        out.push('\n');
    }

    if total_skills == 0 {
        out.push_str("No skills are registered yet.\n");
    } else if total_skills <= embed_threshold {
        out.push_str("Available skills:\n");
        for skill in catalog {
            out.push_str(&format!(
                "- {}.{}{} -- {}\n",
                skill.class_name,
                skill.method_name,
                skill_args_suffix(&skill.signature),
                skill.summary,
            ));
        }
    } else {
        out.push_str(&format!(
            "{total_skills} skills are registered across your devices, too many to \
             list here. Call search_skills(query) to find the one you need before \
             invoking it.\n"
        ));
    }

    out
}

fn skill_args_suffix(signature: &str) -> String {
    match signature.find('(') {
        Some(idx) => signature[idx..].to_string(),
        None => "()".to_string(),
    }
}

/// A one-line notice inserted into the session the first time it crosses
/// into Hub-connected mode, so the model learns the `devices.*` syntax
/// without losing conversational context. Mirrored for the opposite
/// transition in case a session ever drops back to local-only.
pub fn mode_switch_notice(entering_hub_mode: bool) -> &'static str {
    if entering_hub_mode {
        "A Hub is now available. Use devices.<device_name>.<Skill>.<method>(...) \
         instead of device.<Skill>.<method>(...) to reach skills on other devices."
    } else {
        "The Hub connection was lost. Use device.<Skill>.<method>(...) for this \
         device's own skills only."
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(class: &str, method: &str) -> SkillSearchResult {
        SkillSearchResult {
            class_name: class.into(),
            method_name: method.into(),
            signature: format!("{method}(city: str)"),
            summary: "Does a thing.".into(),
            devices: vec!["kitchen".into()],
            call_example: format!("devices.kitchen.{class}.{method}(...)"),
            python_exec_example: "python_exec(code=\"...\")".into(),
        }
    }

    #[test]
    fn embeds_catalog_under_threshold() {
        let catalog = vec![result("WeatherSkill", "get_current_weather")];
        let prompt = hub_system_prompt(1, 40, &["kitchen".into()], &catalog);
        assert!(prompt.contains("WeatherSkill.get_current_weather(city: str)"));
        assert!(prompt.contains("devices.kitchen"));
    }

    #[test]
    fn directs_to_search_above_threshold() {
        let prompt = hub_system_prompt(41, 40, &[], &[]);
        assert!(prompt.contains("search_skills"));
        assert!(!prompt.contains("Available skills:"));
    }

    #[test]
    fn notice_text_differs_by_direction() {
        assert!(mode_switch_notice(true).contains("devices."));
        assert!(mode_switch_notice(false).contains("device."));
    }
}
