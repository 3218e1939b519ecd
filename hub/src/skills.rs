//! The Hub's cross-device skill registry: aggregates every live skill
//! belonging to a user (across all of that user's devices) and answers
//! `search_skills`/`describe_function` the way a single Spoke's local
//! `Catalog` answers them, plus the aggregate-specific behavior from the
//! source this was distilled from (`skill_service.py`): connected-device
//! devices sorted first, an expiry filter applied at the query stage rather
//! than as an afterthought, and ready-to-paste call examples in each result.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;

use shared::search::filter_all_then_any;
use shared::skill::Skill;

use crate::connection::ConnectionManager;
use crate::store::HubStore;

#[derive(Debug, Clone)]
pub struct SkillSearchResult {
    pub class_name: String,
    pub method_name: String,
    pub signature: String,
    pub summary: String,
    /// Devices offering this skill, connected-first then alphabetical,
    /// truncated to the caller's `device_limit`.
    pub devices: Vec<String>,
    pub call_example: String,
    pub python_exec_example: String,
}

pub struct SkillRegistry {
    store: Arc<dyn HubStore>,
    connections: Arc<ConnectionManager>,
    expiry_secs: i64,
}

struct Group {
    signature: String,
    summary: String,
    devices: Vec<String>,
}

impl SkillRegistry {
    pub fn new(store: Arc<dyn HubStore>, connections: Arc<ConnectionManager>, expiry_secs: i64) -> Self {
        Self { store, connections, expiry_secs }
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    fn sort_devices_connected_first(&self, devices: &mut [String]) {
        devices.sort_by(|a, b| {
            let a_key = (!self.connections.is_connected(a), a.clone());
            let b_key = (!self.connections.is_connected(b), b.clone());
            a_key.cmp(&b_key)
        });
    }

    /// Returns deduplicated results grouped by `(class, method, signature)`,
    /// each carrying the devices that offer it. `device_limit` is clamped to
    /// `1..=100` before truncation, and expiry is applied as a query filter
    /// (dead skills never enter the candidate set at all, rather than being
    /// filtered out of an already-assembled result).
    pub async fn search_skills(
        &self,
        user_id: &str,
        query: &str,
        device_limit: usize,
    ) -> Result<Vec<SkillSearchResult>, String> {
        let device_limit = device_limit.clamp(1, 100);
        let now = Utc::now();
        let live: Vec<Skill> = self
            .store
            .skills_for_user(user_id)
            .await?
            .into_iter()
            .filter(|s| s.is_alive(now, self.expiry_secs))
            .collect();

        let matched = filter_all_then_any(&live, query, |s| {
            format!("{} {} {}", s.class_name, s.method_name, s.summary())
        });

        let mut groups: BTreeMap<(String, String), Group> = BTreeMap::new();
        for skill in matched {
            let key = (skill.class_name.clone(), skill.method_name.clone());
            let group = groups.entry(key).or_insert_with(|| Group {
                signature: skill.signature.clone(),
                summary: skill.summary(),
                devices: Vec::new(),
            });
            if !group.devices.contains(&skill.device_id) {
                group.devices.push(skill.device_id.clone());
            }
        }

        let mut results = Vec::with_capacity(groups.len());
        for ((class_name, method_name), mut group) in groups {
            self.sort_devices_connected_first(&mut group.devices);
            group.devices.truncate(device_limit);
            let example_device = group.devices.first().cloned().unwrap_or_else(|| "device".to_string());
            let call_example = format!("devices.{example_device}.{class_name}.{method_name}(...)");
            let python_exec_example = format!("python_exec(code=\"print({call_example})\")");
            results.push(SkillSearchResult {
                class_name,
                method_name,
                signature: group.signature,
                summary: group.summary,
                devices: group.devices,
                call_example,
                python_exec_example,
            });
        }
        Ok(results)
    }

    /// Returns a plain descriptive string, never an error - "not found" and
    /// "bad path" are both valid results the caller hands straight to the
    /// model as tool output.
    pub async fn describe_function(&self, user_id: &str, path: &str) -> Result<String, String> {
        let Some((class_name, method_name)) = path.split_once('.') else {
            return Ok(format!("Invalid path format: {path}. Use 'SkillClass.method_name'"));
        };

        let now = Utc::now();
        let live = self.store.skills_for_user(user_id).await?;
        let mut matches: Vec<&Skill> = live
            .iter()
            .filter(|s| s.class_name == class_name && s.method_name == method_name && s.is_alive(now, self.expiry_secs))
            .collect();
        if matches.is_empty() {
            return Ok(format!("Function not found: {path}"));
        }

        let first = matches[0];
        let mut out = format!("def {}:", first.signature);
        if let Some(doc) = &first.docstring {
            out.push('\n');
            out.push_str(&format!("    \"\"\"{}\"\"\"", doc.trim()));
        }

        let mut device_ids: Vec<String> = matches.drain(..).map(|s| s.device_id.clone()).collect();
        device_ids.dedup();
        self.sort_devices_connected_first(&mut device_ids);

        let receiver = format!(
            "devices.{}",
            device_ids.first().cloned().unwrap_or_else(|| "device".to_string())
        );
        let call = shared::skill::build_example_call(&receiver, class_name, method_name, &first.signature);
        out.push_str(&format!("\n\nExample:\n  python_exec(code=\"print({call})\")"));

        let shown: Vec<&str> = device_ids.iter().take(5).map(String::as_str).collect();
        let more = device_ids.len().saturating_sub(5);
        let suffix = if more > 0 { format!(" (+{more} more)") } else { String::new() };
        out.push_str(&format!("\n# Available on: {}{}", shown.join(", "), suffix));
        Ok(out)
    }
}
