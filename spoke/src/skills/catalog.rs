//! The local skill catalog: the live set of skill classes/methods
//! discovered on this device, with search/describe and allow-list rebuild.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use shared::search::filter_all_then_any;
use shared::skill::{AllowList, Skill};
use shared::CoreError;

use super::loader::{self, ModuleSource};

/// A single callable method on a registered skill class. Concrete skills
/// (native Rust, or a bridge stub that forwards into the sandbox) implement
/// this; the catalog itself only tracks metadata and dispatches by name.
pub trait SkillMethod: Send + Sync {
    fn signature(&self) -> String;
    fn docstring(&self) -> Option<String>;
    fn call(
        &self,
        args: Vec<serde_json::Value>,
        kwargs: serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value, String>;
}

/// A discovered skill class: a name plus its callable methods.
pub struct SkillClass {
    pub name: String,
    pub methods: HashMap<String, Arc<dyn SkillMethod>>,
}

impl SkillClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    /// Only methods not starting with `_` are exposed, matching the
    /// documented discovery rule.
    pub fn register(&mut self, method_name: impl Into<String>, method: Arc<dyn SkillMethod>) {
        let method_name = method_name.into();
        if !method_name.starts_with('_') {
            self.methods.insert(method_name, method);
        }
    }
}

/// A method whose signature/docstring came from a textual scan of a
/// discovered module rather than a native Rust binding. Rust cannot host a
/// foreign module's own interpreter in-process the way a same-language host
/// could, so module-sourced skills publish discovery metadata - they show up
/// in `search`/`describe`/the allow-list - but calling one directly surfaces
/// a clear error until a native `SkillMethod` is bound in its place.
struct UnboundMethod {
    signature: String,
    docstring: Option<String>,
}

impl SkillMethod for UnboundMethod {
    fn signature(&self) -> String {
        self.signature.clone()
    }

    fn docstring(&self) -> Option<String> {
        self.docstring.clone()
    }

    fn call(
        &self,
        _args: Vec<serde_json::Value>,
        _kwargs: serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value, String> {
        Err(format!(
            "{} has no native implementation bound; module-sourced skills are discovery-only until bound",
            self.signature
        ))
    }
}

/// The live catalog for this device. Rebuilt wholesale on a (re)scan;
/// readers always see a consistent snapshot via `parking_lot::RwLock`.
pub struct Catalog {
    device_id: String,
    classes: parking_lot::RwLock<HashMap<String, SkillClass>>,
}

impl Catalog {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            classes: parking_lot::RwLock::new(HashMap::new()),
        }
    }

    /// Registers a discovered class, rejecting a duplicate class name
    /// (two modules both declaring e.g. `WeatherSkill`) per the documented
    /// discovery rule: first registration wins, the collision is reported.
    pub fn register_class(&self, class: SkillClass) -> Result<(), CoreError> {
        let mut classes = self.classes.write();
        if classes.contains_key(&class.name) {
            return Err(CoreError::SkillRuntime(format!(
                "duplicate skill class name: {}",
                class.name
            )));
        }
        classes.insert(class.name.clone(), class);
        Ok(())
    }

    pub fn remove_class(&self, class_name: &str) {
        self.classes.write().remove(class_name);
    }

    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }

    /// A flattened snapshot of every method as a `Skill` record, timestamped
    /// now (the local catalog is always fresh; heartbeat staleness only
    /// matters once these are aggregated at the hub).
    pub fn all_skills(&self) -> Vec<Skill> {
        let now = Utc::now();
        self.classes
            .read()
            .values()
            .flat_map(|class| {
                class.methods.iter().map(move |(method_name, method)| Skill {
                    device_id: self.device_id.clone(),
                    class_name: class.name.clone(),
                    method_name: method_name.clone(),
                    signature: method.signature(),
                    docstring: method.docstring(),
                    last_heartbeat: now,
                })
            })
            .collect()
    }

    pub fn allow_list(&self) -> AllowList {
        let skills = self.all_skills();
        AllowList::from_skills(&skills)
    }

    /// Searches class/method name plus docstring text, all-words-then-any.
    pub fn search(&self, query: &str) -> Vec<Skill> {
        let skills = self.all_skills();
        filter_all_then_any(&skills, query, |s| {
            format!("{} {} {}", s.class_name, s.method_name, s.summary())
        })
        .into_iter()
        .cloned()
        .collect()
    }

    /// `def <signature>:` plus docstring, matching the local describe
    /// contract. Returns a plain string for "not found" rather than an
    /// error, the caller (agent tool) surfaces it to the model as text.
    pub fn describe(&self, path: &str) -> String {
        let Some((class_name, method_name)) = path.split_once('.') else {
            return format!("Invalid path format: {path}. Expected Class.method");
        };
        let classes = self.classes.read();
        let Some(class) = classes.get(class_name) else {
            return format!("Function not found: {path}");
        };
        let Some(method) = class.methods.get(method_name) else {
            return format!("Function not found: {path}");
        };

        let signature = method.signature();
        let mut out = format!("def {signature}:");
        if let Some(doc) = method.docstring() {
            out.push('\n');
            out.push_str(doc.trim());
        }
        let call = shared::skill::build_example_call("device", class_name, method_name, &signature);
        out.push_str(&format!("\n\nExample:\n  python_exec(code=\"print({call})\")"));
        out
    }

    pub fn call(
        &self,
        class_name: &str,
        method_name: &str,
        args: Vec<serde_json::Value>,
        kwargs: serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value, CoreError> {
        let classes = self.classes.read();
        let class = classes
            .get(class_name)
            .ok_or_else(|| CoreError::SkillNotFound(format!("{class_name}.{method_name}")))?;
        let method = class
            .methods
            .get(method_name)
            .ok_or_else(|| CoreError::SkillNotFound(format!("{class_name}.{method_name}")))?;
        method
            .call(args, kwargs)
            .map_err(|e| CoreError::SkillRuntime(shared::sanitize::sanitize_skill_error(&e)))
    }

    /// Scans `dir` for skill modules and registers every discovered class.
    /// Modules declaring background discovery are read first so a caller
    /// awaiting their `wait_for_discovery` hook overlaps that wait with
    /// parsing the rest - the documented two-phase load order. A duplicate
    /// class name is logged and skipped rather than failing the whole load.
    /// Returns the number of classes registered.
    pub fn load(&self, dir: &std::path::Path) -> Result<usize, CoreError> {
        let modules = loader::discover_modules(dir).map_err(|e| CoreError::SkillRuntime(e.to_string()))?;
        let (async_first, rest): (Vec<ModuleSource>, Vec<ModuleSource>) =
            modules.into_iter().partition(|m| m.declares_async_discovery);

        let mut loaded = 0;
        for module in async_first.into_iter().chain(rest) {
            loaded += self.load_module(&module);
        }
        Ok(loaded)
    }

    fn load_module(&self, module: &ModuleSource) -> usize {
        let source = match std::fs::read_to_string(&module.entrypoint) {
            Ok(s) => s,
            Err(e) => {
                warn!(module = %module.name, error = %e, "failed to read skill module");
                return 0;
            }
        };

        let mut registered = 0;
        for parsed in loader::parse_classes(&source) {
            let mut class = SkillClass::new(parsed.name.clone());
            for method in parsed.methods {
                class.register(
                    method.name,
                    Arc::new(UnboundMethod {
                        signature: method.signature,
                        docstring: method.docstring,
                    }),
                );
            }
            let class_name = class.name.clone();
            match self.register_class(class) {
                Ok(()) => registered += 1,
                Err(e) => warn!(class = %class_name, error = %e, "skipping duplicate skill class"),
            }
        }
        registered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoMethod;
    impl SkillMethod for EchoMethod {
        fn signature(&self) -> String {
            "echo(text)".into()
        }
        fn docstring(&self) -> Option<String> {
            Some("Echoes the given text.".into())
        }
        fn call(
            &self,
            args: Vec<serde_json::Value>,
            _kwargs: serde_json::Map<String, serde_json::Value>,
        ) -> Result<serde_json::Value, String> {
            Ok(args.into_iter().next().unwrap_or(json!(null)))
        }
    }

    fn sample_catalog() -> Catalog {
        let catalog = Catalog::new("living_room_pc");
        let mut class = SkillClass::new("TimeSkill");
        class.register("echo", Arc::new(EchoMethod));
        class.register("_private", Arc::new(EchoMethod));
        catalog.register_class(class).unwrap();
        catalog
    }

    #[test]
    fn private_methods_are_not_registered() {
        let catalog = sample_catalog();
        let skills = catalog.all_skills();
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].method_name, "echo");
    }

    #[test]
    fn duplicate_class_name_rejected() {
        let catalog = sample_catalog();
        let dup = SkillClass::new("TimeSkill");
        let err = catalog.register_class(dup).unwrap_err();
        assert!(matches!(err, CoreError::SkillRuntime(_)));
    }

    #[test]
    fn describe_reports_invalid_path_format_as_text() {
        let catalog = sample_catalog();
        let out = catalog.describe("not_a_path");
        assert!(out.starts_with("Invalid path format"));
    }

    #[test]
    fn describe_reports_not_found_as_text() {
        let catalog = sample_catalog();
        let out = catalog.describe("TimeSkill.nonexistent");
        assert!(out.starts_with("Function not found"));
    }

    #[test]
    fn describe_existing_includes_signature_and_docstring() {
        let catalog = sample_catalog();
        let out = catalog.describe("TimeSkill.echo");
        assert!(out.contains("def echo(text):"));
        assert!(out.contains("Echoes the given text."));
    }

    #[test]
    fn search_matches_class_name_tokens() {
        let catalog = sample_catalog();
        let results = catalog.search("time");
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn call_invokes_registered_method() {
        let catalog = sample_catalog();
        let result = catalog
            .call("TimeSkill", "echo", vec![json!("hi")], Default::default())
            .unwrap();
        assert_eq!(result, json!("hi"));
    }

    #[test]
    fn call_unknown_method_is_skill_not_found() {
        let catalog = sample_catalog();
        let err = catalog
            .call("TimeSkill", "nope", vec![], Default::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::SkillNotFound(_)));
    }

    #[test]
    fn allow_list_reflects_public_methods_only() {
        let catalog = sample_catalog();
        let allow = catalog.allow_list();
        assert!(allow.is_allowed("TimeSkill.echo"));
        assert!(!allow.is_allowed("TimeSkill._private"));
    }

    #[test]
    fn load_registers_classes_from_discovered_modules() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("time_skill.py"),
            "class TimeSkill:\n    def get_current_time(self, timezone: str = None):\n        \"\"\"Returns the current time.\"\"\"\n        pass\n",
        )
        .unwrap();

        let catalog = Catalog::new("dev1");
        let loaded = catalog.load(dir.path()).unwrap();
        assert_eq!(loaded, 1);
        assert_eq!(catalog.len(), 1);

        let out = catalog.describe("TimeSkill.get_current_time");
        assert!(out.contains("def get_current_time(timezone: str = None):"));
        assert!(out.contains("python_exec(code=\"print(device.TimeSkill.get_current_time(timezone='...'))\")"));
    }

    #[test]
    fn load_skips_duplicate_class_without_failing_the_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "class TimeSkill:\n    def echo(self):\n        pass\n").unwrap();
        std::fs::write(dir.path().join("b.py"), "class TimeSkill:\n    def echo(self):\n        pass\n").unwrap();

        let catalog = Catalog::new("dev1");
        let loaded = catalog.load(dir.path()).unwrap();
        assert_eq!(loaded, 1);
    }

    #[test]
    fn load_on_missing_directory_is_a_no_op() {
        let catalog = Catalog::new("dev1");
        let loaded = catalog.load(std::path::Path::new("/no/such/skills/dir")).unwrap();
        assert_eq!(loaded, 0);
        assert!(catalog.is_empty());
    }

    #[test]
    fn calling_an_unbound_module_sourced_method_is_a_clear_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "class TimeSkill:\n    def echo(self):\n        pass\n").unwrap();

        let catalog = Catalog::new("dev1");
        catalog.load(dir.path()).unwrap();
        let err = catalog.call("TimeSkill", "echo", vec![], Default::default()).unwrap_err();
        assert!(matches!(err, CoreError::SkillRuntime(_)));
    }
}
