//! Skill-module loading protocol: a scanned directory may contain
//! either loose source files or subdirectories ("repos"); for subdirectories
//! the entrypoint is the first existing of `skill`, `<dirname>`, `main`,
//! `__init__` (with the module's source extension).

use std::path::{Path, PathBuf};

/// One discovered module, ready to be imported by the catalog. `entrypoint`
/// is the file that declares the skill class(es); `declares_async_discovery`
/// is set when the lightweight textual marker is present on first read.
#[derive(Debug, Clone)]
pub struct ModuleSource {
    pub name: String,
    pub entrypoint: PathBuf,
    pub declares_async_discovery: bool,
}

const ENTRYPOINT_CANDIDATES: &[&str] = &["skill", "main", "__init__"];
/// Lightweight textual marker: a module that performs background discovery
/// declares a `wait_for_discovery` hook near the top of its entrypoint.
const ASYNC_DISCOVERY_MARKER: &str = "wait_for_discovery";

const SOURCE_EXT: &str = "py";

/// Scans `dir` for skill modules: loose source files and subdirectories.
/// Does not recurse past one level, matching the documented protocol.
pub fn discover_modules(dir: &Path) -> std::io::Result<Vec<ModuleSource>> {
    let mut modules = Vec::new();
    if !dir.is_dir() {
        return Ok(modules);
    }

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_file() {
            if path.extension().and_then(|e| e.to_str()) == Some(SOURCE_EXT) {
                let name = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string();
                let marker = reads_marker(&path);
                modules.push(ModuleSource {
                    name,
                    entrypoint: path,
                    declares_async_discovery: marker,
                });
            }
        } else if file_type.is_dir() {
            if let Some(entrypoint) = resolve_repo_entrypoint(&path) {
                let name = path
                    .file_name()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string();
                let marker = reads_marker(&entrypoint);
                modules.push(ModuleSource {
                    name,
                    entrypoint,
                    declares_async_discovery: marker,
                });
            }
        }
    }

    modules.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(modules)
}

/// First existing of `skill`, `<dirname>`, `main`, `__init__` inside a
/// directory-packaged skill.
fn resolve_repo_entrypoint(repo_dir: &Path) -> Option<PathBuf> {
    let dir_name = repo_dir.file_name()?.to_str()?;
    let mut candidates: Vec<String> = vec![ENTRYPOINT_CANDIDATES[0].to_string(), dir_name.to_string()];
    candidates.extend(ENTRYPOINT_CANDIDATES[1..].iter().map(|s| s.to_string()));

    for candidate in candidates {
        let candidate_path = repo_dir.join(format!("{candidate}.{SOURCE_EXT}"));
        if candidate_path.is_file() {
            return Some(candidate_path);
        }
    }
    None
}

fn reads_marker(path: &Path) -> bool {
    std::fs::read_to_string(path)
        .map(|content| content.contains(ASYNC_DISCOVERY_MARKER))
        .unwrap_or(false)
}

/// A method signature and docstring recovered by a textual scan of a
/// module's source - not a real parser, just enough of one to recover the
/// public surface the catalog needs to record.
#[derive(Debug, Clone)]
pub struct ParsedMethod {
    pub name: String,
    pub signature: String,
    pub docstring: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ParsedClass {
    pub name: String,
    pub methods: Vec<ParsedMethod>,
}

/// Scans `source` for top-level `class Foo:`/`class Foo(Base):` blocks
/// whose name ends in `Skill` (the documented discovery rule), then for
/// each, the `def` lines in its body. Not indentation-robust beyond a
/// single level - good enough for the straight-line skill modules this
/// protocol targets.
pub fn parse_classes(source: &str) -> Vec<ParsedClass> {
    let lines: Vec<&str> = source.lines().collect();
    let mut classes = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();
        if indent == 0 {
            if let Some(rest) = trimmed.strip_prefix("class ") {
                let name = rest
                    .split(|c: char| c == '(' || c == ':')
                    .next()
                    .unwrap_or("")
                    .trim()
                    .to_string();
                if name.ends_with("Skill") {
                    let (methods, next_i) = parse_class_body(&lines, i + 1);
                    classes.push(ParsedClass { name, methods });
                    i = next_i;
                    continue;
                }
            }
        }
        i += 1;
    }
    classes
}

/// Parses `def` lines from `start` until a line dedents back to column 0,
/// which marks the end of the class body.
fn parse_class_body(lines: &[&str], start: usize) -> (Vec<ParsedMethod>, usize) {
    let mut methods = Vec::new();
    let mut i = start;
    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();
        if !trimmed.is_empty() && indent == 0 {
            break;
        }
        if let Some(rest) = trimmed.strip_prefix("def ") {
            if let Some(paren) = rest.find('(') {
                let name = rest[..paren].trim().to_string();
                if let Some(close) = rest[paren..].find(')') {
                    let params = strip_self(&rest[paren + 1..paren + close]);
                    let signature = format!("{name}({params})");
                    let docstring = find_docstring(lines, i + 1);
                    methods.push(ParsedMethod { name, signature, docstring });
                }
            }
        }
        i += 1;
    }
    (methods, i)
}

fn strip_self(params: &str) -> String {
    params
        .split(',')
        .map(str::trim)
        .filter(|p| *p != "self" && !p.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A triple-quoted docstring starting on the line right after a `def`,
/// single- or multi-line.
fn find_docstring(lines: &[&str], start: usize) -> Option<String> {
    let line = lines.get(start)?.trim();
    for quote in ["\"\"\"", "'''"] {
        if let Some(rest) = line.strip_prefix(quote) {
            if let Some(end) = rest.find(quote) {
                return Some(rest[..end].trim().to_string());
            }
            let mut doc = rest.to_string();
            let mut i = start + 1;
            while i < lines.len() {
                if let Some(end) = lines[i].find(quote) {
                    doc.push('\n');
                    doc.push_str(lines[i][..end].trim());
                    return Some(doc.trim().to_string());
                }
                doc.push('\n');
                doc.push_str(lines[i]);
                i += 1;
            }
            return Some(doc.trim().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn discovers_loose_file_skill() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("time_skill.py"), "class TimeSkill: pass").unwrap();
        let modules = discover_modules(dir.path()).unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].name, "time_skill");
        assert!(!modules[0].declares_async_discovery);
    }

    #[test]
    fn resolves_repo_entrypoint_by_first_match() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("weather_repo");
        std::fs::create_dir(&repo).unwrap();
        std::fs::write(repo.join("main.py"), "class WeatherSkill: pass").unwrap();
        std::fs::write(repo.join("helpers.py"), "# not an entrypoint").unwrap();

        let modules = discover_modules(dir.path()).unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].entrypoint.file_name().unwrap(), "main.py");
    }

    #[test]
    fn prefers_skill_py_over_dirname_and_main() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("anything");
        std::fs::create_dir(&repo).unwrap();
        std::fs::write(repo.join("main.py"), "").unwrap();
        std::fs::write(repo.join("skill.py"), "").unwrap();

        let modules = discover_modules(dir.path()).unwrap();
        assert_eq!(modules[0].entrypoint.file_name().unwrap(), "skill.py");
    }

    #[test]
    fn detects_async_discovery_marker() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("hass.py"),
            "async def wait_for_discovery(): pass",
        )
        .unwrap();
        let modules = discover_modules(dir.path()).unwrap();
        assert!(modules[0].declares_async_discovery);
    }

    #[test]
    fn directory_with_no_entrypoint_is_skipped() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("not_a_skill");
        std::fs::create_dir(&repo).unwrap();
        std::fs::write(repo.join("readme.py"), "").unwrap();

        let modules = discover_modules(dir.path()).unwrap();
        assert!(modules.is_empty());
    }

    #[test]
    fn parse_classes_finds_skill_suffixed_class_only() {
        let source = "class Helper:\n    def ignored(self):\n        pass\n\nclass TimeSkill:\n    def now(self):\n        pass\n";
        let classes = parse_classes(source);
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].name, "TimeSkill");
    }

    #[test]
    fn parse_classes_strips_self_and_records_signature() {
        let source = "class CalcSkill:\n    def add(self, a: int, b: int) -> int:\n        pass\n";
        let classes = parse_classes(source);
        assert_eq!(classes[0].methods[0].signature, "add(a: int, b: int)");
    }

    #[test]
    fn parse_classes_captures_single_line_docstring() {
        let source = "class TimeSkill:\n    def now(self):\n        \"\"\"Returns the current time.\"\"\"\n        pass\n";
        let classes = parse_classes(source);
        assert_eq!(classes[0].methods[0].docstring.as_deref(), Some("Returns the current time."));
    }

    #[test]
    fn parse_classes_captures_multi_line_docstring() {
        let source = "class TimeSkill:\n    def now(self):\n        \"\"\"\n        Returns the current time.\n        \"\"\"\n        pass\n";
        let classes = parse_classes(source);
        let doc = classes[0].methods[0].docstring.as_deref().unwrap();
        assert!(doc.contains("Returns the current time."));
    }

    #[test]
    fn parse_classes_skips_private_helper_def() {
        let source = "class TimeSkill:\n    def _internal(self):\n        pass\n    def now(self):\n        pass\n";
        let classes = parse_classes(source);
        assert_eq!(classes[0].methods.len(), 2, "parsing itself doesn't filter privacy - the catalog does");
    }
}
