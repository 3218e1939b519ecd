//! Error-message sanitization shared by the gatekeeper and the sandbox
//! executor. Both strip file paths and length-cap the message; each
//! additionally generalizes a detail specific to where the error surfaced.

use once_cell_regexes::{FILE_PATH, LINE_NUMBER, PROXY_FRAME};

const MAX_LEN: usize = 500;

fn truncate(mut s: String) -> String {
    if s.len() > MAX_LEN {
        s.truncate(MAX_LEN);
        s.push_str("...");
    }
    s
}

/// Used by the gatekeeper for skill-execution errors: strips file paths and
/// genericizes line numbers (`line 42` -> `line ?`).
pub fn sanitize_skill_error(error: &str) -> String {
    let s = FILE_PATH.replace_all(error, "File \"<skill>\",");
    let s = LINE_NUMBER.replace_all(&s, "line ?");
    truncate(s.into_owned())
}

/// Used by the sandbox executor for code-execution errors: strips file
/// paths and collapses proxy-internal stack frame references down to a
/// single `in <code>` marker so the guest can't infer host structure.
pub fn sanitize_sandbox_error(error: &str) -> String {
    let s = FILE_PATH.replace_all(error, "File \"<sandbox>\",");
    let s = PROXY_FRAME.replace_all(&s, "in <code>");
    truncate(s.into_owned())
}

mod once_cell_regexes {
    use once_cell::sync::Lazy;
    use regex::Regex;

    pub static FILE_PATH: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"File "[^"]+","#).expect("valid regex"));
    pub static LINE_NUMBER: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"line \d+").expect("valid regex"));
    pub static PROXY_FRAME: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"in <module>|in \w+_proxy").expect("valid regex"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skill_error_strips_path_and_line() {
        let raw = r#"File "/home/user/skills/weather.py", line 42, in get"#;
        let out = sanitize_skill_error(raw);
        assert!(out.contains("File \"<skill>\","));
        assert!(out.contains("line ?"));
        assert!(!out.contains("/home/user"));
    }

    #[test]
    fn sandbox_error_collapses_proxy_frames() {
        let raw = r#"File "/sandbox/host.js", line 7, in device_proxy"#;
        let out = sanitize_sandbox_error(raw);
        assert!(out.contains("File \"<sandbox>\","));
        assert!(out.contains("in <code>"));
    }

    #[test]
    fn caps_length_at_500() {
        let raw = "x".repeat(600);
        let out = sanitize_skill_error(&raw);
        assert_eq!(out.len(), 503);
        assert!(out.ends_with("..."));
    }
}
