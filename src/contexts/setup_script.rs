//! Best-effort translation of a POSIX setup script into a Windows batch file.
//!
//! Each line is classified on its own. Lines that mean the same thing under
//! `cmd.exe` are copied, activation lines are mapped, and everything else is
//! kept as a `NEEDS MANUAL CONVERSION` comment. The output is advisory.

/// File names treated as setup/bootstrap scripts.
pub const SETUP_SCRIPT_NAMES: [&str; 3] = ["setup.sh", "bootstrap.sh", "install.sh"];

pub fn is_setup_script(file_name: &str) -> bool {
    SETUP_SCRIPT_NAMES.contains(&file_name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptLine {
    Blank,
    Comment(String),
    Portable(String),
    Mapped(String),
    Manual(String),
}

const PORTABLE_PREFIXES: [&str; 4] = ["mkdir", "cd", "python", "echo"];

pub fn classify_line(line: &str) -> ScriptLine {
    let line = line.trim();
    if line.is_empty() {
        return ScriptLine::Blank;
    }
    if let Some(comment) = line.strip_prefix('#') {
        return ScriptLine::Comment(comment.to_string());
    }
    if line.contains("pip install")
        || PORTABLE_PREFIXES
            .iter()
            .any(|prefix| starts_with_word(line, prefix))
    {
        return ScriptLine::Portable(line.to_string());
    }
    if let Some(activation) = map_activation(line) {
        return ScriptLine::Mapped(activation);
    }
    ScriptLine::Manual(line.to_string())
}

/// `source venv/bin/activate` / `. venv/bin/activate` → `call venv\Scripts\activate.bat`
fn map_activation(line: &str) -> Option<String> {
    let target = line
        .strip_prefix("source ")
        .or_else(|| line.strip_prefix(". "))?
        .trim();
    let env_dir = target.strip_suffix("/bin/activate")?;
    if env_dir.is_empty() || env_dir.contains(char::is_whitespace) {
        return None;
    }
    Some(format!(
        "call {}\\Scripts\\activate.bat",
        env_dir.replace('/', "\\")
    ))
}

/// `python3 -m venv` matches `python`; `pythonic.sh` does not.
fn starts_with_word(line: &str, prefix: &str) -> bool {
    match line.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with(|c: char| c.is_whitespace() || c.is_ascii_digit()),
        None => false,
    }
}

pub fn translate_to_batch(script: &str, source_name: &str) -> String {
    let mut out = String::from("@echo off\n");
    out.push_str(&format!(":: Generated from {}\n", source_name));
    out.push_str(":: Note: this is a line-by-line conversion and may be incomplete\n\n");

    for line in script.lines() {
        match classify_line(line) {
            ScriptLine::Blank => out.push('\n'),
            ScriptLine::Comment(text) => out.push_str(&format!("::{}\n", text)),
            ScriptLine::Portable(text) | ScriptLine::Mapped(text) => {
                out.push_str(&text);
                out.push('\n');
            }
            ScriptLine::Manual(text) => {
                out.push_str(&format!(":: NEEDS MANUAL CONVERSION: {}\n", text));
            }
        }
    }

    out.push_str("\npause\n");
    out
}
