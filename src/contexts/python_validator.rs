//! Structural checks for generated Python sources: a syntax check with the
//! tree-sitter Python grammar, then an import check against the standard
//! library, the project's `requirements.txt`, and the project layout.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use tree_sitter::{Node, Parser, Tree};

use crate::data::ValidationResult;

/// Top-level modules of the CPython 3 standard library.
const STDLIB_MODULES: &[&str] = &[
    "abc", "argparse", "array", "ast", "asyncio", "atexit", "base64", "binascii", "bisect",
    "builtins", "bz2", "calendar", "cmath", "cmd", "codecs", "collections", "colorsys",
    "concurrent", "configparser", "contextlib", "contextvars", "copy", "copyreg", "cProfile",
    "csv", "ctypes", "dataclasses", "datetime", "dbm", "decimal", "difflib", "dis", "doctest",
    "email", "encodings", "enum", "errno", "faulthandler", "fcntl", "filecmp", "fileinput",
    "fnmatch", "fractions", "ftplib", "functools", "gc", "getopt", "getpass", "gettext", "glob",
    "graphlib", "grp", "gzip", "hashlib", "heapq", "hmac", "html", "http", "imaplib",
    "importlib", "inspect", "io", "ipaddress", "itertools", "json", "keyword", "linecache",
    "locale", "logging", "lzma", "mailbox", "marshal", "math", "mimetypes", "mmap",
    "multiprocessing", "netrc", "numbers", "operator", "os", "pathlib", "pdb", "pickle",
    "pkgutil", "platform", "plistlib", "poplib", "posixpath", "pprint", "profile", "pstats",
    "pty", "pwd", "py_compile", "queue", "quopri", "random", "re", "readline", "reprlib",
    "resource", "rlcompleter", "runpy", "sched", "secrets", "select", "selectors", "shelve",
    "shlex", "shutil", "signal", "site", "smtplib", "socket", "socketserver", "sqlite3", "ssl",
    "stat", "statistics", "string", "stringprep", "struct", "subprocess", "symtable", "sys",
    "sysconfig", "syslog", "tabnanny", "tarfile", "tempfile", "termios", "textwrap",
    "threading", "time", "timeit", "tkinter", "token", "tokenize", "tomllib", "trace",
    "traceback", "tracemalloc", "tty", "turtle", "types", "typing", "unicodedata", "unittest",
    "urllib", "uuid", "venv", "warnings", "wave", "weakref", "webbrowser", "winreg", "wsgiref",
    "xml", "xmlrpc", "zipapp", "zipfile", "zipimport", "zlib", "zoneinfo",
];

/// Distribution names whose import name differs from the normalized name.
const DISTRIBUTION_MODULES: &[(&str, &[&str])] = &[
    ("python_dotenv", &["dotenv"]),
    ("psycopg2_binary", &["psycopg2"]),
    ("pyjwt", &["jwt"]),
    ("python_jose", &["jose"]),
    ("python_multipart", &["multipart"]),
    ("beautifulsoup4", &["bs4"]),
    ("pyyaml", &["yaml"]),
    ("pillow", &["pil"]),
    ("scikit_learn", &["sklearn"]),
    ("opencv_python", &["cv2"]),
    ("fastapi", &["fastapi", "starlette", "pydantic"]),
    ("flask", &["flask", "werkzeug", "jinja2"]),
];

/// Python 2 statements the grammar still parses.
const LEGACY_STATEMENTS: &[(&str, &str)] = &[("print_statement", "print"), ("exec_statement", "exec")];

/// Clauses that must line up with the statement they belong to.
const ALIGNED_CLAUSES: &[&str] = &[
    "elif_clause",
    "else_clause",
    "except_clause",
    "except_group_clause",
    "finally_clause",
];

/// An `import` found in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    /// First segment of the dotted module path.
    pub top_level: String,
    /// 1-based source line.
    pub line: usize,
}

fn parse(code: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(&tree_sitter_python::LANGUAGE.into()) {
        tracing::error!(error = %e, "python grammar could not be loaded");
        return None;
    }
    parser.parse(code, None)
}

/// Parses `code` and reports the first syntax error, if any.
pub fn check_syntax(code: &str) -> ValidationResult {
    let Some(tree) = parse(code) else {
        return ValidationResult::syntax_error("source could not be parsed");
    };
    let root = tree.root_node();
    if let Some(node) = first_error(root) {
        return ValidationResult::syntax_error(describe_error(node, code));
    }
    match first_legacy_statement(root).or_else(|| first_bad_indent(root, code.as_bytes())) {
        Some(message) => ValidationResult::syntax_error(message),
        None => ValidationResult::valid(),
    }
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

fn first_legacy_statement(node: Node<'_>) -> Option<String> {
    if let Some((_, keyword)) = LEGACY_STATEMENTS.iter().find(|(kind, _)| *kind == node.kind()) {
        return Some(format!(
            "Missing parentheses in call to '{}' at line {}",
            keyword,
            node.start_position().row + 1
        ));
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
    children.into_iter().find_map(first_legacy_statement)
}

/// True when only spaces or tabs precede `node` on its line.
fn starts_line(node: Node<'_>, source: &[u8]) -> bool {
    let Some(before) = source.get(..node.start_byte()) else {
        return false;
    };
    let line_start = before.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
    before[line_start..].iter().all(|b| *b == b' ' || *b == b'\t')
}

/// The grammar's indentation scanner accepts a dedent to a column that no
/// enclosing block uses. Statements of one block must share a column, and
/// `elif`/`else`/`except`/`finally` must sit at their statement's column.
fn first_bad_indent(node: Node<'_>, source: &[u8]) -> Option<String> {
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node
        .named_children(&mut cursor)
        .filter(|child| !matches!(child.kind(), "comment" | "line_continuation"))
        .collect();

    if matches!(node.kind(), "module" | "block") {
        let mut level = (node.kind() == "module").then_some(0);
        let mut previous: Option<Node<'_>> = None;
        for child in children.iter().copied().filter(|c| starts_line(*c, source)) {
            let pos = child.start_position();
            match level {
                None => level = Some(pos.column),
                Some(expected) if pos.column == expected => {}
                Some(expected) => {
                    let after_nested = previous
                        .is_some_and(|p| p.end_position().row > p.start_position().row);
                    let message = if pos.column < expected || after_nested {
                        "unindent does not match any outer indentation level"
                    } else {
                        "unexpected indent"
                    };
                    return Some(format!("{} at line {}", message, pos.row + 1));
                }
            }
            previous = Some(child);
        }
    }

    if ALIGNED_CLAUSES.contains(&node.kind()) && starts_line(node, source) {
        let misaligned = node
            .parent()
            .filter(|parent| starts_line(*parent, source))
            .is_some_and(|parent| parent.start_position().column != node.start_position().column);
        if misaligned {
            return Some(format!(
                "unindent does not match any outer indentation level at line {}",
                node.start_position().row + 1
            ));
        }
    }

    children
        .into_iter()
        .find_map(|child| first_bad_indent(child, source))
}

fn describe_error(node: Node<'_>, code: &str) -> String {
    let pos = node.start_position();
    let (line, column) = (pos.row + 1, pos.column + 1);
    if node.is_missing() {
        return format!("missing '{}' at line {}, column {}", node.kind(), line, column);
    }
    let snippet = node
        .utf8_text(code.as_bytes())
        .ok()
        .and_then(|text| text.lines().next())
        .map(str::trim)
        .unwrap_or_default();
    if snippet.is_empty() {
        format!("invalid syntax at line {}, column {}", line, column)
    } else {
        format!(
            "invalid syntax at line {}, column {} near '{}'",
            line, column, snippet
        )
    }
}

/// Absolute imports in `code`. Relative and `__future__` imports are skipped.
pub fn collect_imports(code: &str) -> Vec<ImportRef> {
    let Some(tree) = parse(code) else {
        return Vec::new();
    };
    let mut imports = Vec::new();
    collect_from(tree.root_node(), code.as_bytes(), &mut imports);
    imports
}

fn collect_from(node: Node<'_>, source: &[u8], out: &mut Vec<ImportRef>) {
    match node.kind() {
        "import_statement" => {
            let mut cursor = node.walk();
            for name in node.children_by_field_name("name", &mut cursor) {
                let dotted = if name.kind() == "aliased_import" {
                    name.child_by_field_name("name")
                } else {
                    Some(name)
                };
                if let Some(import) = dotted.and_then(|n| import_ref(n, source)) {
                    out.push(import);
                }
            }
        }
        "import_from_statement" => {
            let import = node
                .child_by_field_name("module_name")
                .filter(|module| module.kind() == "dotted_name")
                .and_then(|module| import_ref(module, source));
            out.extend(import);
        }
        "future_import_statement" => {}
        _ => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                collect_from(child, source, out);
            }
        }
    }
}

fn import_ref(dotted: Node<'_>, source: &[u8]) -> Option<ImportRef> {
    let text = dotted.utf8_text(source).ok()?;
    let top_level = text.split('.').next()?.trim();
    if top_level.is_empty() {
        return None;
    }
    Some(ImportRef {
        top_level: top_level.to_string(),
        line: dotted.start_position().row + 1,
    })
}

/// Lowercased, `_`-separated form used to compare distributions and modules.
fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace(['-', '.'], "_")
}

/// Import names provided by the packages listed in `requirements`.
pub fn requirement_modules(requirements: &str) -> BTreeSet<String> {
    let mut modules = BTreeSet::new();
    for line in requirements.lines() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() || line.starts_with('-') {
            continue;
        }
        let end = line
            .find(|c: char| "[<>=!~;@ \t".contains(c))
            .unwrap_or(line.len());
        let distribution = normalize(&line[..end]);
        if distribution.is_empty() {
            continue;
        }
        match DISTRIBUTION_MODULES
            .iter()
            .find(|(name, _)| *name == distribution)
        {
            Some((_, provided)) => modules.extend(provided.iter().map(|m| m.to_string())),
            None => {
                modules.insert(distribution);
            }
        }
    }
    modules
}

fn is_stdlib(module: &str) -> bool {
    STDLIB_MODULES.contains(&module)
}

fn is_local(module: &str, dir: &Path) -> bool {
    dir.join(module).is_dir() || dir.join(format!("{}.py", module)).is_file()
}

/// Checks that every import in `code` resolves.
///
/// `file` is the source's location and is used so sibling modules of a
/// script resolve the way they do when the script is run directly.
pub fn check_imports(code: &str, file: &Path, project_root: &Path) -> ValidationResult {
    let requirements = fs::read_to_string(project_root.join("requirements.txt"))
        .map(|text| requirement_modules(&text))
        .unwrap_or_default();
    let file_dir = file.parent().map(|parent| {
        if parent.is_absolute() {
            parent.to_path_buf()
        } else {
            project_root.join(parent)
        }
    });

    let mut missing: Vec<String> = Vec::new();
    for import in collect_imports(code) {
        let module = import.top_level.as_str();
        let resolved = is_stdlib(module)
            || requirements.contains(&normalize(module))
            || is_local(module, project_root)
            || file_dir.as_deref().is_some_and(|dir| is_local(module, dir));
        if !resolved && !missing.iter().any(|m| m == module) {
            missing.push(module.to_string());
        }
    }

    if missing.is_empty() {
        ValidationResult::valid()
    } else {
        ValidationResult::unresolved_import(format!("Missing imports: {}", missing.join(", ")))
    }
}

/// Syntax check, then import check.
pub fn validate(code: &str, file: &Path, project_root: &Path) -> ValidationResult {
    let syntax = check_syntax(code);
    if !syntax.is_valid {
        return syntax;
    }
    check_imports(code, file, project_root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ErrorKind;

    #[test]
    fn test_valid_syntax() {
        let code = "import os\n\ndef main():\n    return os.getcwd()\n";
        assert!(check_syntax(code).is_valid);
    }

    #[test]
    fn test_syntax_error_reports_location() {
        let result = check_syntax("def broken(:\n    pass\n");
        assert!(!result.is_valid);
        assert_eq!(result.error_kind, ErrorKind::SyntaxError);
        assert!(result.message.unwrap().contains("line 1"));
    }

    #[test]
    fn test_python2_statements_rejected() {
        let print = check_syntax("print \"hello\"\n");
        assert_eq!(print.error_kind, ErrorKind::SyntaxError);
        assert_eq!(
            print.message.as_deref(),
            Some("Missing parentheses in call to 'print' at line 1")
        );

        let exec = check_syntax("x = 0\nexec \"x = 1\"\n");
        assert_eq!(exec.error_kind, ErrorKind::SyntaxError);
        assert!(exec.message.unwrap().contains("'exec' at line 2"));

        assert!(check_syntax("print(\"hello\")\nexec(\"x = 1\")\n").is_valid);
    }

    #[test]
    fn test_inconsistent_dedent_rejected() {
        let result = check_syntax("def f():\n        x = 1\n    y = 2\n");
        assert_eq!(result.error_kind, ErrorKind::SyntaxError);
        assert!(
            result
                .message
                .unwrap()
                .starts_with("unindent does not match any outer indentation level")
        );

        let nested = check_syntax("class A:\n    def f(self):\n            return 1\n        x = 2\n");
        assert!(!nested.is_valid);
    }

    #[test]
    fn test_consistent_indentation_accepted() {
        let code = "\
import os

class A:
    # comment
        # odd comment
    def f(self, items):
        total = sum(
                x for x in items
        )
        if total: return total
        try:
            os.remove('x')
        except OSError:
            pass
        else:
            pass
        finally:
            total = 0
        return total
";
        let result = check_syntax(code);
        assert!(result.is_valid, "{:?}", result.message);
    }

    #[test]
    fn test_collect_imports() {
        let code = "\
from __future__ import annotations
import os, sys as system
import app.models.user
from fastapi import FastAPI
from . import routes
from .db import session

def lazy():
    import requests
";
        let names: Vec<String> = collect_imports(code)
            .into_iter()
            .map(|i| i.top_level)
            .collect();
        assert_eq!(names, vec!["os", "sys", "app", "fastapi", "requests"]);
    }

    #[test]
    fn test_requirement_modules() {
        let modules = requirement_modules(
            "# deps\nfastapi==0.110\nuvicorn[standard]>=0.29\npython-dotenv\nSQLAlchemy~=2.0\n-r dev.txt\n",
        );
        assert!(modules.contains("fastapi"));
        assert!(modules.contains("pydantic"));
        assert!(modules.contains("uvicorn"));
        assert!(modules.contains("dotenv"));
        assert!(modules.contains("sqlalchemy"));
        assert!(!modules.contains("python_dotenv"));
    }

    #[test]
    fn test_imports_resolve_against_project() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::write(root.join("requirements.txt"), "fastapi\nSQLAlchemy\n").unwrap();
        fs::create_dir_all(root.join("app")).unwrap();
        fs::write(root.join("config.py"), "DEBUG = True\n").unwrap();

        let code = "import json\nfrom fastapi import FastAPI\nfrom sqlalchemy import Column\nfrom app import models\nimport config\n";
        let result = validate(code, Path::new("app/main.py"), root);
        assert!(result.is_valid, "{:?}", result.message);
    }

    #[test]
    fn test_sibling_module_resolves() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("app")).unwrap();
        fs::write(root.join("app/database.py"), "").unwrap();

        let result = check_imports("import database\n", Path::new("app/main.py"), root);
        assert!(result.is_valid);
    }

    #[test]
    fn test_unresolved_imports_listed_once() {
        let tmp = tempfile::tempdir().unwrap();
        let code = "import foo\nimport foo.bar\nfrom baz import qux\nimport os\n";
        let result = check_imports(code, Path::new("main.py"), tmp.path());
        assert_eq!(result.error_kind, ErrorKind::UnresolvedImport);
        assert_eq!(result.message.as_deref(), Some("Missing imports: foo, baz"));
    }

    #[test]
    fn test_syntax_checked_before_imports() {
        let tmp = tempfile::tempdir().unwrap();
        let result = validate("import nowhere\nif True print(1)\n", Path::new("x.py"), tmp.path());
        assert_eq!(result.error_kind, ErrorKind::SyntaxError);
    }
}
