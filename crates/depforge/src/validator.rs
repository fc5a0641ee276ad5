//! Import extraction and allow-set validation (C4).
//!
//! Modeled as an immutable value holding the allow-set plus pure functions
//! over it: "rebuild after install" constructs a new `Validator`, it never
//! mutates one in place.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use depforge_types::{Specifier, ValidationReport};

use crate::substitutes;

/// Runtime-builtin module names, recognised bare (no `node:` prefix) or
/// with it. Never surfaced as missing.
const NODE_BUILTINS: &[&str] = &[
    "assert", "buffer", "child_process", "cluster", "crypto", "dgram", "dns", "domain", "events",
    "fs", "http", "http2", "https", "net", "os", "path", "perf_hooks", "process", "punycode",
    "querystring", "readline", "stream", "string_decoder", "timers", "tls", "trace_events", "tty",
    "url", "util", "v8", "vm", "worker_threads", "zlib", "inspector", "async_hooks", "module",
    "repl", "wasi",
];

fn import_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?:import\s+(?:[\w*\s{},]+\s+from\s+)?|import\s*\(\s*|require\s*\(\s*)["']([^"'\s]+)["']"#,
        )
        .expect("import pattern compiles")
    })
}

fn block_comment_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").expect("block comment pattern compiles"))
}

fn line_comment_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"//[^\n]*").expect("line comment pattern compiles"))
}

/// Strip block and line comments from source text before scanning for
/// import specifiers.
fn strip_comments(source: &str) -> String {
    let without_block = block_comment_pattern().replace_all(source, "");
    line_comment_pattern().replace_all(&without_block, "").into_owned()
}

/// Canonicalise a raw specifier string into a package-name `Specifier`, or
/// `None` if it is relative, builtin-prefixed, or a bare runtime builtin.
pub fn canonicalize(raw: &str) -> Option<Specifier> {
    if raw.starts_with('.') || raw.starts_with('/') {
        return None; // relative import
    }
    if let Some(rest) = raw.strip_prefix("node:") {
        let _ = rest;
        return None; // explicit builtin prefix
    }

    if let Some(rest) = raw.strip_prefix('@') {
        let mut segments = rest.splitn(2, '/');
        let scope = segments.next().unwrap_or_default();
        let name = segments.next().and_then(|s| s.split('/').next()).unwrap_or_default();
        if scope.is_empty() || name.is_empty() {
            return None;
        }
        return Some(Specifier::Scoped {
            scope: scope.to_string(),
            name: name.to_string(),
        });
    }

    let name = raw.split('/').next().unwrap_or(raw);
    if name.is_empty() || NODE_BUILTINS.contains(&name) {
        return None;
    }
    Some(Specifier::Bare(name.to_string()))
}

/// Extract every canonicalised, non-relative, non-builtin specifier
/// referenced by `source`, in first-seen order with duplicates removed.
pub fn extract_specifiers(source: &str) -> Vec<Specifier> {
    let stripped = strip_comments(source);
    let mut seen = BTreeSet::new();
    let mut ordered = Vec::new();

    for caps in import_pattern().captures_iter(&stripped) {
        let raw = &caps[1];
        if let Some(spec) = canonicalize(raw) {
            if seen.insert(spec.clone()) {
                ordered.push(spec);
            }
        }
    }

    ordered
}

/// Holds the allow-set (declared + installed-so-far) against which
/// generated source is validated. Rebuilding after an install constructs a
/// new `Validator` rather than mutating this one.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    allow_set: BTreeSet<Specifier>,
}

impl Validator {
    pub fn new(allow_set: impl IntoIterator<Item = Specifier>) -> Self {
        Self {
            allow_set: allow_set.into_iter().collect(),
        }
    }

    /// Construct a new `Validator` whose allow-set is this one's plus the
    /// given newly-installed packages.
    pub fn with_additional(&self, additional: impl IntoIterator<Item = Specifier>) -> Self {
        let mut allow_set = self.allow_set.clone();
        allow_set.extend(additional);
        Self { allow_set }
    }

    pub fn allows(&self, spec: &Specifier) -> bool {
        self.allow_set.contains(spec)
    }

    /// Validate one generated file's source body.
    pub fn validate(&self, source: &str) -> ValidationReport {
        let mut report = ValidationReport::default();

        for spec in extract_specifiers(source) {
            if self.allows(&spec) {
                continue;
            }

            let fix = match substitutes::lookup(&spec.package_name()) {
                Some(s) => {
                    report.substitutes.insert(spec.clone(), s.clone());
                    format!(
                        "Replace imports of \"{}\" with \"{}\": {}",
                        spec.package_name(),
                        s.module,
                        s.example
                    )
                }
                None => format!(
                    "Package \"{}\" is not declared. Remove the import or implement its functionality manually.",
                    spec.package_name()
                ),
            };

            report.missing.push(spec);
            report.fixes.push(fix);
        }

        report
    }
}

/// Build a `BTreeMap` from each missing specifier to the ordered list of
/// files it was seen in, used by the categoriser and the consent UI.
pub fn build_package_file_map<'a>(
    reports: impl IntoIterator<Item = (&'a std::path::Path, &'a ValidationReport)>,
) -> depforge_types::PackageFileMap {
    let mut map: depforge_types::PackageFileMap = BTreeMap::new();
    for (path, report) in reports {
        for spec in &report.missing {
            map.entry(spec.clone()).or_default().push(path.to_path_buf());
        }
    }
    map
}
