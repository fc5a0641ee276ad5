//! Dependency categoriser (C5): production vs development.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use depforge_types::{CategorizedPackages, Category, Specifier};

/// Packages whose purpose is development tooling (test runners, linters,
/// bundlers, type tooling) regardless of which file imports them.
const KNOWN_DEV_PACKAGES: &[&str] = &[
    "jest", "mocha", "chai", "vitest", "jasmine", "ava", "tap", "tape", "eslint", "prettier",
    "webpack", "rollup", "vite", "esbuild", "babel-core", "@babel/core", "typescript", "ts-node",
    "ts-jest", "nodemon", "husky", "lint-staged", "sinon", "supertest", "nyc", "cypress",
    "playwright", "karma", "tslint", "rimraf-cli", "cross-env",
];

fn test_path_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"(?:^|/)(test|tests|spec|specs|__tests__)/").expect("dir pattern compiles"),
            Regex::new(r"\.(test|spec)\.(js|jsx|ts|tsx|mjs|cjs)$").expect("suffix pattern compiles"),
        ]
    })
}

/// Whether `path` is considered a test path under the fixed family of
/// glob-shaped patterns (directories named `test(s)`/`spec(s)`/`__tests__`,
/// or files suffixed `.test.ext`/`.spec.ext`).
pub fn is_test_path(path: &Path) -> bool {
    let path_str = path.to_string_lossy().replace('\\', "/");
    test_path_patterns().iter().any(|re| re.is_match(&path_str))
}

/// Categorise a single package by precedence:
/// 1. `@types/…` prefix → Development.
/// 2. Known dev package → Development.
/// 3. Empty `importing_paths` → Production (conservative default).
/// 4. Any importing path is non-test → Production.
/// 5. Otherwise → Development.
pub fn categorize(spec: &Specifier, importing_paths: &[impl AsRef<Path>]) -> Category {
    if let Specifier::Scoped { scope, .. } = spec {
        if scope == "types" {
            return Category::Development;
        }
    }

    if KNOWN_DEV_PACKAGES.contains(&spec.package_name().as_str()) {
        return Category::Development;
    }

    if importing_paths.is_empty() {
        return Category::Production;
    }

    if importing_paths.iter().any(|p| !is_test_path(p.as_ref())) {
        Category::Production
    } else {
        Category::Development
    }
}

/// Partition a batch of `(specifier, importing paths)` entries into
/// production and development lists, preserving first-seen order.
pub fn categorize_all<P: AsRef<Path>>(
    entries: impl IntoIterator<Item = (Specifier, Vec<P>)>,
) -> CategorizedPackages {
    let mut result = CategorizedPackages::default();
    let mut seen = BTreeSet::new();

    for (spec, paths) in entries {
        if !seen.insert(spec.clone()) {
            continue;
        }
        match categorize(&spec, &paths) {
            Category::Production => result.production.push(spec),
            Category::Development => result.dev.push(spec),
        }
    }

    result
}
