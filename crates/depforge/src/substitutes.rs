//! The curated built-in substitute table.
//!
//! A closed, build-time-immutable enumeration of well-known third-party
//! packages that have a stable runtime built-in replacement. Additions
//! require a code change, not a runtime extension point — this is
//! deliberately not a mutable registry.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use depforge_types::Substitute;

/// Look up the curated substitute for a package name, if one exists.
pub fn lookup(package_name: &str) -> Option<&'static Substitute> {
    table().get(package_name)
}

fn table() -> &'static BTreeMap<&'static str, Substitute> {
    static TABLE: OnceLock<BTreeMap<&'static str, Substitute>> = OnceLock::new();
    TABLE.get_or_init(build_table)
}

fn sub(description: &str, module: &str, example: &str, min_runtime_version: &str) -> Substitute {
    Substitute {
        description: description.to_string(),
        module: module.to_string(),
        example: example.to_string(),
        min_runtime_version: min_runtime_version.to_string(),
    }
}

fn build_table() -> BTreeMap<&'static str, Substitute> {
    let mut t = BTreeMap::new();

    t.insert(
        "uuid",
        sub(
            "Generate RFC 4122 UUIDs without a dependency.",
            "node:crypto",
            "import { randomUUID } from \"node:crypto\"; const id = randomUUID();",
            "14.17.0",
        ),
    );
    t.insert(
        "node-fetch",
        sub(
            "The runtime ships a spec-compliant global `fetch`.",
            "fetch (global)",
            "const res = await fetch(\"https://example.com\"); const body = await res.json();",
            "18.0.0",
        ),
    );
    t.insert(
        "isomorphic-fetch",
        sub(
            "The runtime ships a spec-compliant global `fetch`.",
            "fetch (global)",
            "const res = await fetch(\"https://example.com\");",
            "18.0.0",
        ),
    );
    t.insert(
        "whatwg-fetch",
        sub(
            "The runtime ships a spec-compliant global `fetch`.",
            "fetch (global)",
            "const res = await fetch(\"https://example.com\");",
            "18.0.0",
        ),
    );
    t.insert(
        "axios",
        sub(
            "For simple request/response use, the global `fetch` avoids an extra dependency.",
            "fetch (global)",
            "const res = await fetch(url, { method: \"POST\", body: JSON.stringify(data) });",
            "18.0.0",
        ),
    );
    t.insert(
        "chalk",
        sub(
            "`util.styleText` applies ANSI styling without a dependency.",
            "node:util",
            "import { styleText } from \"node:util\"; console.log(styleText(\"green\", \"ok\"));",
            "20.12.0",
        ),
    );
    t.insert(
        "colors",
        sub(
            "`util.styleText` applies ANSI styling without a dependency.",
            "node:util",
            "import { styleText } from \"node:util\"; console.log(styleText(\"red\", \"fail\"));",
            "20.12.0",
        ),
    );
    t.insert(
        "kleur",
        sub(
            "`util.styleText` applies ANSI styling without a dependency.",
            "node:util",
            "import { styleText } from \"node:util\"; console.log(styleText(\"bold\", \"hi\"));",
            "20.12.0",
        ),
    );
    t.insert(
        "rimraf",
        sub(
            "`fs.rm` supports recursive, force-deleting removal natively.",
            "node:fs/promises",
            "import { rm } from \"node:fs/promises\"; await rm(path, { recursive: true, force: true });",
            "14.14.0",
        ),
    );
    t.insert(
        "mkdirp",
        sub(
            "`fs.mkdir` supports recursive directory creation natively.",
            "node:fs/promises",
            "import { mkdir } from \"node:fs/promises\"; await mkdir(path, { recursive: true });",
            "10.12.0",
        ),
    );
    t.insert(
        "fs-extra",
        sub(
            "Most `fs-extra` helpers (mkdirp, remove, copy) now have a native `fs/promises` equivalent.",
            "node:fs/promises",
            "import { cp, mkdir, rm } from \"node:fs/promises\";",
            "16.7.0",
        ),
    );
    t.insert(
        "glob",
        sub(
            "`fs.glob` walks the filesystem against a glob pattern natively.",
            "node:fs/promises",
            "import { glob } from \"node:fs/promises\"; for await (const f of glob(\"**/*.ts\")) {}",
            "22.0.0",
        ),
    );
    t.insert(
        "dotenv",
        sub(
            "The runtime loads `.env` files natively via a CLI flag or `process.loadEnvFile`.",
            "node:process",
            "process.loadEnvFile(\".env\");",
            "20.6.0",
        ),
    );
    t.insert(
        "lodash.isequal",
        sub(
            "`util.isDeepStrictEqual` performs a structural deep-equality check natively.",
            "node:util",
            "import { isDeepStrictEqual } from \"node:util\"; isDeepStrictEqual(a, b);",
            "9.0.0",
        ),
    );
    t.insert(
        "deep-equal",
        sub(
            "`util.isDeepStrictEqual` performs a structural deep-equality check natively.",
            "node:util",
            "import { isDeepStrictEqual } from \"node:util\"; isDeepStrictEqual(a, b);",
            "9.0.0",
        ),
    );
    t.insert(
        "fast-deep-equal",
        sub(
            "`util.isDeepStrictEqual` performs a structural deep-equality check natively.",
            "node:util",
            "import { isDeepStrictEqual } from \"node:util\"; isDeepStrictEqual(a, b);",
            "9.0.0",
        ),
    );
    t.insert(
        "moment",
        sub(
            "`Intl.DateTimeFormat` formats dates without a dependency; moment is also in maintenance mode.",
            "Intl.DateTimeFormat (global)",
            "new Intl.DateTimeFormat(\"en-US\", { dateStyle: \"medium\" }).format(new Date());",
            "18.0.0",
        ),
    );
    t.insert(
        "qs",
        sub(
            "`URLSearchParams` parses and stringifies query strings natively.",
            "node:url",
            "import { URLSearchParams } from \"node:url\"; new URLSearchParams(\"a=1&b=2\").get(\"a\");",
            "10.0.0",
        ),
    );
    t.insert(
        "form-data",
        sub(
            "The runtime ships a global `FormData` implementation.",
            "FormData (global)",
            "const form = new FormData(); form.append(\"file\", blob, \"name.txt\");",
            "18.0.0",
        ),
    );
    t.insert(
        "node-abort-controller",
        sub(
            "`AbortController` is a runtime global; the polyfill is unnecessary.",
            "AbortController (global)",
            "const controller = new AbortController(); fetch(url, { signal: controller.signal });",
            "15.0.0",
        ),
    );

    t
}
