//! Registry client: package-name syntax and existence checks (C3).
//!
//! `exists` is an HTTPS GET against the public registry with a short hard
//! deadline and an abbreviated-metadata `Accept` header, so only the status
//! code is consumed. `existsBatch` fires one request per package
//! concurrently (one OS thread per query, joined before returning,
//! mirroring this codebase's wave-based concurrency idiom) — request
//! ordering is never observable.
//!
//! Registry errors distinct from 404 are never treated as "exists": they
//! surface to the caller as an error so an LLM hallucination or a registry
//! outage can never trigger an install.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use depforge_types::Specifier;

/// The verdict for a single package name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExistsVerdict {
    Exists,
    NotFound,
    /// Non-404 status, network failure, or timeout. The reason is
    /// preserved for diagnostics but never treated as approvable.
    Error(String),
}

impl ExistsVerdict {
    pub fn exists(&self) -> bool {
        matches!(self, ExistsVerdict::Exists)
    }
}

/// Syntactic validation of a package name, run before any network traffic.
///
/// Rejects names whose bytes would make an HTTP request invalid or would be
/// dangerous as a shell argument (defence in depth; the installer never
/// invokes a shell regardless).
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("package name is empty".to_string());
    }
    if name.len() > 214 {
        return Err("package name exceeds 214 characters".to_string());
    }
    if name.starts_with('.') || name.starts_with('_') {
        return Err("package name must not start with '.' or '_'".to_string());
    }
    if name.to_ascii_lowercase() != name {
        return Err("package name must be lowercase".to_string());
    }

    let body = if let Some(rest) = name.strip_prefix('@') {
        let Some((scope, pkg)) = rest.split_once('/') else {
            return Err("scoped package name is missing a '/'".to_string());
        };
        if scope.is_empty() || pkg.is_empty() {
            return Err("scoped package name has an empty scope or name".to_string());
        }
        pkg
    } else {
        name
    };

    let valid_char = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~');
    if !body.chars().all(valid_char) {
        return Err(format!("package name contains an invalid character: {name}"));
    }

    Ok(())
}

/// A registry HTTP client with a hard timeout.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl RegistryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Check a single package's existence.
    pub fn exists(&self, name: &str) -> ExistsVerdict {
        if let Err(reason) = validate_name(name) {
            return ExistsVerdict::Error(reason);
        }

        let url = format!("{}/{}", self.base_url, encode_path_segment(name));
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.npm.install-v1+json")
            .send();

        match response {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => ExistsVerdict::Exists,
            Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => ExistsVerdict::NotFound,
            Ok(resp) => ExistsVerdict::Error(format!("unexpected status: {}", resp.status())),
            Err(e) => ExistsVerdict::Error(e.to_string()),
        }
    }

    /// Check many packages concurrently. The returned map is order-independent.
    pub fn exists_batch(&self, specifiers: &[Specifier]) -> BTreeMap<Specifier, ExistsVerdict> {
        let client = Arc::new(self.clone());

        let handles: Vec<_> = specifiers
            .iter()
            .cloned()
            .map(|spec| {
                let client = Arc::clone(&client);
                thread::spawn(move || {
                    let verdict = client.exists(&spec.package_name());
                    (spec, verdict)
                })
            })
            .collect();

        handles
            .into_iter()
            .filter_map(|h| h.join().ok())
            .collect()
    }
}

/// Abstracts registry existence checks behind a trait so the orchestrator's
/// loop can be exercised against a scripted fake instead of real network
/// traffic.
pub trait PackageRegistry {
    fn exists_batch(&self, specifiers: &[Specifier]) -> BTreeMap<Specifier, ExistsVerdict>;
}

impl PackageRegistry for RegistryClient {
    fn exists_batch(&self, specifiers: &[Specifier]) -> BTreeMap<Specifier, ExistsVerdict> {
        RegistryClient::exists_batch(self, specifiers)
    }
}

fn encode_path_segment(name: &str) -> String {
    // Scoped packages keep their '/' as a path separator; everything else
    // that could break the request line is percent-encoded.
    name.split('/')
        .map(|seg| {
            seg.chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~' | '@') {
                        c.to_string()
                    } else {
                        format!("%{:02X}", c as u32)
                    }
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("/")
}
