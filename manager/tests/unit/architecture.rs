//! Structural tests for layer boundaries.
//!
//! These scan the source tree so the domain stays free of I/O, services
//! depend on ports only, and adapters stay behind the infra layer.

use std::path::{Path, PathBuf};

fn src() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("src")
}

/// Collect all `.rs` files under a directory recursively.
fn collect_rs_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(collect_rs_files(&path));
            } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
                files.push(path);
            }
        }
    }
    files
}

/// Tracks whether a line sits inside a `#[cfg(test)]` block.
#[derive(Default)]
struct CfgTestTracker {
    in_test_block: bool,
    brace_depth: i32,
    start_depth: i32,
}

impl CfgTestTracker {
    fn process_line(&mut self, line: &str) -> bool {
        if line.trim().contains("#[cfg(test)]") {
            self.in_test_block = true;
            self.start_depth = self.brace_depth;
        }
        for ch in line.chars() {
            match ch {
                '{' => self.brace_depth += 1,
                '}' => {
                    self.brace_depth -= 1;
                    if self.in_test_block && self.brace_depth <= self.start_depth {
                        self.in_test_block = false;
                    }
                }
                _ => {}
            }
        }
        self.in_test_block
    }
}

/// Non-test, non-comment lines of every file under `dir` matching `forbidden`.
fn violations(dir: &Path, forbidden: impl Fn(&str) -> bool) -> Vec<String> {
    let mut found = Vec::new();
    for file in collect_rs_files(dir) {
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };
        let rel = file
            .strip_prefix(env!("CARGO_MANIFEST_DIR"))
            .unwrap_or(&file)
            .display()
            .to_string();
        let mut tracker = CfgTestTracker::default();
        for (i, line) in content.lines().enumerate() {
            let in_test = tracker.process_line(line);
            let trimmed = line.trim();
            if in_test || trimmed.starts_with("//") || trimmed.starts_with("/*") {
                continue;
            }
            if forbidden(line) {
                found.push(format!("{rel}:{}: {trimmed}", i + 1));
            }
        }
    }
    found
}

// ── Layering ──────────────────────────────────────────────────────────────────

#[test]
fn domain_imports_no_outer_layer() {
    let found = violations(&src().join("domain"), |line| {
        ["crate::application", "crate::infra", "crate::app::", "crate::cli::", "tokio::"]
            .iter()
            .any(|outer| line.contains(outer))
    });
    assert!(
        found.is_empty(),
        "domain/ must stay free of I/O and outer layers:\n{}",
        found.join("\n")
    );
}

#[test]
fn application_imports_no_adapters() {
    let found = violations(&src().join("application"), |line| {
        ["crate::infra", "crate::app::", "crate::cli::", "crate::settings"]
            .iter()
            .any(|outer| line.contains(outer))
    });
    assert!(
        found.is_empty(),
        "application/ must depend on ports only:\n{}",
        found.join("\n")
    );
}

#[test]
fn services_never_name_concrete_adapters() {
    let concrete = [
        "SystemdServiceControl",
        "DatadogVendor",
        "ReleaseInstaller",
        "ControlPlaneClient",
        "LocalAgentClient",
        "FileStateStore",
        "YamlConfigStore",
        "TokioCommandRunner",
    ];
    let found = violations(&src().join("application"), |line| {
        concrete.iter().any(|name| line.contains(name))
    });
    assert!(
        found.is_empty(),
        "services take `Arc<dyn Port>`, not adapters:\n{}",
        found.join("\n")
    );
}

#[test]
fn process_spawning_stays_in_infra() {
    let mut found = Vec::new();
    for dir in ["domain", "application"] {
        found.extend(violations(&src().join(dir), |line| {
            line.contains("tokio::process") || line.contains("std::process::Command")
        }));
    }
    assert!(
        found.is_empty(),
        "only infra/ may spawn processes:\n{}",
        found.join("\n")
    );
}

// ── Output discipline ─────────────────────────────────────────────────────────

#[test]
fn library_layers_have_no_print_macros() {
    let mut found = Vec::new();
    for dir in ["domain", "application", "infra"] {
        found.extend(violations(&src().join(dir), |line| {
            line.contains("println!") || line.contains("eprintln!")
        }));
    }
    assert!(
        found.is_empty(),
        "use tracing outside the CLI entry points:\n{}",
        found.join("\n")
    );
}

#[test]
fn no_unwrap_or_expect_outside_tests() {
    let found = violations(&src(), |line| {
        line.contains(".unwrap()") || line.contains(".expect(")
    });
    assert!(
        found.is_empty(),
        "propagate errors with `?` instead:\n{}",
        found.join("\n")
    );
}
