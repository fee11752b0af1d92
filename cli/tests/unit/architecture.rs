//! Structural tests for architectural boundary enforcement.
//!
//! These tests scan source files to verify that the layer boundaries hold:
//! domain is pure, application talks only to ports, infra never prints.

use std::path::{Path, PathBuf};

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

/// Track brace depth and return whether a line is inside a `#[cfg(test)]` block.
struct CfgTestTracker {
    in_test_block: bool,
    brace_depth: i32,
    test_block_start_depth: i32,
}

impl CfgTestTracker {
    fn new() -> Self {
        Self {
            in_test_block: false,
            brace_depth: 0,
            test_block_start_depth: 0,
        }
    }

    /// Process a line and return `true` if it's inside a `#[cfg(test)]` block.
    fn process_line(&mut self, line: &str) -> bool {
        if line.trim().contains("#[cfg(test)]") {
            self.in_test_block = true;
            self.test_block_start_depth = self.brace_depth;
        }
        for ch in line.chars() {
            match ch {
                '{' => self.brace_depth += 1,
                '}' => {
                    self.brace_depth -= 1;
                    if self.in_test_block && self.brace_depth <= self.test_block_start_depth {
                        self.in_test_block = false;
                    }
                }
                _ => {}
            }
        }
        self.in_test_block
    }
}

fn src_dir(layer: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("src").join(layer)
}

/// Non-test, non-comment lines of every file under `layer` containing any
/// of `needles`, formatted as `file:line: text`.
fn offending_lines(layer: &str, needles: &[&str]) -> Vec<String> {
    let mut violations = Vec::new();
    for file in collect_rs_files(&src_dir(layer)) {
        let rel = file
            .strip_prefix(env!("CARGO_MANIFEST_DIR"))
            .unwrap_or(&file)
            .display()
            .to_string();
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };
        let mut tracker = CfgTestTracker::new();
        for (i, line) in content.lines().enumerate() {
            let in_test = tracker.process_line(line);
            let trimmed = line.trim();
            if in_test || trimmed.starts_with("//") {
                continue;
            }
            if needles.iter().any(|n| line.contains(n)) {
                violations.push(format!("{rel}:{}: {trimmed}", i + 1));
            }
        }
    }
    violations
}

#[test]
fn domain_is_pure() {
    let violations = offending_lines(
        "domain",
        &[
            "crate::infra",
            "crate::application",
            "crate::commands",
            "crate::output",
            "tokio",
            "std::fs",
            "std::process",
        ],
    );
    assert!(
        violations.is_empty(),
        "domain/ must stay free of I/O and outer layers:\n{}",
        violations.join("\n")
    );
}

#[test]
fn application_depends_only_on_ports() {
    let violations = offending_lines(
        "application",
        &["crate::infra", "crate::commands", "crate::output", "std::fs", "println!"],
    );
    assert!(
        violations.is_empty(),
        "application/ must reach the outside world through ports:\n{}",
        violations.join("\n")
    );
}

#[test]
fn infra_has_no_imports_from_commands_or_output() {
    let violations = offending_lines("infra", &["crate::commands", "crate::output"]);
    assert!(
        violations.is_empty(),
        "infra/ must not import from commands/ or output/:\n{}",
        violations.join("\n")
    );
}

#[test]
fn infra_has_no_print_macros_outside_tests() {
    let violations = offending_lines("infra", &["println!", "eprintln!"]);
    assert!(
        violations.is_empty(),
        "infra/ must not use println!/eprintln! outside #[cfg(test)]:\n{}",
        violations.join("\n")
    );
}

#[test]
fn processes_are_spawned_only_in_infra() {
    let mut violations = Vec::new();
    for layer in ["domain", "application", "commands", "output"] {
        violations.extend(offending_lines(
            layer,
            &["TokioCommandRunner::new", "Command::new("],
        ));
    }
    assert!(
        violations.is_empty(),
        "external tools must run through the CommandRunner port in infra/:\n{}",
        violations.join("\n")
    );
}
