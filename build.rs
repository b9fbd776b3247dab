use std::path::{Path, PathBuf};
use std::process::Command;

const MAX_LINES: usize = 750;

/// Only the crate's own sources are checked.
const CHECKED_DIR: &str = "src";

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/main");
    println!("cargo:rerun-if-changed=.git/packed-refs");

    let sha = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout)
                    .ok()
                    .map(|s| s.trim().to_string())
            } else {
                None
            }
        })
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=SDLC_MONITOR_GIT_SHA={}", sha);

    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR must be set");
    let root = PathBuf::from(&manifest_dir);
    let mut files = Vec::new();
    walk_directory(&root.join(CHECKED_DIR), &mut files);
    files.sort();

    for file in &files {
        println!("cargo:rerun-if-changed={}", file.display());
    }

    let sources: Vec<(PathBuf, String)> = files
        .iter()
        .filter_map(|file| {
            let content = std::fs::read_to_string(file).ok()?;
            let rel_path = file.strip_prefix(&root).unwrap_or(file).to_path_buf();
            Some((rel_path, content))
        })
        .collect();

    enforce_line_limits(&sources);
    enforce_no_dead_code_allows(&sources);
    enforce_no_test_skips(&sources);
    enforce_serial_for_env_mutations(&sources);
}

fn walk_directory(dir: &Path, files: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_directory(&path, files);
        } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
            files.push(path);
        }
    }
}

fn report(title: &str, violations: &[(PathBuf, usize, String)], advice: &[&str]) -> ! {
    eprintln!("\n========================================");
    eprintln!("{}", title);
    eprintln!("========================================");
    eprintln!();
    for (path, line_num, message) in violations {
        eprintln!("  {}:{}", path.display(), line_num);
        eprintln!("    {}", message.trim());
        eprintln!();
    }
    eprintln!("========================================");
    for line in advice {
        eprintln!("{}", line);
    }
    eprintln!("========================================\n");
    panic!("Build failed: {} ({} occurrence(s))", title, violations.len());
}

fn enforce_line_limits(sources: &[(PathBuf, String)]) {
    let violations: Vec<(PathBuf, usize, String)> = sources
        .iter()
        .filter_map(|(path, content)| {
            let lines = content.lines().filter(|l| !l.trim().is_empty()).count();
            (lines > MAX_LINES).then(|| {
                (
                    path.clone(),
                    lines,
                    format!("{} lines (exceeds by {})", lines, lines - MAX_LINES),
                )
            })
        })
        .collect();

    if !violations.is_empty() {
        report(
            &format!("FILE LINE LIMIT EXCEEDED (max {} lines)", MAX_LINES),
            &violations,
            &["Please split these files into smaller modules."],
        );
    }
}

fn enforce_no_dead_code_allows(sources: &[(PathBuf, String)]) {
    let mut violations = Vec::new();
    for (path, content) in sources {
        for (line_num, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if (trimmed.starts_with("#[allow(") || trimmed.starts_with("#![allow("))
                && trimmed.contains("dead_code")
            {
                violations.push((path.clone(), line_num + 1, line.to_string()));
            }
        }
    }

    if !violations.is_empty() {
        report(
            "#[allow(dead_code)] IS NOT ALLOWED",
            &violations,
            &[
                "Instead:",
                "  - DELETE unused code entirely",
                "  - If the code is for tests, use #[cfg(test)]",
            ],
        );
    }
}

/// A test function found by a line scan: its start line, name and body lines.
struct TestFn<'a> {
    start: usize,
    name: String,
    serial: bool,
    body: Vec<&'a str>,
}

fn test_functions(content: &str) -> Vec<TestFn<'_>> {
    let lines: Vec<&str> = content.lines().collect();
    let mut tests = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let trimmed = lines[i].trim();
        if trimmed != "#[test]" && !trimmed.starts_with("#[tokio::test") {
            i += 1;
            continue;
        }

        let attrs_start = (i.saturating_sub(3)..i)
            .rev()
            .take_while(|&k| lines[k].trim().starts_with("#["))
            .last()
            .unwrap_or(i);
        let Some(fn_line) = (i + 1..lines.len().min(i + 5)).find(|&j| lines[j].contains("fn "))
        else {
            i += 1;
            continue;
        };
        let serial = lines[attrs_start..fn_line]
            .iter()
            .any(|l| matches!(l.trim(), "#[serial]" | "#[serial_test::serial]"));
        let name = lines[fn_line]
            .split("fn ")
            .nth(1)
            .and_then(|rest| rest.split('(').next())
            .unwrap_or("")
            .trim()
            .to_string();

        let mut depth = 0i32;
        let mut opened = false;
        let mut end = fn_line;
        for (k, line) in lines.iter().enumerate().skip(fn_line) {
            for c in line.chars() {
                match c {
                    '{' => {
                        depth += 1;
                        opened = true;
                    }
                    '}' => depth -= 1,
                    _ => {}
                }
            }
            end = k;
            if opened && depth <= 0 {
                break;
            }
        }

        tests.push(TestFn {
            start: i + 1,
            name,
            serial,
            body: lines[fn_line..=end].to_vec(),
        });
        i = end + 1;
    }
    tests
}

/// Bans tests that silently skip instead of failing.
fn enforce_no_test_skips(sources: &[(PathBuf, String)]) {
    let skip_patterns = ["Skipping test", "skipping test", "Test skipped", "test skipped"];

    let mut violations = Vec::new();
    for (path, content) in sources {
        for test in test_functions(content) {
            if let Some(pattern) = skip_patterns
                .iter()
                .find(|p| test.body.iter().any(|l| l.contains(*p)))
            {
                violations.push((
                    path.clone(),
                    test.start,
                    format!("test `{}` contains skip pattern: {}", test.name, pattern),
                ));
            }
        }
    }

    if !violations.is_empty() {
        report(
            "SILENT TEST SKIPS ARE NOT ALLOWED",
            &violations,
            &["Tests must FAIL if they cannot run, not silently pass."],
        );
    }
}

/// Requires #[serial] for tests that mutate environment variables.
fn enforce_serial_for_env_mutations(sources: &[(PathBuf, String)]) {
    let mut violations = Vec::new();
    for (path, content) in sources {
        for test in test_functions(content) {
            let mutates_env = test.body.iter().any(|l| {
                let trimmed = l.trim();
                !trimmed.starts_with("//")
                    && (trimmed.contains("env::set_var") || trimmed.contains("env::remove_var"))
            });
            if mutates_env && !test.serial {
                violations.push((
                    path.clone(),
                    test.start,
                    format!("test `{}` mutates env without #[serial]", test.name),
                ));
            }
        }
    }

    if !violations.is_empty() {
        report(
            "ENV MUTATIONS REQUIRE #[serial]",
            &violations,
            &[
                "Tests that call std::env::set_var or std::env::remove_var",
                "modify global state and cause flaky failures in parallel.",
                "Add #[serial] from the serial_test crate.",
            ],
        );
    }
}
