//! Stamps the binary with the revision it was built from
//!
//! Packaging jobs that build outside a git checkout can set `DAQ_BUILD_REV`
//! themselves. Otherwise the short commit id comes from git, suffixed with
//! `+dirty` when tracked files have local changes.

use std::process::Command;

fn main() {
    println!("cargo:rerun-if-env-changed=DAQ_BUILD_REV");

    let revision = std::env::var("DAQ_BUILD_REV")
        .ok()
        .map(|rev| rev.trim().to_string())
        .filter(|rev| !rev.is_empty())
        .or_else(git_revision)
        .unwrap_or_else(|| "unknown".to_string());
    let built_at = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=DAQ_BUILD_REV={}", revision);
    println!("cargo:rustc-env=DAQ_BUILT_AT={}", built_at);
    println!("cargo:rustc-env=DAQ_BUILD_PROFILE={}", profile);
}

fn git_revision() -> Option<String> {
    let commit = git(&["rev-parse", "--short=10", "HEAD"])?;
    let dirty = git(&["status", "--porcelain", "--untracked-files=no"])
        .is_some_and(|changes| !changes.is_empty());
    Some(if dirty { format!("{}+dirty", commit) } else { commit })
}

/// Trimmed stdout of a successful git invocation
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|text| text.trim().to_string())
}
