// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=DEPTHCAM_VERSION");

    // Packagers building from a tarball set the version explicitly
    let version = match std::env::var("DEPTHCAM_VERSION") {
        Ok(v) => v,
        Err(_) => git_version().unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
    };

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// Version from `git describe`
///
/// "v0.1.0" at a tag becomes "0.1.0-abcdef1", "v0.1.0-5-gabcdef1" after a
/// tag becomes "0.1.0-dirty-abcdef1", and a repository without tags yields
/// the package version with the short hash.
fn git_version() -> Option<String> {
    let hash = commit_hash()?;
    let describe = run_git(&["describe", "--tags", "--match", "v*"]);

    let Some(describe) = describe else {
        return Some(format!("{}-{}", env!("CARGO_PKG_VERSION"), hash));
    };
    let describe = describe.strip_prefix('v').unwrap_or(&describe);

    let parts: Vec<&str> = describe.rsplitn(3, '-').collect();
    if parts.len() == 3 {
        Some(format!("{}-dirty-{}", parts[2], hash))
    } else {
        Some(format!("{}-{}", describe, hash))
    }
}

fn commit_hash() -> Option<String> {
    run_git(&["rev-parse", "--short", "HEAD"])
}

fn run_git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        None
    }
}
