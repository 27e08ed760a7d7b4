use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Build-time fallback for the backend base URL (read with `option_env!`).
const API_URL_ENV: &str = "STATEMENT_ANALYZER_API_URL";

fn main() {
    let commit = get_git_commit().unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=GIT_COMMIT_HASH={commit}");

    // The baked-in API URL must follow the environment of the build.
    println!("cargo:rerun-if-env-changed={API_URL_ENV}");

    if let Ok(git_dir) = get_git_dir() {
        emit_rerun_if_git_head_changes(&git_dir);
    }
}

fn run_git(args: &[&str]) -> Result<String, String> {
    let output = Command::new("git")
        .args(args)
        .output()
        .map_err(|err| err.to_string())?;

    if !output.status.success() {
        return Err(String::from_utf8_lossy(&output.stderr).to_string());
    }

    let out = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if out.is_empty() {
        return Err(format!("empty output from git {}", args.join(" ")));
    }
    Ok(out)
}

fn get_git_commit() -> Result<String, String> {
    run_git(&["rev-parse", "--short", "HEAD"])
}

fn get_git_dir() -> Result<PathBuf, String> {
    let git_dir = PathBuf::from(run_git(&["rev-parse", "--git-dir"])?);
    if git_dir.is_absolute() {
        return Ok(git_dir);
    }
    let manifest_dir =
        PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").map_err(|e| e.to_string())?);
    Ok(manifest_dir.join(git_dir))
}

fn emit_rerun_if_git_head_changes(git_dir: &Path) {
    let head_path = git_dir.join("HEAD");
    println!("cargo:rerun-if-changed={}", head_path.display());

    if let Ok(head_contents) = fs::read_to_string(&head_path) {
        if let Some(ref_path) = head_contents.trim().strip_prefix("ref: ") {
            println!("cargo:rerun-if-changed={}", git_dir.join(ref_path).display());
        }
    }
}
