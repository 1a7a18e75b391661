use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    // Workspace root is one level up from this crate.
    println!("cargo:rerun-if-changed=../.git/HEAD");

    let commit = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .filter(|hash| !hash.is_empty())
        .unwrap_or_else(|| "dev".to_string());

    println!("cargo:rustc-env=FUEL_PLAN_COMMIT={commit}");
}
