//! Stamps the commit and cargo profile into the binary for `/health`

use std::process::Command;

fn main() {
    let commit = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|hash| hash.trim().to_owned())
        .filter(|hash| !hash.is_empty());

    println!("cargo:rustc-env=GIT_HASH={}", commit.as_deref().unwrap_or("unknown"));
    println!(
        "cargo:rustc-env=BUILD_PROFILE={}",
        std::env::var("PROFILE").as_deref().unwrap_or("unknown")
    );
    println!("cargo:rerun-if-changed=../.git/HEAD");
}
