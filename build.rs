//! Build script: version stamping and GPU pre-flight checks.
//!
//! When a GPU feature is requested, verify the toolkit is installed
//! before whisper-rs-sys tries to compile against it; the failure modes
//! otherwise surface as opaque cmake errors.

use std::process::Command;

fn main() {
    // Embed git short hash for the version string
    if let Ok(output) = Command::new("git")
        .args(["rev-parse", "--short=7", "HEAD"])
        .output()
        && output.status.success()
    {
        let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
        println!("cargo:rustc-env=GIT_HASH={}", hash);
    }
    println!("cargo:rerun-if-changed=.git/HEAD");

    if cfg!(feature = "cuda") {
        check_cuda();
    }
    if cfg!(feature = "vulkan") {
        check_vulkan();
    }
}

fn check_cuda() {
    let nvcc = Command::new("nvcc").arg("--version").output();
    match nvcc {
        Ok(out) if out.status.success() => {
            let text = String::from_utf8_lossy(&out.stdout);
            if let Some((major, minor)) = parse_cuda_version(&text) {
                println!("cargo::warning=Building with CUDA {}.{}", major, minor);
            } else {
                println!("cargo::warning=Building with CUDA (version unknown)");
            }
        }
        _ => {
            panic!(
                "`nvcc` not found but the cuda feature is enabled.\n\
                 Install the CUDA toolkit (https://developer.nvidia.com/cuda-downloads)\n\
                 or build without it: cargo build --release"
            );
        }
    }
}

fn check_vulkan() {
    if Command::new("vulkaninfo")
        .arg("--summary")
        .output()
        .is_err()
    {
        panic!(
            "`vulkaninfo` not found but the vulkan feature is enabled.\n\
             Install the Vulkan SDK (https://vulkan.lunarg.com/)\n\
             or build without it: cargo build --release"
        );
    }
    println!("cargo::warning=Vulkan SDK detected");
}

/// Parse "release X.Y" from nvcc --version output.
fn parse_cuda_version(text: &str) -> Option<(u32, u32)> {
    // nvcc output: "Cuda compilation tools, release 12.4, V12.4.131"
    let release_pos = text.find("release ")?;
    let after = &text[release_pos + 8..];
    let comma = after.find(',')?;
    let mut parts = after[..comma].split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}
