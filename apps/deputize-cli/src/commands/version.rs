//! Version command - Print build information

use clap::Args;

/// Arguments for the version command
#[derive(Args, Debug)]
pub struct VersionArgs {}

/// Version line including the git commit when it was provided at build time.
pub fn version_line() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("DEPUTIZE_GIT_COMMIT") {
        Some(commit) if !commit.is_empty() => format!("deputize {version} ({commit})"),
        _ => format!("deputize {version}"),
    }
}

/// Execute the version command
pub fn execute(_args: VersionArgs) {
    println!("{}", version_line());
}
