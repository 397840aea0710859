//! Command line options.

/// Options read from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxOptions {
    /// Prefer mailbox presentation over vsync.
    pub unlimited: bool,
    /// Enable Vulkan validation layers.
    pub validation: bool,
    /// Number of windows to open.
    pub windows: u32,
    /// Print usage and exit.
    pub help: bool,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            unlimited: false,
            validation: cfg!(debug_assertions),
            windows: 1,
            help: false,
        }
    }
}

impl SandboxOptions {
    /// Parse options from the process arguments.
    pub fn from_args() -> Self {
        Self::parse(std::env::args().skip(1))
    }

    /// Parse options, ignoring unknown arguments and malformed values.
    pub fn parse(args: impl IntoIterator<Item = String>) -> Self {
        let mut options = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--unlimited" => options.unlimited = true,
                "--no-validation" => options.validation = false,
                "--windows" => {
                    if let Some(Ok(n)) = args.next().map(|v| v.parse::<u32>()) {
                        options.windows = n.max(1);
                    }
                }
                "-h" | "--help" => options.help = true,
                other => tracing::warn!("Ignoring unknown argument {other}"),
            }
        }

        options
    }
}

pub fn print_help() {
    eprintln!(
        "Skiff sandbox: a spinning quad per window

USAGE:
    cargo run -p skiff-sandbox -- [OPTIONS]

OPTIONS:
    --unlimited             Present with mailbox when available instead of vsync
    --no-validation         Disable Vulkan validation layers
    --windows <N>           Number of windows to open (default: 1)
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> SandboxOptions {
        SandboxOptions::parse(args.iter().map(ToString::to_string))
    }

    #[test]
    fn no_arguments_gives_defaults() {
        assert_eq!(parse(&[]), SandboxOptions::default());
        assert!(!parse(&[]).unlimited);
        assert_eq!(parse(&[]).windows, 1);
    }

    #[test]
    fn flags_are_recognized() {
        let options = parse(&["--unlimited", "--no-validation", "--help"]);
        assert!(options.unlimited);
        assert!(!options.validation);
        assert!(options.help);
        assert!(parse(&["-h"]).help);
    }

    #[test]
    fn window_count() {
        assert_eq!(parse(&["--windows", "3"]).windows, 3);
        assert_eq!(parse(&["--windows", "0"]).windows, 1);
        assert_eq!(parse(&["--windows", "many"]).windows, 1);
        assert_eq!(parse(&["--windows"]).windows, 1);
    }

    #[test]
    fn unknown_arguments_are_ignored() {
        let options = parse(&["--fullscreen", "--unlimited"]);
        assert!(options.unlimited);
    }
}
