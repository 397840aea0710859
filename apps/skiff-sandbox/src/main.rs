//! Skiff sandbox
//!
//! Opens one or more windows, each on its own device, rendering a colored quad
//! that spins a quarter turn per second.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p skiff-sandbox -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--unlimited`: Present with mailbox when the surface offers it
//! - `--no-validation`: Disable Vulkan validation layers
//! - `--windows <N>`: Number of windows to open (default: 1)
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;
mod options;
mod overlay;
mod stats;

use skiff_app::{run, AppConfig, PresentPreference, WindowConfig};

use crate::app::Sandbox;
use crate::options::{print_help, SandboxOptions};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
const CLEAR_COLOR: [f32; 4] = [0.02, 0.02, 0.03, 1.0];
const SHADER_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/shaders");

fn main() -> anyhow::Result<()> {
    let options = SandboxOptions::from_args();
    if options.help {
        print_help();
        return Ok(());
    }

    run(app_config(&options), Sandbox)
}

fn app_config(options: &SandboxOptions) -> AppConfig {
    let present = if options.unlimited {
        PresentPreference::Unlimited
    } else {
        PresentPreference::Vsync
    };

    (1..=options.windows).fold(
        AppConfig::new("Skiff Sandbox").with_validation(options.validation),
        |config, n| {
            let title = if options.windows == 1 {
                "Skiff Sandbox".to_string()
            } else {
                format!("Skiff Sandbox #{n}")
            };
            config.with_window(
                WindowConfig::new(title)
                    .with_size(WIDTH, HEIGHT)
                    .with_present(present)
                    .with_clear_color(CLEAR_COLOR)
                    .with_shader_dir(SHADER_DIR),
            )
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_window_by_default() {
        let config = app_config(&SandboxOptions::default());
        assert_eq!(config.windows.len(), 1);
        assert_eq!(config.windows[0].title, "Skiff Sandbox");
        assert_eq!(config.windows[0].present, PresentPreference::Vsync);
        assert!(config.windows[0].vertex_shader_path().exists());
        assert!(config.windows[0].fragment_shader_path().exists());
    }

    #[test]
    fn options_reach_every_window() {
        let options = SandboxOptions {
            unlimited: true,
            validation: false,
            windows: 3,
            help: false,
        };
        let config = app_config(&options);

        assert!(!config.validation);
        let titles: Vec<_> = config.windows.iter().map(|w| w.title.as_str()).collect();
        assert_eq!(titles, ["Skiff Sandbox #1", "Skiff Sandbox #2", "Skiff Sandbox #3"]);
        assert!(config
            .windows
            .iter()
            .all(|w| w.present == PresentPreference::Unlimited));
    }
}
