//! Application and window configuration.

use std::path::PathBuf;

use skiff_gpu::PresentPreference;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Application name reported to the Vulkan driver.
    pub name: String,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Windows opened at startup.
    pub windows: Vec<WindowConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "Skiff".to_string(),
            validation: cfg!(debug_assertions),
            windows: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Create a new config with the given application name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Open a window at startup.
    pub fn with_window(mut self, window: WindowConfig) -> Self {
        self.windows.push(window);
        self
    }
}

/// Configuration of one window and its renderer.
#[derive(Debug, Clone)]
pub struct WindowConfig {
    /// Window title.
    pub title: String,
    /// Initial width in physical pixels.
    pub width: u32,
    /// Initial height in physical pixels.
    pub height: u32,
    /// Present mode preference.
    pub present: PresentPreference,
    /// Color the frame is cleared to.
    pub clear_color: [f32; 4],
    /// Directory holding GLSL sources.
    pub shader_dir: PathBuf,
    /// Vertex shader file name, relative to `shader_dir`.
    pub vertex_shader: PathBuf,
    /// Fragment shader file name, relative to `shader_dir`.
    pub fragment_shader: PathBuf,
    /// Directory compiled SPIR-V is cached in.
    pub cache_dir: PathBuf,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Skiff".to_string(),
            width: 1280,
            height: 720,
            present: PresentPreference::Vsync,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            shader_dir: PathBuf::from("shaders"),
            vertex_shader: PathBuf::from("quad.vert"),
            fragment_shader: PathBuf::from("quad.frag"),
            cache_dir: PathBuf::from("compiled_shaders"),
        }
    }
}

impl WindowConfig {
    /// Create a new window config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the initial size.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the present mode preference.
    pub fn with_present(mut self, present: PresentPreference) -> Self {
        self.present = present;
        self
    }

    /// Set the clear color.
    pub fn with_clear_color(mut self, clear_color: [f32; 4]) -> Self {
        self.clear_color = clear_color;
        self
    }

    /// Set the directory GLSL sources are read from.
    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = dir.into();
        self
    }

    /// Set the vertex and fragment shader file names.
    pub fn with_shaders(mut self, vertex: impl Into<PathBuf>, fragment: impl Into<PathBuf>) -> Self {
        self.vertex_shader = vertex.into();
        self.fragment_shader = fragment.into();
        self
    }

    /// Set the SPIR-V cache directory.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Full path of the vertex shader source.
    pub fn vertex_shader_path(&self) -> PathBuf {
        self.shader_dir.join(&self.vertex_shader)
    }

    /// Full path of the fragment shader source.
    pub fn fragment_shader_path(&self) -> PathBuf {
        self.shader_dir.join(&self.fragment_shader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn app_config_builders() {
        let config = AppConfig::new("demo")
            .with_validation(false)
            .with_window(WindowConfig::new("one"))
            .with_window(WindowConfig::new("two"));

        assert_eq!(config.name, "demo");
        assert!(!config.validation);
        let titles: Vec<_> = config.windows.iter().map(|w| w.title.as_str()).collect();
        assert_eq!(titles, ["one", "two"]);
    }

    #[test]
    fn validation_defaults_to_debug_builds() {
        assert_eq!(AppConfig::default().validation, cfg!(debug_assertions));
        assert!(AppConfig::default().windows.is_empty());
    }

    #[test]
    fn window_defaults_prefer_vsync() {
        let window = WindowConfig::new("w");
        assert_eq!(window.present, PresentPreference::Vsync);
        assert_eq!((window.width, window.height), (1280, 720));
        assert_eq!(window.clear_color, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn window_builders() {
        let window = WindowConfig::new("w")
            .with_size(640, 480)
            .with_present(PresentPreference::Unlimited)
            .with_clear_color([0.1, 0.2, 0.3, 1.0])
            .with_cache_dir("/tmp/spv");

        assert_eq!((window.width, window.height), (640, 480));
        assert_eq!(window.present, PresentPreference::Unlimited);
        assert_eq!(window.clear_color, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(window.cache_dir, Path::new("/tmp/spv"));
    }

    #[test]
    fn shader_paths_resolve_against_shader_dir() {
        let window = WindowConfig::new("w")
            .with_shader_dir("assets/glsl")
            .with_shaders("tri.vert", "tri.frag");

        assert_eq!(window.vertex_shader_path(), Path::new("assets/glsl/tri.vert"));
        assert_eq!(window.fragment_shader_path(), Path::new("assets/glsl/tri.frag"));
    }
}
