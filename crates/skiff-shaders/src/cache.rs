//! Compile-or-load cache of SPIR-V binaries.
//!
//! Entries live in one directory as `<hash>.spv`, where `<hash>` is the hex
//! BLAKE3 digest of the GLSL source bytes. There is no index: a file existing
//! under that name is a cache hit.

use crate::error::{Result, ShaderError};
use crate::limits::DEFAULT_LIMITS;
use crate::stage::ShaderStage;
use shaderc::{CompileOptions, Compiler, EnvVersion, GlslProfile, SourceLanguage, TargetEnv};
use std::fs;
use std::path::{Path, PathBuf};

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Words in a SPIR-V module header.
pub const SPIRV_HEADER_WORDS: usize = 5;

/// Extension of cache entries.
pub const CACHE_EXTENSION: &str = "spv";

/// Extension of an entry while it is being written.
const PARTIAL_EXTENSION: &str = "spv.tmp";

/// GLSL version assumed for sources without a `#version` directive.
pub const DEFAULT_GLSL_VERSION: u32 = 450;

/// Hex digest naming the cache entry for `source`.
pub fn source_hash(source: &[u8]) -> String {
    blake3::hash(source).to_hex().to_string()
}

/// Decode a cached binary, or `None` if it is not a plausible SPIR-V module.
fn decode_spirv(bytes: &[u8]) -> Option<Vec<u32>> {
    if bytes.len() < SPIRV_HEADER_WORDS * 4 || bytes.len() % 4 != 0 {
        return None;
    }

    let words: Vec<u32> = bytemuck::pod_collect_to_vec(bytes);
    (words[0] == SPIRV_MAGIC).then_some(words)
}

/// Vertex and fragment binaries for one pipeline.
#[derive(Debug, Clone)]
pub struct ShaderSet {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

/// Content-hash keyed shader cache rooted at one directory.
#[derive(Debug, Clone)]
pub struct ShaderCache {
    dir: PathBuf,
}

impl ShaderCache {
    /// Create a cache. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the entry for `source`.
    pub fn entry_path(&self, source: &[u8]) -> PathBuf {
        self.dir
            .join(format!("{}.{CACHE_EXTENSION}", source_hash(source)))
    }

    /// Load the SPIR-V for the GLSL file at `path`, compiling it on a miss.
    ///
    /// Entries that are not valid SPIR-V are recompiled and overwritten.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Vec<u32>> {
        let path = path.as_ref();
        let stage = ShaderStage::from_path(path)?;
        let source = fs::read(path).map_err(|e| ShaderError::io(path, e))?;
        let entry = self.entry_path(&source);

        if entry.exists() {
            let bytes = fs::read(&entry).map_err(|e| ShaderError::io(&entry, e))?;
            if let Some(words) = decode_spirv(&bytes) {
                tracing::debug!(shader = %path.display(), "Shader cache hit");
                return Ok(words);
            }
            tracing::warn!(
                entry = %entry.display(),
                "Discarding corrupt shader cache entry"
            );
        }

        let text =
            std::str::from_utf8(&source).map_err(|_| ShaderError::InvalidSource(path.into()))?;
        let words = compile(text, stage, path)?;

        fs::create_dir_all(&self.dir).map_err(|e| ShaderError::io(&self.dir, e))?;
        // An interrupted write leaves only the partial file behind.
        let partial = entry.with_extension(PARTIAL_EXTENSION);
        fs::write(&partial, bytemuck::cast_slice::<u32, u8>(&words))
            .map_err(|e| ShaderError::io(&partial, e))?;
        fs::rename(&partial, &entry).map_err(|e| ShaderError::io(&entry, e))?;

        tracing::info!(shader = %path.display(), "Compiled shader");
        Ok(words)
    }

    /// Load a vertex and a fragment shader together.
    pub fn load_set(
        &self,
        vertex: impl AsRef<Path>,
        fragment: impl AsRef<Path>,
    ) -> Result<ShaderSet> {
        Ok(ShaderSet {
            vertex: self.load(vertex)?,
            fragment: self.load(fragment)?,
        })
    }
}

fn compile(source: &str, stage: ShaderStage, path: &Path) -> Result<Vec<u32>> {
    let compiler = Compiler::new().ok_or(ShaderError::CompilerUnavailable)?;
    let mut options = CompileOptions::new().ok_or(ShaderError::CompilerUnavailable)?;

    options.set_source_language(SourceLanguage::GLSL);
    options.set_target_env(TargetEnv::Vulkan, EnvVersion::Vulkan1_2 as u32);
    if !source.contains("#version") {
        options.set_forced_version_profile(DEFAULT_GLSL_VERSION, GlslProfile::None);
    }
    for &(limit, value) in DEFAULT_LIMITS {
        options.set_limit(limit, value);
    }

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("shader");

    let artifact = compiler
        .compile_into_spirv(source, stage.kind(), file_name, "main", Some(&options))
        .map_err(|e| ShaderError::Compilation {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    if artifact.get_num_warnings() > 0 {
        tracing::warn!(
            shader = file_name,
            "{}",
            artifact.get_warning_messages().trim_end()
        );
    }

    Ok(artifact.as_binary().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scratch directory removed on drop.
    struct TempDir(PathBuf);

    impl TempDir {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir().join(format!(
                "skiff-shaders-{name}-{}",
                std::process::id()
            ));
            let _ = fs::remove_dir_all(&dir);
            fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }

        fn write(&self, name: &str, contents: &[u8]) -> PathBuf {
            let path = self.0.join(name);
            fs::write(&path, contents).unwrap();
            path
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    const NOT_GLSL: &[u8] = b"this is not a shader";

    const MINIMAL_VERTEX: &str = "#version 450\nvoid main() { gl_Position = vec4(0.0); }\n";

    fn fake_module() -> Vec<u32> {
        vec![SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]
    }

    #[test]
    fn hash_names_the_entry() {
        let cache = ShaderCache::new("cache");
        let path = cache.entry_path(b"void main() {}");

        assert_eq!(path.parent(), Some(Path::new("cache")));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("spv"));
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap();
        assert_eq!(stem.len(), 64);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));

        assert_eq!(source_hash(b"a"), source_hash(b"a"));
        assert_ne!(source_hash(b"a"), source_hash(b"b"));
    }

    #[test]
    fn existing_entry_is_returned_without_compiling() {
        let tmp = TempDir::new("hit");
        let source = tmp.write("bogus.vert", NOT_GLSL);
        let cache = ShaderCache::new(tmp.0.join("compiled"));

        fs::create_dir_all(cache.dir()).unwrap();
        fs::write(
            cache.entry_path(NOT_GLSL),
            bytemuck::cast_slice::<u32, u8>(&fake_module()),
        )
        .unwrap();

        assert_eq!(cache.load(&source).unwrap(), fake_module());
    }

    #[test]
    fn corrupt_entry_is_not_trusted() {
        let tmp = TempDir::new("corrupt");
        let source = tmp.write("bogus.frag", NOT_GLSL);
        let cache = ShaderCache::new(tmp.0.join("compiled"));

        fs::create_dir_all(cache.dir()).unwrap();
        fs::write(cache.entry_path(NOT_GLSL), [1_u8, 2, 3, 4, 5, 6, 7]).unwrap();

        // The entry is ignored, so the bogus source reaches the compiler.
        let err = cache.load(&source).unwrap_err();
        assert!(
            matches!(
                err,
                ShaderError::Compilation { .. } | ShaderError::CompilerUnavailable
            ),
            "{err}"
        );
    }

    #[test]
    fn decode_rejects_bad_binaries() {
        let bytes = |words: &[u32]| bytemuck::cast_slice::<u32, u8>(words).to_vec();

        assert_eq!(decode_spirv(&[]), None);
        assert_eq!(decode_spirv(&SPIRV_MAGIC.to_ne_bytes()[..3]), None);
        assert_eq!(decode_spirv(&bytes(&[0, 0, 0, 0, 0])), None);
        // Magic present but shorter than a header.
        assert_eq!(decode_spirv(&bytes(&[SPIRV_MAGIC])), None);
        assert_eq!(decode_spirv(&bytes(&[SPIRV_MAGIC, 1, 0, 0])), None);
        // Not a whole number of words.
        let mut ragged = bytes(&fake_module());
        ragged.push(0);
        assert_eq!(decode_spirv(&ragged), None);

        assert_eq!(decode_spirv(&bytes(&fake_module())), Some(fake_module()));
    }

    #[test]
    fn missing_source_is_io_error() {
        let tmp = TempDir::new("missing");
        let cache = ShaderCache::new(tmp.0.join("compiled"));
        assert!(matches!(
            cache.load(tmp.0.join("absent.vert")),
            Err(ShaderError::Io { .. })
        ));
    }

    #[test]
    fn unknown_stage_checked_first() {
        let tmp = TempDir::new("stage");
        let source = tmp.write("quad.glsl", MINIMAL_VERTEX.as_bytes());
        let cache = ShaderCache::new(tmp.0.join("compiled"));
        assert!(matches!(
            cache.load(&source),
            Err(ShaderError::UnknownStage(_))
        ));
        assert!(!cache.dir().exists());
    }

    #[test]
    fn miss_compiles_and_persists() {
        let tmp = TempDir::new("miss");
        let source = tmp.write("minimal.vert", MINIMAL_VERTEX.as_bytes());
        let cache = ShaderCache::new(tmp.0.join("compiled"));

        let words = cache.load(&source).unwrap();
        assert_eq!(words[0], SPIRV_MAGIC);

        let entry = cache.entry_path(MINIMAL_VERTEX.as_bytes());
        assert_eq!(fs::read(&entry).unwrap(), bytemuck::cast_slice::<u32, u8>(&words));

        assert!(!entry.with_extension(PARTIAL_EXTENSION).exists());

        // A second load is served from the entry.
        fs::write(&entry, bytemuck::cast_slice::<u32, u8>(&fake_module())).unwrap();
        assert_eq!(cache.load(&source).unwrap(), fake_module());
    }

    #[test]
    fn truncated_entry_is_recompiled() {
        let tmp = TempDir::new("truncated");
        let source = tmp.write("minimal.vert", MINIMAL_VERTEX.as_bytes());
        let cache = ShaderCache::new(tmp.0.join("compiled"));
        let entry = cache.entry_path(MINIMAL_VERTEX.as_bytes());

        fs::create_dir_all(cache.dir()).unwrap();
        fs::write(&entry, SPIRV_MAGIC.to_ne_bytes()).unwrap();

        let words = cache.load(&source).unwrap();
        assert_eq!(words[0], SPIRV_MAGIC);
        assert!(words.len() > SPIRV_HEADER_WORDS);
        assert_eq!(fs::read(&entry).unwrap(), bytemuck::cast_slice::<u32, u8>(&words));
    }
}
