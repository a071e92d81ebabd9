use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::app::adb::command::Tool;
use crate::app::error::AppError;

/// Source of the platform binaries shipped with the application.
pub trait ResourceBundle: Send + Sync {
    /// Returns the bytes stored at `relative_path` (`<os>/<arch>/<file>`), if bundled.
    fn load(&self, relative_path: &str) -> Option<Vec<u8>>;
}

/// Bundle backed by a directory tree on disk.
pub struct DirectoryBundle {
    root: PathBuf,
}

impl DirectoryBundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ResourceBundle for DirectoryBundle {
    fn load(&self, relative_path: &str) -> Option<Vec<u8>> {
        let path = relative_path
            .split('/')
            .fold(self.root.clone(), |acc, segment| acc.join(segment));
        if !path.is_file() {
            return None;
        }
        fs::read(path).ok()
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
pub enum Architecture {
    Arm64,
    X86_64,
}

impl Architecture {
    pub fn normalize(raw: &str) -> Self {
        let value = raw.trim().to_lowercase();
        match value.as_str() {
            "aarch64" | "arm64" | "arm64-v8a" => Architecture::Arm64,
            _ if value.starts_with("armv8") => Architecture::Arm64,
            "x86_64" | "amd64" | "x64" | "x86-64" => Architecture::X86_64,
            _ => {
                warn!(arch = %raw, "unrecognized cpu architecture; using x86_64 binaries");
                Architecture::X86_64
            }
        }
    }

    pub fn current() -> Self {
        Self::normalize(std::env::consts::ARCH)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Architecture::Arm64 => "arm64",
            Architecture::X86_64 => "x86_64",
        }
    }
}

pub fn current_os_tag() -> &'static str {
    match std::env::consts::OS {
        "macos" => "macos",
        "windows" => "windows",
        _ => "linux",
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BinaryHandle {
    pub path: PathBuf,
    pub architecture: Architecture,
}

/// Extracts bundled binaries into the per-user cache and remembers where they went.
///
/// The map is guarded by a single mutex held across extraction, so concurrent first
/// calls for a tool copy the file at most once and all observe the same handle.
/// Failed resolutions stay cached for the resolver's lifetime.
pub struct BinaryResolver {
    bundle: Box<dyn ResourceBundle>,
    cache_dir: PathBuf,
    os: String,
    architecture: Architecture,
    resolved: Mutex<HashMap<Tool, Result<BinaryHandle, AppError>>>,
}

impl BinaryResolver {
    pub fn new(bundle: Box<dyn ResourceBundle>, cache_dir: impl Into<PathBuf>) -> Self {
        Self::with_platform(bundle, cache_dir, current_os_tag(), Architecture::current())
    }

    pub fn with_platform(
        bundle: Box<dyn ResourceBundle>,
        cache_dir: impl Into<PathBuf>,
        os: &str,
        architecture: Architecture,
    ) -> Self {
        Self {
            bundle,
            cache_dir: cache_dir.into(),
            os: os.to_string(),
            architecture,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn resolve(&self, tool: Tool, trace_id: &str) -> Result<BinaryHandle, AppError> {
        let mut guard = self
            .resolved
            .lock()
            .map_err(|_| AppError::system("Binary resolver lock poisoned", trace_id))?;

        match guard.get(&tool) {
            Some(Ok(handle)) if is_executable(&handle.path) => return Ok(handle.clone()),
            Some(Ok(handle)) => {
                debug!(
                    trace_id = %trace_id,
                    tool = %tool,
                    path = %handle.path.display(),
                    "cached binary missing or not executable; extracting again"
                );
            }
            Some(Err(err)) => return Err(err.clone().with_trace_id(trace_id)),
            None => {}
        }

        let outcome = self.extract(tool);
        match &outcome {
            Ok(handle) => info!(
                trace_id = %trace_id,
                tool = %tool,
                path = %handle.path.display(),
                "resolved bundled binary"
            ),
            Err(err) => error!(
                trace_id = %trace_id,
                tool = %tool,
                error = %err.error,
                "bundled binary unavailable"
            ),
        }
        guard.insert(tool, outcome.clone());
        outcome.map_err(|err| err.with_trace_id(trace_id))
    }

    fn resource_path(&self, tool: Tool) -> String {
        format!(
            "{}/{}/{}",
            self.os,
            self.architecture.tag(),
            tool.file_name(&self.os)
        )
    }

    fn extract(&self, tool: Tool) -> Result<BinaryHandle, AppError> {
        let relative = self.resource_path(tool);
        let bytes = self.bundle.load(&relative).ok_or_else(|| {
            AppError::resolution(format!("Bundled {tool} binary not found at {relative}"), "")
        })?;

        let target_dir = self
            .cache_dir
            .join(format!("{}-{}", self.os, self.architecture.tag()));
        fs::create_dir_all(&target_dir).map_err(|err| {
            AppError::resolution(format!("Failed to create binary cache dir: {err}"), "")
        })?;

        let target = target_dir.join(tool.file_name(&self.os));
        // Another process may be running this binary; an identical copy is left alone.
        if is_executable(&target) && fs::read(&target).is_ok_and(|existing| existing == bytes) {
            return Ok(BinaryHandle {
                path: target,
                architecture: self.architecture,
            });
        }

        let staging = target_dir.join(format!("{}.partial", tool.file_name(&self.os)));
        fs::write(&staging, &bytes).map_err(|err| {
            AppError::resolution(format!("Failed to extract {tool} binary: {err}"), "")
        })?;
        mark_executable(&staging).map_err(|err| {
            AppError::resolution(format!("Failed to make {tool} executable: {err}"), "")
        })?;
        fs::rename(&staging, &target).map_err(|err| {
            AppError::resolution(format!("Failed to install {tool} binary: {err}"), "")
        })?;

        if !is_executable(&target) {
            return Err(AppError::resolution(
                format!("{tool} binary at {} is not executable", target.display()),
                "",
            ));
        }

        Ok(BinaryHandle {
            path: target,
            architecture: self.architecture,
        })
    }
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    struct CountingBundle {
        inner: DirectoryBundle,
        loads: Arc<AtomicUsize>,
    }

    impl ResourceBundle for CountingBundle {
        fn load(&self, relative_path: &str) -> Option<Vec<u8>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load(relative_path)
        }
    }

    fn seed_bundle(root: &Path, tool: Tool, contents: &[u8]) -> PathBuf {
        let dir = root.join("linux").join("x86_64");
        fs::create_dir_all(&dir).expect("bundle dir");
        let path = dir.join(tool.file_name("linux"));
        fs::write(&path, contents).expect("bundle file");
        path
    }

    fn resolver(resources: &Path, cache: &Path) -> (BinaryResolver, Arc<AtomicUsize>) {
        let loads = Arc::new(AtomicUsize::new(0));
        let bundle = CountingBundle {
            inner: DirectoryBundle::new(resources),
            loads: Arc::clone(&loads),
        };
        let resolver = BinaryResolver::with_platform(
            Box::new(bundle),
            cache,
            "linux",
            Architecture::X86_64,
        );
        (resolver, loads)
    }

    #[test]
    fn normalizes_architectures() {
        assert_eq!(Architecture::normalize("aarch64"), Architecture::Arm64);
        assert_eq!(Architecture::normalize("ARM64"), Architecture::Arm64);
        assert_eq!(Architecture::normalize("armv8l"), Architecture::Arm64);
        assert_eq!(Architecture::normalize("x86_64"), Architecture::X86_64);
        assert_eq!(Architecture::normalize("AMD64"), Architecture::X86_64);
        assert_eq!(Architecture::normalize("riscv64"), Architecture::X86_64);
        assert_eq!(Architecture::normalize(""), Architecture::X86_64);
    }

    #[test]
    fn extracts_once_and_reuses_cached_path() {
        let resources = tempfile::TempDir::new().expect("resources");
        let cache = tempfile::TempDir::new().expect("cache");
        let source = seed_bundle(resources.path(), Tool::Adb, b"first");
        let (resolver, loads) = resolver(resources.path(), cache.path());

        let first = resolver.resolve(Tool::Adb, "t").expect("resolve");
        assert!(first.path.starts_with(cache.path()));
        assert!(first.path.ends_with("linux-x86_64/adb"));
        assert_eq!(first.architecture, Architecture::X86_64);
        assert!(is_executable(&first.path));

        fs::write(&source, b"second").expect("rewrite bundle");
        let second = resolver.resolve(Tool::Adb, "t").expect("resolve again");
        assert_eq!(first, second);
        assert_eq!(fs::read(&second.path).expect("read"), b"first");
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[cfg(unix)]
    #[test]
    fn identical_cached_binary_is_reused_across_resolvers() {
        use std::os::unix::fs::MetadataExt;

        let resources = tempfile::TempDir::new().expect("resources");
        let cache = tempfile::TempDir::new().expect("cache");
        seed_bundle(resources.path(), Tool::Adb, b"adb-binary");

        let (first_resolver, _) = resolver(resources.path(), cache.path());
        let first = first_resolver.resolve(Tool::Adb, "t").expect("resolve");
        let inode = fs::metadata(&first.path).expect("meta").ino();

        let (second_resolver, _) = resolver(resources.path(), cache.path());
        let second = second_resolver.resolve(Tool::Adb, "t").expect("resolve");
        assert_eq!(first.path, second.path);
        assert_eq!(fs::metadata(&second.path).expect("meta").ino(), inode);
    }

    #[test]
    fn changed_bundle_replaces_stale_cached_binary() {
        let resources = tempfile::TempDir::new().expect("resources");
        let cache = tempfile::TempDir::new().expect("cache");
        let source = seed_bundle(resources.path(), Tool::Adb, b"old");

        let (first_resolver, _) = resolver(resources.path(), cache.path());
        first_resolver.resolve(Tool::Adb, "t").expect("resolve");

        fs::write(&source, b"new-build").expect("rewrite bundle");
        let (second_resolver, _) = resolver(resources.path(), cache.path());
        let handle = second_resolver.resolve(Tool::Adb, "t").expect("resolve");
        assert_eq!(fs::read(&handle.path).expect("read"), b"new-build");
        assert!(is_executable(&handle.path));
    }

    #[test]
    fn re_extracts_when_cached_file_disappears() {
        let resources = tempfile::TempDir::new().expect("resources");
        let cache = tempfile::TempDir::new().expect("cache");
        seed_bundle(resources.path(), Tool::Scrcpy, b"bin");
        let (resolver, loads) = resolver(resources.path(), cache.path());

        let first = resolver.resolve(Tool::Scrcpy, "t").expect("resolve");
        fs::remove_file(&first.path).expect("remove");
        let second = resolver.resolve(Tool::Scrcpy, "t").expect("resolve again");
        assert_eq!(first.path, second.path);
        assert!(second.path.is_file());
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_resource_is_a_cached_resolution_error() {
        let resources = tempfile::TempDir::new().expect("resources");
        let cache = tempfile::TempDir::new().expect("cache");
        let (resolver, loads) = resolver(resources.path(), cache.path());

        let err = resolver.resolve(Tool::Aapt, "t-1").unwrap_err();
        assert_eq!(err.code, "ERR_RESOLUTION");
        assert_eq!(err.trace_id, "t-1");
        assert!(err.error.contains("linux/x86_64/aapt2"));

        seed_bundle(resources.path(), Tool::Aapt, b"late");
        let again = resolver.resolve(Tool::Aapt, "t-2").unwrap_err();
        assert_eq!(again.code, "ERR_RESOLUTION");
        assert_eq!(again.trace_id, "t-2");
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_first_resolution_copies_once() {
        let resources = tempfile::TempDir::new().expect("resources");
        let cache = tempfile::TempDir::new().expect("cache");
        seed_bundle(resources.path(), Tool::Adb, b"bin");
        let (resolver, loads) = resolver(resources.path(), cache.path());
        let resolver = Arc::new(resolver);

        let handles = (0..8)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                thread::spawn(move || resolver.resolve(Tool::Adb, "t").expect("resolve"))
            })
            .collect::<Vec<_>>();
        let paths = handles
            .into_iter()
            .map(|handle| handle.join().expect("join").path)
            .collect::<Vec<_>>();

        assert!(paths.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }
}
