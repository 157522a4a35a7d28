//! Test helpers for building on-disk Go module fixtures.
//!
//! Resolver, planner, and pipeline tests all need a loadable module. These
//! helpers write one into a temp directory and hand back a ready loader,
//! so tests stay focused on the semantics under test.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::loader::DirLoader;

/// An on-disk Go module rooted in a temp directory.
///
/// The directory lives as long as the fixture; dropping it removes
/// everything.
pub struct ModuleFixture {
    dir: TempDir,
    module: String,
}

impl ModuleFixture {
    /// Create a module with the given module path.
    pub fn new(module: &str) -> Self {
        let dir = TempDir::new().expect("create fixture dir");
        fs::write(dir.path().join("go.mod"), format!("module {}\n", module))
            .expect("write go.mod");
        ModuleFixture {
            dir,
            module: module.to_string(),
        }
    }

    /// Write a package's files under `rel` (empty for the module root).
    pub fn package(&self, rel: &str, files: &[(&str, &str)]) -> &Self {
        let dir = self.path(rel);
        fs::create_dir_all(&dir).expect("create package dir");
        for (name, contents) in files {
            fs::write(dir.join(name), contents).expect("write fixture file");
        }
        self
    }

    /// Absolute path of a package directory.
    pub fn path(&self, rel: &str) -> PathBuf {
        if rel.is_empty() {
            self.dir.path().to_path_buf()
        } else {
            self.dir.path().join(rel)
        }
    }

    /// The module root directory.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Import path of a package directory.
    pub fn pkg_path(&self, rel: &str) -> String {
        if rel.is_empty() {
            self.module.clone()
        } else {
            format!("{}/{}", self.module, rel)
        }
    }

    /// A loader rooted at this module.
    pub fn loader(&self) -> DirLoader {
        DirLoader::new(self.dir.path()).expect("create loader")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::PackageLoader;

    #[test]
    fn fixture_round_trips_through_loader() {
        let fixture = ModuleFixture::new("example.com/app");
        fixture.package(
            "models",
            &[("user.go", "package models\n\ntype User struct{ ID int64 }\n")],
        );
        let mut loader = fixture.loader();
        let pkg = loader
            .load_deep(&fixture.pkg_path("models"))
            .expect("deep load");
        assert_eq!(pkg.name, "models");
        assert!(pkg.lookup("User").is_some());
    }
}
