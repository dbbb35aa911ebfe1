//! Sable Build - Compiler and Persistent Build Service
//!
//! This crate compiles `.sb` sources described by a `.sproj` manifest
//! into `.sbin` module images, and hosts the resident `sable-buildd`
//! service that compiles on request over a line-delimited JSON protocol.

pub mod codegen;
pub mod diagnostics;
pub mod error;
pub mod parser;
pub mod project;
pub mod service;

pub use codegen::{lower, CodegenResult};
pub use diagnostics::{Diagnostic, Severity};
pub use error::{BuildError, BuildResult};
pub use parser::{parse, ParseResult};
pub use project::{BuildOutput, Project, ProjectCache};
pub use service::{BuildRequest, BuildResponse, BuildService};

use std::path::Path;

/// Compile a project once, without a resident cache
///
/// Returns the reportable diagnostics and whether the image was emitted.
pub fn build_once(
    manifest_path: &Path,
    out_file: &Path,
) -> BuildResult<(bool, Vec<Diagnostic>)> {
    let mut cache = ProjectCache::new();
    let output = cache.build(manifest_path)?;
    let (visible, failed) = diagnostics::reportable(output.diagnostics);
    if failed {
        return Ok((false, visible));
    }
    std::fs::write(out_file, output.image.encode())?;
    Ok((true, visible))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_once_emits_loadable_image() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("player.sb"),
            "module demo\nclass demo.Player\n  field Health: i32 = 100\nend\n",
        )
        .unwrap();
        let manifest = dir.path().join("demo.sproj");
        std::fs::write(
            &manifest,
            "[project]\nname = \"demo\"\nsources = [\"player.sb\"]\n",
        )
        .unwrap();

        let out = dir.path().join("demo.sbin");
        let (success, diagnostics) = build_once(&manifest, &out).unwrap();
        assert!(success);
        assert!(diagnostics.is_empty());

        let image = sable_core::ModuleImage::decode(&std::fs::read(out).unwrap()).unwrap();
        assert_eq!(image.classes[0].name, "demo.Player");
    }
}
