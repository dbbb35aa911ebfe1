//! Project manifests and the incremental build cache
//!
//! A project is a `.sproj` TOML manifest naming the output module and the
//! `.sb` sources that make it up. The cache is what makes the build
//! service worth keeping alive: parse results are keyed by file
//! modification time, so a rebuild of an unchanged tree reparses nothing.

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use sable_core::ModuleImage;

use crate::codegen;
use crate::diagnostics::{codes, Diagnostic};
use crate::error::{BuildError, BuildResult};
use crate::parser;

#[derive(Debug, Deserialize)]
struct ManifestFile {
    project: ProjectSection,
}

#[derive(Debug, Deserialize)]
struct ProjectSection {
    name: String,
    sources: Vec<String>,
}

/// A loaded manifest with source paths resolved against its directory
#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub sources: Vec<PathBuf>,
}

impl Project {
    /// Parse a `.sproj` manifest
    pub fn load(manifest_path: &Path) -> BuildResult<Self> {
        let text = std::fs::read_to_string(manifest_path)?;
        let manifest: ManifestFile = toml::from_str(&text)?;
        let base = manifest_path.parent().unwrap_or_else(|| Path::new("."));
        Ok(Self {
            name: manifest.project.name,
            sources: manifest
                .project
                .sources
                .iter()
                .map(|source| base.join(source))
                .collect(),
        })
    }
}

/// Parsed contents of one source file
///
/// Lowering happens per build, not per parse: classifying a type name as
/// enum or reference needs the enum set of every source in the project,
/// so only the parse is cached.
struct CachedSource {
    mtime: SystemTime,
    filename: String,
    module: parser::SourceModule,
    diagnostics: Vec<Diagnostic>,
}

struct CachedProject {
    mtime: SystemTime,
    project: Project,
    sources: HashMap<PathBuf, CachedSource>,
}

/// Output of one project build
pub struct BuildOutput {
    pub image: ModuleImage,
    pub diagnostics: Vec<Diagnostic>,
}

/// Mtime-keyed cache of manifests and per-source parse results
///
/// Keyed by canonical manifest path so the same project reached through
/// different spellings shares one entry.
#[derive(Default)]
pub struct ProjectCache {
    projects: HashMap<PathBuf, CachedProject>,
    parses: u64,
    hits: u64,
}

impl ProjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of source files actually parsed since creation
    pub fn parse_count(&self) -> u64 {
        self.parses
    }

    /// Number of source parses served from cache since creation
    pub fn hit_count(&self) -> u64 {
        self.hits
    }

    /// Build a project, reusing every cached parse whose file is unchanged
    pub fn build(&mut self, manifest_path: &Path) -> BuildResult<BuildOutput> {
        let key = manifest_path
            .canonicalize()
            .map_err(BuildError::Io)?;
        let manifest_mtime = modified(&key)?;

        let stale = match self.projects.get(&key) {
            Some(cached) => cached.mtime != manifest_mtime,
            None => true,
        };
        if stale {
            let project = Project::load(&key)?;
            self.projects.insert(
                key.clone(),
                CachedProject {
                    mtime: manifest_mtime,
                    project,
                    sources: HashMap::new(),
                },
            );
        }

        let entry = self
            .projects
            .get_mut(&key)
            .ok_or_else(|| BuildError::Internal("project cache entry vanished".into()))?;

        for source_path in entry.project.sources.clone() {
            let mtime = modified(&source_path)?;
            let reusable = entry
                .sources
                .get(&source_path)
                .map(|cached| cached.mtime == mtime)
                .unwrap_or(false);

            if reusable {
                self.hits += 1;
            } else {
                let filename = source_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| source_path.display().to_string());
                let text = std::fs::read_to_string(&source_path)?;
                let parsed = parser::parse(&filename, &text);

                entry.sources.insert(
                    source_path.clone(),
                    CachedSource {
                        mtime,
                        filename,
                        module: parsed.module,
                        diagnostics: parsed.diagnostics,
                    },
                );
                self.parses += 1;
                tracing::debug!(source = %source_path.display(), "source parsed");
            }
        }

        // Every source contributes its enums before any source is
        // lowered, so a type declared in one file classifies correctly
        // in a sibling.
        let known_enums: HashSet<String> = entry
            .sources
            .values()
            .flat_map(|cached| cached.module.enums.iter().map(|e| e.name.clone()))
            .collect();

        let mut diagnostics = Vec::new();
        let mut image = ModuleImage::new(&entry.project.name);

        for source_path in &entry.project.sources {
            let cached = match entry.sources.get(source_path) {
                Some(cached) => cached,
                None => continue,
            };
            diagnostics.extend(cached.diagnostics.iter().cloned());

            let lowered = codegen::lower(&cached.filename, &cached.module, &known_enums);
            diagnostics.extend(lowered.diagnostics);

            for class in lowered.image.classes {
                if image.classes.iter().any(|c| c.name == class.name) {
                    diagnostics.push(Diagnostic::error(
                        source_path.display().to_string(),
                        1,
                        1,
                        codes::DUPLICATE_CLASS,
                        format!("class `{}` is defined in another source", class.name),
                    ));
                } else {
                    image.classes.push(class);
                }
            }
            image.enums.extend(lowered.image.enums);
        }

        Ok(BuildOutput { image, diagnostics })
    }
}

fn modified(path: &Path) -> BuildResult<SystemTime> {
    Ok(std::fs::metadata(path)?.modified()?)
}
