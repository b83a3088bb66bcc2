//! Artifact catalogs
//!
//! A catalog answers one question at init time - which version suffixes of a
//! slug already exist - and accepts finished artifacts for publication.
//! `DirCatalog` is the production filesystem store; `MemoryCatalog` backs
//! tests and embedders.

use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use dashmap::DashMap;
use regex::Regex;
use tracing::info;

use rulec_core::ArtifactRef;

use crate::error::{EmitError, EmitResult};

/// One finished artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Slugified rule name
    pub slug: String,

    /// Version suffix
    pub version: u32,

    /// Complete program text
    pub source: String,
}

impl Artifact {
    /// File name the artifact publishes under
    pub fn file_name(&self) -> String {
        format!("{}_v{}.py", self.slug, self.version)
    }

    /// Persistence handle
    pub fn to_ref(&self) -> ArtifactRef {
        ArtifactRef {
            slug: self.slug.clone(),
            version: self.version,
        }
    }
}

/// Where artifacts live between compiler runs
pub trait ArtifactCatalog {
    /// Every version suffix already published for a slug
    fn versions(&self, slug: &str) -> Vec<u32>;

    /// Publish one finished artifact; never overwrites
    fn publish(&self, artifact: &Artifact) -> EmitResult<()>;
}

fn artifact_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?P<slug>.+)_v(?P<version>\d+)\.py$").expect("valid regex"))
}

/// Parse `<slug>_v<version>.py`
fn parse_file_name(file_name: &str) -> Option<(String, u32)> {
    let captures = artifact_name_re().captures(file_name)?;
    let version = captures.name("version")?.as_str().parse().ok()?;
    Some((captures.name("slug")?.as_str().to_string(), version))
}

/// Filesystem-backed catalog: one directory, one file per artifact
pub struct DirCatalog {
    root: PathBuf,
}

impl DirCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Full path an artifact publishes to
    pub fn path_for(&self, artifact: &Artifact) -> PathBuf {
        self.root.join(artifact.file_name())
    }
}

impl ArtifactCatalog for DirCatalog {
    fn versions(&self, slug: &str) -> Vec<u32> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            // A catalog directory that does not exist yet simply has no
            // published versions.
            return Vec::new();
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                parse_file_name(name.to_str()?)
            })
            .filter(|(found, _)| found == slug)
            .map(|(_, version)| version)
            .collect()
    }

    fn publish(&self, artifact: &Artifact) -> EmitResult<()> {
        fs::create_dir_all(&self.root).map_err(|source| EmitError::Io {
            path: self.root.clone(),
            source,
        })?;

        let path = self.path_for(artifact);
        if path.exists() {
            return Err(EmitError::ArtifactExists {
                file_name: artifact.file_name(),
            });
        }

        fs::write(&path, &artifact.source).map_err(|source| EmitError::Io {
            path: path.clone(),
            source,
        })?;

        info!(artifact = %artifact.file_name(), "published artifact");
        Ok(())
    }
}

/// In-memory catalog keyed by file name
pub struct MemoryCatalog {
    artifacts: DashMap<String, Artifact>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self {
            artifacts: DashMap::new(),
        }
    }

    /// Fetch a published artifact by file name
    pub fn get(&self, file_name: &str) -> Option<Artifact> {
        self.artifacts.get(file_name).map(|a| a.value().clone())
    }

    /// Number of published artifacts
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactCatalog for MemoryCatalog {
    fn versions(&self, slug: &str) -> Vec<u32> {
        self.artifacts
            .iter()
            .filter(|entry| entry.value().slug == slug)
            .map(|entry| entry.value().version)
            .collect()
    }

    fn publish(&self, artifact: &Artifact) -> EmitResult<()> {
        let file_name = artifact.file_name();
        if self.artifacts.contains_key(&file_name) {
            return Err(EmitError::ArtifactExists { file_name });
        }
        self.artifacts.insert(file_name, artifact.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(slug: &str, version: u32) -> Artifact {
        Artifact {
            slug: slug.to_string(),
            version,
            source: format!("# {slug} v{version}\n"),
        }
    }

    #[test]
    fn test_parse_file_name() {
        assert_eq!(
            parse_file_name("morning_lights_v12.py"),
            Some(("morning_lights".to_string(), 12))
        );
        assert_eq!(parse_file_name("README.md"), None);
    }

    #[test]
    fn test_memory_catalog_versions_and_overwrite_refusal() {
        let catalog = MemoryCatalog::new();
        catalog.publish(&artifact("rule", 1)).unwrap();
        catalog.publish(&artifact("rule", 2)).unwrap();
        catalog.publish(&artifact("other", 7)).unwrap();

        let mut versions = catalog.versions("rule");
        versions.sort_unstable();
        assert_eq!(versions, vec![1, 2]);

        let err = catalog.publish(&artifact("rule", 2)).unwrap_err();
        assert!(matches!(err, EmitError::ArtifactExists { .. }));
    }

    #[test]
    fn test_dir_catalog_scans_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = DirCatalog::new(dir.path());

        // Pre-existing artifacts from earlier runs, plus an unrelated file.
        std::fs::write(dir.path().join("rule_v3.py"), "# old\n").unwrap();
        std::fs::write(dir.path().join("rule_v10.py"), "# older\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "n/a").unwrap();

        let mut versions = catalog.versions("rule");
        versions.sort_unstable();
        assert_eq!(versions, vec![3, 10]);
        assert!(catalog.versions("unknown").is_empty());
    }

    #[test]
    fn test_dir_catalog_publish_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = DirCatalog::new(dir.path());

        catalog.publish(&artifact("rule", 1)).unwrap();
        let err = catalog.publish(&artifact("rule", 1)).unwrap_err();
        assert!(matches!(err, EmitError::ArtifactExists { .. }));

        let written = std::fs::read_to_string(dir.path().join("rule_v1.py")).unwrap();
        assert_eq!(written, "# rule v1\n");
    }

    #[test]
    fn test_missing_dir_means_no_versions() {
        let catalog = DirCatalog::new("/nonexistent/rulec-artifacts");
        assert!(catalog.versions("rule").is_empty());
    }
}
