//! Bundle Analysis
//!
//! Reads a build tool's own description of what it emitted and sizes each
//! emitted file. Two artifact shapes are understood:
//!
//! - **Manifest** (Vite style): `{ "<entry>": { "file": "...", "css": [..], "assets": [..] } }`.
//!   Files are resolved against the output directory and sized from disk.
//! - **Stats dump** (Webpack style): `{ "assets": [{ "name": "...", "size": 123 }], "time": 456 }`.
//!   Sizes are taken from the dump.
//!
//! HTML entry files are excluded so the comparison covers JS/CSS/asset weight.
//! Missing or unreadable artifacts yield an empty analysis rather than an error,
//! since the build may have failed upstream.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Where a build tool describes its output
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ArtifactSource {
    /// Entry → emitted file mapping
    Manifest {
        /// Manifest file location
        path: PathBuf,
    },
    /// List of emitted assets with sizes
    StatsDump {
        /// Stats file location
        path: PathBuf,
    },
    /// No artifact; chunk analysis is skipped
    #[default]
    #[serde(rename = "none")]
    Disabled,
}

/// One emitted output file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    /// Size of the emitted file
    pub size_bytes: u64,
    /// Extension without the dot (`js`, `css`, ...), empty when absent
    pub file_extension: String,
}

/// Emitted files keyed by output file name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleAnalysis {
    /// Emitted files, HTML excluded
    pub chunks: BTreeMap<String, ChunkInfo>,
    /// Build time the tool itself reported, when its artifact carries one
    pub tool_reported_time_ms: Option<u64>,
}

impl BundleAnalysis {
    /// Sum of all chunk sizes
    pub fn total_bytes(&self) -> u64 {
        self.chunks.values().map(|c| c.size_bytes).sum()
    }
}

/// Chunk bytes grouped by file extension
pub fn bytes_by_extension<'a>(chunks: impl IntoIterator<Item = &'a ChunkInfo>) -> BTreeMap<String, u64> {
    let mut totals = BTreeMap::new();
    for chunk in chunks {
        *totals.entry(chunk.file_extension.clone()).or_default() += chunk.size_bytes;
    }
    totals
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    file: Option<String>,
    #[serde(default)]
    css: Vec<String>,
    #[serde(default)]
    assets: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StatsDump {
    #[serde(default)]
    assets: Vec<StatsAsset>,
    time: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct StatsAsset {
    name: String,
    size: u64,
}

fn file_extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_string()
}

fn is_html(name: &str) -> bool {
    let ext = file_extension(name);
    ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm")
}

/// Reads one tool's output artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleAnalyzer {
    source: ArtifactSource,
    output_dir: PathBuf,
}

impl BundleAnalyzer {
    /// `output_dir` is where manifest references are resolved
    pub fn new(source: ArtifactSource, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            output_dir: output_dir.into(),
        }
    }

    /// Analyze the artifact. Never fails; problems are logged and produce an
    /// empty (or partial) analysis.
    pub fn analyze(&self) -> BundleAnalysis {
        match &self.source {
            ArtifactSource::Manifest { path } => self.analyze_manifest(path),
            ArtifactSource::StatsDump { path } => Self::analyze_stats_dump(path),
            ArtifactSource::Disabled => BundleAnalysis::default(),
        }
    }

    fn read_artifact<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Build artifact missing, skipping chunk analysis");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Build artifact unreadable, skipping chunk analysis");
                None
            }
        }
    }

    fn analyze_manifest(&self, path: &Path) -> BundleAnalysis {
        let Some(manifest) = Self::read_artifact::<BTreeMap<String, ManifestEntry>>(path) else {
            return BundleAnalysis::default();
        };

        let referenced: BTreeSet<String> = manifest
            .into_values()
            .flat_map(|entry| entry.file.into_iter().chain(entry.css).chain(entry.assets))
            .collect();

        let mut analysis = BundleAnalysis::default();
        for name in referenced {
            if is_html(&name) {
                continue;
            }
            let file_path = self.output_dir.join(&name);
            match std::fs::metadata(&file_path) {
                Ok(meta) if meta.is_file() => {
                    analysis.chunks.insert(
                        name.clone(),
                        ChunkInfo {
                            size_bytes: meta.len(),
                            file_extension: file_extension(&name),
                        },
                    );
                }
                _ => warn!(file = %file_path.display(), "Manifest references a missing file, skipping"),
            }
        }

        debug!(chunks = analysis.chunks.len(), "Manifest analyzed");
        analysis
    }

    fn analyze_stats_dump(path: &Path) -> BundleAnalysis {
        let Some(stats) = Self::read_artifact::<StatsDump>(path) else {
            return BundleAnalysis::default();
        };

        let chunks = stats
            .assets
            .into_iter()
            .filter(|asset| !is_html(&asset.name))
            .map(|asset| {
                let info = ChunkInfo {
                    size_bytes: asset.size,
                    file_extension: file_extension(&asset.name),
                };
                (asset.name, info)
            })
            .collect::<BTreeMap<_, _>>();

        debug!(chunks = chunks.len(), "Stats dump analyzed");
        BundleAnalysis {
            chunks,
            tool_reported_time_ms: stats.time,
        }
    }
}

/// Total size of the visible files in an output directory.
///
/// Hidden entries (such as a tool's `.vite/` metadata folder) are not part of
/// the shipped bundle and are skipped. A missing directory has size zero.
pub fn dist_size(dir: &Path) -> u64 {
    if !dir.exists() {
        return 0;
    }
    WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0 || !e.file_name().to_str().is_some_and(|n| n.starts_with('.'))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, bytes: usize) {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![b'x'; bytes]).unwrap();
    }

    #[test]
    fn test_manifest_sizes_from_disk() {
        let dist = tempfile::tempdir().unwrap();
        write(dist.path(), "assets/index-abc.js", 1200);
        write(dist.path(), "assets/vue-vendor-def.js", 5000);
        write(dist.path(), "assets/index-abc.css", 300);
        write(dist.path(), "assets/logo.png", 42);
        fs::create_dir_all(dist.path().join(".vite")).unwrap();
        fs::write(
            dist.path().join(".vite/manifest.json"),
            r#"{
                "index.html": {"file": "assets/index-abc.js", "css": ["assets/index-abc.css"], "assets": ["assets/logo.png"], "isEntry": true},
                "_vue-vendor.js": {"file": "assets/vue-vendor-def.js"}
            }"#,
        )
        .unwrap();

        let analyzer = BundleAnalyzer::new(
            ArtifactSource::Manifest {
                path: dist.path().join(".vite/manifest.json"),
            },
            dist.path(),
        );
        let analysis = analyzer.analyze();

        assert_eq!(analysis.chunks.len(), 4);
        assert_eq!(analysis.chunks["assets/index-abc.js"].size_bytes, 1200);
        assert_eq!(analysis.chunks["assets/index-abc.css"].file_extension, "css");
        assert_eq!(analysis.total_bytes(), 6542);
        assert_eq!(analysis.tool_reported_time_ms, None);
    }

    #[test]
    fn test_manifest_missing_file_is_skipped() {
        let dist = tempfile::tempdir().unwrap();
        write(dist.path(), "assets/present.js", 10);
        fs::write(
            dist.path().join("manifest.json"),
            r#"{"a": {"file": "assets/present.js"}, "b": {"file": "assets/removed.js"}}"#,
        )
        .unwrap();

        let analysis = BundleAnalyzer::new(
            ArtifactSource::Manifest {
                path: dist.path().join("manifest.json"),
            },
            dist.path(),
        )
        .analyze();

        assert_eq!(analysis.chunks.len(), 1);
        assert!(analysis.chunks.contains_key("assets/present.js"));
    }

    #[test]
    fn test_manifest_excludes_html() {
        let dist = tempfile::tempdir().unwrap();
        write(dist.path(), "index.html", 10);
        write(dist.path(), "app.js", 20);
        fs::write(
            dist.path().join("manifest.json"),
            r#"{"index.html": {"file": "index.html"}, "main": {"file": "app.js"}}"#,
        )
        .unwrap();

        let analysis = BundleAnalyzer::new(
            ArtifactSource::Manifest {
                path: dist.path().join("manifest.json"),
            },
            dist.path(),
        )
        .analyze();
        assert_eq!(analysis.chunks.keys().collect::<Vec<_>>(), vec!["app.js"]);
    }

    #[test]
    fn test_stats_dump() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("stats.json"),
            r#"{
                "time": 2345,
                "assets": [
                    {"name": "main.1a2b.js", "size": 1000},
                    {"name": "vue-vendor.3c4d.js", "size": 4000},
                    {"name": "index.html", "size": 500}
                ]
            }"#,
        )
        .unwrap();

        let analysis = BundleAnalyzer::new(
            ArtifactSource::StatsDump {
                path: dir.path().join("stats.json"),
            },
            dir.path().join("dist"),
        )
        .analyze();

        assert_eq!(analysis.chunks.len(), 2);
        assert_eq!(analysis.total_bytes(), 5000);
        assert_eq!(analysis.tool_reported_time_ms, Some(2345));
        assert_eq!(bytes_by_extension(analysis.chunks.values())["js"], 5000);
    }

    #[test]
    fn test_missing_artifact_is_empty() {
        for source in [
            ArtifactSource::Manifest {
                path: "/nonexistent/manifest.json".into(),
            },
            ArtifactSource::StatsDump {
                path: "/nonexistent/stats.json".into(),
            },
            ArtifactSource::Disabled,
        ] {
            let analysis = BundleAnalyzer::new(source, "/nonexistent").analyze();
            assert!(analysis.chunks.is_empty());
        }
    }

    #[test]
    fn test_malformed_artifact_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("stats.json"), "{ not json").unwrap();
        let analysis = BundleAnalyzer::new(
            ArtifactSource::StatsDump {
                path: dir.path().join("stats.json"),
            },
            dir.path(),
        )
        .analyze();
        assert_eq!(analysis, BundleAnalysis::default());
    }

    #[test]
    fn test_dist_size_skips_hidden() {
        let dist = tempfile::tempdir().unwrap();
        write(dist.path(), "index.html", 100);
        write(dist.path(), "assets/app.js", 900);
        write(dist.path(), ".vite/manifest.json", 5000);

        assert_eq!(dist_size(dist.path()), 1000);
        assert_eq!(dist_size(&dist.path().join("missing")), 0);
    }

    #[test]
    fn test_artifact_source_serde() {
        let source: ArtifactSource =
            serde_json::from_str(r#"{"kind": "stats-dump", "path": "stats.json"}"#).unwrap();
        assert_eq!(
            source,
            ArtifactSource::StatsDump {
                path: "stats.json".into()
            }
        );
        let none: ArtifactSource = serde_json::from_str(r#"{"kind": "none"}"#).unwrap();
        assert_eq!(none, ArtifactSource::Disabled);
    }
}
