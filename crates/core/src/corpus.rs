use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::CurationConfig;
use crate::error::{Error, Result};

/// The image identifiers found in a review directory, plus the layout needed
/// to resolve each id's sidecar files.
#[derive(Debug, Clone)]
pub struct Corpus {
    dir: PathBuf,
    ids: Vec<String>,
    images: HashMap<String, PathBuf>,
    image_extensions: Vec<String>,
    prompt_extension: String,
    feature_extension: String,
}

/// Display payload for one identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusItem {
    pub id: String,
    pub image_path: PathBuf,
    pub prompt: Option<String>,
}

impl Corpus {
    /// Scan the top level of `dir` for images. Ids come back sorted.
    pub fn discover(dir: &Path, config: &CurationConfig) -> Result<Self> {
        if !dir.exists() {
            return Err(Error::CorpusNotFound(dir.to_path_buf()));
        }
        if !dir.is_dir() {
            return Err(Error::CorpusNotDirectory(dir.to_path_buf()));
        }

        let image_extensions: Vec<String> = config
            .image_extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();

        let mut images = HashMap::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Some(ext) = path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase())
            else {
                continue;
            };
            if !image_extensions.contains(&ext) {
                continue;
            }
            if let Some(stem) = path.file_stem() {
                images
                    .entry(stem.to_string_lossy().to_string())
                    .or_insert_with(|| path.to_path_buf());
            }
        }
        let mut ids: Vec<String> = images.keys().cloned().collect();
        ids.sort();

        Ok(Self {
            dir: dir.to_path_buf(),
            ids,
            images,
            image_extensions,
            prompt_extension: config.prompt_extension.trim_start_matches('.').to_string(),
            feature_extension: config.feature_extension.trim_start_matches('.').to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Image file for `id`. Ids not seen during discovery get the first
    /// configured extension.
    pub fn image_path(&self, id: &str) -> PathBuf {
        if let Some(path) = self.images.get(id) {
            return path.clone();
        }
        let ext = self.image_extensions.first().map(String::as_str).unwrap_or("jpg");
        self.dir.join(format!("{id}.{ext}"))
    }

    pub fn prompt_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{}", self.prompt_extension))
    }

    pub fn feature_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{}", self.feature_extension))
    }

    /// Prompt text for `id`: the last non-empty line of its sidecar, if any.
    pub fn prompt(&self, id: &str) -> Option<String> {
        let text = fs::read_to_string(self.prompt_path(id)).ok()?;
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .map(str::to_string)
    }

    pub fn item(&self, id: &str) -> CorpusItem {
        CorpusItem {
            id: id.to_string(),
            image_path: self.image_path(id),
            prompt: self.prompt(id),
        }
    }

    /// Load the feature vector sidecar for `id`.
    pub fn load_features(&self, id: &str) -> Result<Vec<f32>> {
        let path = self.feature_path(id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::MissingFeature(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let features: Vec<f32> =
            serde_json::from_slice(&bytes).map_err(|e| Error::InvalidFeature {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        if features.is_empty() {
            return Err(Error::InvalidFeature {
                id: id.to_string(),
                reason: "empty feature vector".to_string(),
            });
        }
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus_dir() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        fs::write(dir.join("b.jpg"), b"img").unwrap();
        fs::write(dir.join("a.PNG"), b"img").unwrap();
        fs::write(dir.join("c.webp"), b"img").unwrap();
        fs::write(dir.join("b.txt"), "first line\nsecond line\n\n").unwrap();
        fs::write(dir.join("notes.md"), b"skip").unwrap();
        fs::write(dir.join("a.features.json"), "[0.5, 1.0, -2]").unwrap();
        fs::create_dir(dir.join("nested")).unwrap();
        fs::write(dir.join("nested/deep.jpg"), b"img").unwrap();
        tmp
    }

    #[test]
    fn test_discover_top_level_images_sorted() {
        let tmp = corpus_dir();
        let corpus = Corpus::discover(tmp.path(), &CurationConfig::default()).unwrap();
        assert_eq!(corpus.ids(), &["a", "b", "c"]);
        assert_eq!(corpus.len(), 3);
    }

    #[test]
    fn test_discover_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Corpus::discover(&tmp.path().join("nope"), &CurationConfig::default())
            .unwrap_err();
        assert!(matches!(err, Error::CorpusNotFound(_)));
    }

    #[test]
    fn test_discover_file_not_dir() {
        let tmp = corpus_dir();
        let err = Corpus::discover(&tmp.path().join("b.jpg"), &CurationConfig::default())
            .unwrap_err();
        assert!(matches!(err, Error::CorpusNotDirectory(_)));
    }

    #[test]
    fn test_item_resolves_image_and_prompt() {
        let tmp = corpus_dir();
        let corpus = Corpus::discover(tmp.path(), &CurationConfig::default()).unwrap();

        let b = corpus.item("b");
        assert_eq!(b.image_path, tmp.path().join("b.jpg"));
        assert_eq!(b.prompt.as_deref(), Some("second line"));

        let a = corpus.item("a");
        assert_eq!(a.image_path, tmp.path().join("a.PNG"));
        assert_eq!(a.prompt, None);
    }

    #[test]
    fn test_load_features() {
        let tmp = corpus_dir();
        let corpus = Corpus::discover(tmp.path(), &CurationConfig::default()).unwrap();
        assert_eq!(corpus.load_features("a").unwrap(), vec![0.5, 1.0, -2.0]);
    }

    #[test]
    fn test_load_features_missing_and_invalid() {
        let tmp = corpus_dir();
        fs::write(tmp.path().join("c.features.json"), "{not json").unwrap();
        let corpus = Corpus::discover(tmp.path(), &CurationConfig::default()).unwrap();

        assert!(matches!(
            corpus.load_features("b").unwrap_err(),
            Error::MissingFeature(id) if id == "b"
        ));
        assert!(matches!(
            corpus.load_features("c").unwrap_err(),
            Error::InvalidFeature { .. }
        ));
    }
}
