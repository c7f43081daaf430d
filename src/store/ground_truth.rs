//! YOLO-format ground-truth loader.
//!
//! Annotation layout: one `{image}.txt` per image with lines of
//! `class_id cx cy w h` in normalized center-form, plus a `classes.txt`
//! listing class names by id. Empty annotation files are valid and mean
//! "verified, nothing present".

use crate::constants::dataset::{ANNOTATION_EXTENSION, CLASSES_FILE};
use crate::error::{Error, Result};
use crate::geometry::BoundingBox;
use crate::matching::GroundTruth;
use crate::store::{GroundTruthProvider, ImageEntry};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Ground-truth provider reading YOLO annotations from one directory.
#[derive(Debug)]
pub struct YoloGroundTruth {
    dir: PathBuf,
    classes: Vec<String>,
}

impl YoloGroundTruth {
    /// Open a ground-truth directory and read its class list.
    pub fn open(dir: &Path) -> Result<Self> {
        let classes_path = dir.join(CLASSES_FILE);
        let content =
            std::fs::read_to_string(&classes_path).map_err(|source| Error::ConfigRead {
                path: classes_path,
                source,
            })?;
        let classes: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect();

        Ok(Self {
            dir: dir.to_path_buf(),
            classes,
        })
    }

    fn annotation_path(&self, image: &str) -> PathBuf {
        self.dir
            .join(Path::new(image).with_extension(ANNOTATION_EXTENSION))
    }

    fn parse_line(&self, path: &Path, line_no: usize, line: &str) -> Result<GroundTruth> {
        let malformed = |message: String| Error::AnnotationParse {
            path: path.to_path_buf(),
            message: format!("line {line_no}: {message}"),
        };

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(malformed(format!(
                "expected 5 fields (class cx cy w h), got {}",
                fields.len()
            )));
        }

        let class_id: u32 = fields[0]
            .parse()
            .map_err(|_| malformed(format!("invalid class id '{}'", fields[0])))?;
        let mut values = [0.0f64; 4];
        for (slot, field) in values.iter_mut().zip(&fields[1..]) {
            *slot = field
                .parse()
                .map_err(|_| malformed(format!("invalid coordinate '{field}'")))?;
        }

        let bbox = BoundingBox::from_center(values[0], values[1], values[2], values[3])
            .map_err(|e| malformed(e.to_string()))?;
        let class_name = self
            .classes
            .get(class_id as usize)
            .cloned()
            .unwrap_or_else(|| format!("class_{class_id}"));

        Ok(GroundTruth {
            bbox,
            class_id,
            class_name,
        })
    }
}

impl GroundTruthProvider for YoloGroundTruth {
    fn list_images(&self) -> Result<Vec<ImageEntry>> {
        let mut entries = Vec::new();
        for dir_entry in std::fs::read_dir(&self.dir)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            let is_annotation = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(ANNOTATION_EXTENSION));
            let is_classes_file = path.file_name().is_some_and(|n| n == CLASSES_FILE);
            if !path.is_file() || !is_annotation || is_classes_file {
                continue;
            }

            let filename = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let captured_at: Option<DateTime<Utc>> = dir_entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::from);

            entries.push(ImageEntry {
                filename,
                captured_at,
            });
        }

        // Directory order is filesystem-dependent; sort for determinism.
        entries.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(entries)
    }

    fn load(&self, image: &str) -> Result<Vec<GroundTruth>> {
        let path = self.annotation_path(image);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)?;

        let mut boxes = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            boxes.push(self.parse_line(&path, line_no + 1, line)?);
        }
        Ok(boxes)
    }

    fn class_names(&self) -> &[String] {
        &self.classes
    }
}
