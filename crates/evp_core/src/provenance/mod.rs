use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AppError;

/// One citation recorded by the upstream draft generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvenanceCitation {
    pub filename: String,
    pub page: u32,
    pub line: u32,
    pub excerpt: String,
}

/// Field path (e.g. `characteristics[3].nominal`) → citations backing that field.
pub type ProvenanceMap = BTreeMap<String, Vec<ProvenanceCitation>>;

pub trait ProvenanceSource: Send + Sync {
    /// `None` when nothing was ever recorded for `case_id`.
    fn list_provenance_citations(&self, case_id: &str) -> Result<Option<ProvenanceMap>, AppError>;
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct DraftRecord {
    case_id: Option<String>,
    car_id: Option<String>,
    bundle: DraftBundle,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct DraftBundle {
    provenance: BTreeMap<String, Vec<RawCitation>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawCitation {
    filename: Option<String>,
    page: Option<serde_json::Value>,
    line: Option<serde_json::Value>,
    excerpt: Option<String>,
}

fn lenient_u32(v: Option<&serde_json::Value>) -> u32 {
    let n = match v {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    match n {
        Some(n) if n >= 1 => n.min(u32::MAX as u64) as u32,
        _ => 1,
    }
}

/// Reads `*.json` draft records from a directory, one file per generated draft.
#[derive(Debug, Clone)]
pub struct DraftDirProvenance {
    dir: PathBuf,
}

impl DraftDirProvenance {
    pub fn open(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn list_draft_files(&self) -> Result<Vec<PathBuf>, AppError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            AppError::new("PROVENANCE_READ_FAILED", "Failed to read drafts directory")
                .with_details(format!("path={}; err={}", self.dir.display(), e))
        })?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                AppError::new("PROVENANCE_READ_FAILED", "Failed to read drafts directory entry")
                    .with_details(format!("path={}; err={}", self.dir.display(), e))
            })?;
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|x| x.to_str()) == Some("json") {
                files.push(path);
            }
        }
        // read_dir order is filesystem-dependent.
        files.sort();
        Ok(files)
    }
}

impl ProvenanceSource for DraftDirProvenance {
    fn list_provenance_citations(&self, case_id: &str) -> Result<Option<ProvenanceMap>, AppError> {
        if !self.dir.is_dir() {
            return Ok(None);
        }

        let mut out: ProvenanceMap = BTreeMap::new();
        let mut matched = false;
        for path in self.list_draft_files()? {
            let bytes = match fs::read(&path) {
                Ok(b) => b,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable draft record");
                    continue;
                }
            };
            let draft: DraftRecord = match serde_json::from_slice(&bytes) {
                Ok(d) => d,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping malformed draft record");
                    continue;
                }
            };
            let draft_case = draft.case_id.as_deref().or(draft.car_id.as_deref());
            if draft_case != Some(case_id) {
                continue;
            }
            matched = true;
            debug!(path = %path.display(), fields = draft.bundle.provenance.len(), "reading draft provenance");

            for (field_path, cits) in draft.bundle.provenance {
                let bucket = out.entry(field_path).or_default();
                for c in cits {
                    let filename = c.filename.unwrap_or_default();
                    if filename.trim().is_empty() {
                        continue;
                    }
                    bucket.push(ProvenanceCitation {
                        filename,
                        page: lenient_u32(c.page.as_ref()),
                        line: lenient_u32(c.line.as_ref()),
                        excerpt: c.excerpt.unwrap_or_default(),
                    });
                }
            }
        }

        Ok(matched.then_some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reads_only_matching_case_in_file_order() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        fs::write(
            dir.join("b.json"),
            r#"{"car_id":"CAR-1","bundle":{"provenance":{"f.a":[{"filename":"x.txt","page":"2","line":7,"excerpt":"second"}]}}}"#,
        )
        .unwrap();
        fs::write(
            dir.join("a.json"),
            r#"{"case_id":"CAR-1","bundle":{"provenance":{"f.a":[{"filename":"x.txt","page":1,"line":null,"excerpt":"first"},{"filename":"","page":1}]}}}"#,
        )
        .unwrap();
        fs::write(dir.join("c.json"), r#"{"case_id":"OTHER","bundle":{"provenance":{"f.b":[{"filename":"y.txt"}]}}}"#).unwrap();
        fs::write(dir.join("broken.json"), "{not json").unwrap();

        let src = DraftDirProvenance::open(dir.to_path_buf());
        let map = src.list_provenance_citations("CAR-1").unwrap().expect("matched");
        assert_eq!(map.len(), 1);
        let cits = &map["f.a"];
        assert_eq!(cits.len(), 2);
        assert_eq!((cits[0].excerpt.as_str(), cits[0].page, cits[0].line), ("first", 1, 1));
        assert_eq!((cits[1].excerpt.as_str(), cits[1].page, cits[1].line), ("second", 2, 7));
    }

    #[test]
    fn unknown_case_and_missing_dir_are_none() {
        let tmp = tempfile::tempdir().unwrap();
        let src = DraftDirProvenance::open(tmp.path().join("absent"));
        assert_eq!(src.list_provenance_citations("X").unwrap(), None);

        let src = DraftDirProvenance::open(tmp.path().to_path_buf());
        assert_eq!(src.list_provenance_citations("X").unwrap(), None);
    }
}
