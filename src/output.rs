//! JSON documents handed to the dashboard

use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::PipelineError;

pub const DATA_FILE: &str = "data.json";
pub const RECORDS_FILE: &str = "records.json";
pub const RAW_FILE: &str = "kobo_raw.json";

/// Pretty JSON with a trailing newline; non-ASCII labels are written as is
pub fn render_json<T: Serialize>(name: &str, value: &T) -> Result<String, PipelineError> {
    let mut json = serde_json::to_string_pretty(value).map_err(|e| PipelineError::Persist {
        path: PathBuf::from(name),
        source: io::Error::new(io::ErrorKind::InvalidData, e),
    })?;
    json.push('\n');
    Ok(json)
}

fn temp_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!(".{}.tmp", name))
}

fn remove_temps(paths: &[PathBuf]) {
    for path in paths {
        let _ = fs::remove_file(path);
    }
}

/// Write every `(file name, contents)` pair into `dir`, or none of them.
///
/// Contents go to hidden temporaries first and are renamed into place only once
/// all of them are on disk, so a reader never sees one fresh file next to a stale one
/// because the other write failed.
pub fn write_documents(dir: &Path, documents: &[(&str, String)]) -> Result<Vec<PathBuf>, PipelineError> {
    fs::create_dir_all(dir).map_err(|source| PipelineError::Persist {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut temps: Vec<PathBuf> = Vec::with_capacity(documents.len());
    for (name, contents) in documents {
        let temp = temp_path(dir, name);
        if let Err(source) = fs::write(&temp, contents) {
            remove_temps(&temps);
            let _ = fs::remove_file(&temp);
            return Err(PipelineError::Persist { path: temp, source });
        }
        debug!(path = %temp.display(), bytes = contents.len(), "staged document");
        temps.push(temp);
    }

    let mut written = Vec::with_capacity(documents.len());
    for (i, (name, _)) in documents.iter().enumerate() {
        let target = dir.join(name);
        if let Err(source) = fs::rename(&temps[i], &target) {
            remove_temps(&temps[i..]);
            return Err(PipelineError::Persist {
                path: target,
                source,
            });
        }
        written.push(target);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_json_keeps_unicode() {
        let json = render_json("x", &json!({"label": "Insécurité"})).unwrap();
        assert!(json.contains("Insécurité"));
        assert!(json.ends_with("}\n"));
    }

    #[test]
    fn test_write_documents() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("public");
        let written = write_documents(
            &out,
            &[(DATA_FILE, "{}\n".to_string()), (RECORDS_FILE, "[]\n".to_string())],
        )
        .unwrap();

        assert_eq!(written, vec![out.join(DATA_FILE), out.join(RECORDS_FILE)]);
        assert_eq!(fs::read_to_string(out.join(DATA_FILE)).unwrap(), "{}\n");
        assert_eq!(fs::read_to_string(out.join(RECORDS_FILE)).unwrap(), "[]\n");

        // No temporaries left behind
        let names: Vec<String> = fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn test_failed_write_leaves_existing_files_alone() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(DATA_FILE), "old").unwrap();
        // A directory where the second temporary should go makes that write fail
        fs::create_dir(temp_path(dir.path(), RECORDS_FILE)).unwrap();

        let err = write_documents(
            dir.path(),
            &[(DATA_FILE, "new".to_string()), (RECORDS_FILE, "new".to_string())],
        )
        .unwrap_err();

        assert!(matches!(err, PipelineError::Persist { .. }));
        assert_eq!(fs::read_to_string(dir.path().join(DATA_FILE)).unwrap(), "old");
        assert!(!dir.path().join(RECORDS_FILE).exists());
        assert!(!temp_path(dir.path(), DATA_FILE).exists());
    }
}
