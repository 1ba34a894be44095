//! `Registry::load` performs the manifest load pipeline:
//! duplicate-key scan → parse → name validity → cross-type uniqueness →
//! file-existence warnings.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::dedupe::scan_duplicate_keys;
use crate::error::ManifestError;
use crate::model::{is_valid_name, DefinitionPointer, JobDef, Kind, ManifestFile, TaskPointer, WorkflowDef};

/// A loaded, validated manifest plus the directory it was loaded from (used
/// to resolve the relative `file` pointers in task/workflow/job entries).
pub struct Registry {
    base_dir: PathBuf,
    file: ManifestFile,
    /// Non-fatal warnings accumulated during `load` (missing referenced
    /// files). Surfaced to the caller for logging; never block execution.
    pub warnings: Vec<String>,
}

impl Registry {
    /// Load and validate a manifest from `path`.
    ///
    /// # Errors
    /// `DuplicateKeys`, `Parse`, `InvalidNames`, `DuplicateNames`.
    pub fn load(path: impl AsRef<Path>) -> Result<Registry, ManifestError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        // Step 1: duplicate-key scan.
        let offenses = scan_duplicate_keys(&text);
        if !offenses.is_empty() {
            return Err(ManifestError::DuplicateKeys(offenses));
        }

        // Step 2: parse.
        let file: ManifestFile = serde_json::from_str(&text)?;

        // Step 3: name validity.
        let mut invalid = Vec::new();
        for name in file.tasks.keys().chain(file.workflows.keys()).chain(file.jobs.keys()) {
            if !is_valid_name(name) {
                invalid.push(name.clone());
            }
        }
        if !invalid.is_empty() {
            invalid.sort();
            return Err(ManifestError::InvalidNames(invalid));
        }

        // Step 4: cross-type uniqueness.
        let mut seen: HashMap<&str, Kind> = HashMap::new();
        let mut duplicates = Vec::new();
        for (name, kind) in file
            .tasks
            .keys()
            .map(|n| (n.as_str(), Kind::Task))
            .chain(file.workflows.keys().map(|n| (n.as_str(), Kind::Workflow)))
            .chain(file.jobs.keys().map(|n| (n.as_str(), Kind::Job)))
        {
            if seen.insert(name, kind).is_some() {
                duplicates.push(name.to_string());
            }
        }
        if !duplicates.is_empty() {
            duplicates.sort();
            duplicates.dedup();
            return Err(ManifestError::DuplicateNames(duplicates));
        }

        // Step 5: file-existence — warnings only, never fatal.
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut warnings = Vec::new();
        for (name, ptr) in &file.tasks {
            check_file_exists(&base_dir, &ptr.file, "task", name, &mut warnings);
        }
        for (name, ptr) in &file.workflows {
            check_file_exists(&base_dir, &ptr.file, "workflow", name, &mut warnings);
        }
        for (name, ptr) in &file.jobs {
            check_file_exists(&base_dir, &ptr.file, "job", name, &mut warnings);
        }
        for warning in &warnings {
            warn!("{warning}");
        }

        Ok(Registry { base_dir, file, warnings })
    }

    pub fn get_task(&self, name: &str) -> Result<&TaskPointer, ManifestError> {
        self.file.tasks.get(name).ok_or_else(|| ManifestError::NotFound {
            kind: "task",
            name: name.to_string(),
        })
    }

    fn get_pointer(&self, name: &str, kind: &'static str, table: &HashMap<String, DefinitionPointer>) -> Result<DefinitionPointer, ManifestError> {
        table.get(name).cloned().ok_or_else(|| ManifestError::NotFound {
            kind,
            name: name.to_string(),
        })
    }

    /// Load and validate the on-disk definition for `name`.
    pub fn get_workflow_def(&self, name: &str) -> Result<WorkflowDef, ManifestError> {
        let ptr = self.get_pointer(name, "workflow", &self.file.workflows)?;
        let def: WorkflowDef = self.read_definition(&ptr.file)?;
        for step in def.all_steps() {
            if step.name == step.reference {
                return Err(ManifestError::SelfReferentialStep { step: step.name.clone() });
            }
        }
        Ok(def)
    }

    pub fn get_job_def(&self, name: &str) -> Result<JobDef, ManifestError> {
        let ptr = self.get_pointer(name, "job", &self.file.jobs)?;
        let def: JobDef = self.read_definition(&ptr.file)?;
        for step in def.all_steps() {
            if step.name == step.reference {
                return Err(ManifestError::SelfReferentialStep { step: step.name.clone() });
            }
        }
        Ok(def)
    }

    fn read_definition<T: serde::de::DeserializeOwned>(&self, relative_file: &str) -> Result<T, ManifestError> {
        let path = self.base_dir.join(relative_file);
        let text = std::fs::read_to_string(&path).map_err(|source| ManifestError::Io { path, source })?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn list_tasks(&self) -> Vec<&str> {
        self.file.tasks.keys().map(String::as_str).collect()
    }

    pub fn list_workflows(&self) -> Vec<&str> {
        self.file.workflows.keys().map(String::as_str).collect()
    }

    pub fn list_jobs(&self) -> Vec<&str> {
        self.file.jobs.keys().map(String::as_str).collect()
    }

    pub fn integrations(&self) -> &HashMap<String, serde_json::Value> {
        &self.file.integrations
    }
}

fn check_file_exists(base_dir: &Path, relative_file: &str, kind: &str, name: &str, warnings: &mut Vec<String>) {
    let path = base_dir.join(relative_file);
    if !path.exists() {
        warnings.push(format!(
            "{kind} '{name}' references missing file '{}'",
            path.display()
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_manifest(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("manifest.json");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn load_valid_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = r#"{
            "tasks": {"extract": {"file": "extract.sh", "runtime": "bash"}},
            "workflows": {},
            "jobs": {}
        }"#;
        let path = write_manifest(&dir, manifest);
        let registry = Registry::load(&path).expect("should load");
        assert_eq!(registry.list_tasks(), vec!["extract"]);
        assert_eq!(registry.warnings.len(), 1); // extract.sh doesn't exist
    }

    #[test]
    fn duplicate_top_level_tasks_key_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = "{\n  \"tasks\": {},\n  \"tasks\": {}\n}";
        let path = write_manifest(&dir, manifest);
        assert!(matches!(Registry::load(&path), Err(ManifestError::DuplicateKeys(_))));
    }

    #[test]
    fn invalid_name_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = r#"{"tasks": {"bad-name": {"file": "x.sh", "runtime": "bash"}}}"#;
        let path = write_manifest(&dir, manifest);
        assert!(matches!(Registry::load(&path), Err(ManifestError::InvalidNames(_))));
    }

    #[test]
    fn cross_type_duplicate_name_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = r#"{
            "tasks": {"shared": {"file": "x.sh", "runtime": "bash"}},
            "workflows": {"shared": {"file": "shared.json"}}
        }"#;
        let path = write_manifest(&dir, manifest);
        assert!(matches!(Registry::load(&path), Err(ManifestError::DuplicateNames(_))));
    }

    #[test]
    fn self_referential_step_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = r#"{"workflows": {"w": {"file": "w.json"}}}"#;
        write_manifest(&dir, manifest);
        let wf_path = dir.path().join("w.json");
        std::fs::write(&wf_path, r#"{"name": "w", "tasks": [{"name": "x", "reference": "x"}]}"#).unwrap();

        let registry = Registry::load(dir.path().join("manifest.json")).unwrap();
        assert!(matches!(
            registry.get_workflow_def("w"),
            Err(ManifestError::SelfReferentialStep { .. })
        ));
    }
}
