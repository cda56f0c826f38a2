//! IaC and CI/CD adapters (class `iac`, `cicd`, §4.4.j): routed by path hint,
//! confirmed by content shape. Class and content must agree.

use camino::Utf8Path;
use weftend_capture::ArtifactCapture;

use crate::result::AdapterMode;
use crate::shared::{fail, ok, read_bounded, single_file_entry};
use crate::{Adapter, AdapterResult};

const MAX_CICD_BYTES: u64 = 2 * 1024 * 1024;

fn looks_like_cicd_workflow(text: &str) -> bool {
    (text.contains("\non:") || text.starts_with("on:")) && text.contains("jobs:")
        || text.contains("pool:")
        || text.contains("stages:") && text.contains("script:")
}

fn looks_like_iac(text: &str) -> bool {
    text.contains("resource \"") || text.contains("provider \"")
        || (text.contains("apiVersion:") && text.contains("kind:"))
}

fn cicd_path_hint(path: &Utf8Path) -> bool {
    let s = path.as_str();
    s.contains(".github/workflows/") || s.ends_with("azure-pipelines.yml") || s.ends_with(".gitlab-ci.yml")
}

fn iac_path_hint(path: &Utf8Path) -> bool {
    let s = path.as_str().to_lowercase();
    s.ends_with(".tf") || s.ends_with(".bicep") || s.contains("/k8s/") || s.contains("/manifests/")
}

pub struct IacAdapter;

impl Adapter for IacAdapter {
    fn id(&self) -> &'static str {
        "iac_adapter_v1"
    }

    fn class(&self) -> &'static str {
        "iac"
    }

    fn fitness(&self, path: &Utf8Path, capture: &ArtifactCapture) -> bool {
        single_file_entry(capture).is_some() && iac_path_hint(path)
    }

    fn validate(
        &self,
        path: &Utf8Path,
        capture: &ArtifactCapture,
        _enabled_plugins: &[String],
    ) -> AdapterResult {
        if single_file_entry(capture).is_none() {
            return fail("IAC_UNSUPPORTED_FORMAT", "iac adapter requires a single file input");
        }
        let bytes = match read_bounded(path, MAX_CICD_BYTES) {
            Ok(b) => b,
            Err(e) => return fail("IAC_UNSUPPORTED_FORMAT", e.to_string()),
        };
        let text = String::from_utf8_lossy(&bytes);

        if looks_like_cicd_workflow(&text) {
            return fail("IAC_UNSUPPORTED_FORMAT", "path hints IaC but content structurally looks like a CI workflow");
        }
        if !looks_like_iac(&text) {
            return fail("IAC_UNSUPPORTED_FORMAT", "path hints IaC but no structural IaC evidence found");
        }
        ok(self.id(), AdapterMode::Strict, "IaC path hint confirmed by content shape", Vec::new(), None)
    }
}

pub struct CicdAdapter;

impl Adapter for CicdAdapter {
    fn id(&self) -> &'static str {
        "cicd_adapter_v1"
    }

    fn class(&self) -> &'static str {
        "cicd"
    }

    fn fitness(&self, path: &Utf8Path, capture: &ArtifactCapture) -> bool {
        single_file_entry(capture).is_some() && cicd_path_hint(path)
    }

    fn validate(
        &self,
        path: &Utf8Path,
        capture: &ArtifactCapture,
        _enabled_plugins: &[String],
    ) -> AdapterResult {
        if single_file_entry(capture).is_none() {
            return fail("CICD_UNSUPPORTED_FORMAT", "cicd adapter requires a single file input");
        }
        let bytes = match read_bounded(path, MAX_CICD_BYTES) {
            Ok(b) => b,
            Err(e) => return fail("CICD_UNSUPPORTED_FORMAT", e.to_string()),
        };
        let text = String::from_utf8_lossy(&bytes);

        if !looks_like_cicd_workflow(&text) {
            return fail("CICD_UNSUPPORTED_FORMAT", "path hints CI/CD but no structural workflow evidence found");
        }
        ok(self.id(), AdapterMode::Strict, "CI/CD path hint confirmed by content shape", Vec::new(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use weftend_capture::{capture, CaptureLimits};

    fn utf8(path: &std::path::Path) -> camino::Utf8PathBuf {
        camino::Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
    }

    #[test]
    fn accepts_github_workflow_shape() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".github/workflows")).unwrap();
        let file = dir.path().join(".github/workflows/ci.yml");
        fs::write(&file, "on:\n  push:\njobs:\n  build:\n    runs-on: ubuntu-latest\n").unwrap();
        let cap = capture(&utf8(&file), CaptureLimits::default()).unwrap();
        let adapter = CicdAdapter;
        let result = adapter.validate(&utf8(&file), &cap, &[]);
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_iac_path_hint_with_cicd_content() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("main.tf");
        fs::write(&file, "on:\n  push:\njobs:\n  build:\n    runs-on: ubuntu-latest\n").unwrap();
        let cap = capture(&utf8(&file), CaptureLimits::default()).unwrap();
        let adapter = IacAdapter;
        let result = adapter.validate(&utf8(&file), &cap, &[]);
        assert_eq!(result.fail_code(), Some("IAC_UNSUPPORTED_FORMAT"));
    }

    #[test]
    fn accepts_terraform_resource_block() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("main.tf");
        fs::write(&file, "resource \"aws_s3_bucket\" \"b\" {\n  bucket = \"x\"\n}\n").unwrap();
        let cap = capture(&utf8(&file), CaptureLimits::default()).unwrap();
        let adapter = IacAdapter;
        let result = adapter.validate(&utf8(&file), &cap, &[]);
        assert!(result.is_ok());
    }
}
