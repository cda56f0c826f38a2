//! Per-class format adapters and the fixed-order adapter registry (§4.4).
//!
//! Grounded on the teacher's `xchecker-gate` ordered-rule walk: each adapter
//! is a small trait at the seam, the registry tries adapters in a fixed
//! order for `auto` selection, and every adapter reports reason codes rather
//! than an opaque pass/fail bit.

pub mod cicd;
pub mod container;
pub mod document;
pub mod extension;
pub mod image;
pub mod package;
pub mod result;
pub mod scm;
pub mod signature;

mod archive;
mod shared;

pub use archive::ArchiveAdapter;
pub use cicd::{CicdAdapter, IacAdapter};
pub use container::ContainerAdapter;
pub use document::DocumentAdapter;
pub use extension::ExtensionAdapter;
pub use image::ImageAdapter;
pub use package::PackageAdapter;
pub use result::{AdapterMode, AdapterResult, AdapterSignalsData};
pub use scm::ScmAdapter;
pub use signature::SignatureAdapter;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use weftend_capture::ArtifactCapture;
use weftend_util::error::WeftEndError;

/// Plugin names the registry recognizes (§4.4.a "named plugin").
pub const KNOWN_PLUGINS: &[&str] = &["tar", "7z"];

/// A single format-class adapter (§4.4: `id`, `class`, `fitness`, `validate`).
pub trait Adapter: Send + Sync {
    fn id(&self) -> &'static str;
    fn class(&self) -> &'static str;
    fn fitness(&self, path: &Utf8Path, capture: &ArtifactCapture) -> bool;
    fn validate(
        &self,
        path: &Utf8Path,
        capture: &ArtifactCapture,
        enabled_plugins: &[String],
    ) -> AdapterResult;
}

/// Which classes are administratively disabled (`WEFTEND_ADAPTER_DISABLE*`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenancePolicy {
    pub disabled_classes: Vec<String>,
}

impl MaintenancePolicy {
    #[must_use]
    pub fn from_classes(disabled_classes: Vec<String>) -> Self {
        Self { disabled_classes }
    }

    pub fn from_json(text: &str) -> Result<Self, WeftEndError> {
        serde_json::from_str(text)
            .map_err(|e| WeftEndError::adapter("ADAPTER_POLICY_INVALID", e.to_string()))
    }

    #[must_use]
    pub fn is_disabled(&self, class: &str) -> bool {
        self.disabled_classes.iter().any(|c| c == class)
    }
}

/// Adapter selection mode (`--adapter auto|none|<class>`, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterSelection {
    Auto,
    None,
    Class(String),
}

/// The fixed-order registry (§4.4.b–j order: archive, package, extension,
/// document, container, image, signature, scm, iac, cicd).
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn Adapter>>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self {
            adapters: vec![
                Box::new(ArchiveAdapter),
                Box::new(PackageAdapter),
                Box::new(ExtensionAdapter),
                Box::new(DocumentAdapter),
                Box::new(ContainerAdapter),
                Box::new(ImageAdapter),
                Box::new(SignatureAdapter),
                Box::new(ScmAdapter),
                Box::new(IacAdapter),
                Box::new(CicdAdapter),
            ],
        }
    }
}

impl AdapterRegistry {
    #[must_use]
    pub fn adapters(&self) -> &[Box<dyn Adapter>] {
        &self.adapters
    }

    fn find_class(&self, class: &str) -> Option<&dyn Adapter> {
        self.adapters
            .iter()
            .map(std::convert::AsRef::as_ref)
            .find(|a| a.class() == class)
    }
}

fn plugin_fail(enabled_plugins: &[String]) -> AdapterResult {
    let unknown: Vec<&String> = enabled_plugins
        .iter()
        .filter(|p| !KNOWN_PLUGINS.contains(&p.as_str()))
        .collect();
    if unknown.is_empty() {
        AdapterResult::Fail {
            fail_code: "ADAPTER_PLUGIN_UNUSED".to_string(),
            fail_message: format!(
                "no adapter selected to use enabled plugin(s): {}",
                enabled_plugins.join(",")
            ),
            reason_codes: vec!["ADAPTER_PLUGIN_UNUSED".to_string()],
        }
    } else {
        AdapterResult::Fail {
            fail_code: "ADAPTER_PLUGIN_UNKNOWN".to_string(),
            fail_message: format!(
                "unknown plugin(s) enabled: {}",
                unknown
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(",")
            ),
            reason_codes: vec!["ADAPTER_PLUGIN_UNKNOWN".to_string()],
        }
    }
}

/// Route an artifact through the registry per `selection` (§4.4).
///
/// Returns `Ok(None)` when no adapter ran and that is not itself an error
/// (e.g. `auto` with no fitting adapter and no plugins named).
pub fn route(
    registry: &AdapterRegistry,
    selection: &AdapterSelection,
    enabled_plugins: &[String],
    maintenance: &MaintenancePolicy,
    path: &Utf8Path,
    capture: &ArtifactCapture,
) -> Result<Option<AdapterResult>, WeftEndError> {
    match selection {
        AdapterSelection::None => {
            if enabled_plugins.is_empty() {
                Ok(None)
            } else {
                Ok(Some(plugin_fail(enabled_plugins)))
            }
        }
        AdapterSelection::Class(class) => {
            if maintenance.is_disabled(class) {
                return Ok(Some(AdapterResult::Fail {
                    fail_code: "ADAPTER_TEMPORARILY_UNAVAILABLE".to_string(),
                    fail_message: format!("adapter class '{class}' is administratively disabled"),
                    reason_codes: vec!["ADAPTER_TEMPORARILY_UNAVAILABLE".to_string()],
                }));
            }
            match registry.find_class(class) {
                Some(adapter) => Ok(Some(adapter.validate(path, capture, enabled_plugins))),
                None => Ok(Some(AdapterResult::Fail {
                    fail_code: format!("{}_UNSUPPORTED_FORMAT", class.to_uppercase()),
                    fail_message: format!("no adapter registered for class '{class}'"),
                    reason_codes: vec![format!("{}_UNSUPPORTED_FORMAT", class.to_uppercase())],
                })),
            }
        }
        AdapterSelection::Auto => {
            for adapter in registry.adapters() {
                if maintenance.is_disabled(adapter.class()) {
                    continue;
                }
                if adapter.fitness(path, capture) {
                    return Ok(Some(adapter.validate(path, capture, enabled_plugins)));
                }
            }
            if enabled_plugins.is_empty() {
                Ok(None)
            } else {
                Ok(Some(plugin_fail(enabled_plugins)))
            }
        }
    }
}
