use std::collections::HashMap;

/// Opaque provider credentials, as handed down from the (out-of-scope)
/// credential vault.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub kind: String,
    pub value: String,
}

/// A manifest file descriptor attached to a cloud storage binding.
#[derive(Debug, Clone)]
pub struct ManifestDescriptor {
    pub filename: String,
}

/// Cloud provider kind a storage binding points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudProvider {
    Aws,
    Azure,
    Gcs,
}

/// A binding to a cloud object store resource (spec §3 `Cloud storage binding`).
#[derive(Debug, Clone)]
pub struct CloudStorageBinding {
    pub id: i64,
    pub provider: CloudProvider,
    pub credentials: Credentials,
    pub resource_name: String,
    pub specific_attributes: HashMap<String, String>,
    pub manifests: Vec<ManifestDescriptor>,
}
