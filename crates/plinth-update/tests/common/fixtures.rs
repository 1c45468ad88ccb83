//! Fixtures shared by the update orchestration tests

#![allow(dead_code)]

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use plinth_core::types::ExtensionRecord;
use plinth_core::{Error, HostPaths, Result};
use plinth_registry::{
    ExtensionContext, ExtensionPlugin, ExtensionRegistry, PluginLoader, RouteDefinition,
    RouteRegistrar, ScopedQueryExecutor,
};
use plinth_update::{DirectorySource, PackageSource, UpdateOrchestrator};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::watch;

/// Builder for versioned upload archives
pub struct PackageBuilder {
    name: String,
    version: String,
    extra_files: Vec<(String, Vec<u8>)>,
}

impl PackageBuilder {
    /// An extension package with a backend entry stub
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            extra_files: vec![(
                "index.js".to_string(),
                b"export function initialize() {}\nexport function cleanup() {}\n".to_vec(),
            )],
        }
    }

    /// Add or replace a file in the archive
    pub fn with_file(mut self, path: &str, content: &[u8]) -> Self {
        self.extra_files.retain(|(p, _)| p != path);
        self.extra_files.push((path.to_string(), content.to_vec()));
        self
    }

    /// Build the gzip-compressed tar archive bytes
    pub fn build_archive(&self) -> Vec<u8> {
        let manifest = format!(
            "name: {}\nversion: \"{}\"\ntype: extension\nbackend_entry: index.js\n",
            self.name, self.version
        );
        let mut files = vec![("extension.yaml".to_string(), manifest.into_bytes())];
        files.extend(self.extra_files.iter().cloned());

        let mut tar = tar::Builder::new(Vec::new());
        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            tar.append_data(&mut header, path.as_str(), content.as_slice())
                .expect("append archive entry");
        }
        let tar_bytes = tar.into_inner().expect("finish tar");

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar_bytes).expect("compress tar");
        encoder.finish().expect("finish gzip")
    }
}

/// Plugin loader producing scripted stub plugins, with a call log
pub struct StubLoader {
    fail_initialize: Mutex<HashSet<String>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl StubLoader {
    pub fn new() -> Self {
        Self {
            fail_initialize: Mutex::new(HashSet::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make `initialize` fail for the given extension id
    pub fn fail_initialize_for(&self, id: &str) {
        self.fail_initialize.lock().unwrap().insert(id.to_string());
    }

    /// Chronological log of plugin lifecycle calls
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PluginLoader for StubLoader {
    async fn load(&self, record: &ExtensionRecord) -> Result<Box<dyn ExtensionPlugin>> {
        Ok(Box::new(StubPlugin {
            id: record.id.clone(),
            fail_initialize: self.fail_initialize.lock().unwrap().contains(&record.id),
            calls: self.calls.clone(),
        }))
    }
}

/// Scripted plugin that records lifecycle calls and registers one route
struct StubPlugin {
    id: String,
    fail_initialize: bool,
    calls: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ExtensionPlugin for StubPlugin {
    async fn initialize(&self, context: &ExtensionContext) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("initialize {}", self.id));
        if self.fail_initialize {
            return Err(Error::initialization_failed(&self.id, "stub init exploded"));
        }
        context.register_routes(&[RouteDefinition {
            method: "GET".to_string(),
            path: "/status".to_string(),
            handler: "status".to_string(),
        }])?;
        Ok(())
    }

    async fn cleanup(&self, _context: &ExtensionContext) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("cleanup {}", self.id));
        Ok(())
    }

    async fn migrate(&self, _context: &ExtensionContext, from_version: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("migrate {} from {}", self.id, from_version));
        Ok(())
    }
}

/// Route registrar capturing registrations per extension id
#[derive(Default)]
pub struct RecordingRouter {
    routes: Mutex<HashMap<String, Vec<RouteDefinition>>>,
}

impl RecordingRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_routes(&self, extension_id: &str) -> bool {
        self.routes
            .lock()
            .unwrap()
            .get(extension_id)
            .is_some_and(|routes| !routes.is_empty())
    }
}

impl RouteRegistrar for RecordingRouter {
    fn register(&self, extension_id: &str, routes: &[RouteDefinition]) -> Result<()> {
        self.routes
            .lock()
            .unwrap()
            .entry(extension_id.to_string())
            .or_default()
            .extend_from_slice(routes);
        Ok(())
    }

    fn unregister(&self, extension_id: &str) -> Result<()> {
        self.routes.lock().unwrap().remove(extension_id);
        Ok(())
    }
}

/// Query executor that answers every query with no rows
pub struct NullQueries;

#[async_trait]
impl ScopedQueryExecutor for NullQueries {
    async fn execute(&self, _extension_id: &str, _query: &str) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }
}

/// Source that holds every fetch until the test opens the gate
pub struct GatedSource {
    inner: DirectorySource,
    gate: watch::Receiver<bool>,
}

impl GatedSource {
    pub fn new(root: &Path, gate: watch::Receiver<bool>) -> Self {
        Self {
            inner: DirectorySource::new(root),
            gate,
        }
    }
}

#[async_trait]
impl PackageSource for GatedSource {
    async fn fetch(&self, name: &str, version: &str) -> anyhow::Result<Vec<u8>> {
        let mut gate = self.gate.clone();
        gate.wait_for(|open| *open)
            .await
            .map_err(|_| anyhow::anyhow!("fetch gate closed"))?;
        self.inner.fetch(name, version).await
    }
}

/// A registry and orchestrator standing on a temporary data root, with a
/// depot directory the directory source reads published archives from
pub struct UpdateHost {
    pub temp: TempDir,
    pub paths: HostPaths,
    pub depot: PathBuf,
    pub registry: Arc<ExtensionRegistry>,
    pub loader: Arc<StubLoader>,
    pub router: Arc<RecordingRouter>,
    pub orchestrator: UpdateOrchestrator,
}

impl UpdateHost {
    /// Host wired to a `DirectorySource` over the depot
    pub fn new() -> Self {
        Self::with_source(|depot| Arc::new(DirectorySource::new(depot)))
    }

    /// Host wired to a custom source built over the depot path
    pub fn with_source<F>(make_source: F) -> Self
    where
        F: FnOnce(&Path) -> Arc<dyn PackageSource>,
    {
        let temp = TempDir::new().expect("create temp data root");
        let paths = HostPaths::new(temp.path().join("plinth"));
        let depot = temp.path().join("depot");
        std::fs::create_dir_all(&depot).expect("create depot");

        let loader = Arc::new(StubLoader::new());
        let router = Arc::new(RecordingRouter::new());
        let registry = Arc::new(
            ExtensionRegistry::new(
                paths.clone(),
                loader.clone(),
                router.clone(),
                Arc::new(NullQueries),
            )
            .expect("open registry"),
        );
        let orchestrator = UpdateOrchestrator::new(registry.clone(), make_source(&depot), &paths)
            .expect("start orchestrator");

        Self {
            temp,
            paths,
            depot,
            registry,
            loader,
            router,
            orchestrator,
        }
    }

    /// Drop an archive into the depot under the directory source's naming
    pub fn publish(&self, name: &str, version: &str, bytes: &[u8]) {
        let path = self.depot.join(format!("{}_{}.tar.gz", name, version));
        std::fs::write(path, bytes).expect("publish archive");
    }

    /// Install and enable a fresh extension, returning its id
    pub async fn install_enabled(&self, name: &str, version: &str) -> String {
        let archive = PackageBuilder::new(name, version).build_archive();
        let record = self
            .registry
            .install(&archive, "ops")
            .await
            .expect("install extension");
        self.registry
            .enable(&record.id)
            .await
            .expect("enable extension");
        record.id
    }
}

/// All ledger envelopes recorded so far, as raw JSON
pub fn ledger_lines(paths: &HostPaths) -> Vec<Value> {
    let content = std::fs::read_to_string(paths.ledger_file()).unwrap_or_default();
    content
        .lines()
        .map(|line| serde_json::from_str(line).expect("parse ledger line"))
        .collect()
}

/// The `type` tag of every ledger event, in append order
pub fn event_types(lines: &[Value]) -> Vec<String> {
    lines
        .iter()
        .map(|line| {
            line["event"]["type"]
                .as_str()
                .expect("event type tag")
                .to_string()
        })
        .collect()
}
