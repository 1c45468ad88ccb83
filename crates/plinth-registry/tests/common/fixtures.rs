//! Fixtures shared by the registry integration tests

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
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Builder for upload archives used as lifecycle fixtures
pub struct PackageBuilder {
    name: String,
    version: String,
    package_type: String,
    backend_entry: Option<String>,
    frontend_entry: Option<String>,
    permissions: Vec<String>,
    dependencies: Vec<(String, String, bool)>,
    extra_files: Vec<(String, Vec<u8>)>,
}

impl PackageBuilder {
    /// An extension package with a backend entry stub
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            package_type: "extension".to_string(),
            backend_entry: Some("index.js".to_string()),
            frontend_entry: None,
            permissions: Vec::new(),
            dependencies: Vec::new(),
            extra_files: vec![(
                "index.js".to_string(),
                b"export function initialize() {}\nexport function cleanup() {}\n".to_vec(),
            )],
        }
    }

    /// A widget package with a frontend entry stub
    pub fn widget(name: &str, version: &str) -> Self {
        let mut builder = Self::new(name, version);
        builder.package_type = "widget".to_string();
        builder.backend_entry = None;
        builder.frontend_entry = Some(format!("{}.vue", name));
        builder.extra_files = vec![(
            format!("{}.vue", name),
            b"<template><div/></template>\n".to_vec(),
        )];
        builder
    }

    pub fn with_permission(mut self, token: &str) -> Self {
        self.permissions.push(token.to_string());
        self
    }

    pub fn with_dependency(mut self, name: &str, constraint: &str) -> Self {
        self.dependencies
            .push((name.to_string(), constraint.to_string(), false));
        self
    }

    pub fn with_optional_dependency(mut self, name: &str, constraint: &str) -> Self {
        self.dependencies
            .push((name.to_string(), constraint.to_string(), true));
        self
    }

    /// Add or replace a file in the archive
    pub fn with_file(mut self, path: &str, content: &[u8]) -> Self {
        self.extra_files.retain(|(p, _)| p != path);
        self.extra_files.push((path.to_string(), content.to_vec()));
        self
    }

    fn manifest_yaml(&self) -> String {
        let mut yaml = format!(
            "name: {}\nversion: \"{}\"\ntype: {}\n",
            self.name, self.version, self.package_type
        );
        if let Some(entry) = &self.backend_entry {
            yaml.push_str(&format!("backend_entry: {}\n", entry));
        }
        if let Some(entry) = &self.frontend_entry {
            yaml.push_str(&format!("frontend_entry: {}\n", entry));
        }
        if !self.permissions.is_empty() {
            yaml.push_str("permissions:\n");
            for permission in &self.permissions {
                yaml.push_str(&format!("  - {}\n", permission));
            }
        }
        if !self.dependencies.is_empty() {
            yaml.push_str("dependencies:\n");
            for (name, constraint, optional) in &self.dependencies {
                if *optional {
                    yaml.push_str(&format!(
                        "  {}:\n    version: \"{}\"\n    optional: true\n",
                        name, constraint
                    ));
                } else {
                    yaml.push_str(&format!("  {}: \"{}\"\n", name, constraint));
                }
            }
        }
        yaml
    }

    /// Build the gzip-compressed tar archive bytes
    pub fn build_archive(&self) -> Vec<u8> {
        let mut files = vec![(
            "extension.yaml".to_string(),
            self.manifest_yaml().into_bytes(),
        )];
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
    fail_load: Mutex<HashSet<String>>,
    fail_initialize: Mutex<HashSet<String>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl StubLoader {
    pub fn new() -> Self {
        Self {
            fail_load: Mutex::new(HashSet::new()),
            fail_initialize: Mutex::new(HashSet::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make `load` fail for the given extension id
    pub fn fail_load_for(&self, id: &str) {
        self.fail_load.lock().unwrap().insert(id.to_string());
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
        if self.fail_load.lock().unwrap().contains(&record.id) {
            return Err(Error::initialization_failed(&record.id, "stub load refused"));
        }
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

    pub fn routes_for(&self, extension_id: &str) -> Vec<RouteDefinition> {
        self.routes
            .lock()
            .unwrap()
            .get(extension_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_routes(&self, extension_id: &str) -> bool {
        !self.routes_for(extension_id).is_empty()
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

/// A full registry standing on a temporary data root
pub struct TestHost {
    pub temp: TempDir,
    pub paths: HostPaths,
    pub registry: ExtensionRegistry,
    pub loader: Arc<StubLoader>,
    pub router: Arc<RecordingRouter>,
}

impl TestHost {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("create temp data root");
        let paths = HostPaths::new(temp.path().join("plinth"));
        let loader = Arc::new(StubLoader::new());
        let router = Arc::new(RecordingRouter::new());
        let registry = ExtensionRegistry::new(
            paths.clone(),
            loader.clone(),
            router.clone(),
            Arc::new(NullQueries),
        )
        .expect("open registry");
        Self {
            temp,
            paths,
            registry,
            loader,
            router,
        }
    }

    /// Open a second registry over the same data root
    pub fn reopen(&self) -> Result<ExtensionRegistry> {
        ExtensionRegistry::new(
            self.paths.clone(),
            self.loader.clone(),
            self.router.clone(),
            Arc::new(NullQueries),
        )
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
