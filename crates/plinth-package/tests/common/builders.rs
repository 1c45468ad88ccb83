//! Package builders for creating test fixtures
//!
//! Provides a fluent builder for constructing package archives (gzip tar
//! bytes) with a manifest and arbitrary files, plus helpers for laying the
//! same content out on disk.

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Builder for package archives used as upload fixtures
pub struct PackageBuilder {
    name: String,
    version: String,
    package_type: String,
    backend_entry: Option<String>,
    frontend_entry: Option<String>,
    permissions: Vec<String>,
    dependencies: Vec<(String, String, bool)>,
    locales: Option<(String, Vec<String>)>,
    extra_files: Vec<(String, Vec<u8>)>,
    include_manifest: bool,
}

impl PackageBuilder {
    /// Create a builder with sensible defaults for an extension package
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            package_type: "extension".to_string(),
            backend_entry: Some("index.js".to_string()),
            frontend_entry: None,
            permissions: Vec::new(),
            dependencies: Vec::new(),
            locales: None,
            extra_files: vec![(
                "index.js".to_string(),
                b"export function initialize() {}\nexport function cleanup() {}\n".to_vec(),
            )],
            include_manifest: true,
        }
    }

    /// Create a widget package with a frontend entry file
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

    pub fn with_type(mut self, package_type: &str) -> Self {
        self.package_type = package_type.to_string();
        self
    }

    pub fn with_backend_entry(mut self, entry: &str) -> Self {
        self.backend_entry = Some(entry.to_string());
        self
    }

    pub fn with_frontend_entry(mut self, entry: &str) -> Self {
        self.frontend_entry = Some(entry.to_string());
        self
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

    pub fn with_locales(mut self, default: &str, supported: &[&str]) -> Self {
        self.locales = Some((
            default.to_string(),
            supported.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    /// Add or replace a file in the archive
    pub fn with_file(mut self, path: &str, content: &[u8]) -> Self {
        self.extra_files.retain(|(p, _)| p != path);
        self.extra_files.push((path.to_string(), content.to_vec()));
        self
    }

    /// Drop the manifest from the archive entirely
    pub fn without_manifest(mut self) -> Self {
        self.include_manifest = false;
        self
    }

    /// Render the manifest document
    pub fn manifest_yaml(&self) -> String {
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
        if let Some((default, supported)) = &self.locales {
            yaml.push_str(&format!(
                "locales:\n  default: {}\n  supported: [{}]\n",
                default,
                supported.join(", ")
            ));
        }
        yaml
    }

    /// Full file listing: manifest, declared locale files, extra files
    fn files(&self) -> Vec<(String, Vec<u8>)> {
        let mut files = Vec::new();
        if self.include_manifest {
            files.push((
                "extension.yaml".to_string(),
                self.manifest_yaml().into_bytes(),
            ));
        }
        if let Some((_, supported)) = &self.locales {
            for code in supported {
                files.push((format!("locales/{}.json", code), b"{}".to_vec()));
            }
        }
        files.extend(self.extra_files.iter().cloned());
        files
    }

    /// Build the gzip-compressed tar archive bytes
    pub fn build_archive(&self) -> Vec<u8> {
        let mut tar = tar::Builder::new(Vec::new());
        for (path, content) in self.files() {
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

    /// Write the same content as an on-disk tree, returning its root
    pub fn build_tree(&self, parent: &Path) -> PathBuf {
        let root = parent.join(format!("{}_{}", self.name, self.version));
        for (path, content) in self.files() {
            let target = root.join(&path);
            if let Some(dir) = target.parent() {
                std::fs::create_dir_all(dir).expect("create tree dirs");
            }
            std::fs::write(target, content).expect("write tree file");
        }
        root
    }
}

/// Raw archive from explicit (path, content) pairs, no manifest involved
pub fn raw_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut tar = tar::Builder::new(Vec::new());
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        // Write the name bytes directly: `append_data`/`set_path` refuse
        // the `..` components some fixtures here need to exercise.
        header.as_gnu_mut().unwrap().name[..path.len()].copy_from_slice(path.as_bytes());
        header.set_cksum();
        tar.append(&header, *content).expect("append archive entry");
    }
    let tar_bytes = tar.into_inner().expect("finish tar");

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar_bytes).expect("compress tar");
    encoder.finish().expect("finish gzip")
}
