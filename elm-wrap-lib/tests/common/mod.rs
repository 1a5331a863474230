// SPDX-License-Identifier: MPL-2.0

//! Shared fixtures: an in-memory transport and a fake package registry
//! serving metadata and archives the way the package website does.

// Not every test binary exercises every helper.
#![allow(dead_code)]

use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::io::Write;

use elm_wrap::pkg_version::PkgVersion;
use elm_wrap::transport::{Transport, TransportError};

/// The registry base url used by every test.
pub const REGISTRY: &str = "https://registry.test";

/// Transport answering from an in-memory url map.
#[derive(Default)]
pub struct MemoryTransport {
    responses: HashMap<String, Vec<u8>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<B: Into<Vec<u8>>>(&mut self, url: String, body: B) {
        self.responses.insert(url, body.into());
    }

    /// Serve the metadata triplet and the archive of one package
    /// version, returning the archive hash declared in endpoint.json.
    pub fn serve_package(&mut self, pv: &PkgVersion, src_files: &[(&str, &str)]) -> String {
        let archive = archive_bytes(pv, src_files);
        let hash = sha1_hex(&archive);
        self.serve_package_with_hash(pv, src_files, &hash);
        hash
    }

    /// Same as [serve_package] but with an explicit declared hash,
    /// possibly disagreeing with the archive bytes.
    pub fn serve_package_with_hash(
        &mut self,
        pv: &PkgVersion,
        src_files: &[(&str, &str)],
        declared_hash: &str,
    ) {
        let archive = archive_bytes(pv, src_files);
        let meta_base = format!(
            "{}/packages/{}/{}/{}",
            REGISTRY, pv.author_pkg.author, pv.author_pkg.pkg, pv.version
        );
        let archive_url = format!(
            "https://archives.test/{}-{}-{}.zip",
            pv.author_pkg.author, pv.author_pkg.pkg, pv.version
        );
        self.insert(
            format!("{}/endpoint.json", meta_base),
            format!(r#"{{"url":"{}","hash":"{}"}}"#, archive_url, declared_hash),
        );
        self.insert(
            format!("{}/elm.json", meta_base),
            format!(r#"{{"name":"{}"}}"#, pv.author_pkg),
        );
        self.insert(format!("{}/docs.json", meta_base), "[]");
        self.insert(archive_url, archive);
    }
}

impl Transport for MemoryTransport {
    fn fetch_string(&self, url: &str) -> Result<String, TransportError> {
        self.fetch_bytes(url)
            .map(|bytes| String::from_utf8(bytes).expect("test fixture is UTF-8"))
    }

    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

/// Build a package archive with the usual single leading directory.
pub fn archive_bytes(pv: &PkgVersion, src_files: &[(&str, &str)]) -> Vec<u8> {
    let prefix = format!(
        "{}-{}-abcdef1",
        pv.author_pkg.author, pv.author_pkg.pkg
    );
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        writer
            .start_file(format!("{}/elm.json", prefix), options)
            .unwrap();
        writer.write_all(b"{\"from\":\"archive\"}").unwrap();
        writer
            .start_file(format!("{}/README.md", prefix), options)
            .unwrap();
        writer.write_all(b"readme").unwrap();
        for (name, content) in src_files {
            writer
                .start_file(format!("{}/src/{}", prefix, name), options)
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

pub fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
