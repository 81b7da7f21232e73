// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Directory-backed key/value store
//!
//! One file per key. Key bytes outside `[A-Za-z0-9_-]` are hex-escaped as
//! `%XX` so any key maps to a portable file name.

use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

use super::traits::{KeyValueStore, StorageResult};
use crate::storage::types::StorageError;

const EXTENSION: &str = "mgk";

#[derive(Debug)]
pub struct DirectoryStore {
    root: PathBuf,
}

fn io_error(err: std::io::Error) -> StorageError {
    StorageError::Serialization(err.to_string())
}

fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

fn decode_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

impl DirectoryStore {
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(io_error)?;
        debug!("opened key directory {}", root.display());
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.{}", encode_key(key), EXTENSION))
    }
}

impl KeyValueStore for DirectoryStore {
    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let target = self.path_for(key);
        let staging = target.with_extension("tmp");
        fs::write(&staging, value).map_err(io_error)?;
        fs::rename(&staging, &target).map_err(io_error)
    }

    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(e)),
        }
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(e)),
        }
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(decode_key)
            {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
