#![warn(missing_docs)]
//! # sentinel-contract-tests
//!
//! ## Purpose
//! Loads the frozen JSON contracts under `contracts/` so tests can check
//! fixtures and live responses against them.
//!
//! ## Responsibilities
//! - Resolve contract and fixture paths relative to the workspace root.
//! - Compile schemas and report every violation for a document.
//!
//! ## Data flow
//! `contracts/*.schema.json` -> [`Contract::load`] -> [`Contract::violations`].
//!
//! ## Ownership and lifetimes
//! A compiled [`Contract`] owns its validator and can be reused across
//! documents.
//!
//! ## Error model
//! Missing files, invalid JSON and uncompilable schemas surface as
//! [`ContractError`].
//!
//! ## Security and privacy notes
//! Contracts pin the wire shape of every JSON endpoint, including the
//! truncation bound on event bodies.

use std::fs;
use std::path::{Path, PathBuf};

use jsonschema::JSONSchema;
use serde_json::Value;
use thiserror::Error;

/// Directory holding the `*.schema.json` contracts.
pub fn contracts_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../contracts")
}

/// Path of the valid fixture for contract `name`.
pub fn fixture_path(name: &str) -> PathBuf {
    contracts_dir()
        .join("fixtures")
        .join(format!("{name}.valid.json"))
}

/// Reads and parses one JSON file.
///
/// # Errors
/// Returns [`ContractError::Read`] or [`ContractError::Parse`].
pub fn load_json(path: &Path) -> Result<Value, ContractError> {
    let raw = fs::read_to_string(path).map_err(|source| ContractError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ContractError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Compiled JSON schema for one endpoint.
pub struct Contract {
    name: String,
    validator: JSONSchema,
}

impl Contract {
    /// Loads and compiles `contracts/<name>.schema.json`.
    ///
    /// # Errors
    /// Returns [`ContractError`] when the schema is missing or invalid.
    pub fn load(name: &str) -> Result<Self, ContractError> {
        let path = contracts_dir().join(format!("{name}.schema.json"));
        let schema = load_json(&path)?;
        let validator = JSONSchema::compile(&schema).map_err(|error| ContractError::Schema {
            name: name.to_string(),
            reason: error.to_string(),
        })?;
        Ok(Self {
            name: name.to_string(),
            validator,
        })
    }

    /// Contract name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` when `document` satisfies the schema.
    pub fn is_valid(&self, document: &Value) -> bool {
        self.validator.is_valid(document)
    }

    /// Lists every violation as `<instance path>: <message>`.
    pub fn violations(&self, document: &Value) -> Vec<String> {
        match self.validator.validate(document) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|error| format!("{}: {error}", error.instance_path))
                .collect(),
        }
    }
}

/// Contract loading error type.
#[derive(Debug, Error)]
pub enum ContractError {
    /// File could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// File is not valid JSON.
    #[error("invalid json in {}: {source}", .path.display())]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
    /// Schema failed to compile.
    #[error("schema `{name}` does not compile: {reason}")]
    Schema {
        /// Contract name.
        name: String,
        /// Compiler message.
        reason: String,
    },
}
