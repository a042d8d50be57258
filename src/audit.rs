//! Audit logging: a concise index line appended to a central file plus a
//! per-transaction JSON document.
//!
//! Every write holds one process-wide lock across the whole sequence, so
//! concurrent transactions observe the index line and the document together
//! or not at all. Audit throughput is bounded by disk latency in exchange
//! for that consistency.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::DateTime;
use parking_lot::Mutex;
use serde::Serialize;

use crate::engine::{Interruption, MatchedRule, Transaction};
use crate::error::{Error, Result};

/// Transaction section of the audit document.
#[derive(Debug, Serialize)]
pub struct AuditTransaction {
    /// Timestamp, `dd/Mon/yyyy:HH:MM:SS +zzzz`.
    pub time: String,
    /// Transaction id.
    pub transaction_id: String,
    /// Client address.
    pub remote_address: String,
    /// Client port.
    pub remote_port: i64,
    /// Server name seen in the Host header.
    pub server_name: String,
}

/// Request section of the audit document.
#[derive(Debug, Serialize)]
pub struct AuditRequest {
    /// Full request line.
    pub request_line: String,
    /// Request method.
    pub method: String,
    /// Request URI.
    pub uri: String,
    /// HTTP protocol.
    pub protocol: String,
    /// Request headers, sorted by name for stable output.
    pub headers: BTreeMap<String, Vec<String>>,
    /// Request body.
    pub body: String,
}

/// Response section of the audit document.
#[derive(Debug, Serialize)]
pub struct AuditResponse {
    /// Response status.
    pub status: i64,
    /// Response headers, sorted by name.
    pub headers: BTreeMap<String, Vec<String>>,
    /// Response body.
    pub body: String,
}

/// Engine results section of the audit document.
#[derive(Debug, Serialize)]
pub struct AuditData {
    /// Messages of the matched rules, in match order.
    pub messages: Vec<String>,
    /// The full matched-rules log.
    pub matched_rules: Vec<MatchedRule>,
    /// The latched interruption, if any.
    pub interruption: Option<Interruption>,
    /// Engine identification.
    pub producer: String,
}

/// The per-transaction JSON document.
#[derive(Debug, Serialize)]
pub struct AuditDocument {
    /// Transaction metadata.
    pub transaction: AuditTransaction,
    /// Request view.
    pub request: AuditRequest,
    /// Response view.
    pub response: AuditResponse,
    /// Engine results.
    pub audit_data: AuditData,
}

/// Build the audit view of a finished transaction. Field and header
/// ordering are stable for testability.
pub fn audit_document(tx: &Transaction) -> AuditDocument {
    AuditDocument {
        transaction: AuditTransaction {
            time: format_timestamp(tx.timestamp()),
            transaction_id: tx.id().to_string(),
            remote_address: tx.first_value("remote_addr", "").to_string(),
            remote_port: collection_int(tx, "remote_port"),
            server_name: tx.first_value("server_name", "").to_string(),
        },
        request: AuditRequest {
            request_line: tx.first_value("request_line", "").to_string(),
            method: tx.first_value("request_method", "").to_string(),
            uri: tx.first_value("request_uri", "").to_string(),
            protocol: tx.first_value("request_protocol", "").to_string(),
            headers: header_map(tx, "request_headers"),
            body: tx.first_value("request_body", "").to_string(),
        },
        response: AuditResponse {
            status: collection_int(tx, "response_status"),
            headers: header_map(tx, "response_headers"),
            body: tx.first_value("response_body", "").to_string(),
        },
        audit_data: AuditData {
            messages: tx
                .matched_rules()
                .iter()
                .flat_map(|m| m.messages.iter())
                .filter(|m| !m.is_empty())
                .cloned()
                .collect(),
            matched_rules: tx.matched_rules().to_vec(),
            interruption: tx.interruption().cloned(),
            producer: format!("rampart/{}", env!("CARGO_PKG_VERSION")),
        },
    }
}

/// Writer for the two audit artifacts.
///
/// The central file is opened append-only once and held for the life of the
/// logger; document directories are created on demand.
pub struct AuditLogger {
    directory: PathBuf,
    central_path: PathBuf,
    central: Mutex<File>,
}

impl AuditLogger {
    /// Open the central audit file (append-only, created 0666) and remember
    /// the base directory for per-transaction documents.
    pub fn open(file: impl AsRef<Path>, directory: impl AsRef<Path>) -> Result<Self> {
        let path = file.as_ref().to_path_buf();
        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o666);
        }
        let central = options.open(&path).map_err(|e| Error::AuditIo {
            path: path.clone(),
            source: e,
        })?;
        Ok(Self {
            directory: directory.as_ref().to_path_buf(),
            central_path: path,
            central: Mutex::new(central),
        })
    }

    /// Write both audit artifacts for a finished transaction.
    ///
    /// The JSON document lands at its final path atomically (temp file and
    /// rename, mode 0600) before the index line is appended; a failure
    /// leaves no partial document behind.
    pub fn write_audit(&self, tx: &Transaction) -> Result<()> {
        let mut central = self.central.lock();

        let (relative_dir, filename) = tx.audit_path();
        let document_dir = self.directory.join(relative_dir);
        fs::create_dir_all(&document_dir).map_err(|e| Error::AuditIo {
            path: document_dir.clone(),
            source: e,
        })?;
        let document_path = document_dir.join(filename);

        let json = serde_json::to_vec_pretty(&audit_document(tx))
            .map_err(|e| Error::AuditSerialize { source: e })?;
        write_document(&document_path, &json)?;

        let line = concise_line(tx, &document_path);
        central
            .write_all(line.as_bytes())
            .map_err(|e| Error::AuditIo {
                path: self.central_path.clone(),
                source: e,
            })?;
        Ok(())
    }
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("directory", &self.directory)
            .finish()
    }
}

fn write_document(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let io_err = |e: std::io::Error| Error::AuditIo {
        path: path.to_path_buf(),
        source: e,
    };
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(&tmp).map_err(io_err)?;
    file.write_all(data).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);
    fs::rename(&tmp, path).map_err(io_err)
}

fn concise_line(tx: &Transaction, document_path: &Path) -> String {
    let client = match tx.first_value("remote_addr", "") {
        "" => "-",
        addr => addr,
    };
    format!(
        "{} {} - - [{}] {:?} {} {} {:?} {:?} {} {:?} {} {} {}\n",
        client,
        "-",
        format_timestamp(tx.timestamp()),
        tx.first_value("request_line", ""),
        collection_int(tx, "response_status"),
        collection_int(tx, "response_content_length"),
        "-",
        "-",
        tx.id(),
        "-",
        document_path.display(),
        0,
        collection_int(tx, "request_body_length"),
    )
}

fn format_timestamp(nanos: i64) -> String {
    DateTime::from_timestamp_nanos(nanos)
        .format("%d/%b/%Y:%H:%M:%S %z")
        .to_string()
}

fn collection_int(tx: &Transaction, name: &str) -> i64 {
    tx.collection(name).map(|c| c.first_int("")).unwrap_or(0)
}

fn header_map(tx: &Transaction, name: &str) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if let Some(collection) = tx.collection(name) {
        for (key, value) in collection.entries() {
            map.entry(key.clone()).or_default().push(value.clone());
        }
    }
    map
}
