//! Binary analyzer
//!
//! Works on raw bytes: signature-based format recognition, a record walk
//! for TES-style container formats, Shannon entropy, printable-string
//! extraction, and SHA-256 fingerprinting. Findings carry their evidence
//! in `binary_`-prefixed keys.

use std::path::Path;

use serde_json::json;
use sha2::{Digest, Sha256};

use crate::analysis::{Issue, Severity};
use crate::storage::MemoryStore;

use super::{LanguageAnalyzer, Result};

/// Known file signatures, longest-prefix first
const FILE_SIGNATURES: &[(&[u8], &str)] = &[
    (b"SQLite format 3", "sqlite_database"),
    (&[0xCA, 0xFE, 0xBA, 0xBE], "macos_universal"),
    (&[0x7F, b'E', b'L', b'F'], "elf_executable"),
    (&[0x89, b'P', b'N', b'G'], "png_image"),
    (b"PK\x03\x04", "zip_archive"),
    (b"Rar!", "rar_archive"),
    (b"BSA\x00", "bethesda_archive"),
    (b"TES3", "tes3_container"),
    (b"TES4", "tes4_container"),
    (b"GIF8", "gif_image"),
    (&[0xFF, 0xD8, 0xFF], "jpeg_image"),
    (b"MZ", "dos_executable"),
];

/// Minimum printable run that counts as a string
const MIN_STRING_LENGTH: usize = 4;

/// How much of the file feeds entropy and string extraction
const SAMPLE_SIZE: usize = 64 * 1024;

/// Binary format analyzer
pub struct BinaryAnalyzer {
    _private: (),
}

impl BinaryAnalyzer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Identify the format from the header bytes
    fn identify_format(header: &[u8]) -> (&'static str, f64) {
        for (signature, format) in FILE_SIGNATURES {
            if header.starts_with(signature) {
                return (format, 0.9);
            }
        }
        ("unknown", 0.1)
    }

    /// Shannon entropy in bits per byte
    fn entropy(data: &[u8]) -> f64 {
        if data.is_empty() {
            return 0.0;
        }
        let mut frequencies = [0usize; 256];
        for byte in data {
            frequencies[*byte as usize] += 1;
        }
        let len = data.len() as f64;
        frequencies
            .iter()
            .filter(|&&count| count > 0)
            .map(|&count| {
                let p = count as f64 / len;
                -p * p.log2()
            })
            .sum()
    }

    /// Printable ASCII runs of at least `MIN_STRING_LENGTH` bytes
    fn extract_strings(data: &[u8]) -> Vec<String> {
        let mut strings = Vec::new();
        let mut current = String::new();
        for &byte in data {
            if (32..=126).contains(&byte) {
                current.push(byte as char);
            } else {
                if current.len() >= MIN_STRING_LENGTH {
                    strings.push(std::mem::take(&mut current));
                } else {
                    current.clear();
                }
            }
        }
        if current.len() >= MIN_STRING_LENGTH {
            strings.push(current);
        }
        strings
    }

    /// SHA-256 fingerprint of the whole content
    fn sha256_hex(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Walk a TES-style container: 4-byte tag + little-endian u32 size
    /// per record after the 4-byte signature; stops at truncation
    fn walk_tes_records(data: &[u8]) -> usize {
        let mut offset = 4;
        let mut records = 0;
        while offset + 8 <= data.len() {
            let tag = &data[offset..offset + 4];
            if !tag.iter().all(|b| b.is_ascii_uppercase() || *b == b'_' || b.is_ascii_digit()) {
                break;
            }
            let size = u32::from_le_bytes([
                data[offset + 4],
                data[offset + 5],
                data[offset + 6],
                data[offset + 7],
            ]) as usize;
            let next = offset.checked_add(8 + size);
            match next {
                Some(next) if next <= data.len() => {
                    records += 1;
                    offset = next;
                }
                _ => break,
            }
        }
        records
    }
}

impl Default for BinaryAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAnalyzer for BinaryAnalyzer {
    fn language_name(&self) -> &'static str {
        "binary"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &[
            ".exe", ".dll", ".so", ".dat", ".bin", ".pak", ".db", ".sqlite", ".esm", ".esp",
            ".bsa", ".img", ".iso",
        ]
    }

    fn handles_binary(&self) -> bool {
        true
    }

    fn analyze_file(&self, path: &Path, content: &str, memory: &MemoryStore) -> Result<Vec<Issue>> {
        self.analyze_bytes(path, content.as_bytes(), memory)
    }

    fn analyze_bytes(&self, path: &Path, bytes: &[u8], _memory: &MemoryStore) -> Result<Vec<Issue>> {
        let file_path = path.display().to_string();
        let mut issues = Vec::new();

        let header = &bytes[..bytes.len().min(1024)];
        let (file_type, confidence) = Self::identify_format(header);

        let sample = &bytes[..bytes.len().min(SAMPLE_SIZE)];
        let entropy = Self::entropy(sample);
        let strings = Self::extract_strings(sample);
        let sha256 = Self::sha256_hex(bytes);

        let evidence = |issue: Issue| {
            issue
                .with_extra("binary_file_type", json!(file_type))
                .with_extra("binary_entropy", json!(entropy))
                .with_extra("binary_string_count", json!(strings.len()))
                .with_extra("binary_sha256", json!(sha256.clone()))
        };

        if confidence < 0.5 {
            issues.push(evidence(
                Issue::new(
                    &file_path,
                    "binary_unknown_format",
                    Severity::Medium,
                    "File format could not be reliably identified",
                )
                .with_suggestion("Verify file integrity against its format specification"),
            ));
        }

        if file_type.starts_with("tes") {
            let records = Self::walk_tes_records(bytes);
            if records == 0 {
                issues.push(evidence(
                    Issue::new(
                        &file_path,
                        "binary_empty_container",
                        Severity::High,
                        "Container file holds no readable records",
                    )
                    .with_suggestion("The file may be corrupted or truncated"),
                ));
            } else if records > 5000 {
                issues.push(evidence(
                    Issue::new(
                        &file_path,
                        "binary_oversized_container",
                        Severity::Low,
                        format!("High record count ({records}) may degrade load performance"),
                    )
                    .with_suggestion("Consider splitting the container"),
                ));
            }
        }

        if !bytes.is_empty() && entropy < 1.0 {
            issues.push(evidence(
                Issue::new(
                    &file_path,
                    "binary_low_entropy",
                    Severity::Low,
                    "Very low entropy suggests highly repetitive data",
                )
                .with_suggestion("The file may benefit from compression"),
            ));
        }

        Ok(issues)
    }
}
