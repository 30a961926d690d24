//! Signature documents
//!
//! The admin stage hands the current draft and its pending signature to a
//! `DocumentRenderer`. The built-in renderer writes a plain-text signature
//! packet; binary formats plug in behind the same trait.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Pending signature request attached to a draft
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignaturePlaceholder {
    pub signer: String,
    pub status: String,
    pub signature_id: String,
    pub timestamp: String,
}

impl SignaturePlaceholder {
    pub fn pending(signer: impl Into<String>) -> Self {
        Self {
            signer: signer.into(),
            status: "pending".to_string(),
            signature_id: format!("sig_{}", uuid::Uuid::new_v4().simple()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

pub trait DocumentRenderer: Send + Sync {
    /// File extension of rendered documents, without the dot
    fn extension(&self) -> &str;

    /// Render `draft` with a signature block for `signature` to `out_path`
    fn render_signature_document(
        &self,
        draft: &str,
        signature: &SignaturePlaceholder,
        out_path: &Path,
    ) -> Result<PathBuf>;
}

/// Text packet: the draft followed by a signature block
pub struct SignaturePacketRenderer;

impl DocumentRenderer for SignaturePacketRenderer {
    fn extension(&self) -> &str {
        "txt"
    }

    fn render_signature_document(
        &self,
        draft: &str,
        signature: &SignaturePlaceholder,
        out_path: &Path,
    ) -> Result<PathBuf> {
        let body = if draft.trim().is_empty() {
            "[No draft content available]"
        } else {
            draft
        };

        let packet = format!(
            "{body}\n\n{rule}\nSIGNATURE PAGE\n{rule}\n\nSigner: {signer}\nSignature ID: {id}\nStatus: {status}\n\n\nSignature: ______________________________\n\nDate: ___________________\n",
            body = body.trim_end(),
            rule = "=".repeat(40),
            signer = signature.signer,
            id = signature.signature_id,
            status = signature.status,
        );

        std::fs::write(out_path, packet)
            .with_context(|| format!("Failed to write signature packet {}", out_path.display()))?;

        tracing::info!("Signature packet written to {}", out_path.display());
        Ok(out_path.to_path_buf())
    }
}
