// Base64 утилиты и ASCII armor

use crate::error::{CascadeError, Result};
use base64::{engine::general_purpose, Engine};

const ARMOR_LINE_WIDTH: usize = 64;

pub fn encode(data: &[u8]) -> String {
    general_purpose::STANDARD.encode(data)
}

pub fn decode(data: &str) -> Result<Vec<u8>> {
    general_purpose::STANDARD
        .decode(data)
        .map_err(|e| CascadeError::InvalidKeyFormat(format!("Base64 decode failed: {}", e)))
}

/// base64url without padding (JWK members)
pub fn encode_url(data: &[u8]) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(data)
}

/// Wrap `data` between `-----BEGIN {label}-----` / `-----END {label}-----`
pub fn armor(label: &str, data: &[u8]) -> String {
    let body = encode(data);
    let mut out = format!("-----BEGIN {}-----\n", label);
    for chunk in body.as_bytes().chunks(ARMOR_LINE_WIDTH) {
        // base64 output is ASCII
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    out.push_str(&format!("-----END {}-----\n", label));
    out
}

/// Inverse of [`armor`]; returns the label and the decoded body
pub fn dearmor(text: &str) -> Result<(String, Vec<u8>)> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    let label = lines
        .next()
        .and_then(|l| l.strip_prefix("-----BEGIN "))
        .and_then(|l| l.strip_suffix("-----"))
        .ok_or_else(|| CascadeError::InvalidKeyFormat("missing armor header".to_string()))?
        .to_string();

    let footer = format!("-----END {}-----", label);
    let mut body = String::new();
    let mut closed = false;
    for line in lines {
        if line == footer {
            closed = true;
            break;
        }
        body.push_str(line);
    }
    if !closed {
        return Err(CascadeError::InvalidKeyFormat("missing armor footer".to_string()));
    }

    Ok((label, decode(&body)?))
}
