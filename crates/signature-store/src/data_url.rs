//! Data-URL encoding for signature images, matching the persisted history
//! layout where each record carries its image inline as `data:<mime>;base64`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub fn encode(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Decodes `data:<mime>;base64,<payload>` into raw bytes. Returns `None` for
/// anything that is not a well-formed base64 data URL.
pub fn decode(data_url: &str) -> Option<Vec<u8>> {
    let rest = data_url.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;

    if !header.ends_with(";base64") {
        return None;
    }

    STANDARD.decode(payload).ok()
}
