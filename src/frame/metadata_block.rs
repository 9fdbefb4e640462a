use crate::frame::FrameDecodeError;
use crate::metadata::Metadata;

/// Serializes metadata as an HTTP/1 style header block, one `key: value\r\n`
/// line per value. Keys are written lower-case.
pub fn encode_metadata_block(metadata: &Metadata) -> Vec<u8> {
    let mut block = String::new();
    for (key, values) in metadata.entries() {
        let key = key.to_ascii_lowercase();
        for value in values {
            block.push_str(&key);
            block.push_str(": ");
            block.push_str(value);
            block.push_str("\r\n");
        }
    }
    block.into_bytes()
}

/// Parses a header block produced by [`encode_metadata_block`] (or by any
/// HTTP/1 style header writer). Bare `\n` line endings are accepted.
pub fn decode_metadata_block(bytes: &[u8]) -> Result<Metadata, FrameDecodeError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|err| FrameDecodeError::InvalidMetadata(err.to_string()))?;

    let mut metadata = Metadata::new();

    for line in text.split('\n') {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| FrameDecodeError::InvalidMetadata(format!("missing ':' in {line:?}")))?;

        let key = key.trim();
        if key.is_empty() {
            return Err(FrameDecodeError::InvalidMetadata(format!(
                "empty key in {line:?}"
            )));
        }

        metadata.append(key, value.trim());
    }

    Ok(metadata)
}
