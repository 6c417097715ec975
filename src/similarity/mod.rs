
/// Cosine similarity between two vectors.
///
/// Returns 0.0 (never NaN, never an error) when the dimensions differ,
/// either vector is empty, or either magnitude is zero. Mismatched stored
/// dimensions therefore rank last instead of breaking a search.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Encode a vector as a BLOB: each f32 big-endian, 4 bytes, in order.
#[inline]
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for &v in vector {
        bytes.extend_from_slice(&v.to_be_bytes());
    }
    bytes
}

/// Decode a BLOB produced by [`encode_vector`]. Bit-exact round-trip;
/// trailing bytes that do not form a whole f32 are ignored.
#[inline]
pub fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
