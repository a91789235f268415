//! Shannon entropy of a payload's byte-value distribution (spec §4.2 GLOSSARY).

/// Entropy in bits, range [0, 8]. Returns 0.0 for empty payloads.
pub fn shannon_entropy(payload: &[u8]) -> f64 {
    if payload.is_empty() {
        return 0.0;
    }
    let mut counts = [0u32; 256];
    for &b in payload {
        counts[b as usize] += 1;
    }
    let n = payload.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / n;
            -p * p.log2()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_byte_payload_has_zero_entropy() {
        assert_eq!(shannon_entropy(&[7, 7, 7, 7]), 0.0);
    }

    #[test]
    fn fully_varied_payload_has_max_entropy_for_length() {
        let e = shannon_entropy(&[0, 1, 2, 3]);
        assert!((e - 2.0).abs() < 1e-9);
    }

    #[test]
    fn empty_payload_has_zero_entropy() {
        assert_eq!(shannon_entropy(&[]), 0.0);
    }
}
