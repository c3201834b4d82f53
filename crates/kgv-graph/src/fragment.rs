// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

use crate::{Fragment, Statement};

/// Prefix of every encoded fragment. A decryption under the wrong key
/// that happens to get through is still rejected by the marker.
pub const MARKER: &[u8; 16] = b"KGV-FRAGMENT-V1\0";

pub fn encode_fragment(fragment: &Fragment) -> Result<Vec<u8>, bincode::Error> {
    let statements: Vec<&Statement> = fragment.iter().collect();

    let mut out = MARKER.to_vec();
    bincode::serialize_into(&mut out, &statements)?;

    Ok(out)
}

/// `None` if the marker is missing or the body does not parse.
pub fn decode_fragment(bytes: &[u8]) -> Option<Fragment> {
    let body = bytes.strip_prefix(&MARKER[..])?;
    let statements: Vec<Statement> = bincode::deserialize(body).ok()?;

    Some(statements.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Dataset, Node};

    fn fragment() -> Fragment {
        [
            Statement::new(Node::iri("s"), Node::iri("p"), Node::literal("x")),
            Statement::new(Node::blank("b"), Node::iri("p"), Node::iri("o")),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn decode_what_was_encoded() {
        let bytes = encode_fragment(&fragment()).unwrap();
        assert!(bytes.starts_with(MARKER));
        assert_eq!(decode_fragment(&bytes), Some(fragment()));

        let empty = encode_fragment(&Dataset::new()).unwrap();
        assert_eq!(decode_fragment(&empty), Some(Dataset::new()));
    }

    #[test]
    fn garbage_is_not_a_fragment() {
        let mut bytes = encode_fragment(&fragment()).unwrap();
        bytes[0] ^= 1;
        assert_eq!(decode_fragment(&bytes), None);

        assert_eq!(decode_fragment(b""), None);
        assert_eq!(decode_fragment(MARKER), None);

        let mut truncated = encode_fragment(&fragment()).unwrap();
        truncated.truncate(truncated.len() - 3);
        assert_eq!(decode_fragment(&truncated), None);
    }
}
