use sha2::{Digest, Sha256};
use sha3::Keccak256;

/// Both digests derived from a single code blob. The sha256 one is the
/// primary content address, the keccak256 one is kept as a secondary index
/// since keccak is what the Ethereum tooling ecosystem searches by.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CodeHash {
    pub sha256: Vec<u8>,
    pub keccak256: Vec<u8>,
}

impl CodeHash {
    pub fn from_code(code: &[u8]) -> Self {
        Self {
            sha256: sha256(code),
            keccak256: keccak256(code),
        }
    }
}

pub fn sha256(code: &[u8]) -> Vec<u8> {
    Sha256::digest(code).to_vec()
}

pub fn keccak256(code: &[u8]) -> Vec<u8> {
    Keccak256::digest(code).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digests_are_consistent_with_the_code() {
        let code = hex::decode("6080604052348015600e575f5ffd5b50").unwrap();
        let hash = CodeHash::from_code(&code);
        assert_eq!(hash.sha256, sha256(&code));
        assert_eq!(hash.keccak256, keccak256(&code));
        assert_eq!(hash.sha256.len(), 32);
        assert_eq!(hash.keccak256.len(), 32);
        assert_ne!(hash.sha256, hash.keccak256);
    }

    #[test]
    fn empty_code_hashes_to_well_known_values() {
        let hash = CodeHash::from_code(&[]);
        assert_eq!(
            hex::encode(hash.sha256),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            hex::encode(hash.keccak256),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }
}
