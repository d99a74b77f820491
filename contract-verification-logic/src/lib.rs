pub mod chain;
pub mod compiler;
pub mod engine;
pub mod errors;
pub mod explorer;
pub mod pool;
pub mod replace;
pub mod signatures;
pub mod sinks;
pub mod storage;
pub mod types;
pub mod verifier;

mod metrics;

pub trait ToHex {
    fn to_hex(&self) -> String;
}

impl<T: ?Sized + AsRef<[u8]>> ToHex for T {
    fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self))
    }
}

pub trait FromHex {
    fn from_hex(value: &str) -> Result<Self, hex::FromHexError>
    where
        Self: Sized;
}

impl<T: From<Vec<u8>>> FromHex for T {
    fn from_hex(value: &str) -> Result<Self, hex::FromHexError>
    where
        Self: Sized,
    {
        hex::decode(value.strip_prefix("0x").unwrap_or(value)).map(|v| v.into())
    }
}

/// EIP-55 mixed-case checksum encoding of an address.
pub fn to_checksum_address(address: &[u8]) -> String {
    let lowercase = hex::encode(address);
    let hash = verification_common::keccak256(lowercase.as_bytes());

    let checksummed: String = lowercase
        .char_indices()
        .map(|(index, character)| {
            let nibble = (hash[index / 2] >> (if index % 2 == 0 { 4 } else { 0 })) & 0x0f;
            if nibble >= 8 {
                character.to_ascii_uppercase()
            } else {
                character
            }
        })
        .collect();
    format!("0x{checksummed}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_address_matches_eip55_vectors() {
        let cases = [
            (
                "5aaeb6053f3e94c9b9a09f33669435e7ef1beaed",
                "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            ),
            (
                "fb6916095ca1df60bb79ce92ce3ea74c37c5d359",
                "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
            ),
            (
                "dbf03b407c01e7cd3cbea99509d93f8dddc8c6fb",
                "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
            ),
        ];
        for (raw, expected) in cases {
            assert_eq!(to_checksum_address(&hex::decode(raw).unwrap()), expected);
        }
    }

    #[test]
    fn hex_round_trip() {
        let bytes: Vec<u8> = Vec::from_hex("0xcafe").unwrap();
        assert_eq!(bytes, vec![0xca, 0xfe]);
        assert_eq!(bytes.to_hex(), "0xcafe");
        let unprefixed: Vec<u8> = Vec::from_hex("cafe").unwrap();
        assert_eq!(unprefixed, bytes);
    }
}
