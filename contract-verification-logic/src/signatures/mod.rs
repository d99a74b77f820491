use anyhow::Context;
use contract_verification_database::{SignatureKind, SignatureRecord, SignatureView};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use verification_common::keccak256;

/// Derives the signature records of every function, event and error fragment
/// of the ABI. Constructors, fallback and receive carry no selector and are
/// ignored. An empty or missing ABI yields no records.
pub fn extract_signatures(abi: &serde_json::Value) -> Result<Vec<SignatureRecord>, anyhow::Error> {
    let abi: alloy_json_abi::JsonAbi =
        serde_json::from_value(abi.clone()).context("parsing contract abi")?;

    let mut records = Vec::new();
    for function in abi.functions() {
        records.push(record(function.signature(), SignatureKind::Function));
    }
    for event in abi.events() {
        records.push(record(event.signature(), SignatureKind::Event));
    }
    for error in abi.errors() {
        records.push(record(error.signature(), SignatureKind::Error));
    }

    Ok(records)
}

fn record(signature: String, kind: SignatureKind) -> SignatureRecord {
    let signature_hash = keccak256(signature.as_bytes());
    SignatureRecord {
        signature,
        signature_hash,
        kind,
    }
}

/// One lookup result. `filtered` marks variants whose text does not re-hash
/// to the stored hash, i.e. corrupt or imported non-canonical entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureLookupEntry {
    pub signature: String,
    pub signature_hash: String,
    pub is_canonical: bool,
}

fn entry_from_view(view: SignatureView) -> SignatureLookupEntry {
    let is_canonical = keccak256(view.signature.as_bytes()) == view.signature_hash;
    SignatureLookupEntry {
        signature: view.signature,
        signature_hash: format!("0x{}", hex::encode(view.signature_hash)),
        is_canonical,
    }
}

/// Looks up signatures by a full 32-byte hash or a 4-byte selector prefix.
/// With `filter` enabled, non-canonical variants are removed instead of only
/// being marked.
pub async fn lookup_signatures(
    database_connection: &DatabaseConnection,
    signature_hash: &[u8],
    filter: bool,
) -> Result<Vec<SignatureLookupEntry>, anyhow::Error> {
    let views =
        contract_verification_database::find_signatures(database_connection, signature_hash)
            .await?;

    let mut entries: Vec<_> = views.into_iter().map(entry_from_view).collect();
    if filter {
        entries.retain(|entry| entry.is_canonical);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn signatures_are_extracted_for_all_fragment_kinds() {
        let abi = serde_json::json!([
            {
                "type": "constructor",
                "inputs": [{ "name": "owner", "type": "address", "internalType": "address" }],
                "stateMutability": "nonpayable"
            },
            {
                "type": "function",
                "name": "transfer",
                "inputs": [
                    { "name": "to", "type": "address", "internalType": "address" },
                    { "name": "amount", "type": "uint256", "internalType": "uint256" }
                ],
                "outputs": [{ "name": "", "type": "bool", "internalType": "bool" }],
                "stateMutability": "nonpayable"
            },
            {
                "type": "event",
                "name": "Transfer",
                "inputs": [
                    { "name": "from", "type": "address", "indexed": true, "internalType": "address" },
                    { "name": "to", "type": "address", "indexed": true, "internalType": "address" },
                    { "name": "value", "type": "uint256", "indexed": false, "internalType": "uint256" }
                ],
                "anonymous": false
            },
            {
                "type": "error",
                "name": "InsufficientBalance",
                "inputs": [{ "name": "available", "type": "uint256", "internalType": "uint256" }]
            },
            { "type": "fallback", "stateMutability": "payable" },
            { "type": "receive", "stateMutability": "payable" }
        ]);

        let mut records = extract_signatures(&abi).unwrap();
        records.sort_by(|lhs, rhs| lhs.signature.cmp(&rhs.signature));

        let signatures: Vec<_> = records
            .iter()
            .map(|record| (record.signature.as_str(), record.kind))
            .collect();
        assert_eq!(
            signatures,
            vec![
                ("InsufficientBalance(uint256)", SignatureKind::Error),
                ("Transfer(address,address,uint256)", SignatureKind::Event),
                ("transfer(address,uint256)", SignatureKind::Function),
            ]
        );

        let transfer = records
            .iter()
            .find(|record| record.kind == SignatureKind::Function)
            .unwrap();
        // selector of transfer(address,uint256)
        assert_eq!(hex::encode(&transfer.signature_hash[..4]), "a9059cbb");
    }

    #[test]
    fn empty_abi_extracts_zero_signatures() {
        let records = extract_signatures(&serde_json::json!([])).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn canonical_flag_reflects_text_hash_consistency() {
        let canonical = entry_from_view(SignatureView {
            signature: "transfer(address,uint256)".to_string(),
            signature_hash: keccak256(b"transfer(address,uint256)"),
            signature_hash_4: keccak256(b"transfer(address,uint256)")[..4].to_vec(),
        });
        assert!(canonical.is_canonical);

        let corrupted = entry_from_view(SignatureView {
            signature: "transfer (address, uint256)".to_string(),
            signature_hash: keccak256(b"transfer(address,uint256)"),
            signature_hash_4: keccak256(b"transfer(address,uint256)")[..4].to_vec(),
        });
        assert!(!corrupted.is_canonical);
    }
}
