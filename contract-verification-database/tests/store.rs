//! Integration tests against a live postgres instance. Run with a database
//! prepared by `contract-verification-migration` and the connection string
//! in `DATABASE_URL`, then `cargo test -- --ignored`.

use contract_verification_database::{
    find_verification_job, get_sourcify_match, insert_verification_job,
    mark_verification_job_succeeded, store_verification, CompiledContract,
    CompiledContractCompiler, CompiledContractLanguage, InsertContractDeployment,
    NewVerification, SignatureKind, SignatureRecord, StoreError, VerifiedContractMatches,
};
use sea_orm::{Database, DatabaseConnection};
use std::collections::BTreeMap;
use verification_common::{
    keccak256, CompilationArtifacts, CreationCodeArtifacts, Match, MatchStatus, MatchValues,
    RuntimeCodeArtifacts,
};

async fn connect() -> DatabaseConnection {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    Database::connect(url).await.expect("database connection")
}

fn unique_address(seed: u8) -> Vec<u8> {
    let mut address = vec![seed; 20];
    address[0] = 0xab;
    address
}

fn sample_match(metadata_match: bool) -> Match {
    Match {
        metadata_match,
        transformations: vec![],
        values: MatchValues::default(),
    }
}

fn sample_verification(
    address: Vec<u8>,
    runtime_code: Vec<u8>,
    metadata_match: bool,
) -> NewVerification {
    let compiled_contract = CompiledContract {
        compiler: CompiledContractCompiler::Solc,
        version: "0.8.20+commit.a1b79de6".to_string(),
        language: CompiledContractLanguage::Solidity,
        name: "Storage".to_string(),
        fully_qualified_name: "contracts/Storage.sol:Storage".to_string(),
        sources: BTreeMap::from([(
            "contracts/Storage.sol".to_string(),
            "contract Storage {}".to_string(),
        )]),
        compiler_settings: serde_json::json!({"optimizer": {"enabled": false}}),
        compilation_artifacts: CompilationArtifacts::default(),
        creation_code: vec![0x60, 0x80, 0x60],
        creation_code_artifacts: CreationCodeArtifacts::default(),
        runtime_code: runtime_code.clone(),
        runtime_code_artifacts: RuntimeCodeArtifacts::default(),
    };

    NewVerification {
        deployment: InsertContractDeployment::Genesis {
            chain_id: 1337,
            address,
            runtime_code,
        },
        compiled_contract,
        matches: VerifiedContractMatches::OnlyRuntime {
            runtime_match: sample_match(metadata_match),
        },
        match_metadata: serde_json::json!({"name": "Storage"}),
        signatures: vec![SignatureRecord {
            signature: "store(uint256)".to_string(),
            signature_hash: keccak256(b"store(uint256)"),
            kind: SignatureKind::Function,
        }],
    }
}

#[tokio::test]
#[ignore = "requires a live postgres database"]
async fn repeated_identical_submissions_do_not_duplicate_rows() {
    let db = connect().await;
    let address = unique_address(0x01);

    let stored = store_verification(&db, sample_verification(address.clone(), vec![0x01; 40], false))
        .await
        .expect("first store");

    let error = store_verification(&db, sample_verification(address, vec![0x01; 40], false))
        .await
        .expect_err("identical resubmission must be rejected");
    assert!(matches!(error, StoreError::AlreadyVerified));
    assert!(stored.verified_contract_id > 0);
}

#[tokio::test]
#[ignore = "requires a live postgres database"]
async fn partial_match_is_upgraded_to_perfect_and_repointed() {
    let db = connect().await;
    let address = unique_address(0x02);

    let partial =
        store_verification(&db, sample_verification(address.clone(), vec![0x02; 40], false))
            .await
            .expect("partial store");
    assert_eq!(partial.runtime_status, Some(MatchStatus::Partial));

    let perfect =
        store_verification(&db, sample_verification(address.clone(), vec![0x02; 40], true))
            .await
            .expect("upgrade store");
    assert_eq!(perfect.runtime_status, Some(MatchStatus::Perfect));
    assert_ne!(partial.verified_contract_id, perfect.verified_contract_id);

    let sourcify_match = get_sourcify_match(&db, 1337, address, false)
        .await
        .expect("select sourcify match")
        .expect("sourcify match must exist");
    assert_eq!(
        sourcify_match.verified_contract_id,
        perfect.verified_contract_id
    );
    assert_eq!(sourcify_match.runtime_status, Some(MatchStatus::Perfect));
}

#[tokio::test]
#[ignore = "requires a live postgres database"]
async fn verification_jobs_reach_a_terminal_state() {
    let db = connect().await;
    let address = unique_address(0x03);

    let job = insert_verification_job(&db, 1337, address.clone(), "verify_from_json_input")
        .await
        .expect("insert job");

    let pending = find_verification_job(&db, job.id)
        .await
        .expect("select job")
        .expect("job must exist");
    assert!(!pending.is_completed);

    let stored = store_verification(&db, sample_verification(address, vec![0x03; 40], false))
        .await
        .expect("store");
    mark_verification_job_succeeded(&db, job.id, stored.verified_contract_id)
        .await
        .expect("mark succeeded");

    let completed = find_verification_job(&db, job.id)
        .await
        .expect("select job")
        .expect("job must exist");
    assert!(completed.is_completed);
    assert_eq!(
        completed.verified_contract_id,
        Some(stored.verified_contract_id)
    );
    assert_eq!(completed.runtime_status, Some(MatchStatus::Partial));
}
