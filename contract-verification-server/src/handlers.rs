use actix_web::{web, HttpResponse};
use contract_verification_database::VerificationJobView;
use contract_verification_logic::{
    engine::{
        VerificationEngine, VerifyFromExplorerRequest, VerifyFromJsonInputRequest,
        VerifyFromMetadataRequest, VerifySimilarityRequest,
    },
    errors::{ErrorCode, SubmissionError},
    explorer::ExplorerImporter,
    replace::{ForcedCompilation, ReplaceEngine, ReplaceMethod, ReplaceRequest},
    sinks::ReadSink,
    ToHex,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{collections::BTreeMap, sync::Arc};
use uuid::Uuid;
use verification_common::MatchStatus;

pub struct AppState {
    pub engine: Arc<VerificationEngine>,
    pub replace_engine: Arc<ReplaceEngine>,
    pub explorer_importer: Option<Arc<dyn ExplorerImporter>>,
}

pub fn configure_routes(service_config: &mut web::ServiceConfig, state: Arc<AppState>) {
    service_config
        .app_data(web::Data::new(state))
        .route(
            "/verify/metadata/{chain_id}/{address}",
            web::post().to(verify_from_metadata),
        )
        .route(
            "/verify/etherscan/{chain_id}/{address}",
            web::post().to(verify_from_etherscan),
        )
        .route(
            "/verify/similarity/{chain_id}/{address}",
            web::post().to(verify_similarity),
        )
        .route(
            "/verify/{chain_id}/{address}",
            web::post().to(verify_from_json_input),
        )
        .route("/verify/{verification_id}", web::get().to(get_verification_job))
        .route(
            "/contract/{chain_id}/{address}",
            web::get().to(get_contract),
        )
        .route("/files/{chain_id}/{address}", web::get().to(get_files))
        .route("/private/replace", web::post().to(replace_verification));
}

fn error_envelope(custom_code: &str, message: String, error_data: Option<Value>) -> Value {
    let mut envelope = json!({
        "customCode": custom_code,
        "errorId": Uuid::new_v4(),
        "message": message,
    });
    if let Some(error_data) = error_data {
        envelope["errorData"] = error_data;
    }
    envelope
}

fn submission_error_response(error: SubmissionError) -> HttpResponse {
    let code = error.error_code();
    let envelope = error_envelope(&code.to_string(), error.to_string(), None);
    match error {
        SubmissionError::InvalidParameter(_) => HttpResponse::BadRequest().json(envelope),
        SubmissionError::UnsupportedChain(_) | SubmissionError::ContractNotDeployed => {
            HttpResponse::NotFound().json(envelope)
        }
        SubmissionError::ContractIsAlreadyBeingVerified => {
            HttpResponse::TooManyRequests().json(envelope)
        }
        SubmissionError::GetBytecode(_) => HttpResponse::BadGateway().json(envelope),
        SubmissionError::ShuttingDown | SubmissionError::Internal(_) => {
            HttpResponse::InternalServerError().json(envelope)
        }
    }
}

fn internal_error_response(error: anyhow::Error) -> HttpResponse {
    tracing::error!(error = format!("{error:#}"), "request failed");
    HttpResponse::InternalServerError().json(error_envelope(
        &ErrorCode::InternalError.to_string(),
        "internal error".to_string(),
        None,
    ))
}

fn parse_address(address: &str) -> Result<Vec<u8>, HttpResponse> {
    let decoded = hex::decode(address.trim_start_matches("0x")).map_err(|_| {
        HttpResponse::BadRequest().json(error_envelope(
            &ErrorCode::InvalidParameter.to_string(),
            format!("invalid contract address: {address}"),
            None,
        ))
    })?;
    if decoded.len() != 20 {
        return Err(HttpResponse::BadRequest().json(error_envelope(
            &ErrorCode::InvalidParameter.to_string(),
            format!("contract address must be 20 bytes long: {address}"),
            None,
        )));
    }
    Ok(decoded)
}

fn parse_optional_hash(hash: &Option<String>) -> Result<Option<Vec<u8>>, HttpResponse> {
    match hash {
        None => Ok(None),
        Some(hash) => hex::decode(hash.trim_start_matches("0x")).map(Some).map_err(|_| {
            HttpResponse::BadRequest().json(error_envelope(
                &ErrorCode::InvalidParameter.to_string(),
                format!("invalid transaction hash: {hash}"),
                None,
            ))
        }),
    }
}

fn accepted(verification_id: Uuid) -> HttpResponse {
    HttpResponse::Accepted().json(json!({ "verificationId": verification_id }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct VerifyBody {
    std_json_input: Value,
    compiler_version: String,
    contract_identifier: String,
    #[serde(default)]
    creation_transaction_hash: Option<String>,
}

async fn verify_from_json_input(
    state: web::Data<Arc<AppState>>,
    path: web::Path<(i64, String)>,
    body: web::Json<VerifyBody>,
) -> HttpResponse {
    let (chain_id, address) = path.into_inner();
    let contract_address = match parse_address(&address) {
        Ok(contract_address) => contract_address,
        Err(response) => return response,
    };
    let creation_transaction_hash =
        match parse_optional_hash(&body.creation_transaction_hash) {
            Ok(hash) => hash,
            Err(response) => return response,
        };

    let body = body.into_inner();
    let request = VerifyFromJsonInputRequest {
        chain_id,
        contract_address,
        std_json_input: body.std_json_input,
        compiler_version: body.compiler_version,
        contract_identifier: body.contract_identifier,
        creation_transaction_hash,
    };

    match state.engine.submit_from_json_input(request).await {
        Ok(verification_id) => accepted(verification_id),
        Err(error) => submission_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct VerifyMetadataBody {
    metadata: Value,
    sources: BTreeMap<String, String>,
    #[serde(default)]
    creation_transaction_hash: Option<String>,
}

async fn verify_from_metadata(
    state: web::Data<Arc<AppState>>,
    path: web::Path<(i64, String)>,
    body: web::Json<VerifyMetadataBody>,
) -> HttpResponse {
    let (chain_id, address) = path.into_inner();
    let contract_address = match parse_address(&address) {
        Ok(contract_address) => contract_address,
        Err(response) => return response,
    };
    let creation_transaction_hash =
        match parse_optional_hash(&body.creation_transaction_hash) {
            Ok(hash) => hash,
            Err(response) => return response,
        };

    let body = body.into_inner();
    let request = VerifyFromMetadataRequest {
        chain_id,
        contract_address,
        metadata: body.metadata,
        sources: body.sources,
        creation_transaction_hash,
    };

    match state.engine.submit_from_metadata(request).await {
        Ok(verification_id) => accepted(verification_id),
        Err(error) => submission_error_response(error),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct VerifyEtherscanBody {
    #[serde(default)]
    api_key: Option<String>,
}

async fn verify_from_etherscan(
    state: web::Data<Arc<AppState>>,
    path: web::Path<(i64, String)>,
    body: Option<web::Json<VerifyEtherscanBody>>,
) -> HttpResponse {
    let (chain_id, address) = path.into_inner();
    let contract_address = match parse_address(&address) {
        Ok(contract_address) => contract_address,
        Err(response) => return response,
    };

    let importer = match &state.explorer_importer {
        Some(importer) => Arc::clone(importer),
        None => {
            return HttpResponse::NotFound().json(error_envelope(
                &ErrorCode::InvalidParameter.to_string(),
                "etherscan import is not enabled".to_string(),
                None,
            ))
        }
    };

    let api_key = body.and_then(|body| body.into_inner().api_key);
    let explorer_result = match importer
        .fetch(chain_id, &contract_address, api_key.as_deref())
        .await
    {
        Ok(explorer_result) => explorer_result,
        Err(error) => {
            let envelope =
                error_envelope(&error.error_code().to_string(), error.to_string(), None);
            return HttpResponse::BadRequest().json(envelope);
        }
    };

    let request = VerifyFromExplorerRequest {
        chain_id,
        contract_address,
        explorer_result,
    };
    match state.engine.submit_from_explorer(request).await {
        Ok(verification_id) => accepted(verification_id),
        Err(error) => submission_error_response(error),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct VerifySimilarityBody {
    #[serde(default)]
    creation_transaction_hash: Option<String>,
}

async fn verify_similarity(
    state: web::Data<Arc<AppState>>,
    path: web::Path<(i64, String)>,
    body: Option<web::Json<VerifySimilarityBody>>,
) -> HttpResponse {
    let (chain_id, address) = path.into_inner();
    let contract_address = match parse_address(&address) {
        Ok(contract_address) => contract_address,
        Err(response) => return response,
    };
    let creation_transaction_hash = body
        .map(|body| body.into_inner().creation_transaction_hash)
        .unwrap_or_default();
    let creation_transaction_hash = match parse_optional_hash(&creation_transaction_hash) {
        Ok(hash) => hash,
        Err(response) => return response,
    };

    let request = VerifySimilarityRequest {
        chain_id,
        contract_address,
        creation_transaction_hash,
    };
    match state.engine.submit_similarity(request).await {
        Ok(verification_id) => accepted(verification_id),
        Err(error) => submission_error_response(error),
    }
}

fn status_to_api(status: Option<MatchStatus>) -> Value {
    match status {
        Some(MatchStatus::Perfect) => json!("exact_match"),
        Some(MatchStatus::Partial) => json!("match"),
        None => Value::Null,
    }
}

fn job_view_to_response(view: VerificationJobView) -> Value {
    let overall = match (view.runtime_status, view.creation_status) {
        (Some(MatchStatus::Perfect), _) | (_, Some(MatchStatus::Perfect)) => json!("exact_match"),
        (Some(MatchStatus::Partial), _) | (_, Some(MatchStatus::Partial)) => json!("match"),
        (None, None) => Value::Null,
    };

    let error = view.error.map(|error| {
        let message = error
            .data
            .as_ref()
            .and_then(|data| data.get("message"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        json!({
            "customCode": error.code,
            "errorId": error.error_id,
            "message": message,
            "errorData": error.data,
        })
    });

    let mut response = json!({
        "isJobCompleted": view.is_completed,
        "contract": {
            "chainId": view.chain_id,
            "address": view.contract_address.to_hex(),
            "match": overall,
            "runtimeMatch": status_to_api(view.runtime_status),
            "creationMatch": status_to_api(view.creation_status),
        },
    });
    if let Some(error) = error {
        response["error"] = error;
    }
    if view
        .external_verification
        .as_object()
        .is_some_and(|map| !map.is_empty())
    {
        response["externalVerifications"] = view.external_verification;
    }
    response
}

async fn get_verification_job(
    state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> HttpResponse {
    let verification_id = match Uuid::parse_str(&path.into_inner()) {
        Ok(verification_id) => verification_id,
        Err(_) => {
            return HttpResponse::BadRequest().json(error_envelope(
                &ErrorCode::InvalidParameter.to_string(),
                "verification id must be a uuid".to_string(),
                None,
            ))
        }
    };

    match state.engine.get_job(verification_id).await {
        Ok(Some(view)) => HttpResponse::Ok().json(job_view_to_response(view)),
        Ok(None) => HttpResponse::NotFound().json(error_envelope(
            &ErrorCode::InvalidParameter.to_string(),
            format!("verification job was not found: {verification_id}"),
            None,
        )),
        Err(error) => internal_error_response(error),
    }
}

async fn get_contract(
    state: web::Data<Arc<AppState>>,
    path: web::Path<(i64, String)>,
) -> HttpResponse {
    let (chain_id, address) = path.into_inner();
    let contract_address = match parse_address(&address) {
        Ok(contract_address) => contract_address,
        Err(response) => return response,
    };

    match state
        .engine
        .storage()
        .read()
        .get_contract(chain_id, &contract_address)
        .await
    {
        Ok(Some(contract)) => HttpResponse::Ok().json(contract),
        Ok(None) => HttpResponse::NotFound().json(error_envelope(
            &ErrorCode::InvalidParameter.to_string(),
            "contract is not verified".to_string(),
            None,
        )),
        Err(error) => internal_error_response(error),
    }
}

async fn get_files(
    state: web::Data<Arc<AppState>>,
    path: web::Path<(i64, String)>,
) -> HttpResponse {
    let (chain_id, address) = path.into_inner();
    let contract_address = match parse_address(&address) {
        Ok(contract_address) => contract_address,
        Err(response) => return response,
    };

    match state
        .engine
        .storage()
        .read()
        .get_files(chain_id, &contract_address)
        .await
    {
        Ok(Some(files)) => HttpResponse::Ok().json(files),
        Ok(None) => HttpResponse::NotFound().json(error_envelope(
            &ErrorCode::InvalidParameter.to_string(),
            "contract is not verified".to_string(),
            None,
        )),
        Err(error) => internal_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ReplaceBody {
    verified_contract_id: i64,
    method: ReplaceMethod,
    #[serde(default)]
    force_compilation: Option<ForcedCompilationBody>,
    #[serde(default)]
    force_rpc_request: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ForcedCompilationBody {
    compiler_version: String,
    std_json_input: Value,
    contract_identifier: String,
}

async fn replace_verification(
    state: web::Data<Arc<AppState>>,
    body: web::Json<ReplaceBody>,
) -> HttpResponse {
    let body = body.into_inner();
    let request = ReplaceRequest {
        verified_contract_id: body.verified_contract_id,
        method: body.method,
        force_compilation: body.force_compilation.map(|forced| ForcedCompilation {
            compiler_version: forced.compiler_version,
            std_json_input: forced.std_json_input,
            contract_identifier: forced.contract_identifier,
        }),
        force_rpc_request: body.force_rpc_request,
    };

    match state.replace_engine.replace(request).await {
        Ok(outcome) => HttpResponse::Ok().json(json!({
            "verifiedContractId": outcome.verified_contract_id,
            "creationCodeFetchedFromRpc": outcome.creation_code_fetched_from_rpc,
        })),
        Err(error) => HttpResponse::BadRequest().json(error_envelope(
            &ErrorCode::InvalidParameter.to_string(),
            error.to_string(),
            None,
        )),
    }
}
