mod in_flight;
pub(crate) mod tasks;

pub use in_flight::{InFlightGuard, InFlightVerifications};

use crate::{
    chain::{Chain, Chains},
    compiler::Compiler,
    errors::{ErrorExport, SubmissionError},
    explorer::ExplorerResult,
    metrics,
    pool::{TaskExport, WorkerPool},
    sinks::{dump_failed_verification_input, JobContext, ObjectStorage},
    storage::StorageFanout,
    types::VerificationEndpoint,
    verifier::Verifier,
    ToHex,
};
use anyhow::Context;
use contract_verification_database::{VerificationJobError, VerificationJobView};
use sea_orm::{prelude::Uuid, DatabaseConnection};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tasks::{TaskDependencies, VerifyCompilationContext};
use tokio::task::JoinSet;

#[derive(Clone, Debug)]
pub struct VerifyFromJsonInputRequest {
    pub chain_id: i64,
    pub contract_address: Vec<u8>,
    pub std_json_input: Value,
    pub compiler_version: String,
    pub contract_identifier: String,
    pub creation_transaction_hash: Option<Vec<u8>>,
}

#[derive(Clone, Debug)]
pub struct VerifyFromMetadataRequest {
    pub chain_id: i64,
    pub contract_address: Vec<u8>,
    pub metadata: Value,
    pub sources: BTreeMap<String, String>,
    pub creation_transaction_hash: Option<Vec<u8>>,
}

/// The explorer result is fetched by the caller through the configured
/// [`crate::explorer::ExplorerImporter`]; import failures surface
/// synchronously with their own sub-codes and never create a job.
#[derive(Clone, Debug)]
pub struct VerifyFromExplorerRequest {
    pub chain_id: i64,
    pub contract_address: Vec<u8>,
    pub explorer_result: ExplorerResult,
}

#[derive(Clone, Debug)]
pub struct VerifySimilarityRequest {
    pub chain_id: i64,
    pub contract_address: Vec<u8>,
    pub creation_transaction_hash: Option<Vec<u8>>,
}

/// The verification job engine: admits requests, creates job records,
/// dispatches compile-plus-verify work onto the worker pool and persists the
/// outcome once per job.
pub struct VerificationEngine {
    database_connection: Arc<DatabaseConnection>,
    storage: Arc<StorageFanout>,
    pool: Arc<WorkerPool>,
    compiler: Arc<dyn Compiler>,
    verifier: Arc<dyn Verifier>,
    chains: Chains,
    debug_store: Option<Arc<ObjectStorage>>,
    in_flight: Arc<InFlightVerifications>,
    completions: tokio::sync::Mutex<JoinSet<()>>,
    closed: AtomicBool,
}

impl VerificationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        database_connection: Arc<DatabaseConnection>,
        storage: Arc<StorageFanout>,
        pool: Arc<WorkerPool>,
        compiler: Arc<dyn Compiler>,
        verifier: Arc<dyn Verifier>,
        chains: Chains,
        debug_store: Option<Arc<ObjectStorage>>,
    ) -> Self {
        Self {
            database_connection,
            storage,
            pool,
            compiler,
            verifier,
            chains,
            debug_store,
            in_flight: Arc::new(InFlightVerifications::default()),
            completions: tokio::sync::Mutex::new(JoinSet::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn storage(&self) -> &Arc<StorageFanout> {
        &self.storage
    }

    pub async fn submit_from_json_input(
        &self,
        request: VerifyFromJsonInputRequest,
    ) -> Result<Uuid, SubmissionError> {
        let endpoint = VerificationEndpoint::VerifyFromJsonInput;
        let chain = self.chain(request.chain_id)?;
        let admission = self
            .admit(request.chain_id, request.contract_address.clone(), endpoint)
            .await?;

        let raw_input = serde_json::json!({
            "stdJsonInput": request.std_json_input,
            "compilerVersion": request.compiler_version,
            "contractIdentifier": request.contract_identifier,
            "creationTransactionHash": request.creation_transaction_hash.as_deref().map(|hash| hash.to_hex()),
        });

        let dependencies = self.task_dependencies();
        let context = VerifyCompilationContext {
            chain_id: request.chain_id,
            contract_address: request.contract_address.clone(),
            chain,
            creation_transaction_hash: request.creation_transaction_hash.clone(),
            job: admission.job_context.clone(),
        };
        let task = tasks::run_json_input_task(
            dependencies,
            context,
            request.std_json_input,
            request.compiler_version,
            request.contract_identifier,
        );

        self.dispatch(admission, endpoint, Some(raw_input), task)
            .await
    }

    pub async fn submit_from_metadata(
        &self,
        request: VerifyFromMetadataRequest,
    ) -> Result<Uuid, SubmissionError> {
        let endpoint = VerificationEndpoint::VerifyFromMetadata;
        let chain = self.chain(request.chain_id)?;
        let admission = self
            .admit(request.chain_id, request.contract_address.clone(), endpoint)
            .await?;

        let raw_input = serde_json::json!({
            "metadata": request.metadata,
            "sources": request.sources,
            "creationTransactionHash": request.creation_transaction_hash.as_deref().map(|hash| hash.to_hex()),
        });

        let dependencies = self.task_dependencies();
        let context = VerifyCompilationContext {
            chain_id: request.chain_id,
            contract_address: request.contract_address.clone(),
            chain,
            creation_transaction_hash: request.creation_transaction_hash.clone(),
            job: admission.job_context.clone(),
        };
        let task =
            tasks::run_metadata_task(dependencies, context, request.metadata, request.sources);

        self.dispatch(admission, endpoint, Some(raw_input), task)
            .await
    }

    pub async fn submit_from_explorer(
        &self,
        request: VerifyFromExplorerRequest,
    ) -> Result<Uuid, SubmissionError> {
        let endpoint = VerificationEndpoint::VerifyFromExplorerResult;
        let chain = self.chain(request.chain_id)?;
        let admission = self
            .admit(request.chain_id, request.contract_address.clone(), endpoint)
            .await?;

        let dependencies = self.task_dependencies();
        let context = VerifyCompilationContext {
            chain_id: request.chain_id,
            contract_address: request.contract_address.clone(),
            chain,
            creation_transaction_hash: None,
            job: admission.job_context.clone(),
        };
        let task = tasks::run_explorer_result_task(dependencies, context, request.explorer_result);

        self.dispatch(admission, endpoint, None, task).await
    }

    /// Similarity pre-conditions run before job admission: the runtime
    /// bytecode is fetched synchronously, so an undeployed contract or an
    /// unreachable node fails the submission without a job record.
    pub async fn submit_similarity(
        &self,
        request: VerifySimilarityRequest,
    ) -> Result<Uuid, SubmissionError> {
        let endpoint = VerificationEndpoint::VerifySimilarity;
        let chain = self.chain(request.chain_id)?;

        let runtime_code = chain
            .get_bytecode(&request.contract_address)
            .await
            .map_err(|error| SubmissionError::GetBytecode(error.to_string()))?;
        if runtime_code.is_empty() {
            return Err(SubmissionError::ContractNotDeployed);
        }

        let admission = self
            .admit(request.chain_id, request.contract_address.clone(), endpoint)
            .await?;

        let dependencies = self.task_dependencies();
        let context = VerifyCompilationContext {
            chain_id: request.chain_id,
            contract_address: request.contract_address.clone(),
            chain,
            creation_transaction_hash: request.creation_transaction_hash.clone(),
            job: admission.job_context.clone(),
        };
        let task = tasks::run_similarity_task(dependencies, context, runtime_code);

        self.dispatch(admission, endpoint, None, task).await
    }

    pub async fn get_job(
        &self,
        verification_id: Uuid,
    ) -> Result<Option<VerificationJobView>, anyhow::Error> {
        contract_verification_database::find_verification_job(
            self.database_connection.as_ref(),
            verification_id,
        )
        .await
    }

    /// Graceful drain: the pool is destroyed first (aborting in-flight
    /// tasks), then every outstanding completion task is awaited so each job
    /// row is terminal before shutdown returns.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.pool.shutdown();

        let mut completions = self.completions.lock().await;
        while completions.join_next().await.is_some() {}
    }

    fn chain(&self, chain_id: i64) -> Result<Arc<dyn Chain>, SubmissionError> {
        self.chains
            .get(chain_id)
            .ok_or(SubmissionError::UnsupportedChain(chain_id))
    }

    fn task_dependencies(&self) -> TaskDependencies {
        TaskDependencies {
            database_connection: Arc::clone(&self.database_connection),
            storage: Arc::clone(&self.storage),
            compiler: Arc::clone(&self.compiler),
            verifier: Arc::clone(&self.verifier),
        }
    }

    async fn admit(
        &self,
        chain_id: i64,
        contract_address: Vec<u8>,
        endpoint: VerificationEndpoint,
    ) -> Result<Admission, SubmissionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SubmissionError::ShuttingDown);
        }

        let guard = self
            .in_flight
            .try_begin(chain_id, contract_address.clone())
            .ok_or(SubmissionError::ContractIsAlreadyBeingVerified)?;

        let job = contract_verification_database::insert_verification_job(
            self.database_connection.as_ref(),
            chain_id,
            contract_address,
            &endpoint.to_string(),
        )
        .await
        .context("inserting the verification job")?;

        let job_context = JobContext {
            verification_id: job.id,
            trace_id: Uuid::new_v4().to_string(),
        };

        Ok(Admission { guard, job_context })
    }

    async fn dispatch(
        &self,
        admission: Admission,
        endpoint: VerificationEndpoint,
        raw_input: Option<Value>,
        task: impl std::future::Future<Output = TaskExport> + Send + 'static,
    ) -> Result<Uuid, SubmissionError> {
        let Admission { guard, job_context } = admission;
        let job_id = job_context.verification_id;

        let span = tracing::info_span!(
            "verification",
            verification_id = %job_id,
            trace_id = %job_context.trace_id,
            endpoint = %endpoint,
        );

        let handle = match self.pool.spawn(span.clone(), task) {
            Ok(handle) => handle,
            Err(_shut_down) => {
                let error = ErrorExport::new(
                    crate::errors::ErrorCode::InternalError,
                    "worker pool is shut down",
                );
                persist_job_error(&self.database_connection, job_id, &error).await;
                drop(guard);
                return Err(SubmissionError::ShuttingDown);
            }
        };

        let database_connection = Arc::clone(&self.database_connection);
        let debug_store = self.debug_store.clone();
        let completion = async move {
            let export = match handle.join().await {
                Ok(export) => export,
                Err(aborted) => TaskExport::error(ErrorExport::new(
                    crate::errors::ErrorCode::InternalError,
                    aborted.to_string(),
                )),
            };

            let endpoint_label = endpoint.to_string();
            match export {
                TaskExport::Verification(export) => {
                    metrics::VERIFICATIONS_TOTAL
                        .with_label_values(&[endpoint_label.as_str(), "success"])
                        .inc();
                    if let Err(error) =
                        contract_verification_database::mark_verification_job_succeeded(
                            database_connection.as_ref(),
                            job_id,
                            export.verified_contract_id,
                        )
                        .await
                    {
                        tracing::error!(
                            verification_id = %job_id,
                            error = format!("{error:#}"),
                            "failed to persist the verification success"
                        );
                    }
                }
                TaskExport::Error {
                    export,
                    failed_sink_write,
                } => {
                    let code_label = export.code.to_string();
                    metrics::VERIFICATIONS_TOTAL
                        .with_label_values(&[endpoint_label.as_str(), code_label.as_str()])
                        .inc();
                    tracing::warn!(
                        verification_id = %job_id,
                        error_id = %export.error_id,
                        error_code = %export.code,
                        message = export.message,
                        "verification failed"
                    );

                    if failed_sink_write {
                        if let (Some(debug_store), Some(raw_input)) = (&debug_store, &raw_input) {
                            dump_failed_verification_input(debug_store, job_id, raw_input).await;
                        }
                    }

                    persist_job_error(&database_connection, job_id, &export).await;
                }
            }

            // released only after the job row is terminal
            drop(guard);
        };

        self.completions.lock().await.spawn(completion);

        Ok(job_id)
    }
}

struct Admission {
    guard: InFlightGuard,
    job_context: JobContext,
}

async fn persist_job_error(
    database_connection: &DatabaseConnection,
    job_id: Uuid,
    export: &ErrorExport,
) {
    let mut data = serde_json::Map::new();
    data.insert(
        "message".to_string(),
        Value::String(export.message.clone()),
    );
    if let Some(Value::Object(extra)) = &export.data {
        for (key, value) in extra {
            data.insert(key.clone(), value.clone());
        }
    }

    let job_error = VerificationJobError {
        code: export.code.to_string(),
        error_id: export.error_id,
        data: Some(Value::Object(data)),
    };
    if let Err(error) = contract_verification_database::mark_verification_job_failed(
        database_connection,
        job_id,
        &job_error,
    )
    .await
    {
        tracing::error!(
            verification_id = %job_id,
            error = format!("{error:#}"),
            "failed to persist the verification error"
        );
    }
}
