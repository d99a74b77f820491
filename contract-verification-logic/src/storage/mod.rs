use crate::{
    metrics,
    sinks::{JobContext, ReadSink, SinkError, SinkReceipt, WriteSink},
    types::VerificationResult,
};
use std::sync::Arc;

/// Orchestrates one verification across every configured write backend with
/// per-class failure semantics: `writeOrErr` sinks run first and abort on the
/// first typed error, `writeOrWarn` sinks run afterwards and only log.
/// Within each class, declaration order is preserved.
pub struct StorageFanout {
    read: Arc<dyn ReadSink>,
    write_or_err: Vec<Arc<dyn WriteSink>>,
    write_or_warn: Vec<Arc<dyn WriteSink>>,
}

impl StorageFanout {
    pub fn new(
        read: Arc<dyn ReadSink>,
        write_or_err: Vec<Arc<dyn WriteSink>>,
        write_or_warn: Vec<Arc<dyn WriteSink>>,
    ) -> Self {
        Self {
            read,
            write_or_err,
            write_or_warn,
        }
    }

    pub fn read(&self) -> &Arc<dyn ReadSink> {
        &self.read
    }

    /// Initializes every write sink; any failure aborts startup.
    pub async fn init(&self) -> Result<(), anyhow::Error> {
        for sink in self.write_or_err.iter().chain(self.write_or_warn.iter()) {
            sink.init().await?;
        }
        Ok(())
    }

    /// Fans the result out to all sinks. Returns the receipt of the sink
    /// that produced canonical row ids (at most one does).
    pub async fn store_verification(
        &self,
        result: &VerificationResult,
        job: Option<&JobContext>,
    ) -> Result<SinkReceipt, SinkError> {
        let mut canonical_receipt = SinkReceipt::default();

        for sink in &self.write_or_err {
            let sink_name = sink.identifier().to_string();
            let timer = metrics::SINK_STORE_TIME
                .with_label_values(&[sink_name.as_str()])
                .start_timer();
            let receipt = sink.store_verification(result, job).await;
            timer.observe_duration();

            match receipt {
                Ok(receipt) => {
                    if receipt.verified_contract_id.is_some() {
                        canonical_receipt = receipt;
                    }
                }
                Err(error) => {
                    metrics::SINK_STORE_ERRORS
                        .with_label_values(&[sink_name.as_str(), "write_or_err"])
                        .inc();
                    return Err(error);
                }
            }
        }

        for sink in &self.write_or_warn {
            let sink_name = sink.identifier().to_string();
            let timer = metrics::SINK_STORE_TIME
                .with_label_values(&[sink_name.as_str()])
                .start_timer();
            let receipt = sink.store_verification(result, job).await;
            timer.observe_duration();

            if let Err(error) = receipt {
                metrics::SINK_STORE_ERRORS
                    .with_label_values(&[sink_name.as_str(), "write_or_warn"])
                    .inc();
                let trace_id = job.map(|job| job.trace_id.clone()).unwrap_or_default();
                tracing::warn!(
                    sink = sink_name,
                    trace_id,
                    error = %error,
                    "write-or-warn sink failed to store the verification"
                );
            }
        }

        Ok(canonical_receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        sinks::{ContractView, FilesView, MockWriteSink, SinkIdentifier},
        types::{CompilationReady, DeploymentInfo},
    };
    use async_trait::async_trait;
    use contract_verification_database::{
        CompiledContractCompiler, CompiledContractLanguage, VerifiedContractMatches,
    };
    use std::{
        collections::BTreeMap,
        sync::atomic::{AtomicUsize, Ordering},
    };
    use verification_common::{
        CompilationArtifacts, CreationCodeArtifacts, Match, MatchValues, RuntimeCodeArtifacts,
    };

    struct NoopReadSink;

    #[async_trait]
    impl ReadSink for NoopReadSink {
        async fn get_contract(
            &self,
            _chain_id: i64,
            _address: &[u8],
        ) -> Result<Option<ContractView>, anyhow::Error> {
            Ok(None)
        }

        async fn get_files(
            &self,
            _chain_id: i64,
            _address: &[u8],
        ) -> Result<Option<FilesView>, anyhow::Error> {
            Ok(None)
        }
    }

    fn sample_result() -> VerificationResult {
        VerificationResult {
            deployment: DeploymentInfo {
                chain_id: 1337,
                address: vec![0xab; 20],
                runtime_code: Some(vec![0x60, 0x80]),
                ..Default::default()
            },
            compilation: CompilationReady {
                compiler: CompiledContractCompiler::Solc,
                language: CompiledContractLanguage::Solidity,
                version: "0.8.20+commit.a1b79de6".to_string(),
                name: "Storage".to_string(),
                fully_qualified_name: "contracts/Storage.sol:Storage".to_string(),
                sources: BTreeMap::new(),
                compiler_settings: serde_json::json!({}),
                compilation_artifacts: CompilationArtifacts::default(),
                creation_code: vec![0x60],
                creation_code_artifacts: CreationCodeArtifacts::default(),
                runtime_code: vec![0x60, 0x80],
                runtime_code_artifacts: RuntimeCodeArtifacts::default(),
            },
            matches: VerifiedContractMatches::OnlyRuntime {
                runtime_match: Match {
                    metadata_match: false,
                    transformations: vec![],
                    values: MatchValues::default(),
                },
            },
        }
    }

    fn mock_sink(
        identifier: SinkIdentifier,
        outcome: impl Fn() -> Result<SinkReceipt, SinkError> + Send + Sync + 'static,
    ) -> Arc<dyn WriteSink> {
        let mut sink = MockWriteSink::new();
        sink.expect_identifier().return_const(identifier);
        sink.expect_store_verification()
            .returning(move |_, _| outcome());
        Arc::new(sink)
    }

    #[tokio::test]
    async fn write_or_err_failure_aborts_before_warn_sinks_run() {
        static WARN_CALLS: AtomicUsize = AtomicUsize::new(0);

        let failing = mock_sink(SinkIdentifier::SourcifyDatabase, || {
            Err(SinkError::AlreadyVerified)
        });
        let warn = mock_sink(SinkIdentifier::RepositoryV1, || {
            WARN_CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(SinkReceipt::default())
        });

        let fanout = StorageFanout::new(Arc::new(NoopReadSink), vec![failing], vec![warn]);
        let error = fanout
            .store_verification(&sample_result(), None)
            .await
            .unwrap_err();
        assert!(matches!(error, SinkError::AlreadyVerified));
        assert_eq!(WARN_CALLS.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn warn_sink_failures_do_not_fail_the_request() {
        let canonical = mock_sink(SinkIdentifier::SourcifyDatabase, || {
            Ok(SinkReceipt {
                verified_contract_id: Some(17),
                runtime_status: None,
                creation_status: None,
            })
        });
        let failing_warn = mock_sink(SinkIdentifier::EtherscanVerify, || {
            Err(SinkError::Internal(anyhow::anyhow!("rate limited")))
        });

        let fanout =
            StorageFanout::new(Arc::new(NoopReadSink), vec![canonical], vec![failing_warn]);
        let receipt = fanout
            .store_verification(&sample_result(), None)
            .await
            .unwrap();
        assert_eq!(receipt.verified_contract_id, Some(17));
    }

    #[tokio::test]
    async fn write_or_err_sinks_run_in_declaration_order() {
        static ORDER: AtomicUsize = AtomicUsize::new(0);

        let first = mock_sink(SinkIdentifier::SourcifyDatabase, || {
            let order = ORDER.fetch_add(1, Ordering::SeqCst);
            assert_eq!(order, 0);
            Ok(SinkReceipt::default())
        });
        let second = mock_sink(SinkIdentifier::AllianceDatabase, || {
            let order = ORDER.fetch_add(1, Ordering::SeqCst);
            assert_eq!(order, 1);
            Ok(SinkReceipt::default())
        });

        let fanout = StorageFanout::new(Arc::new(NoopReadSink), vec![first, second], vec![]);
        fanout
            .store_verification(&sample_result(), None)
            .await
            .unwrap();
        assert_eq!(ORDER.load(Ordering::SeqCst), 2);
    }
}
