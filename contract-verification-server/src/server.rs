use crate::{
    handlers::{self, AppState},
    settings::Settings,
};
use anyhow::Context;
use blockscout_service_launcher::{database, launcher, launcher::LaunchSettings, tracing};
use contract_verification_logic::{
    chain::{Chains, JsonRpcChain},
    compiler::ProcessCompiler,
    engine::VerificationEngine,
    explorer::{EtherscanImporter, ExplorerImporter},
    pool::WorkerPool,
    replace::ReplaceEngine,
    sinks::{
        AllianceDatabaseSink, CanonicalStoreSink, ExplorerFamily, ExplorerVerifySink,
        ObjectStorage, ReadSink, RepositorySink, S3RepositorySink, SinkIdentifier, WriteSink,
    },
    storage::StorageFanout,
    verifier::BytecodeVerifier,
};
use contract_verification_migration::Migrator;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::{collections::BTreeMap, sync::Arc};

const SERVICE_NAME: &str = "contract_verification";

#[derive(Clone)]
struct Router {
    state: Arc<AppState>,
}

impl launcher::HttpRouter for Router {
    fn register_routes(&self, service_config: &mut actix_web::web::ServiceConfig) {
        handlers::configure_routes(service_config, Arc::clone(&self.state));
    }
}

async fn connect_database(
    url: &str,
    max_connections: u32,
) -> Result<Arc<DatabaseConnection>, anyhow::Error> {
    let mut options = ConnectOptions::new(url.to_string());
    options.max_connections(max_connections);
    let connection = Database::connect(options)
        .await
        .context("connecting to the database")?;
    Ok(Arc::new(connection))
}

struct ConfiguredSinks {
    by_identifier: BTreeMap<SinkIdentifier, Arc<dyn WriteSink>>,
    canonical: Arc<CanonicalStoreSink>,
    repository: Option<Arc<RepositorySink>>,
}

async fn build_sinks(
    settings: &Settings,
    database_connection: &Arc<DatabaseConnection>,
) -> Result<ConfiguredSinks, anyhow::Error> {
    let mut by_identifier: BTreeMap<SinkIdentifier, Arc<dyn WriteSink>> = BTreeMap::new();

    let canonical = Arc::new(
        CanonicalStoreSink::new(Arc::clone(database_connection))
            .with_fail_on_signature_errors(settings.fail_on_signature_errors),
    );
    by_identifier.insert(
        SinkIdentifier::SourcifyDatabase,
        Arc::clone(&canonical) as Arc<dyn WriteSink>,
    );

    if settings.alliance_database.enabled {
        // The alliance database is shared between explorers and managed from
        // outside, so it is never created or migrated from here.
        let alliance_connection = connect_database(&settings.alliance_database.url, 5).await?;
        by_identifier.insert(
            SinkIdentifier::AllianceDatabase,
            Arc::new(AllianceDatabaseSink::new(alliance_connection)),
        );
    }

    let mut repository = None;
    if settings.repository.enabled {
        let v1 = Arc::new(RepositorySink::v1(settings.repository.root_path.clone()));
        repository = Some(Arc::clone(&v1));
        by_identifier.insert(SinkIdentifier::RepositoryV1, v1);
        by_identifier.insert(
            SinkIdentifier::RepositoryV2,
            Arc::new(RepositorySink::v2(settings.repository.root_path.clone())),
        );
    }

    if let Some(s3_settings) = settings.s3_repository.clone() {
        let storage = ObjectStorage::new(s3_settings)
            .await
            .context("s3 repository initialization")?;
        by_identifier.insert(
            SinkIdentifier::S3Repository,
            Arc::new(S3RepositorySink::new(storage)),
        );
    }

    for (family, verifier_settings) in [
        (ExplorerFamily::Etherscan, &settings.external_verifiers.etherscan),
        (
            ExplorerFamily::Blockscout,
            &settings.external_verifiers.blockscout,
        ),
        (
            ExplorerFamily::Routescan,
            &settings.external_verifiers.routescan,
        ),
    ] {
        if verifier_settings.enabled {
            let sink = ExplorerVerifySink::new(
                family,
                verifier_settings.directory_url.clone(),
                verifier_settings.api_keys.clone(),
                verifier_settings.default_api_key.clone(),
                Arc::clone(database_connection),
            );
            by_identifier.insert(family.sink_identifier(), Arc::new(sink));
        }
    }

    Ok(ConfiguredSinks {
        by_identifier,
        canonical,
        repository,
    })
}

fn select_sinks(
    identifiers: &[SinkIdentifier],
    sinks: &ConfiguredSinks,
) -> Result<Vec<Arc<dyn WriteSink>>, anyhow::Error> {
    identifiers
        .iter()
        .map(|identifier| {
            sinks.by_identifier.get(identifier).cloned().ok_or_else(|| {
                anyhow::anyhow!("sink {identifier} is listed in the storage policy but not configured")
            })
        })
        .collect()
}

pub async fn run(settings: Settings) -> Result<(), anyhow::Error> {
    tracing::init_logs(SERVICE_NAME, &settings.tracing, &settings.jaeger)?;

    database::initialize_postgres::<Migrator>(
        &settings.database.url,
        settings.database.create_database,
        settings.database.run_migrations,
    )
    .await?;
    let database_connection =
        connect_database(&settings.database.url, settings.database.max_connections).await?;

    let sinks = build_sinks(&settings, &database_connection).await?;

    let read_sink: Arc<dyn ReadSink> = match settings.storage.read {
        SinkIdentifier::SourcifyDatabase => Arc::clone(&sinks.canonical) as Arc<dyn ReadSink>,
        SinkIdentifier::RepositoryV1 | SinkIdentifier::RepositoryV2 => sinks
            .repository
            .clone()
            .map(|repository| repository as Arc<dyn ReadSink>)
            .ok_or(anyhow::anyhow!(
                "repository read sink requires the repository to be enabled"
            ))?,
        other => anyhow::bail!("sink {other} cannot serve reads"),
    };

    let storage = Arc::new(StorageFanout::new(
        read_sink,
        select_sinks(&settings.storage.write_or_err, &sinks)?,
        select_sinks(&settings.storage.write_or_warn, &sinks)?,
    ));
    storage.init().await.context("initializing write sinks")?;

    let chains = {
        let mut inner: BTreeMap<i64, Arc<dyn contract_verification_logic::chain::Chain>> =
            BTreeMap::new();
        for (chain_id, chain_settings) in &settings.chains {
            inner.insert(
                *chain_id,
                Arc::new(JsonRpcChain::new(
                    chain_settings.rpc_url.clone(),
                    chain_settings.max_retries,
                )),
            );
        }
        Chains::new(inner)
    };

    let compiler = Arc::new(ProcessCompiler::new(settings.compilers.dir.clone()));
    let verifier = Arc::new(BytecodeVerifier);

    let debug_store = match settings.debug_data_store.clone() {
        Some(debug_settings) => Some(Arc::new(
            ObjectStorage::new(debug_settings)
                .await
                .context("debug data store initialization")?,
        )),
        None => None,
    };

    let pool = Arc::new(WorkerPool::new(&settings.worker_pool)?);

    let engine = Arc::new(VerificationEngine::new(
        Arc::clone(&database_connection),
        Arc::clone(&storage),
        Arc::clone(&pool),
        compiler.clone(),
        verifier.clone(),
        chains.clone(),
        debug_store,
    ));

    let replace_engine = Arc::new(ReplaceEngine::new(
        Arc::clone(&database_connection),
        compiler,
        verifier,
        chains,
    ));

    let explorer_importer: Option<Arc<dyn ExplorerImporter>> = settings
        .etherscan_import
        .enabled
        .then(|| {
            Arc::new(EtherscanImporter::new(
                settings.etherscan_import.api_url.clone(),
                settings.etherscan_import.default_api_key.clone(),
            )) as Arc<dyn ExplorerImporter>
        });

    let state = Arc::new(AppState {
        engine: Arc::clone(&engine),
        replace_engine,
        explorer_importer,
    });

    let router = Router { state };
    let grpc_router = tonic::transport::Server::builder()
        .add_routes(tonic::service::Routes::default());

    let launch_settings = LaunchSettings {
        service_name: SERVICE_NAME.to_string(),
        server: settings.server,
        metrics: settings.metrics,
    };

    let result = launcher::launch(&launch_settings, router, grpc_router).await;

    // Drain in-flight verifications so every job row is terminal before the
    // process exits.
    engine.close().await;

    result
}
