// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::process::ExitCode;

use tracing::{debug, error, info, warn};

use ci_logs_indexer::{
    config::Config,
    logger,
    pipeline::{DirectorySource, Pipeline},
    sink::{ElasticsearchTransport, ShutdownStatus, SinkService},
};

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("CI_LOGS | ERROR | {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logger::init(&config.log_level) {
        eprintln!("CI_LOGS | ERROR | Failed to set up logging: {e}");
        return ExitCode::FAILURE;
    }
    debug!("Logging subsystem enabled");

    let transport = ElasticsearchTransport::new(
        &config.index_url,
        config.https_proxy.as_deref(),
        config.request_timeout,
    );
    info!(
        "Indexing {} into {} (index '{}')",
        config.data_dir.display(),
        transport.bulk_url(),
        config.index_name
    );

    let (sink, sink_task) = SinkService::spawn(config.sink_config(), transport);
    let pipeline = Pipeline::new(sink.clone(), config.resolver_config());

    if let Err(e) = pipeline.run(&DirectorySource::new(&config.data_dir)).await {
        error!("Indexing aborted: {e}");
        sink_task.abort();
        return ExitCode::FAILURE;
    }

    match sink.close(config.close_timeout).await {
        Ok(report) => {
            if report.status == ShutdownStatus::TimedOut {
                warn!(
                    "Shut down with deliveries pending: {} documents indexed in {} batches",
                    report.documents_indexed, report.batches_sent
                );
            } else {
                info!(
                    "Done: {} documents indexed in {} batches, {} retries",
                    report.documents_indexed, report.batches_sent, report.retries
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Indexing failed while closing: {e}");
            ExitCode::FAILURE
        }
    }
}
