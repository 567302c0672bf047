use std::{
    process,
    sync::{Arc, OnceLock},
};

use templog::{
    config::Config,
    core::{backends::BackendFactory, executor::Executor, identity},
    logger::LoggerManager,
    print_error,
    sensor::FakeSensor,
};
use tracing::{debug, error, info};

static CONFIG: OnceLock<Config> = OnceLock::new();

pub fn config() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::new().unwrap_or_else(|e| {
            print_error!("{}", e);
            process::exit(1);
        })
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config();

    let logger_manager = LoggerManager::new(cfg.logger.clone()).unwrap_or_else(|e| {
        print_error!("failed to set up logging: {}", e);
        process::exit(1);
    });
    logger_manager.init().unwrap_or_else(|e| {
        print_error!("failed to init logging: {}", e);
        process::exit(1);
    });

    info!("starting templog version {}...", env!("CARGO_PKG_VERSION"));
    info!("log level: {}", cfg.logger.level);
    info!("backend: {}", cfg.backend.label());
    debug!("{:#?}", cfg.backend);

    // Resolved once; every measurement of this process carries this id.
    let device_id = identity::resolve(&cfg.backend.identity()).unwrap_or_else(|e| {
        error!("failed to resolve device identity: {}", e);
        process::exit(1);
    });
    info!("device id: {}", device_id);

    let factory = Arc::new(cfg.backend.clone()) as Arc<dyn BackendFactory>;
    let executor = Executor::new(
        Arc::new(FakeSensor::default()),
        device_id,
        factory,
        cfg.sampling.clone(),
    );

    if cfg.sampling.collection_interval_secs == 0 {
        if let Err(e) = executor.run().await {
            error!("publish failed: {}", e);
            process::exit(1);
        }
        return Ok(());
    }

    tokio::select! {
        result = executor.run() => {
            if let Err(e) = result {
                error!("executor stopped: {}", e);
                process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C — shutting down");
        }
    }

    Ok(())
}
