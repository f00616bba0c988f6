use std::{net::TcpListener, sync::Arc, time::Duration};

use anyhow::Context;
use env_logger::Env;
use sector::{
    configuration::get_configuration,
    domain::taxonomy::Taxonomy,
    services::{
        ml_health_handler, taxonomy_refresh_handler, transition_logger_handler, SharedTaxonomy,
    },
    startup::{build_ml_classifier, build_pipeline, run},
};
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let configuration = get_configuration().context("Failed to read configuration.")?;

    let bundled = Taxonomy::bundled().context("Bundled taxonomy is invalid")?;
    log::info!(
        "Loaded bundled taxonomy with {} keywords",
        bundled.keyword_count()
    );
    let taxonomy = Arc::new(SharedTaxonomy::new(Some(bundled)));

    if configuration.database.enabled {
        let connection_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy_with(configuration.database.with_db());

        let store = taxonomy.clone();
        let interval = Duration::from_secs(configuration.taxonomy.refresh_interval_secs);
        tokio::spawn(async move { taxonomy_refresh_handler(connection_pool, store, interval).await });
    }

    let ml = build_ml_classifier(&configuration)?.map(Arc::new);

    // Spawn background tasks
    if let Some(ml) = &ml {
        let transitions = ml.breaker().subscribe();
        tokio::spawn(async move { transition_logger_handler(transitions).await });

        let backend = ml.backend().clone();
        let breaker = ml.breaker().clone();
        let interval = Duration::from_millis(configuration.circuit_breaker.health_check_interval_ms);
        let probe_timeout =
            Duration::from_millis(configuration.circuit_breaker.health_check_timeout_ms);
        tokio::spawn(
            async move { ml_health_handler(backend, breaker, interval, probe_timeout).await },
        );
    }

    let pipeline = build_pipeline(&configuration, taxonomy, ml)?;

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    log::info!("Listening on {}", address);

    run(listener, Arc::new(pipeline))?.await?;
    Ok(())
}
