use anyhow::Context;
use campus_ledger::{App, AppContext, ConfigBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigBuilder::new()
        .from_env()
        .build()
        .context("invalid configuration")?;

    campus_ledger::init_tracing_with_config(&config);

    let catalog = config
        .load_plan_catalog()
        .context("failed to load plan catalog")?;
    tracing::info!(plans = ?catalog.plan_names(), "Plan catalog ready");

    let builder = AppContext::builder().with_catalog(catalog);

    #[cfg(feature = "database")]
    let builder = match &config.database {
        Some(database) => {
            let store = campus_ledger::SeaOrmStore::connect(database)
                .await
                .context("failed to open database")?;
            builder.with_store(store)
        }
        None => {
            tracing::warn!("No DATABASE_URL set, using in-memory storage");
            builder
        }
    };

    #[cfg(not(feature = "database"))]
    tracing::warn!("Built without the `database` feature, using in-memory storage");

    App::with_config(config)
        .with_context(builder.build())
        .with_default_routes()
        .start_scheduler()
        .serve()
        .await
        .context("server error")?;

    Ok(())
}
