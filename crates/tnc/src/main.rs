use std::sync::Arc;

use anyhow::Context;

use tnc_core::{
    config::Config,
    domain::UserId,
    gateway::Gateway,
    logging,
    store::Store,
    transport::{fake::FakeTransport, Transport},
};
use tnc_store::PgStore;

mod console;
mod health;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("tnc")?;

    let cfg = Arc::new(Config::load()?);

    let store: Arc<dyn Store> = {
        let pg = PgStore::connect(&cfg.database_url)
            .await
            .context("connecting to the database")?;
        pg.init_schema()
            .await
            .context("initializing the database schema")?;
        Arc::new(pg)
    };

    let transport = build_transport(&cfg)?;

    tokio::spawn(health::serve(cfg.health_port));

    let (gateway, outbound) = Gateway::new(cfg.clone(), store, transport);
    let sweeper = gateway.spawn_sweeper();

    tracing::info!(
        health_port = cfg.health_port,
        transport = %cfg.transport,
        "tnc started"
    );

    console::run(gateway.clone(), outbound, UserId(cfg.operator_user)).await?;

    gateway.shutdown();
    let _ = sweeper.await;
    Ok(())
}

fn build_transport(cfg: &Config) -> anyhow::Result<Arc<dyn Transport>> {
    match cfg.transport.as_str() {
        "fake" => {
            let fake = FakeTransport::default();
            if let Some(path) = &cfg.fake_directory_file {
                let entries = fake
                    .load_directory(path)
                    .with_context(|| format!("loading fake directory {}", path.display()))?;
                tracing::info!(entries, "loaded fake platform directory");
            }
            Ok(Arc::new(fake))
        }
        other => anyhow::bail!(
            "unknown TRANSPORT '{other}'; an MTProto client adapter plugs in \
             behind the tnc-core Transport port"
        ),
    }
}
