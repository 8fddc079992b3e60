use anno_http::{explorer_defaults, ClientConfig, HttpSource};
use anno_protocol::ServerConfig;
use annomatrix::{AnnoMatrix, Explorer, ExplorerEvent, Field, Query};
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "anno_explorer=info,annomatrix=info,anno_http=info".into());
    Registry::default()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

pub struct Session {
    pub source: Arc<HttpSource>,
    pub server: ServerConfig,
    pub explorer: Explorer,
}

/// Load server config and schema, then build the loader and the session
/// over it.
pub async fn bootstrap(config: ClientConfig) -> Result<(Session, mpsc::UnboundedReceiver<ExplorerEvent>)> {
    info!(base_url = %config.base_url, "Initial data load start");
    let source = Arc::new(HttpSource::new(config)?);
    let (server, schema) = tokio::try_join!(source.fetch_config(), source.fetch_schema())?;

    let loader = AnnoMatrix::loader(schema, source.clone());
    let (explorer, events) =
        Explorer::new(loader, explorer_defaults(&server)).context("Failed to initialize explorer")?;
    info!("Initial data load complete");
    Ok((Session { source, server, explorer }, events))
}

/// Parse `field:column=value`, e.g. `var:gene_id=TP53`, into an X query.
pub fn parse_where(arg: &str) -> Result<Query> {
    let Some((field, rest)) = arg.split_once(':') else {
        bail!("expected field:column=value, got '{arg}'");
    };
    let Some((column, value)) = rest.split_once('=') else {
        bail!("expected field:column=value, got '{arg}'");
    };
    let field: Field = field.parse()?;
    Ok(Query::where_eq(field, column, value))
}

/// Parse `lo,hi` quantiles.
pub fn parse_range(arg: &str) -> Result<(f64, f64)> {
    let Some((lo, hi)) = arg.split_once(',') else {
        bail!("expected lo,hi, got '{arg}'");
    };
    Ok((
        lo.trim().parse().context("invalid lower bound")?,
        hi.trim().parse().context("invalid upper bound")?,
    ))
}
