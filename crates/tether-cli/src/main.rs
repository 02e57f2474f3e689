//! minimal_service
//!
//! Exposes `add_two_ints` on an in-process transport, calls it a few times
//! through a client, then shuts down.
//!
//! ```text
//! RUST_LOG=debug minimal_service -a 3 -b 4 --calls 2
//! minimal_service --config service.json
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tether_core::domain::HandlerError;
use tether_core::impls::InMemoryTransport;
use tether_core::typed::from_fn;
use tether_core::typed::interfaces::{AddTwoInts, AddTwoIntsRequest, AddTwoIntsResponse};
use tether_core::{Context, Executor, Node, RequestContext, ServiceOptions};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Name of the node that owns the service.
    #[arg(long)]
    node_name: Option<String>,

    #[arg(long)]
    service_name: Option<String>,

    /// JSON file with `node_name`, `service_name` and `service` options.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(short, long, default_value_t = 2, allow_negative_numbers = true)]
    a: i64,

    #[arg(short, long, default_value_t = 3, allow_negative_numbers = true)]
    b: i64,

    /// How many requests the demo client sends (`b` grows by one each time).
    #[arg(long, default_value_t = 1)]
    calls: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    node_name: Option<String>,
    service_name: Option<String>,
    service: ServiceOptions,
}

impl FileConfig {
    fn load(path: Option<&PathBuf>) -> Result<Self, Box<dyn std::error::Error>> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                Ok(serde_json::from_str(&text)?)
            }
            None => Ok(Self::default()),
        }
    }
}

fn handle_service(
    ctx: &RequestContext<'_>,
    request: AddTwoIntsRequest,
    response: &mut AddTwoIntsResponse,
) -> Result<(), HandlerError> {
    info!(
        node = ctx.node_name(),
        request_id = %ctx.request_id(),
        "request: {} + {}",
        request.a,
        request.b
    );
    response.sum = request
        .a
        .checked_add(request.b)
        .ok_or_else(|| HandlerError::new("sum overflows i64"))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let file = FileConfig::load(cli.config.as_ref())?;
    let node_name = cli
        .node_name
        .or(file.node_name)
        .unwrap_or_else(|| "minimal_service".to_string());
    let service_name = cli
        .service_name
        .or(file.service_name)
        .unwrap_or_else(|| "add_two_ints".to_string());

    let transport = InMemoryTransport::new();
    let context = Context::initialized(Arc::new(transport.clone()));
    let node = Node::new(node_name, &context)?;
    let _server = node.create_service::<AddTwoInts, _>(
        &service_name,
        from_fn::<AddTwoInts, _>(handle_service),
        file.service,
    )?;

    let mut executor = Executor::new(&context);
    executor.add_node(Arc::clone(&node));
    let spinner = tokio::spawn(async move { executor.spin().await });

    let client = transport.client::<AddTwoInts>(&service_name)?;
    for i in 0..cli.calls {
        let request = AddTwoIntsRequest {
            a: cli.a,
            b: cli.b.saturating_add(i64::from(i)),
        };
        match client.call(&request).await {
            Ok(response) => info!("result of {} + {}: {}", request.a, request.b, response.sum),
            Err(err) => warn!(error = %err, "call failed"),
        }
    }

    context.shutdown();
    spinner.await?;
    Ok(())
}
