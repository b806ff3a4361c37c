//! HTTP front end for the snippet executor
//!
//! ## Endpoints
//!
//! GET / - Welcome message
//! GET /health - Liveness probe
//! POST /playground/execute - Run a snippet, `{"code": ...}` in, `{"stdout", "stderr"}` out

use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{App, HttpResponse, HttpServer, Responder, web};
use clap::Parser;
use console::style;
use log::{error, info, warn};
use playground_sandbox::{
    ExecutionRequest, ExecutionResult, Executor, ExecutorBuilder, INTERNAL_ERROR_MESSAGE,
    NamespaceConfig, SecurityProfile, logging,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "playground-server")]
#[command(version, about = "Serve the snippet playground over HTTP", long_about = None)]
struct Cli {
    /// Address to bind
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8000)]
    port: u16,

    /// Limit preset
    #[arg(short = 'P', long, value_name = "PROFILE", default_value = "strict")]
    profile: SecurityProfile,

    /// Deadline in seconds (overrides the profile)
    #[arg(short, long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Memory limit (256M, 1G) (overrides the profile)
    #[arg(short, long, value_name = "SIZE")]
    memory: Option<String>,

    /// Interpreter program
    #[arg(short, long, value_name = "PATH")]
    interpreter: Option<PathBuf>,

    /// Directory for per-run scratch directories
    #[arg(long, value_name = "PATH")]
    scratch_root: Option<PathBuf>,

    /// Run each snippet in fresh user/net/ipc/uts namespaces
    #[arg(long)]
    isolate: bool,

    /// Maximum snippets running at once per worker
    #[arg(long, value_name = "N")]
    max_concurrent: Option<usize>,

    /// Show verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn build_executor(cli: &Cli) -> playground_sandbox::Result<Executor> {
    let mut builder = cli.profile.apply(ExecutorBuilder::new());

    if let Some(t) = cli.timeout {
        builder = builder.deadline(Duration::from_secs(t));
    }
    if let Some(m) = &cli.memory {
        builder = builder.memory_limit_str(m)?;
    }
    if let Some(i) = &cli.interpreter {
        builder = builder.interpreter(i);
    }
    if let Some(r) = &cli.scratch_root {
        builder = builder.scratch_root(r);
    }
    if cli.isolate {
        builder = builder.namespaces(NamespaceConfig::isolated());
    }

    builder.build()
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();
    logging::init_logger(cli.verbose);

    let executor = match build_executor(&cli) {
        Ok(executor) => executor,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            std::process::exit(2);
        }
    };

    if !playground_sandbox::utils::interpreter_available(&executor.runner().config().interpreter)
    {
        warn!("Interpreter is not reachable; every run will report an internal error");
    }

    let state = web::Data::new(executor);
    let addr = (cli.bind.clone(), cli.port);

    info!(
        "Playground server starting on http://{}:{} (profile {:?})",
        cli.bind, cli.port, cli.profile
    );

    let mut server = HttpServer::new(move || App::new().app_data(state.clone()).configure(routes));
    if let Some(n) = cli.max_concurrent {
        server = server.worker_max_blocking_threads(n.max(1));
    }

    server.bind(addr)?.run().await
}

/// Largest request body accepted by the execute endpoint
const MAX_REQUEST_BYTES: usize = 1024 * 1024;

const MALFORMED_REQUEST_MESSAGE: &str =
    "Error: Request body must be a JSON object with a string 'code' field.";
const OVERSIZED_REQUEST_MESSAGE: &str = "Error: Snippet exceeds the 1 MiB request size limit.";

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(welcome))
        .route("/health", web::get().to(health_check))
        .service(
            web::resource("/playground/execute")
                .app_data(json_config())
                .route(web::post().to(execute)),
        );
}

/// Bodies that do not decode still get a well-formed 200 result
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(MAX_REQUEST_BYTES)
        .error_handler(|err, _req| {
            let message = match err {
                JsonPayloadError::Overflow { .. } | JsonPayloadError::OverflowKnownLength { .. } => {
                    OVERSIZED_REQUEST_MESSAGE
                }
                _ => MALFORMED_REQUEST_MESSAGE,
            };
            warn!("Rejected execute request: {}", err);
            let body = ExecutionResult::failure(message);
            InternalError::from_response(err, HttpResponse::Ok().json(body)).into()
        })
}

// ============ Handlers ============

async fn welcome() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "Message": "Welcome to the Python Playground Backend!"
    }))
}

/// Health check endpoint
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Run one snippet. Always answers 200; failures travel in `stderr`.
async fn execute(
    req: web::Json<ExecutionRequest>,
    executor: web::Data<Executor>,
) -> impl Responder {
    let request = req.into_inner();

    let result = match web::block(move || executor.execute(&request)).await {
        Ok(result) => result,
        Err(e) => {
            error!("Blocking pool failure: {}", e);
            ExecutionResult::failure(INTERNAL_ERROR_MESSAGE)
        }
    };

    HttpResponse::Ok().json(result)
}
