use clap::Parser;
use provision_panel::{api, state};
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "provision-stub")]
#[command(about = "In-memory provisioning service for local use with provctl")]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// Delay before answering create/destroy requests, in milliseconds
    #[arg(short, long, default_value_t = 0)]
    delay_ms: u64,
}

fn print_banner(args: &Args) {
    println!();
    println!("  ╔═══════════════════════════════════════════╗");
    println!("  ║          Provisioning Stub Service        ║");
    println!("  ╚═══════════════════════════════════════════╝");
    println!();
    println!("  Version:   {}", VERSION);
    println!("  Delay:     {} ms", args.delay_ms);
    println!();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    print_banner(&args);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "provision_panel=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state = api::StubState::new(
        state::ProvisionRegistry::new(),
        Duration::from_millis(args.delay_ms),
    );
    let app = api::create_router(state).layer(TraceLayer::new_for_http());

    let listener = match tokio::net::TcpListener::bind(args.bind).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind {}: {}", args.bind, e);
            std::process::exit(1);
        }
    };

    println!("  Listening on http://{}", args.bind);
    println!();

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
