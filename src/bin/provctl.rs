use clap::{Parser, Subcommand};
use colored::Colorize;
use provision_panel::client::HttpProvisioner;
use provision_panel::config::{PanelConfig, BASE_URL_ENV, DEFAULT_BASE_URL};
use provision_panel::controller::{Dispatch, Severity};
use provision_panel::panel::{Action, Change, Panel, PanelSubscription, PanelView};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;
use tabled::{Table, Tabled};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "provctl")]
#[command(about = "Control panel for creating and destroying provisioned instances")]
struct Cli {
    /// Provisioning API base URL
    #[arg(short, long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    server: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Request creation of an instance and wait for the outcome
    Create {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        device: String,
    },
    /// Request destruction of an instance and wait for the outcome
    Destroy {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        device: String,
    },
    /// Show the status of a provisioning job
    Job { job_id: String },
}

type HttpPanel = Panel<HttpProvisioner>;

#[derive(Tabled)]
struct FieldRow {
    field: &'static str,
    value: String,
}

enum LineEvent {
    Line(String),
    Interrupted,
    Eof,
}

fn print_help() {
    println!("{}", "Available commands:".bold());
    println!("  {}    - Set the user name", "user <name>".cyan());
    println!("  {}    - Set the device ID", "device <id>".cyan());
    println!("  {}           - Show the current fields", "show".cyan());
    println!("  {}         - Request creation of the instance", "create".cyan());
    println!("  {}        - Request destruction of the instance", "destroy".cyan());
    println!("  {}         - Show the last request status", "status".cyan());
    println!("  {}       - Show the status of a provisioning job", "job <id>".cyan());
    println!("  {}           - Show this help", "help".cyan());
    println!("  {}           - Exit", "exit".cyan());
    println!();
    println!(
        "{} Only one request runs at a time; create/destroy are ignored while busy.",
        "Note:".dimmed()
    );
}

fn styled_status(view: &PanelView) -> String {
    if view.busy {
        return format!("{} {}", "Busy:".yellow(), view.status);
    }
    match view.severity {
        Some(Severity::Info) => format!("{} {}", "Success:".green(), view.status),
        Some(Severity::Warning) => format!("{} {}", "Warning:".yellow(), view.status),
        Some(Severity::Error) => format!("{} {}", "Error:".red(), view.status),
        None => view.status.clone(),
    }
}

fn print_view(view: &PanelView) {
    if view.status.is_empty() {
        println!("{}", "No request has been made yet".dimmed());
    } else {
        println!("{}", styled_status(view));
    }
}

fn print_fields(panel: &HttpPanel) {
    let identity = panel.input().current_identity();
    let instance_name = match identity.validate() {
        Ok(()) => identity.instance_name(),
        Err(_) => "-".to_string(),
    };
    let rows = vec![
        FieldRow {
            field: "user",
            value: identity.user,
        },
        FieldRow {
            field: "device",
            value: identity.device,
        },
        FieldRow {
            field: "instance_name",
            value: instance_name,
        },
    ];
    println!("{}", Table::new(rows));
}

fn report_dispatch(dispatch: Dispatch) {
    // sent and rejected requests are reported by the status renderer
    if dispatch == Dispatch::Ignored {
        println!(
            "{} A request is already in flight; action ignored",
            "Busy:".yellow()
        );
    }
}

async fn show_job(api: &HttpProvisioner, job_id: &str) -> bool {
    match api.job_status(job_id).await {
        Ok(report) => {
            let status = match report.status.as_str() {
                "finished" => report.status.green().to_string(),
                "failed" | "not_found" => report.status.red().to_string(),
                _ => report.status.yellow().to_string(),
            };
            println!("  Job:     {}", job_id.yellow());
            println!("  Status:  {}", status);
            if let Some(result) = report.result {
                let pretty =
                    serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string());
                println!("  Result:  {}", pretty);
            }
            report.status != "not_found"
        }
        Err(e) => {
            println!("{} {}", "Error:".red(), e.reason());
            false
        }
    }
}

async fn handle_command(line: &str, panel: &mut HttpPanel, api: &HttpProvisioner) -> bool {
    let line = line.trim();
    let (command, arg) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command {
        "help" | "?" => print_help(),

        "exit" | "quit" | "q" => return false,

        "user" => {
            panel.set_user(arg);
            println!("  user = {:?}", arg);
        }

        "device" => {
            panel.set_device(arg);
            println!("  device = {:?}", arg);
        }

        "show" => print_fields(panel),

        "create" => report_dispatch(panel.invoke(Action::Create)),

        "destroy" => report_dispatch(panel.invoke(Action::Destroy)),

        "status" => print_view(&panel.view()),

        "job" => {
            if arg.is_empty() {
                println!("{}", "Usage: job <id>".yellow());
                return true;
            }
            show_job(api, arg).await;
        }

        _ => println!(
            "{} Unknown command: {}. Type 'help' for available commands.",
            "Error:".red(),
            command
        ),
    }

    true
}

/// Prints every request state change as it happens.
async fn render_status(mut subscription: PanelSubscription) {
    while let Some((change, view)) = subscription.changed().await {
        if change == Change::Request && !view.status.is_empty() {
            println!("{}", styled_status(&view));
        }
    }
}

/// Reads lines on a dedicated thread. After each line the reader waits for
/// an acknowledgement so the prompt is redrawn after the command's output.
fn spawn_line_reader(events: mpsc::UnboundedSender<LineEvent>, acks: std_mpsc::Receiver<()>) {
    thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                let _ = events.send(LineEvent::Eof);
                return;
            }
        };

        loop {
            let event = match rl.readline("provctl> ") {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(&line);
                    LineEvent::Line(line)
                }
                Err(ReadlineError::Interrupted) => LineEvent::Interrupted,
                Err(ReadlineError::Eof) => LineEvent::Eof,
                Err(err) => {
                    tracing::error!(error = %err, "readline failed");
                    LineEvent::Eof
                }
            };

            let last = matches!(event, LineEvent::Eof);
            if events.send(event).is_err() || last {
                break;
            }
            if acks.recv().is_err() {
                break;
            }
        }
    });
}

async fn run_interactive(api: Arc<HttpProvisioner>) {
    println!(
        "{}",
        r#"
                            _   _
  _ __  _ __ _____   _____| |_| |
 | '_ \| '__/ _ \ \ / / __| __| |
 | |_) | | | (_) \ V / (__| |_| |
 | .__/|_|  \___/ \_/ \___|\__|_|
 |_|     Provisioning Control Panel
"#
        .cyan()
    );
    println!("Connected to: {}", api.config().base_url().yellow());
    println!("Type {} for available commands\n", "help".cyan());

    let (mut panel, mut completions) = Panel::new(Arc::clone(&api));
    tokio::spawn(render_status(panel.subscribe()));

    let (line_tx, mut lines) = mpsc::unbounded_channel();
    let (ack_tx, ack_rx) = std_mpsc::channel();
    spawn_line_reader(line_tx, ack_rx);

    loop {
        tokio::select! {
            Some(completion) = completions.recv() => {
                panel.on_completion(completion);
            }
            event = lines.recv() => {
                let keep_going = match event {
                    Some(LineEvent::Line(line)) => handle_command(&line, &mut panel, &api).await,
                    Some(LineEvent::Interrupted) => {
                        println!("Use 'exit' to quit");
                        true
                    }
                    Some(LineEvent::Eof) | None => false,
                };
                if !keep_going {
                    println!("Goodbye!");
                    break;
                }
                let _ = ack_tx.send(());
            }
        }
    }
}

async fn run_once(api: Arc<HttpProvisioner>, action: Action, user: String, device: String) -> bool {
    let (mut panel, mut completions) = Panel::new(api);
    panel.set_user(user);
    panel.set_device(device);

    match panel.invoke(action) {
        Dispatch::Sent(request) => {
            println!(
                "{} {}",
                action.kind().busy_label(),
                request.instance_name.yellow()
            );
        }
        Dispatch::Rejected(_) | Dispatch::Ignored => {
            print_view(&panel.view());
            return false;
        }
    }

    let Some(completion) = completions.recv().await else {
        return false;
    };
    let outcome = panel.on_completion(completion);
    print_view(&panel.view());
    outcome.is_some_and(|outcome| outcome.is_success())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "provision_panel=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Read once; the base URL never changes for the life of the process
    let config = match PanelConfig::new(&cli.server) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "Error:".red(), e);
            std::process::exit(2);
        }
    };
    let api = Arc::new(HttpProvisioner::new(config));

    let ok = match cli.command {
        Some(Command::Create { user, device }) => run_once(api, Action::Create, user, device).await,
        Some(Command::Destroy { user, device }) => {
            run_once(api, Action::Destroy, user, device).await
        }
        Some(Command::Job { job_id }) => show_job(&api, &job_id).await,
        None => {
            run_interactive(api).await;
            true
        }
    };

    if !ok {
        std::process::exit(1);
    }
}
