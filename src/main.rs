use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use shardline::client::AgentClient;
use shardline::config::{AgentConfig, TlsConfig};
use shardline::protocol::control::{ExecutorInfo, ResourceSpec, StartRequest};
use shardline::protocol::ExecutorStatus;
use shardline::server::AgentServer;
use shardline::shutdown::install_shutdown_handler;
use shardline::tls::TlsIdentity;

#[derive(Parser, Debug)]
#[command(name = "shardline")]
#[command(version)]
#[command(about = "Cluster node agent: shard storage, task execution and heartbeats")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start an agent on this node
    Agent(AgentArgs),

    /// Shard storage commands
    Shard {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: ShardCommands,
    },

    /// Executor management commands
    Exec {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: ExecCommands,
    },
}

// =============================================================================
// Agent Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct AgentArgs {
    /// Master address receiving heartbeats ("host:port")
    #[arg(long, default_value = "127.0.0.1:8930")]
    master: String,

    /// Host name or IP to listen on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value = "8931")]
    port: u16,

    /// Directory for shard files
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Data center label
    #[arg(long, default_value = "defaultDataCenter")]
    data_center: String,

    /// Rack label
    #[arg(long, default_value = "defaultRack")]
    rack: String,

    /// Maximum number of concurrent executors
    #[arg(long, default_value = "16")]
    max_executors: i32,

    /// Memory offered to tasks, in MB
    #[arg(long, default_value = "1024")]
    memory_mb: i64,

    /// CPU level offered to tasks
    #[arg(long, default_value = "1")]
    cpu_level: i32,

    /// Keep shard files left by a previous agent on the same port
    #[arg(long)]
    keep_shards: bool,

    /// Comma-separated capability tags this node provides
    #[arg(long, default_value = "")]
    resources: String,

    /// Heartbeat interval in milliseconds
    #[arg(long, default_value = "5000", value_parser = clap::value_parser!(u64).range(1..))]
    heartbeat_interval_ms: u64,

    // === TLS Options ===
    /// Enable mutual TLS on the listener and for heartbeats
    #[arg(long)]
    tls: bool,

    /// Path to CA certificate (PEM format)
    #[arg(long, requires = "tls")]
    ca_cert: Option<PathBuf>,

    /// Path to node certificate (PEM format)
    #[arg(long, requires = "tls")]
    cert: Option<PathBuf>,

    /// Path to node private key (PEM format)
    #[arg(long, requires = "tls")]
    key: Option<PathBuf>,

    /// Fall back to plaintext when --tls is given but certificates cannot be loaded.
    /// Useful for development. NOT recommended for production.
    #[arg(long)]
    allow_insecure: bool,
}

// =============================================================================
// Client Arguments (shared by shard and exec commands)
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Agent address ("host:port")
    #[arg(long, short = 'a', default_value = "127.0.0.1:8931")]
    addr: String,

    /// Path to CA certificate (PEM format) for TLS
    #[arg(long)]
    ca_cert: Option<PathBuf>,

    /// Path to client certificate (PEM format) for mTLS
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Path to client private key (PEM format) for mTLS
    #[arg(long)]
    key: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// Shard Commands
// =============================================================================

#[derive(clap::Subcommand, Debug)]
enum ShardCommands {
    /// Append data to a shard (reads stdin when no file is given)
    Put {
        name: String,
        file: Option<PathBuf>,
    },
    /// Read a shard to stdout
    Get {
        name: String,

        /// Byte offset to start from
        #[arg(long, default_value = "0")]
        offset: u64,
    },
    /// Delete a shard
    Delete { name: String },
}

// =============================================================================
// Exec Commands
// =============================================================================

#[derive(clap::Subcommand, Debug)]
enum ExecCommands {
    /// Launch a program on the agent
    Start {
        /// Program path
        path: String,

        /// Program arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,

        /// Working directory (defaults to the agent's shard directory)
        #[arg(long)]
        dir: Option<String>,

        /// CPUs charged while the program runs
        #[arg(long, default_value = "1")]
        cpus: i32,

        /// Memory charged while the program runs, in MB
        #[arg(long, default_value = "0")]
        memory_mb: i64,
    },
    /// Stop a running executor
    Stop { handle: Uuid },
    /// Get status of an executor
    Status { handle: Uuid },
    /// List running executors
    List,
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct StartOutput {
    handle: String,
    pid: u32,
}

#[derive(Serialize)]
struct StatusOutput {
    handle: String,
    status: String,
    exit_code: Option<i32>,
}

#[derive(Serialize)]
struct ExecutorOutput {
    handle: String,
    path: String,
    pid: u32,
    started_at_ms: i64,
    cpu_count: i32,
    memory_mb: i64,
}

impl From<&ExecutorInfo> for ExecutorOutput {
    fn from(info: &ExecutorInfo) -> Self {
        let resource = info.resource.clone().unwrap_or_default();
        Self {
            handle: info.handle.clone(),
            path: info.path.clone(),
            pid: info.pid,
            started_at_ms: info.started_at_ms,
            cpu_count: resource.cpu_count,
            memory_mb: resource.memory_mb,
        }
    }
}

#[derive(Serialize)]
struct DeleteOutput {
    name: String,
    deleted: bool,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn status_to_string(status: ExecutorStatus) -> &'static str {
    match status {
        ExecutorStatus::Unknown => "UNKNOWN",
        ExecutorStatus::Running => "RUNNING",
        ExecutorStatus::Completed => "COMPLETED",
        ExecutorStatus::Failed => "FAILED",
        ExecutorStatus::Stopped => "STOPPED",
    }
}

async fn create_client(args: &ClientArgs) -> Result<AgentClient, Box<dyn std::error::Error>> {
    match (&args.ca_cert, &args.cert, &args.key) {
        (Some(ca), Some(cert), Some(key)) => {
            let tls = TlsConfig {
                enabled: true,
                ca_cert_path: Some(ca.clone()),
                cert_path: Some(cert.clone()),
                key_path: Some(key.clone()),
                allow_insecure: false,
            };
            let identity = TlsIdentity::load(&tls).await?;
            Ok(AgentClient::with_tls(&args.addr, &identity)?)
        }
        (None, None, None) => Ok(AgentClient::new(&args.addr)),
        _ => Err("TLS requires all of --ca-cert, --cert and --key".into()),
    }
}

// =============================================================================
// Agent Implementation
// =============================================================================

async fn run_agent(args: AgentArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let tls = TlsConfig {
        enabled: args.tls,
        ca_cert_path: args.ca_cert,
        cert_path: args.cert,
        key_path: args.key,
        allow_insecure: args.allow_insecure,
    };
    if tls.enabled && !tls.is_complete() && !tls.allow_insecure {
        return Err("TLS enabled but missing required paths (--ca-cert, --cert, --key)".into());
    }

    let config = AgentConfig {
        master: args.master,
        host: args.host,
        port: args.port,
        dir: args.dir.unwrap_or_else(std::env::temp_dir),
        data_center: args.data_center,
        rack: args.rack,
        max_executors: args.max_executors,
        memory_mb: args.memory_mb,
        cpu_level: args.cpu_level,
        clean_restart: !args.keep_shards,
        provided_resources: args.resources,
        heartbeat_interval_ms: args.heartbeat_interval_ms,
        tls,
    };

    tracing::info!(
        master = %config.master,
        host = %config.host,
        port = config.port,
        data_center = %config.data_center,
        rack = %config.rack,
        resources = ?config.provided_tags(),
        "Starting shardline agent"
    );

    let server = AgentServer::start(config).await?;
    install_shutdown_handler(server.handle());
    server.run().await?;

    Ok(())
}

// =============================================================================
// Client Command Handlers
// =============================================================================

async fn handle_shard(
    client: &AgentClient,
    command: ShardCommands,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        ShardCommands::Put { name, file } => {
            let data = match file {
                Some(path) => tokio::fs::read(path).await?,
                None => {
                    let mut buf = Vec::new();
                    tokio::io::stdin().read_to_end(&mut buf).await?;
                    buf
                }
            };
            client.put(&name, &data).await?;
            eprintln!("Wrote {} bytes to shard {}", data.len(), name);
        }
        ShardCommands::Get { name, offset } => {
            let data = client.get(&name, offset).await?;
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&data).await?;
            stdout.flush().await?;
        }
        ShardCommands::Delete { name } => {
            let deleted = client.delete_shard(&name).await?;
            match output_format {
                OutputFormat::Json => {
                    let output = DeleteOutput { name, deleted };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Table => {
                    if deleted {
                        println!("Shard {} deleted.", name);
                    } else {
                        println!("Shard {} not found.", name);
                    }
                }
            }
        }
    }
    Ok(())
}

async fn handle_exec(
    client: &AgentClient,
    command: ExecCommands,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        ExecCommands::Start {
            path,
            args,
            dir,
            cpus,
            memory_mb,
        } => {
            let request = StartRequest {
                path,
                args,
                dir: dir.unwrap_or_default(),
                resource: Some(ResourceSpec {
                    cpu_count: cpus,
                    cpu_level: 0,
                    memory_mb,
                }),
            };
            let resp = client.start(request).await?;
            if !resp.error.is_empty() {
                return Err(format!("Start failed: {}", resp.error).into());
            }
            match output_format {
                OutputFormat::Json => {
                    let output = StartOutput {
                        handle: resp.handle,
                        pid: resp.pid,
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Table => {
                    println!("Executor started.");
                    println!("Handle: {}", resp.handle);
                    println!("PID:    {}", resp.pid);
                }
            }
        }
        ExecCommands::Stop { handle } => {
            client.stop(handle).await?;
            println!("Executor {} stopped.", handle);
        }
        ExecCommands::Status { handle } => {
            let resp = client.status(handle).await?;
            if !resp.error.is_empty() {
                return Err(resp.error.into());
            }
            let status = status_to_string(resp.status());
            match output_format {
                OutputFormat::Json => {
                    let output = StatusOutput {
                        handle: resp.handle,
                        status: status.to_string(),
                        exit_code: resp.exit_code,
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Table => {
                    println!("Handle:    {}", resp.handle);
                    println!("Status:    {}", status);
                    if let Some(exit_code) = resp.exit_code {
                        println!("Exit Code: {}", exit_code);
                    }
                }
            }
        }
        ExecCommands::List => {
            let executors = client.list().await?;
            match output_format {
                OutputFormat::Json => {
                    let output: Vec<ExecutorOutput> =
                        executors.iter().map(ExecutorOutput::from).collect();
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Table => {
                    if executors.is_empty() {
                        println!("No running executors.");
                        return Ok(());
                    }
                    println!("{:<38} {:<8} {:<5} PATH", "HANDLE", "PID", "CPUS");
                    println!("{}", "-".repeat(70));
                    for info in &executors {
                        let row = ExecutorOutput::from(info);
                        println!(
                            "{:<38} {:<8} {:<5} {}",
                            row.handle, row.pid, row.cpu_count, row.path
                        );
                    }
                }
            }
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Agent(agent_args) => {
            run_agent(agent_args).await?;
        }
        Commands::Shard { client, command } => {
            let agent = create_client(&client).await?;
            handle_shard(&agent, command, &client.output).await?;
        }
        Commands::Exec { client, command } => {
            let agent = create_client(&client).await?;
            handle_exec(&agent, command, &client.output).await?;
        }
    }

    Ok(())
}
