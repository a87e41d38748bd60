//! ovpnctl CLI: automation interface for an OpenVPN gateway
//!
//! Every command prints at most one line of compact JSON on standard
//! output. Diagnostics go to standard error. Exit status is 0 on success,
//! 1 on a fatal error and 2 on a usage error.

mod logging;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use logging::{init_logging, LogConfig};
use ovpnctl_gateway::requests::parse;
use ovpnctl_gateway::{
    ClientRequest, EasyRsa, FirewallTools, Gateway, GatewayError, IpCommand, Issued, Layout, NameRequest,
    ServiceAction, SetupRequest, Systemd,
};
use ovpnctl_settings::ToolsConfig;
use serde::Serialize;
use serde_json::json;
use std::process::ExitCode;
use std::time::Duration;

type SystemGateway = Gateway<EasyRsa, Systemd, IpCommand>;

/// ovpnctl: manage an OpenVPN gateway from scripts
#[derive(Parser)]
#[command(name = "ovpnctl")]
#[command(version)]
#[command(about = "Command line interface for an OpenVPN gateway", long_about = None)]
#[command(after_help = "JSON options are passed as one quoted argument, e.g.\n  \
    ovpnctl setup '{\"port\": 1194}'\n\
    Without a command, the issued client certificates are listed.")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up or update the gateway with JSON options
    Setup {
        /// Settings to change, e.g. {"port": 1194}
        #[arg(value_name = "JSON")]
        options: String,
    },

    /// Print the current settings
    Get,

    /// Add a client certificate, or update its users
    Add {
        /// {"name": <unique name>, "users": [<login accounts>]}
        #[arg(value_name = "JSON")]
        options: String,
    },

    /// Revoke and delete a client certificate
    Del {
        /// {"name": <certificate name>}
        #[arg(value_name = "JSON")]
        options: String,
    },

    /// Write a client bundle archive and print its location
    Download {
        /// {"name": <certificate name>}
        #[arg(value_name = "JSON")]
        options: String,
    },

    /// Create a new certificate authority and server certificate
    #[command(name = "setup_cert")]
    SetupCert,

    /// Print the choices for the enumerated settings
    Getopt,

    /// Control the daemon
    Ctl {
        /// start, stop, restart, reload, enable, disable, isactive or isenabled
        action: String,
    },
}

impl Commands {
    fn writes(&self) -> bool {
        !matches!(self, Commands::Get | Commands::Getopt)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&LogConfig::for_verbosity(cli.verbose));

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_status(&e))
        }
    }
}

fn run(command: Option<Commands>) -> Result<()> {
    if command.as_ref().is_some_and(Commands::writes) {
        warn_unprivileged();
    }
    let gateway = open_gateway()?;

    match command {
        None => cmd_list(&gateway),
        Some(Commands::Setup { options }) => cmd_setup(&gateway, &options),
        Some(Commands::Get) => cmd_get(&gateway),
        Some(Commands::Add { options }) => cmd_add(&gateway, &options),
        Some(Commands::Del { options }) => cmd_del(&gateway, &options),
        Some(Commands::Download { options }) => cmd_download(&gateway, &options),
        Some(Commands::SetupCert) => cmd_setup_cert(&gateway),
        Some(Commands::Getopt) => cmd_getopt(&gateway),
        Some(Commands::Ctl { action }) => cmd_ctl(&gateway, &action),
    }
}

/// Usage errors exit with 2, everything else with 1
fn exit_status(e: &anyhow::Error) -> u8 {
    let usage = e
        .chain()
        .any(|cause| cause.downcast_ref::<GatewayError>().is_some_and(GatewayError::is_usage));
    if usage {
        2
    } else {
        1
    }
}

fn warn_unprivileged() {
    // SAFETY: geteuid has no preconditions and cannot fail
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        tracing::warn!("Not running as root; writing settings or certificates will likely fail");
    }
}

fn open_gateway() -> Result<SystemGateway> {
    let tools = ToolsConfig::load_system().context("Failed to load tool configuration")?;
    let layout = Layout::system();

    let pki = EasyRsa::new(&tools.pki.easyrsa, &layout.pki_dir);
    let services = Systemd::locate(Duration::from_secs(tools.service.timeout_secs));
    let network = IpCommand::new(&layout.net_class);

    Ok(Gateway::new(layout, tools, pki, services, network).with_firewall_tools(FirewallTools::locate()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

// ─── Commands ────────────────────────────────────────────────────────────────

/// List client certificates
fn cmd_list(gateway: &SystemGateway) -> Result<()> {
    let clients = gateway.list().context("Failed to read settings")?;
    print_json(&clients)
}

/// Apply settings and restart the daemon
fn cmd_setup(gateway: &SystemGateway, options: &str) -> Result<()> {
    let request: SetupRequest = parse(options).context("Invalid setup options")?;
    let result = gateway.setup(&request).context("Setup failed")?;
    print_json(&json!({ "result": result }))
}

fn cmd_get(gateway: &SystemGateway) -> Result<()> {
    let settings = gateway.get().context("Failed to read settings")?;
    print_json(&settings)
}

fn cmd_add(gateway: &SystemGateway, options: &str) -> Result<()> {
    let request: ClientRequest = parse(options).context("Invalid add options")?;
    match gateway.add(&request).context("Failed to add certificate")? {
        Issued::Created(id) => tracing::info!("Certificate {} created with id {}", request.name, id),
        Issued::Updated(_) => tracing::info!("Certificate {} already exists, users updated", request.name),
    }
    Ok(())
}

fn cmd_del(gateway: &SystemGateway, options: &str) -> Result<()> {
    let request: NameRequest = parse(options).context("Invalid del options")?;
    gateway.del(&request).context("Failed to delete certificate")?;
    Ok(())
}

fn cmd_download(gateway: &SystemGateway, options: &str) -> Result<()> {
    let request: NameRequest = parse(options).context("Invalid download options")?;
    let zip = gateway.download(&request).context("Failed to create client bundle")?;
    print_json(&json!({ "zip": zip.display().to_string() }))
}

fn cmd_setup_cert(gateway: &SystemGateway) -> Result<()> {
    gateway.setup_cert().context("Failed to set up certificates")
}

fn cmd_getopt(gateway: &SystemGateway) -> Result<()> {
    let catalog = gateway.getopt().context("Failed to collect options")?;
    print_json(&catalog)
}

fn cmd_ctl(gateway: &SystemGateway, action: &str) -> Result<()> {
    let action: ServiceAction = action.parse()?;
    let result = gateway.ctl(action).context("Failed to control the daemon")?;
    print_json(&json!({ "result": result }))
}
