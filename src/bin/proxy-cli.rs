use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for proxy-manager", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "PROXY_MANAGER_API_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manager state and the last reload pass
    Status,
    /// List records of one kind
    List {
        #[arg(value_enum)]
        kind: Kind,
    },
    /// Show one record
    Get {
        #[arg(value_enum)]
        kind: Kind,
        id: i64,
    },
    /// Create a record from a JSON file
    Create {
        #[arg(value_enum)]
        kind: Kind,
        file: PathBuf,
    },
    /// Replace a record from a JSON file
    Update {
        #[arg(value_enum)]
        kind: Kind,
        id: i64,
        file: PathBuf,
    },
    /// Delete a record
    Delete {
        #[arg(value_enum)]
        kind: Kind,
        id: i64,
    },
    /// Certificate operations
    #[command(subcommand)]
    Cert(CertCommand),
    /// Proxy operations
    #[command(subcommand)]
    Proxy(ProxyCommand),
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Kind {
    Sites,
    Upstreams,
    Redirections,
    AccessLists,
}

impl Kind {
    fn path(self) -> &'static str {
        match self {
            Kind::Sites => "sites",
            Kind::Upstreams => "upstreams",
            Kind::Redirections => "redirections",
            Kind::AccessLists => "access-lists",
        }
    }
}

#[derive(Subcommand)]
enum CertCommand {
    List,
    Status { domain: String },
    Issue { domain: String, email: String },
    Renew { domain: String },
    RenewAll,
    Revoke { domain: String },
}

#[derive(Subcommand)]
enum ProxyCommand {
    Status,
    Validate,
    Reload,
    /// Re-render every record and apply
    Apply,
    /// Print the main configuration fragment
    ShowConfig,
    /// Replace the main configuration fragment with a file's contents
    SetConfig { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let (method, path, body) = match cli.command {
        Commands::Status => (Method::GET, "status".to_string(), None),
        Commands::List { kind } => (Method::GET, kind.path().to_string(), None),
        Commands::Get { kind, id } => (Method::GET, format!("{}/{}", kind.path(), id), None),
        Commands::Create { kind, file } => (
            Method::POST,
            kind.path().to_string(),
            Some(read_json(&file)?),
        ),
        Commands::Update { kind, id, file } => (
            Method::PUT,
            format!("{}/{}", kind.path(), id),
            Some(read_json(&file)?),
        ),
        Commands::Delete { kind, id } => {
            (Method::DELETE, format!("{}/{}", kind.path(), id), None)
        }
        Commands::Cert(cert) => match cert {
            CertCommand::List => (Method::GET, "certificates".to_string(), None),
            CertCommand::Status { domain } => {
                (Method::GET, format!("certificates/{}", domain), None)
            }
            CertCommand::Issue { domain, email } => (
                Method::POST,
                "certificates".to_string(),
                Some(json!({ "domain": domain, "email": email })),
            ),
            CertCommand::Renew { domain } => {
                (Method::POST, format!("certificates/{}/renew", domain), None)
            }
            CertCommand::RenewAll => (Method::POST, "certificates/renew-all".to_string(), None),
            CertCommand::Revoke { domain } => {
                (Method::DELETE, format!("certificates/{}", domain), None)
            }
        },
        Commands::Proxy(proxy) => match proxy {
            ProxyCommand::Status => (Method::GET, "proxy/status".to_string(), None),
            ProxyCommand::Validate => (Method::POST, "proxy/validate".to_string(), None),
            ProxyCommand::Reload => (Method::POST, "proxy/reload".to_string(), None),
            ProxyCommand::Apply => (Method::POST, "proxy/apply".to_string(), None),
            ProxyCommand::ShowConfig => (Method::GET, "proxy/config".to_string(), None),
            ProxyCommand::SetConfig { file } => (
                Method::PUT,
                "proxy/config".to_string(),
                Some(json!({ "content": std::fs::read_to_string(&file)? })),
            ),
        },
    };

    let mut request = client
        .request(method, format!("{}/admin/{}", cli.url.trim_end_matches('/'), path))
        .headers(headers);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let ok = print_response(request.send().await?).await?;
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn read_json(path: &PathBuf) -> Result<Value, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

async fn print_response(res: reqwest::Response) -> Result<bool, Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let rendered = match serde_json::from_str::<Value>(&text) {
        Ok(json) => serde_json::to_string_pretty(&json)?,
        Err(_) => text,
    };

    if status.is_success() {
        println!("{}", rendered);
        Ok(true)
    } else {
        eprintln!("Error: Admin API returned status {}", status);
        eprintln!("{}", rendered);
        Ok(false)
    }
}
