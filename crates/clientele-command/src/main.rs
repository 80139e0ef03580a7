use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use clientele_core::{CustomerDraft, CustomerStore, HttpMethod, OutboundRequest};
use clientele_db::SqliteCustomerStore;
use clientele_discovery::{ConsulConfig, ConsulRegistry, ServiceClient, ServiceRegistry};

#[derive(Parser)]
#[command(name = "clientele")]
#[command(about = "Customer service local administrative CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, env = "DATABASE_URL", default_value = "clientele.db")]
    db: String,

    #[arg(long, env = "CONSUL_HOST", default_value = "localhost")]
    consul_host: String,

    #[arg(long, env = "CONSUL_PORT", default_value_t = 8500)]
    consul_port: u16,

    #[arg(long, env = "CONSUL_TOKEN")]
    consul_token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Customer records in the local database
    Customer {
        #[command(subcommand)]
        sub: CustomerCommands,
    },
    /// Service registry inspection
    Registry {
        #[command(subcommand)]
        sub: RegistryCommands,
    },
    /// Call a registered service by name
    Call {
        service: String,
        path: String,
        #[arg(long, default_value = "GET")]
        method: HttpMethod,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
}

#[derive(Subcommand)]
enum CustomerCommands {
    /// Create a customer
    Add {
        #[arg(long)]
        document: String,
        #[arg(long)]
        firstname: String,
        #[arg(long)]
        lastname: String,
        #[arg(long)]
        address: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        email: String,
    },
    /// Show one customer by document id
    Get { document: String },
    /// List customers
    List {
        #[arg(long, default_value_t = 0)]
        skip: usize,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// Delete a customer by document id
    Delete { document: String },
}

#[derive(Subcommand)]
enum RegistryCommands {
    /// Check whether the registry has a leader
    Status,
    /// List every service known to the local agent
    Services,
    /// Resolve a service to a passing instance
    Lookup { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Customer { sub } => {
            let store = SqliteCustomerStore::new(&cli.db).context("failed to open database")?;
            run_customer(&store, sub)?;
        }
        Commands::Registry { sub } => {
            let registry = registry(&cli.consul_host, cli.consul_port, cli.consul_token)?;
            run_registry(registry.as_ref(), sub).await?;
        }
        Commands::Call { service, path, method, body, timeout } => {
            let registry = registry(&cli.consul_host, cli.consul_port, cli.consul_token)?;
            let client = ServiceClient::new(registry, concat!("clientele/", env!("CARGO_PKG_VERSION")))?;

            let mut request = OutboundRequest::new(service, method, path);
            if let Some(body) = body {
                request = request.with_body(serde_json::from_str(&body).context("--body is not valid JSON")?);
            }

            let reply = client.call(request, Some(Duration::from_secs(timeout))).await?;
            println!("{}", serde_json::to_string_pretty(&reply)?);
        }
    }

    Ok(())
}

fn registry(host: &str, port: u16, token: Option<String>) -> anyhow::Result<Arc<dyn ServiceRegistry>> {
    let config = ConsulConfig::new(host, port).with_token(token);
    Ok(Arc::new(ConsulRegistry::new(config)?))
}

fn run_customer(store: &dyn CustomerStore, sub: CustomerCommands) -> anyhow::Result<()> {
    match sub {
        CustomerCommands::Add { document, firstname, lastname, address, phone, email } => {
            let draft = CustomerDraft { document, firstname, lastname, address, phone, email }.validate()?;
            let customer = store.create(draft)?;
            println!("Customer created: {}", customer.document);
        }
        CustomerCommands::Get { document } => match store.find_by_id(&document)? {
            Some(customer) => println!("{}", serde_json::to_string_pretty(&customer)?),
            None => bail!("customer {document} not found"),
        },
        CustomerCommands::List { skip, limit } => {
            let customers = store.list(skip, limit)?;
            println!("{:<15} {:<25} {:<30} {:<15}", "Document", "Name", "Email", "Phone");
            println!("{}", "-".repeat(85));
            for c in customers {
                let name = format!("{} {}", c.firstname, c.lastname);
                println!("{:<15} {:<25} {:<30} {:<15}", c.document, name, c.email, c.phone);
            }
        }
        CustomerCommands::Delete { document } => {
            if !store.delete(&document)? {
                bail!("customer {document} not found");
            }
            println!("Customer deleted: {document}");
        }
    }
    Ok(())
}

async fn run_registry(registry: &dyn ServiceRegistry, sub: RegistryCommands) -> anyhow::Result<()> {
    match sub {
        RegistryCommands::Status => {
            if registry.is_available().await {
                println!("Registry: available");
            } else {
                bail!("registry unavailable");
            }
        }
        RegistryCommands::Services => {
            let services = registry.list_all().await;
            println!("{:<30} {:<20} {:<20} {:<6} Tags", "ID", "Name", "Address", "Port");
            println!("{}", "-".repeat(90));
            for s in services {
                println!("{:<30} {:<20} {:<20} {:<6} {}", s.id, s.name, s.address, s.port, s.tags.join(","));
            }
        }
        RegistryCommands::Lookup { name } => match registry.lookup(&name).await {
            Some(found) => println!("{name}: {}:{}", found.address, found.port),
            None => bail!("no passing instance of {name}"),
        },
    }
    Ok(())
}
