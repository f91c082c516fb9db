//! catalog-reconciler command line
//!
//! Thin driver around [`ProductsController`]: loads configuration, installs
//! logging, then runs one command against the products backend and prints
//! the resulting page together with every notice raised on the way.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use catalog_reconciler_lib::application::{
    LoadOutcome, MutationOutcome, NoticeLevel, ProductsController, ProductsView,
};
use catalog_reconciler_lib::domain::{MutationRequest, PageQuery, ProductId, ProductPayload};
use catalog_reconciler_lib::infrastructure::{
    AppConfig, BufferedNavigator, BufferedNotifier, FileSessionStore, ProductsHttpClient, logging,
};

#[derive(Parser, Debug)]
#[command(name = "catalog-reconciler")]
#[command(about = "Product catalog client that waits for queued mutations to become visible")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account; sign in afterwards with `login`
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign in and store the access token
    Login {
        #[arg(long)]
        identifier: String,
        #[arg(long)]
        password: String,
    },
    /// Sign out and forget the stored token
    Logout,
    /// Show one page of products
    List {
        #[command(flatten)]
        page: PageArgs,
    },
    /// Queue a new product and wait until it shows up
    Create {
        #[command(flatten)]
        product: ProductArgs,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Queue an update and wait until the record matches
    Update {
        id: ProductId,
        #[command(flatten)]
        product: ProductArgs,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Queue a deletion and wait until the total drops
    Delete {
        id: ProductId,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Print the effective configuration
    Config,
}

#[derive(clap::Args, Debug)]
struct PageArgs {
    #[arg(long, default_value_t = 0)]
    offset: u64,
    /// Page size; defaults to pagination.default_limit
    #[arg(long)]
    limit: Option<u64>,
}

#[derive(clap::Args, Debug)]
struct ProductArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    brand: String,
    #[arg(long)]
    price: f64,
}

impl From<ProductArgs> for ProductPayload {
    fn from(args: ProductArgs) -> Self {
        Self {
            name: args.name,
            brand: args.brand,
            price: args.price,
        }
    }
}

struct App {
    config: AppConfig,
    client: Arc<ProductsHttpClient>,
    controller: ProductsController,
    notifier: Arc<BufferedNotifier>,
    navigator: Arc<BufferedNavigator>,
}

impl App {
    fn build(config: AppConfig) -> Result<Self> {
        let session_store = Arc::new(FileSessionStore::new(config.session.token_path()));
        let client = Arc::new(ProductsHttpClient::new(&config.api, session_store.clone())?);
        let notifier = Arc::new(BufferedNotifier::default());
        let navigator = Arc::new(BufferedNavigator::default());

        let controller = ProductsController::new(
            client.clone(),
            session_store,
            notifier.clone(),
            navigator.clone(),
            config.poll_policy(),
            config.controller_settings(),
        );

        Ok(Self {
            config,
            client,
            controller,
            notifier,
            navigator,
        })
    }

    fn page_query(&self, page: &PageArgs) -> PageQuery {
        PageQuery::new(page.offset, page.limit.unwrap_or(self.config.pagination.default_limit))
    }

    async fn load(&self, page: &PageArgs) -> Result<LoadOutcome> {
        match self.controller.change_page(self.page_query(page)).await {
            LoadOutcome::Unauthenticated => self.not_signed_in().map(|()| LoadOutcome::Unauthenticated),
            outcome => Ok(outcome),
        }
    }

    async fn mutate(&self, page: &PageArgs, request: MutationRequest) -> Result<()> {
        if !matches!(self.load(page).await?, LoadOutcome::Loaded { .. }) {
            self.print_notices();
            bail!("Could not load the current page; nothing was submitted");
        }

        match self.controller.submit(request).await {
            MutationOutcome::Queued { ack, session } => {
                info!("Waiting for {} ({})", ack.operation_id, session);
                tokio::select! {
                    outcome = self.controller.settle() => {
                        if let Some(outcome) = outcome {
                            info!("Reconciliation finished: {:?} after {} attempt(s)", outcome.phase(), outcome.attempts());
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        self.controller.leave().await;
                        println!("Stopped waiting; the operation may still be applied.");
                    }
                }
                Ok(())
            }
            MutationOutcome::Superseded { ack } => {
                println!("Operation {} was queued but is not being tracked.", ack.operation_id);
                Ok(())
            }
            MutationOutcome::NotLoaded(_) => bail!("Could not load the current page; nothing was submitted"),
            MutationOutcome::Unauthenticated => self.not_signed_in(),
            MutationOutcome::Busy => bail!("Another mutation is still being submitted"),
            MutationOutcome::Invalid(_) | MutationOutcome::Failed(_) => Ok(()),
        }
    }

    fn not_signed_in(&self) -> Result<()> {
        let route = self
            .navigator
            .last_redirect()
            .map(|redirect| format!("{}?redirect={}", redirect.route, redirect.return_path))
            .unwrap_or_else(|| self.config.session.login_route.clone());
        bail!("Not signed in ({route}). Run `catalog-reconciler login` first.")
    }

    async fn print_view(&self) {
        print_page(&self.controller.view().await);
    }

    fn print_notices(&self) {
        for notice in self.notifier.drain() {
            let marker = match notice.level {
                NoticeLevel::Success => "✔",
                NoticeLevel::Info => "ℹ",
                NoticeLevel::Error => "✖",
            };
            println!("{marker} {}", notice.message);
        }
    }
}

fn print_page(view: &ProductsView) {
    let pagination = &view.pagination;
    let first = if pagination.total() == 0 { 0 } else { pagination.offset() + 1 };
    let last = pagination.offset() + view.products.len() as u64;
    println!("Products {first}-{last} of {}", pagination.total());

    for product in &view.products {
        println!(
            "{:>6}  {:<30}  {:<20}  {:>10.2}",
            product.id, product.name, product.brand, product.price
        );
    }
    if let Some(message) = &view.query_state.error_message {
        println!("({message})");
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let path = cli
        .config
        .clone()
        .or_else(|| Some(AppConfig::default_config_file()).filter(|path| path.exists()));
    let mut config = AppConfig::load(path.as_deref()).context("Failed to load configuration")?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    logging::init_logging_with_config(&config.logging)?;

    let app = App::build(config)?;

    match cli.command {
        Command::Register { name, email, password } => {
            app.client.register(&name, &email, &password).await?;
            println!("Account created. Run `catalog-reconciler login` to sign in.");
            return Ok(());
        }
        Command::Login { identifier, password } => {
            let login = app.client.login(&identifier, &password).await?;
            println!("Signed in ({} token).", login.token_type);
            return Ok(());
        }
        Command::Logout => {
            if app.client.logout().await {
                println!("Signed out.");
            } else {
                println!("No active session.");
            }
            return Ok(());
        }
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&app.config)?);
            return Ok(());
        }
        Command::List { page } => {
            app.load(&page).await?;
        }
        Command::Create { product, page } => {
            app.mutate(&page, MutationRequest::Create(product.into())).await?;
        }
        Command::Update { id, product, page } => {
            let payload = product.into();
            app.mutate(&page, MutationRequest::Update { id, payload }).await?;
        }
        Command::Delete { id, page } => {
            app.mutate(&page, MutationRequest::Delete { id }).await?;
        }
    }

    app.print_notices();
    app.print_view().await;
    Ok(())
}
