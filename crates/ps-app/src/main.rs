use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ps_app::checkout::{CheckoutForm, submit_checkout};
use ps_app::configurator::{ConfigurationResolver, Resolution};
use ps_app::events::JobEvent;
use ps_app::generator::backend::config::BackendConfig;
use ps_app::generator::backend::schemas::{PaymentProvider, ShippingAddress};
use ps_app::generator::backend::{GenBackend, StorefrontApi};
use ps_app::generator::{Generator, Style};
use ps_app::state::{FlowState, Step};
use ps_core::Catalog;

#[derive(Parser, Debug)]
#[command(name = "possible", about = "Text-to-3D-print storefront client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a model from a prompt, price it and (optionally) check out.
    Create(CreateArgs),
    /// Poll an existing generation job until it settles.
    Status { job_id: String },
    /// Show an order's timeline.
    Order { order_id: String },
    /// Price one configuration.
    Pricing(PricingArgs),
    /// List sizes, materials and mesh styles offered by the backend.
    Options,
}

#[derive(Args, Debug)]
struct PricingArgs {
    #[arg(long, default_value = "medium")]
    size: String,
    #[arg(long, default_value = "plastic_white")]
    material: String,
    #[arg(long)]
    color: Option<String>,
    #[arg(long)]
    country: Option<String>,
    /// Price a custom height in mm instead of a preset size.
    #[arg(long)]
    height: Option<u32>,
}

#[derive(Args, Debug)]
struct CreateArgs {
    prompt: String,
    #[arg(long, value_enum, default_value_t = Style::Figurine)]
    style: Style,
    #[command(flatten)]
    pricing: PricingArgs,
    /// Email for checkout; without it the flow stops after pricing.
    #[arg(long)]
    email: Option<String>,
    #[arg(long, default_value = "")]
    name: String,
    #[arg(long, default_value = "")]
    address: String,
    #[arg(long, default_value = "")]
    city: String,
    #[arg(long, default_value = "")]
    state: String,
    #[arg(long, default_value = "")]
    zip: String,
    #[arg(long, value_enum, default_value_t = PaymentProvider::Stripe)]
    provider: PaymentProvider,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = BackendConfig::load()?;
    let backend = Arc::new(GenBackend::new(&config)?);
    info!(api_url = backend.api_url(), "Using backend");

    match cli.command {
        Command::Create(args) => create(backend, &config, args).await,
        Command::Status { job_id } => status(backend, &config, &job_id).await,
        Command::Order { order_id } => order(backend.as_ref(), &order_id).await,
        Command::Pricing(args) => pricing(backend, &config, &args).await,
        Command::Options => options(backend.as_ref()).await,
    }
}

async fn create(backend: Arc<GenBackend>, config: &BackendConfig, args: CreateArgs) -> anyhow::Result<()> {
    let generator = Generator::new(backend.clone(), config.poll_options());
    let (tx, rx) = mpsc::unbounded_channel();
    let submission = generator.generate(&args.prompt, args.style, tx).await?;
    println!("Job {} submitted", submission.job_id);

    let mut flow = FlowState::new();
    follow(&mut flow, rx).await;
    submission.handle.finished().await;

    if flow.step() != Step::Customize {
        bail!(flow.error.unwrap_or_else(|| "generation did not finish".into()));
    }
    if let Some(image) = flow.job.as_ref().and_then(|j| j.image_path.as_deref()) {
        println!("Concept image: {}", backend.asset_url(image));
    }

    let resolver = configure(backend.clone(), config, &args.pricing).await?;
    let selection = resolver.checkout_selection()?;
    println!("Price: {}", selection.price);

    let Some(email) = args.email else {
        return Ok(());
    };
    flow.proceed_to_checkout(selection.clone())?;

    let form = CheckoutForm {
        job_id: flow.job_id().unwrap_or_default().to_string(),
        email,
        shipping: ShippingAddress {
            name: args.name,
            address: args.address,
            city: args.city,
            state: args.state,
            zip: args.zip,
            country: String::new(),
        },
        provider: args.provider,
        mesh_style: None,
    };
    let redirect = submit_checkout(backend.as_ref(), &form, &selection).await?;
    if let Some(order_id) = &redirect.order_id {
        println!("Order {order_id}");
    }
    println!("Continue to payment: {}", redirect.url);
    Ok(())
}

async fn status(backend: Arc<GenBackend>, config: &BackendConfig, job_id: &str) -> anyhow::Result<()> {
    let generator = Generator::new(backend, config.poll_options());
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = generator.watch(job_id, tx)?;

    let mut flow = FlowState::new();
    follow(&mut flow, rx).await;
    handle.finished().await;

    match flow.error {
        Some(error) => bail!(error),
        None => Ok(()),
    }
}

/// Print poll events until the job settles.
async fn follow(flow: &mut FlowState, mut rx: mpsc::UnboundedReceiver<JobEvent>) {
    while let Some(event) = rx.recv().await {
        let terminal = event.is_terminal();
        if let JobEvent::Update(status) = &event {
            println!("[{:>3}%] {}", status.progress, status.state.status_line());
        }
        flow.apply(event);
        if terminal {
            break;
        }
    }
}

async fn configure(
    backend: Arc<GenBackend>,
    config: &BackendConfig,
    args: &PricingArgs,
) -> anyhow::Result<ConfigurationResolver> {
    let catalog = match backend.options().await {
        Ok(options) => options.to_catalog(),
        Err(e) => {
            warn!(error = %e, "Could not load options, using built-in catalog");
            Catalog::default()
        }
    };

    let resolver = ConfigurationResolver::with_debounce(backend, catalog, config.price_debounce);
    if let Some(country) = &args.country {
        resolver.set_country(country)?;
    }
    resolver.set_material(&args.material)?;
    if let Some(color) = &args.color {
        resolver.set_color(color)?;
    }
    match args.height {
        Some(height) => resolver.set_custom_height(height),
        None => resolver.set_size(&args.size)?,
    }

    match resolver.settled().await {
        Resolution::Resolved(_) => Ok(resolver),
        Resolution::Failed { error, .. } => bail!("pricing failed: {error}"),
        Resolution::Invalid(reason) => bail!("invalid configuration: {reason}"),
        Resolution::Loading { .. } => bail!("pricing did not settle"),
    }
}

async fn pricing(backend: Arc<GenBackend>, config: &BackendConfig, args: &PricingArgs) -> anyhow::Result<()> {
    let resolver = configure(backend, config, args).await?;
    let selection = resolver.checkout_selection()?;

    match selection.custom_height_mm {
        Some(height) => println!("{height} mm custom, {}: {}", selection.material, selection.price),
        None => println!("{} {}: {}", selection.size, selection.material, selection.price),
    }
    if let Some(color) = &selection.color {
        println!("Color: {color}");
    }

    let region = resolver.load_region().await.context("loading regional pricing")?;
    println!("Region: {} ({})", region.region.name, region.region.key);
    if let Some(size) = region.size(&selection.size) {
        if let Some(local) = &size.local_currency {
            println!("Local price for {}: {}", size.name, local.display);
        }
    }
    Ok(())
}

async fn order(backend: &dyn StorefrontApi, order_id: &str) -> anyhow::Result<()> {
    let order = backend.order(order_id).await?;
    println!("Order {} ({})", order.id, order.status.label());
    println!("{} {} {}", order.size, order.material, order.total_display());
    if let Some(tracking) = &order.tracking_number {
        println!("Tracking: {tracking}");
    }

    let job = backend.job_status(&order.job_id).await.ok();
    let progress = order.fulfillment(job.as_ref());
    println!("Fulfillment: {:?} {}%", progress.stage, progress.percent);

    for step in order.timeline() {
        let mark = if step.completed { "x" } else { " " };
        match step.at {
            Some(at) => println!("[{mark}] {} {}", step.stage.label(), at.format("%Y-%m-%d %H:%M")),
            None => println!("[{mark}] {}", step.stage.label()),
        }
    }
    Ok(())
}

async fn options(backend: &dyn StorefrontApi) -> anyhow::Result<()> {
    let options = backend.options().await?;

    println!("Sizes:");
    for size in &options.sizes {
        println!("  {:<8} {:<10} {} mm", size.key, size.name, size.height_mm);
    }
    println!("Materials:");
    for material in &options.materials {
        let colors = if material.full_color {
            "full color".to_string()
        } else {
            material.colors.join(", ")
        };
        println!("  {:<15} {:<20} {colors}", material.key, material.name);
    }
    if !options.mesh_styles.is_empty() {
        println!("Mesh styles:");
        for style in &options.mesh_styles {
            println!("  {:<10} {}", style.key, style.name);
        }
    }
    Ok(())
}
