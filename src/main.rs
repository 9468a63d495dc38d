use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use studlink::flow::{CaptureFlow, FlowEvent, NoticeLevel};
use studlink::store::StateStore;
use studlink::{ArtifactBackend, CaptureConfig};

#[derive(Parser)]
#[command(name = "studlink", version, about = "Checkout-assist capture for brick-mosaic storefronts")]
struct Cli {
    /// Directory for saved designs, session state, and local artifacts
    #[arg(long, env = "STUDLINK_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture the design on a storefront page
    Capture {
        /// URL of the design page
        url: String,

        /// Save endpoint; omitted means a local image blob is produced
        #[arg(long, env = "STUDLINK_SAVE_ENDPOINT")]
        endpoint: Option<String>,

        /// Product page the tracking code applies to
        #[arg(long, env = "STUDLINK_PRODUCT_URL")]
        product_url: Option<String>,

        /// Customer identity to correlate captures with
        #[arg(long, env = "STUDLINK_CUSTOMER_EMAIL")]
        customer_email: Option<String>,

        /// Park the design in the local queue instead of publishing
        #[arg(long)]
        save_later: bool,

        /// Readiness polls before giving up
        #[arg(long, default_value_t = 10)]
        poll_attempts: u32,

        /// Milliseconds between readiness polls
        #[arg(long, default_value_t = 1000)]
        poll_interval_ms: u64,

        /// Fail instead of saving locally when the endpoint is down
        #[arg(long)]
        no_local_fallback: bool,
    },

    /// List designs parked in the save-for-later queue
    Saved {
        /// Drop every queued design
        #[arg(long)]
        clear: bool,
    },

    /// Bind a captured design to a storefront order
    Associate {
        /// Storefront order id
        #[arg(long)]
        order_id: String,

        /// Design id; defaults to the most recent capture's
        #[arg(long)]
        design_id: Option<String>,

        /// Save endpoint that owns the designs
        #[arg(long, env = "STUDLINK_SAVE_ENDPOINT")]
        endpoint: String,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    let cli = Cli::parse();
    let data_dir = cli.data_dir.unwrap_or_else(studlink::default_data_dir);

    match cli.command {
        Commands::Capture {
            url,
            endpoint,
            product_url,
            customer_email,
            save_later,
            poll_attempts,
            poll_interval_ms,
            no_local_fallback,
        } => {
            let config = CaptureConfig {
                backend: match endpoint {
                    Some(endpoint) => ArtifactBackend::Remote { endpoint },
                    None => ArtifactBackend::Local,
                },
                product_url,
                customer_email,
                poll_attempts,
                poll_interval_ms,
                data_dir,
                local_fallback: !no_local_fallback,
                ..Default::default()
            };

            let mut flow = CaptureFlow::new(config).context("building capture flow")?;
            flow.on_event(Box::new(|event| {
                if let FlowEvent::Notice { level, message } = event {
                    match level {
                        NoticeLevel::Error => eprintln!("! {}", message),
                        _ => println!("- {}", message),
                    }
                }
            }));

            let report = flow.run(&url, save_later).context("capture failed")?;

            if let Some(code) = &report.tracking_code {
                println!("Tracking code: {}", code);
            }
            if let Some(artifact) = &report.artifact {
                println!("Share text:    {}", artifact.share_text());
                if let Some(id) = &artifact.design_id {
                    println!("Design id:     {}", id);
                }
            }
            if let Some(checkout) = &report.checkout_url {
                println!("Checkout URL:  {}", checkout);
            }
            println!("Finished in stage {:?}", report.stage);

            flow.close().context("closing capture flow")?;
        }

        Commands::Saved { clear } => {
            let store = StateStore::new(&data_dir).context("opening state store")?;
            if clear {
                store.clear_saved().context("clearing save queue")?;
                println!("Save queue cleared");
                return Ok(());
            }
            let entries = store.saved_designs().context("reading save queue")?;
            if entries.is_empty() {
                println!("No designs saved for later");
            }
            for entry in entries {
                println!(
                    "{}  {}  {} pieces, {} colors",
                    entry.tracking_code,
                    entry.created_at.format("%Y-%m-%d %H:%M"),
                    entry.design_data.total_pieces,
                    entry.design_data.piece_colors.len()
                );
            }
        }

        Commands::Associate {
            order_id,
            design_id,
            endpoint,
        } => {
            let config = CaptureConfig {
                backend: ArtifactBackend::Remote { endpoint },
                data_dir,
                ..Default::default()
            };
            let mut flow = CaptureFlow::new(config).context("building capture flow")?;
            let used = flow
                .associate_order(&order_id, design_id.as_deref())
                .context("associating order")?;
            println!("Design {} associated with order {}", used, order_id);
            flow.close().context("closing capture flow")?;
        }
    }

    Ok(())
}
