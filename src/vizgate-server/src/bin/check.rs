//! Vizgate Check - lists what the configured Tableau account can see.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use vizgate_server::ServerConfig;
use vizgate_server::vendor::describe;
use vizgate_tableau::{TableauClient, Workbook};

/// Vizgate Check
#[derive(Parser)]
#[command(name = "vizgate-check")]
#[command(about = "Sign in to Tableau Server and list sites, workbooks and views")]
#[command(version)]
struct Args {
    /// Configuration file path (JSON). Without it the environment is used.
    #[arg(short, long)]
    config: Option<String>,

    /// Also list the views of each workbook
    #[arg(long)]
    views: bool,

    /// Print the workbook descriptors as JSON instead of a report
    #[arg(long)]
    json: bool,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn setup_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Report lines for one workbook. Tableau reports `size` in megabytes.
fn workbook_report(index: usize, workbook: &Workbook) -> Vec<String> {
    let mut lines = vec![
        format!("{}. {}", index + 1, workbook.name),
        format!("   Content URL: {}", workbook.content_url),
    ];
    if let Some(owner) = workbook.owner.as_ref().and_then(|o| o.name.as_deref()) {
        lines.push(format!("   Owner: {owner}"));
    }
    if let Some(created) = workbook.created_at {
        lines.push(format!("   Created: {}", created.format("%Y-%m-%d")));
    }
    if let Some(updated) = workbook.updated_at {
        lines.push(format!("   Updated: {}", updated.format("%Y-%m-%d")));
    }
    if let Some(size) = workbook.size {
        lines.push(format!("   Size: {size} MB"));
    }
    let tags = workbook.tag_labels();
    if tags.is_empty() {
        lines.push("   Tags: None".to_string());
    } else {
        lines.push(format!("   Tags: {}", tags.join(", ")));
    }
    lines
}

async fn check(args: &Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::from_env()?,
    };
    let settings = config
        .tableau
        .settings()
        .context("no Tableau server configured (TABLEAU_SERVER_URL)")?;

    let client = TableauClient::new(settings)?;
    let session = client.authenticate().await.context("signing in")?;

    if !args.json {
        println!("Server: {}", client.server_url());
        println!("User: {}", client.settings().username);
        println!("Site context: {}", session.site_context);
        println!("Site ID: {}", session.site_id);
        println!();

        match client.list_sites(&session.token).await {
            Ok(sites) => {
                println!("Sites:");
                for site in &sites {
                    println!("  - {} (contentUrl: \"{}\")", site.name, site.content_url);
                }
                println!();
            }
            Err(e) => warn!("Could not list sites: {}", e),
        }
    }

    let workbooks = client
        .list_workbooks(&session.token, &session.site_id)
        .await
        .context("listing workbooks")?;

    let mut descriptors = Vec::with_capacity(workbooks.len());
    if !args.json {
        println!("Found {} workbooks:", workbooks.len());
        println!();
    }

    for (index, workbook) in workbooks.into_iter().enumerate() {
        let mut first_view = None;

        if !args.json {
            for line in workbook_report(index, &workbook) {
                println!("{line}");
            }
        }

        if args.views {
            match client
                .list_views(&session.token, &session.site_id, &workbook.id)
                .await
            {
                Ok(views) => {
                    first_view = views.first().map(|v| v.sheet_name().to_string());
                    if !args.json {
                        for view in &views {
                            println!("   View: {} ({})", view.name, view.sheet_name());
                        }
                    }
                }
                Err(e) => warn!("Could not list views of '{}': {}", workbook.name, e),
            }
        }

        if !args.json {
            println!();
        }
        descriptors.push(describe(workbook, first_view));
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
    }

    if let Err(e) = client.sign_out(&session.token).await {
        warn!("Sign-out failed: {}", e);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let _ = dotenvy::dotenv();
    setup_logging(&args.log_level);

    match check(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
