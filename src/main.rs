use std::fs;
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;

mod auth;
mod models;
mod repositories;
pub mod services;
pub mod settings;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    #[arg(long, default_value = "log4rs.yaml")]
    log4rs: String,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    init_logging(&args.log4rs)?;
    let config = settings::Settings::new(&args.config).context("Could not load config file.")?;
    config
        .rewards
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid reward settings: {}", e))?;

    let conn = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .connect(&config.postgres.url)
        .await
        .context("Could not connect to database.")?;

    sqlx::migrate!("./migrations")
        .run(&conn)
        .await
        .context("Could not run migrations.")?;

    log::info!("Starting services.");
    services::start_services(conn, config).await
}

fn init_logging(path: &str) -> Result<(), anyhow::Error> {
    if !Path::new("logs").exists() {
        fs::create_dir("logs")?;
    }

    match log4rs::init_file(path, Default::default()) {
        Ok(_) => {
            println!("[*] Logging initialized successfully.");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] Failed to initialize logging: {}", e);
            Err(anyhow::anyhow!("Could not initialize logging: {}", e))
        }
    }
}
