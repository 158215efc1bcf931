mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod routes;
mod scheduler;
mod stats;
mod utils;

use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use log::{error, info};

use crate::config::Config;
use crate::scheduler::OverdueSweeper;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let pool = match db::create_pool(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to the database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = db::run_migrations(&pool).await {
        error!("Failed to run migrations: {}", e);
        std::process::exit(1);
    }

    let sweeper = config
        .overdue_sweep_interval
        .map(|interval| OverdueSweeper::start(pool.clone(), interval));

    let bind_addr = config.bind_addr.clone();
    info!("Starting server at {}", bind_addr);

    let pool_data = web::Data::new(pool);
    let config_data = web::Data::new(config);

    let result = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(pool_data.clone())
            .app_data(config_data.clone())
            .configure(routes::configure)
    })
    .bind(&bind_addr)?
    .run()
    .await;

    if let Some(sweeper) = sweeper {
        sweeper.stop().await;
    }

    result
}
