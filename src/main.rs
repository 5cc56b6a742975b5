use std::io;
use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{middleware::Logger, App, HttpServer};
use sqlx::postgres::PgPoolOptions;

use taskflow::config::Config;
use taskflow::email::LogEmailSender;
use taskflow::notification::amqp::AmqpBroker;
use taskflow::notification::{NotificationConsumer, NotificationError};
use taskflow::store::Stores;
use taskflow::AppServices;

const CONSUMER_RETRY: Duration = Duration::from_secs(5);
const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

fn startup_error(context: &str, error: impl std::fmt::Display) -> io::Error {
    log::error!("{}: {}", context, error);
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, error))
}

async fn consume_once(
    consumer: &NotificationConsumer,
    amqp_url: &str,
    queue: &str,
) -> Result<(), NotificationError> {
    let broker = AmqpBroker::connect(amqp_url, queue).await?;
    broker.declare().await?;
    let deliveries = broker.consume("taskflow-email").await?;
    consumer.run(deliveries).await;
    Ok(())
}

/// Keeps one consumer attached to the queue, reconnecting whenever its stream stops.
async fn supervise_consumer(consumer: NotificationConsumer, amqp_url: String, queue: String) {
    loop {
        match consume_once(&consumer, &amqp_url, &queue).await {
            Ok(()) => log::warn!("notification stream stopped, reconnecting in {:?}", CONSUMER_RETRY),
            Err(e) => log::error!("notification consumer could not attach, retrying in {:?}: {}", CONSUMER_RETRY, e),
        }
        actix_web::rt::time::sleep(CONSUMER_RETRY).await;
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = Config::from_env().map_err(|e| startup_error("configuration", e))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .map_err(|e| startup_error("database", e))?;

    let broker = AmqpBroker::connect(&config.amqp_url, &config.email_queue)
        .await
        .map_err(|e| startup_error("broker", e))?;
    broker
        .declare()
        .await
        .map_err(|e| startup_error("broker", e))?;
    let publisher = broker
        .publisher()
        .await
        .map_err(|e| startup_error("broker", e))?;

    let consumer = NotificationConsumer::new(Arc::new(LogEmailSender), config.frontend_url.clone());
    actix_web::rt::spawn(supervise_consumer(
        consumer,
        config.amqp_url.clone(),
        config.email_queue.clone(),
    ));

    let services = AppServices::from_config(&config, Stores::postgres(pool), Arc::new(publisher));

    let sessions = services.sessions.clone();
    actix_web::rt::spawn(async move {
        let mut ticks = actix_web::rt::time::interval(PURGE_INTERVAL);
        loop {
            ticks.tick().await;
            if let Err(e) = sessions.purge_expired().await {
                log::warn!("could not purge expired invalidation records: {}", e);
            }
        }
    });

    log::info!("Starting TaskFlow server at {}", config.server_url());
    HttpServer::new(move || {
        let services = services.clone();
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .configure(|cfg| services.configure(cfg))
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .run()
    .await?;

    drop(broker);
    Ok(())
}
