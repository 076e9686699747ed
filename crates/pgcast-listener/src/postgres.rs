//! PostgreSQL `LISTEN`/`NOTIFY` source.
//!
//! One dedicated connection per source. A driver task polls the connection
//! for asynchronous messages and forwards notifications, in arrival order,
//! over an unbounded channel that backs the returned stream.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use pgcast_core::NotificationEvent;
use pgcast_settings::UpstreamSettings;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_postgres::tls::NoTlsStream;
use tokio_postgres::{AsyncMessage, Client, Config, Connection, NoTls, Socket};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{check_channel, NotificationSource, NotificationStream, UpstreamError};

type PgConnection = Connection<Socket, NoTlsStream>;
type EventSender = mpsc::UnboundedSender<Result<NotificationEvent, UpstreamError>>;
type EventReceiver = mpsc::UnboundedReceiver<Result<NotificationEvent, UpstreamError>>;

const APPLICATION_NAME: &str = "pgcast";

pub struct PgNotificationSource {
    client: Option<Client>,
    events: Option<EventReceiver>,
    driver: Option<JoinHandle<()>>,
    shutdown: CancellationToken,
    channel: Option<String>,
}

impl PgNotificationSource {
    /// Open the upstream connection and start its driver task.
    pub async fn connect(settings: &UpstreamSettings) -> Result<Self, UpstreamError> {
        let config = pg_config(settings);
        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| UpstreamError::Connect(e.to_string()))?;

        info!(
            host = %settings.host,
            port = settings.port,
            database = %settings.database,
            user = %settings.user,
            "connected to upstream"
        );

        let shutdown = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(drive(connection, tx, shutdown.clone()));

        Ok(Self {
            client: Some(client),
            events: Some(rx),
            driver: Some(driver),
            shutdown,
            channel: None,
        })
    }

    /// Channel currently listened on, if any.
    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }
}

#[async_trait]
impl NotificationSource for PgNotificationSource {
    async fn subscribe(&mut self, channel: &str) -> Result<NotificationStream, UpstreamError> {
        check_channel(channel)?;
        let client = self.client.as_ref().ok_or(UpstreamError::Closed)?;
        if self.channel.is_some() {
            return Err(UpstreamError::AlreadySubscribed);
        }
        let rx = self.events.take().ok_or(UpstreamError::AlreadySubscribed)?;

        client
            .batch_execute(&format!("LISTEN {}", quote_ident(channel)))
            .await
            .map_err(|e| UpstreamError::Listen {
                channel: channel.to_string(),
                reason: e.to_string(),
            })?;
        info!(channel, "listening for notifications");
        self.channel = Some(channel.to_string());

        let shutdown = self.shutdown.clone();
        let stream = UnboundedReceiverStream::new(rx)
            .take_until(async move { shutdown.cancelled().await });
        Ok(Box::pin(stream))
    }

    async fn close(&mut self) -> Result<(), UpstreamError> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };
        if self.channel.is_some() {
            if let Err(e) = client.batch_execute("UNLISTEN *").await {
                warn!(error = %e, "UNLISTEN failed during close");
            }
        }
        self.shutdown.cancel();
        drop(client);
        if let Some(driver) = self.driver.take() {
            let _ = driver.await;
        }
        info!(channel = ?self.channel, "upstream subscription closed");
        Ok(())
    }
}

impl Drop for PgNotificationSource {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Poll the connection until it ends or the source shuts down.
async fn drive(mut connection: PgConnection, events: EventSender, shutdown: CancellationToken) {
    let mut messages = futures::stream::poll_fn(move |cx| connection.poll_message(cx));
    loop {
        let next = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            next = messages.next() => next,
        };
        match next {
            Some(Ok(AsyncMessage::Notification(n))) => {
                debug!(channel = n.channel(), pid = n.process_id(), "notification received");
                let event = NotificationEvent::new(n.channel(), n.payload());
                if events.send(Ok(event)).is_err() {
                    break;
                }
            }
            Some(Ok(AsyncMessage::Notice(notice))) => {
                debug!(severity = notice.severity(), message = notice.message(), "upstream notice");
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                let _ = events.send(Err(UpstreamError::ConnectionLost(e.to_string())));
                break;
            }
            None => {
                let _ = events.send(Err(UpstreamError::ConnectionLost(
                    "connection closed by server".into(),
                )));
                break;
            }
        }
    }
}

fn pg_config(settings: &UpstreamSettings) -> Config {
    let mut config = Config::new();
    let _ = config
        .user(&settings.user)
        .host(&settings.host)
        .dbname(&settings.database)
        .port(settings.port)
        .application_name(APPLICATION_NAME)
        .connect_timeout(Duration::from_secs(settings.connect_timeout_secs));
    if let Some(password) = &settings.password {
        let _ = config.password(password);
    }
    config
}

/// Quote a channel name as a SQL identifier.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
