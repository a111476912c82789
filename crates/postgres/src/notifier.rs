//! The PostgreSQL change notifier.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_postgres::error::SqlState;
use tokio_postgres::{AsyncMessage, Client, NoTls};

use tablestream_core::errors::{NotifierError, Result};
use tablestream_core::notify::{
    Backoff, ChangeCallback, ChangeNotifier, Debouncer, ListenRequest, DEFAULT_DEBOUNCE,
};
use tablestream_core::table::TableRef;

use crate::ddl;

/// Configuration for [`PostgresChangeNotifier`].
#[derive(Clone, Debug)]
pub struct PostgresListenOptions {
    conninfo: String,
    channel_prefix: String,
    debounce: Duration,
    provision_triggers: bool,
    backoff_base: Duration,
    backoff_cap: Duration,
}

impl PostgresListenOptions {
    pub fn new(conninfo: impl Into<String>) -> Self {
        Self {
            conninfo: conninfo.into(),
            channel_prefix: "tablestream".to_string(),
            debounce: DEFAULT_DEBOUNCE,
            provision_triggers: true,
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(30),
        }
    }

    pub fn channel_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.channel_prefix = prefix.into();
        self
    }

    pub fn debounce(mut self, interval: Duration) -> Self {
        self.debounce = interval;
        self
    }

    /// Disable DDL provisioning for roles that only listen.
    pub fn provision_triggers(mut self, provision: bool) -> Self {
        self.provision_triggers = provision;
        self
    }

    pub fn backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_cap = cap;
        self
    }
}

/// Converts row-level trigger notifications on a `NOTIFY` channel into
/// debounced change callbacks.
///
/// Owns one dedicated connection per listen session. Transient session
/// failures (connect refused, channel closed) are retried with capped
/// exponential backoff until cancelled or stopped.
pub struct PostgresChangeNotifier {
    options: PostgresListenOptions,
    stop_tx: watch::Sender<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl PostgresChangeNotifier {
    pub fn new(options: PostgresListenOptions) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            options,
            stop_tx,
            supervisor: Mutex::new(None),
        }
    }

    async fn join_supervisor(&self) {
        let task = self.supervisor.lock().unwrap().take();
        if let Some(task) = task {
            if task.await.is_err() {
                warn!("Postgres listen supervisor ended abnormally");
            }
        }
    }
}

#[async_trait]
impl ChangeNotifier for PostgresChangeNotifier {
    async fn start_listening(
        &self,
        request: ListenRequest,
        on_changed: ChangeCallback,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<()> {
        // Starting again replaces any previous listen session.
        self.stop_tx.send_replace(true);
        self.join_supervisor().await;
        self.stop_tx.send_replace(false);

        let options = self.options.clone();
        let mut stop_rx = self.stop_tx.subscribe();
        let task = tokio::spawn(async move {
            let mut backoff = Backoff::exponential(options.backoff_base, options.backoff_cap);
            loop {
                match run_session(&options, &request, &on_changed, &mut cancel, &mut stop_rx).await
                {
                    SessionEnd::Cancelled => break,
                    SessionEnd::Failed(error) => {
                        let delay = backoff.next_delay();
                        warn!(
                            "Listen session for {} failed: {}; retrying in {:?}",
                            request.table, error, delay
                        );
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = cancel.wait_for(|stop| *stop) => break,
                            _ = stop_rx.wait_for(|stop| *stop) => break,
                        }
                    }
                }
            }
            debug!("Listen loop for {} ended", request.table);
        });
        *self.supervisor.lock().unwrap() = Some(task);
        Ok(())
    }

    async fn stop_listening(&self) {
        self.stop_tx.send_replace(true);
        self.join_supervisor().await;
    }
}

impl Drop for PostgresChangeNotifier {
    fn drop(&mut self) {
        if let Some(task) = self.supervisor.get_mut().unwrap().take() {
            task.abort();
        }
    }
}

enum SessionEnd {
    Cancelled,
    Failed(NotifierError),
}

/// One listen session: connect, provision, `LISTEN`, drain notifications.
async fn run_session(
    options: &PostgresListenOptions,
    request: &ListenRequest,
    on_changed: &ChangeCallback,
    cancel: &mut watch::Receiver<bool>,
    stop_rx: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let channel = ddl::channel_name(&options.channel_prefix, &request.table);

    let (client, mut connection) = match tokio_postgres::connect(&options.conninfo, NoTls).await {
        Ok(pair) => pair,
        Err(error) => return SessionEnd::Failed(NotifierError::ConnectFailed(error.to_string())),
    };

    // The connection object multiplexes queries and async notifications; it
    // has to be polled on its own task for either to make progress.
    let (notification_tx, mut notification_rx) = mpsc::unbounded_channel();
    let connection_task = tokio::spawn(async move {
        let mut messages = futures::stream::poll_fn(move |cx| connection.poll_message(cx));
        while let Some(message) = messages.next().await {
            match message {
                Ok(AsyncMessage::Notification(notification)) => {
                    let _ = notification_tx.send(notification.channel().to_string());
                }
                Ok(_) => {}
                Err(error) => {
                    debug!("Postgres connection ended: {}", error);
                    break;
                }
            }
        }
    });

    if options.provision_triggers {
        if let Err(error) = provision(&client, &options.channel_prefix, &request.table).await {
            connection_task.abort();
            return SessionEnd::Failed(error);
        }
    }

    if let Err(error) = client.batch_execute(&ddl::listen_sql(&channel)).await {
        connection_task.abort();
        return SessionEnd::Failed(NotifierError::ListenFailed(error.to_string()));
    }
    info!(
        "Listening for changes to {} on channel {}",
        request.table, channel
    );

    let debouncer = Debouncer::new(options.debounce);
    loop {
        tokio::select! {
            received = notification_rx.recv() => match received {
                Some(incoming) if incoming == channel => {
                    if debouncer.accept() {
                        on_changed();
                    }
                }
                Some(_) => {}
                None => {
                    return SessionEnd::Failed(NotifierError::ListenFailed(
                        "notification stream closed".to_string(),
                    ));
                }
            },
            _ = cancel.wait_for(|stop| *stop) => break,
            _ = stop_rx.wait_for(|stop| *stop) => break,
        }
    }

    if let Err(error) = client.batch_execute(&ddl::unlisten_sql(&channel)).await {
        debug!("UNLISTEN during shutdown failed: {}", error);
    }
    connection_task.abort();
    SessionEnd::Cancelled
}

/// (Re)creates the notify function and trigger for `table`.
///
/// Trigger creation requiring elevated privilege is recoverable: the trigger
/// is assumed to exist already, provisioned by an operator.
async fn provision(client: &Client, prefix: &str, table: &TableRef) -> std::result::Result<(), NotifierError> {
    let sql = ddl::provision_sql(prefix, table);
    match client.batch_execute(&sql).await {
        Ok(()) => {
            debug!("Provisioned change trigger for {}", table);
            Ok(())
        }
        Err(error) if error.code() == Some(&SqlState::INSUFFICIENT_PRIVILEGE) => {
            warn!(
                "Insufficient privilege to create trigger on {}; assuming it exists",
                table
            );
            Ok(())
        }
        Err(error) => Err(NotifierError::ProvisionFailed(error.to_string())),
    }
}
