use anyhow::Context as _;
use std::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Pick an unused TCP port on localhost.
///
/// Note: this does not reserve the port; it's still possible for another process to bind it
/// before you do.
///
/// # Errors
///
/// Returns an error if binding an ephemeral localhost port fails or if the bound socket's
/// local address cannot be read.
pub fn pick_unused_port() -> anyhow::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("bind ephemeral port")?;
    Ok(listener.local_addr()?.port())
}

/// An in-process HTTP server standing in for the semantic layer.
///
/// Shuts down (and stops the serving task) when dropped.
pub struct TestServer {
    base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    #[must_use]
    pub fn base_url(&self) -> String {
        self.base_url.clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.abort();
    }
}

/// Serve `app` on `127.0.0.1:<ephemeral>` until the returned guard is dropped.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn spawn_app(app: axum::Router) -> anyhow::Result<TestServer> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind test server")?;
    let addr = listener.local_addr().context("local_addr")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = shutdown_rx.await;
    });
    let handle = tokio::spawn(async move { server.await });

    Ok(TestServer {
        base_url: format!("http://{addr}"),
        shutdown: Some(shutdown_tx),
        handle,
    })
}
