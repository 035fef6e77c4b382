use anyhow::{Context, Result};

#[zbus::proxy(
    interface = "org.facedash.Presence1",
    default_service = "org.facedash.Presence1",
    default_path = "/org/facedash/Presence1"
)]
trait Presence {
    fn current_user(&self) -> zbus::Result<String>;
    fn status(&self) -> zbus::Result<String>;
    fn reload_gallery(&self) -> zbus::Result<u32>;
}

async fn proxy() -> Result<PresenceProxy<'static>> {
    let conn = zbus::Connection::session()
        .await
        .context("connecting to the session bus")?;
    PresenceProxy::new(&conn)
        .await
        .context("creating presence proxy")
}

/// `facedash status`: current user plus the daemon's status JSON.
pub async fn run() -> Result<()> {
    let proxy = proxy().await?;
    let user = proxy
        .current_user()
        .await
        .context("facedashd is not running")?;
    println!("Current user: {user}");
    let raw = proxy.status().await?;
    let value: serde_json::Value = serde_json::from_str(&raw).context("parsing daemon status")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Ask a running daemon to pick up a rebuilt gallery. Absence of the
/// daemon is not an error.
pub async fn notify_gallery_rebuilt() {
    let result = async { Ok::<_, anyhow::Error>(proxy().await?.reload_gallery().await?) }.await;
    match result {
        Ok(entries) => tracing::info!(entries, "daemon reloaded the gallery"),
        Err(e) => tracing::debug!(error = %e, "daemon not notified"),
    }
}
