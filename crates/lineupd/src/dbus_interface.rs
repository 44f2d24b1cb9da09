use crate::service::IdentifyService;
use zbus::interface;

pub const BUS_NAME: &str = "org.lineup.Lineup1";
pub const OBJECT_PATH: &str = "/org/lineup/Lineup1";

/// D-Bus interface for the Lineup identification daemon.
///
/// Bus name: org.lineup.Lineup1
/// Object path: /org/lineup/Lineup1
pub struct LineupInterface {
    service: IdentifyService,
}

impl LineupInterface {
    pub fn new(service: IdentifyService) -> Self {
        Self { service }
    }
}

#[interface(name = "org.lineup.Lineup1")]
impl LineupInterface {
    /// Identify the person in an encoded image. Returns a JSON response.
    async fn identify(&self, image: Vec<u8>) -> zbus::fdo::Result<String> {
        tracing::info!(bytes = image.len(), "identify requested");
        Ok(self.service.identify_upload(&image).await.to_json())
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(self.service.status().await.to_string())
    }

    /// List gallery identifiers and reference image paths.
    async fn list_gallery(&self) -> zbus::fdo::Result<String> {
        let entries = self.service.list_gallery().await.map_err(|e| {
            tracing::error!(error = %e, "list_gallery failed");
            zbus::fdo::Error::Failed(e.to_string())
        })?;
        serde_json::to_string(&entries).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }
}
