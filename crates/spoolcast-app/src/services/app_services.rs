// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central application context: loads the configuration once, owns the shared
// printer TLS provider, and exposes the two transport branches (upload and
// print trigger) to the commands.
//
// The TLS context is built lazily on the first transport call and reused by
// every later one, FTPS and MQTT alike.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use spoolcast_core::error::{Result, SpoolcastError};
use spoolcast_core::types::TransferProgress;
use spoolcast_core::AppConfig;
use spoolcast_security::TlsContextProvider;
use spoolcast_transport::{
    ControlChannelPublisher, FtpsSessionFactory, PublishTarget, RumqttConnector,
    TransferOrchestrator, UploadReport, UploadRequest,
};
use tracing::{info, instrument, warn};

use super::data_dir;

/// Shared application services. Cheap to clone.
#[derive(Clone)]
pub struct AppContext {
    config: Arc<AppConfig>,
    /// Directory the config file was loaded from.
    base_dir: PathBuf,
    tls: Arc<TlsContextProvider>,
}

impl AppContext {
    /// Load the config at `config_path` (or the default one) and prepare the
    /// TLS provider. Nothing touches the network here.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = match config_path {
            Some(p) => p.to_path_buf(),
            None => data_dir::default_config_path()?,
        };
        info!(path = %path.display(), "loading configuration");
        let config = AppConfig::load(&path)?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let tls = match &config.ca_cert {
            Some(ca) => TlsContextProvider::from_ca_file(data_dir::resolve(&base_dir, ca)),
            None => TlsContextProvider::beside_executable()?,
        };
        Ok(Self::new(config, base_dir, tls))
    }

    pub fn new(config: AppConfig, base_dir: PathBuf, tls: TlsContextProvider) -> Self {
        Self {
            config: Arc::new(config),
            base_dir,
            tls: Arc::new(tls),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The print command template to use.
    pub fn template_path(&self) -> PathBuf {
        match &self.config.message_template {
            Some(p) => data_dir::resolve(&self.base_dir, p),
            None => self.base_dir.join(data_dir::MESSAGE_TEMPLATE_FILE),
        }
    }

    /// Upload `file` to the printer as `remote_name`.
    #[instrument(skip(self, on_progress))]
    pub async fn upload(
        &self,
        file: &Path,
        remote_name: &str,
        on_progress: impl FnMut(TransferProgress),
    ) -> Result<UploadReport> {
        let retry = &self.config.retry;
        let tls = self.tls.shared_context()?;
        let orchestrator = TransferOrchestrator::new(
            FtpsSessionFactory::new(tls, retry.reply_timeout()),
            retry.clone(),
        );
        let request = UploadRequest::new(
            file,
            self.config.printer_ip.as_str(),
            self.config.user.as_str(),
            self.config.password.as_str(),
            remote_name,
        );

        let report = orchestrator
            .upload(&request, retry.max_attempts, on_progress)
            .await
            .map_err(|failure| {
                warn!(attempts = failure.attempts().len(), "upload failed");
                SpoolcastError::from(failure)
            })?;
        if report.assumed_delivered {
            warn!("printer went quiet after the last byte; treating the upload as delivered");
        }
        Ok(report)
    }

    /// Tell the printer to start `delivered_filename`.
    #[instrument(skip(self))]
    pub async fn publish(&self, delivered_filename: &str, template: Option<&Path>) -> Result<()> {
        let template = match template {
            Some(p) => p.to_path_buf(),
            None => self.template_path(),
        };
        let retry = &self.config.retry;
        let tls = self.tls.shared_context()?;
        let publisher = ControlChannelPublisher::new(RumqttConnector::new(tls), retry.ack_grace());
        let target = PublishTarget::new(
            self.config.printer_ip.as_str(),
            self.config.password.as_str(),
            self.config.serial.as_str(),
        );
        publisher
            .publish(&template, delivered_filename, &target, retry.max_attempts)
            .await
    }
}
