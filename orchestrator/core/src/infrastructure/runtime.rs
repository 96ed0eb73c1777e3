// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::controller_config::DockerSection;
use crate::domain::runtime::{ContainerId, RuntimeError, WorkerSpec, WorkloadRuntime};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Labels stamped on every worker container so operators can find a swarm's
/// containers with `docker ps --filter label=...`.
const LABEL_SWARM: &str = "ai.100monkeys.aegis.swarm-id";
const LABEL_ROLE: &str = "ai.100monkeys.aegis.role";

pub struct DockerWorkloadRuntime {
    docker: Docker,
    network_mode: Option<String>,
    autopull: bool,
    stop_timeout: Duration,
}

impl DockerWorkloadRuntime {
    pub fn new(settings: &DockerSection) -> Result<Self, RuntimeError> {
        let docker = if let Some(path) = &settings.socket_path {
            #[cfg(unix)]
            let result = Docker::connect_with_unix(path, 120, bollard::API_DEFAULT_VERSION);

            #[cfg(windows)]
            let result = Docker::connect_with_named_pipe(path, 120, bollard::API_DEFAULT_VERSION);

            result.map_err(|e| RuntimeError::Unavailable(format!(
                "Failed to connect to Docker at {}: {}\n\n\
                 Ensure Docker is running and the socket path is correct.",
                path, e
            )))?
        } else {
            Docker::connect_with_local_defaults()
                .map_err(|e| RuntimeError::Unavailable(format!(
                    "Failed to connect to Docker: {}\n\n\
                     Common causes:\n\
                     - Docker daemon not running (check: docker ps)\n\
                     - Permission denied accessing Docker socket\n\
                     - On Linux: Current user not in 'docker' group",
                    e
                )))?
        };

        Ok(Self {
            docker,
            network_mode: settings.network.clone(),
            autopull: settings.autopull,
            stop_timeout: settings.stop_timeout,
        })
    }

    /// Verify Docker daemon is accessible
    pub async fn healthcheck(&self) -> Result<(), RuntimeError> {
        self.docker.ping().await.map_err(|e| {
            RuntimeError::Unavailable(format!(
                "Cannot connect to Docker daemon: {}\n\nVerify with: docker ps",
                e
            ))
        })?;
        Ok(())
    }

    async fn ensure_image(&self, image: &str) -> Result<(), RuntimeError> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        if !self.autopull {
            return Err(RuntimeError::StartFailed(format!(
                "Image {} not found locally and autopull is disabled",
                image
            )));
        }

        info!("Pulling worker image: {}", image);
        let options = Some(CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            if let Err(e) = result {
                return Err(RuntimeError::StartFailed(format!(
                    "Failed to pull image {}: {}\n\nTry manually: docker pull {}",
                    image, e, image
                )));
            }
        }
        info!("Successfully pulled worker image: {}", image);
        Ok(())
    }
}

fn is_not_found(err: &DockerError) -> bool {
    matches!(err, DockerError::DockerResponseServerError { status_code: 404, .. })
}

fn is_not_modified(err: &DockerError) -> bool {
    matches!(err, DockerError::DockerResponseServerError { status_code: 304, .. })
}

#[async_trait]
impl WorkloadRuntime for DockerWorkloadRuntime {
    async fn start_worker(&self, spec: WorkerSpec) -> Result<ContainerId, RuntimeError> {
        self.ensure_image(&spec.image).await?;

        let mut labels = HashMap::new();
        if let Some(swarm) = spec.env.get("AEGIS_SWARM_ID") {
            labels.insert(LABEL_SWARM.to_string(), swarm.clone());
        }
        if let Some(role) = spec.env.get("AEGIS_BEE_ROLE") {
            labels.insert(LABEL_ROLE.to_string(), role.clone());
        }

        let host_config = bollard::service::HostConfig {
            network_mode: self.network_mode.clone(),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let container_config = Config {
            image: Some(spec.image.clone()),
            env: Some(spec.env_pairs()),
            labels: Some(labels),
            host_config: Some(host_config),
            ..Default::default()
        };

        let res = self
            .docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| RuntimeError::StartFailed(format!("{}: {}", spec.name, e)))?;

        for warning in &res.warnings {
            warn!(container = %spec.name, "Docker warning on create: {}", warning);
        }

        self.docker
            .start_container(&res.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RuntimeError::StartFailed(format!("Failed to start container {}: {}", spec.name, e)))?;

        info!(container = %spec.name, id = %res.id, image = %spec.image, "Started worker container");
        Ok(ContainerId::new(res.id))
    }

    async fn stop_worker(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        let stop = StopContainerOptions {
            t: self.stop_timeout.as_secs() as i64,
        };

        match self.docker.stop_container(id.as_str(), Some(stop)).await {
            Ok(()) => {}
            Err(e) if is_not_modified(&e) => {
                debug!(id = %id, "Container already stopped");
            }
            Err(e) if is_not_found(&e) => {
                return Err(RuntimeError::ContainerNotFound(id.to_string()));
            }
            Err(e) => return Err(RuntimeError::StopFailed(e.to_string())),
        }

        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        self.docker
            .remove_container(id.as_str(), Some(options))
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    RuntimeError::ContainerNotFound(id.to_string())
                } else {
                    RuntimeError::StopFailed(e.to_string())
                }
            })?;

        info!(id = %id, "Stopped and removed worker container");
        Ok(())
    }
}
