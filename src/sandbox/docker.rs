use super::{SandboxOutcome, SandboxRequest, SandboxRuntime};
use crate::error::SandboxError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Docker-backed sandbox: one throwaway container per request
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    image: String,
    dockerfile_dir: Option<PathBuf>,
}

impl DockerRuntime {
    pub fn new(image: impl Into<String>, dockerfile_dir: Option<PathBuf>) -> Self {
        Self {
            image: image.into(),
            dockerfile_dir,
        }
    }

    /// Arguments for `docker`, excluding credential values.
    ///
    /// Credentials are passed as bare `-e KEY` so the values only travel
    /// through the child's environment.
    pub fn run_args(&self, request: &SandboxRequest, container_name: &str) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "-i".to_string(),
            "--name".to_string(),
            container_name.to_string(),
        ];

        for mount in &request.mounts {
            let mut spec = format!("{}:{}", mount.host.display(), mount.container);
            if mount.read_only {
                spec.push_str(":ro");
            }
            args.push("-v".to_string());
            args.push(spec);
        }

        for key in request.env.keys() {
            args.push("-e".to_string());
            args.push(key.clone());
        }

        if let Some(workdir) = &request.workdir {
            args.push("-w".to_string());
            args.push(workdir.clone());
        }

        args.push(self.image.clone());
        args.extend(request.command.iter().cloned());
        args
    }

    fn container_name(label: &str) -> String {
        let sanitized: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
            .collect();
        format!("maxreview-{}-{}", sanitized, std::process::id())
    }
}

/// Removes the container if the run future is dropped before it finished.
struct ContainerGuard {
    name: String,
    armed: bool,
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if self.armed {
            // Killing the docker client does not stop the container itself.
            let _ = std::process::Command::new("docker")
                .args(["rm", "-f", &self.name])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn();
        }
    }
}

#[async_trait]
impl SandboxRuntime for DockerRuntime {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn is_available(&self) -> bool {
        Command::new("docker")
            .arg("info")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn ensure_image(&self) -> Result<(), SandboxError> {
        debug!("Checking Docker image {}", self.image);

        let inspect = Command::new("docker")
            .args(["image", "inspect", &self.image])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;

        if inspect.success() {
            debug!("Image {} exists locally", self.image);
            return Ok(());
        }

        let context_dir =
            self.dockerfile_dir
                .as_ref()
                .ok_or_else(|| SandboxError::ImageBuildFailed {
                    image: self.image.clone(),
                    reason: "image not found and no Dockerfile directory configured".to_string(),
                })?;

        info!("Building Docker image {} from {:?}", self.image, context_dir);
        let output = Command::new("docker")
            .arg("build")
            .arg("-t")
            .arg(&self.image)
            .arg(context_dir)
            .output()
            .await?;

        if !output.status.success() {
            return Err(SandboxError::ImageBuildFailed {
                image: self.image.clone(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!("Built Docker image {}", self.image);
        Ok(())
    }

    async fn execute(&self, request: SandboxRequest) -> Result<SandboxOutcome, SandboxError> {
        let container_name = Self::container_name(&request.label);
        let args = self.run_args(&request, &container_name);
        debug!("docker {}", args.join(" "));

        let started = Instant::now();
        let mut child = Command::new("docker")
            .args(&args)
            .envs(&request.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SandboxError::LaunchFailed(format!("docker: {}", e)))?;

        let mut guard = ContainerGuard {
            name: container_name,
            armed: true,
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Some(input) = &request.stdin {
                stdin.write_all(input.as_bytes()).await?;
            }
            stdin.shutdown().await?;
        }

        let output = match tokio::time::timeout(request.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "{} exceeded {}s, removing container",
                    request.label,
                    request.timeout.as_secs()
                );
                return Err(SandboxError::Timeout(request.timeout.as_secs()));
            }
        };
        guard.armed = false;

        Ok(SandboxOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            elapsed: started.elapsed(),
        })
    }
}
