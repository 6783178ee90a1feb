use serde::Serialize;
use std::process::ExitStatus;
use tokio::process::Command;

use crate::{Address, Assignment, Error, Rank, Result};

/// What the collective runtime does at the rendezvous address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Rank 0: binds the rendezvous listener.
    Coordinator,
    /// Connects to the coordinator.
    Worker,
}

/// Everything the distributed runtime needs to join the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchPlan {
    pub rank: Rank,
    pub coordinator: Address,
    pub coordinator_port: u16,
    pub world_size: usize,
}

impl LaunchPlan {
    pub fn new(assignment: &Assignment, coordinator_port: u16) -> Self {
        Self {
            rank: assignment.rank,
            coordinator: assignment.coordinator.clone(),
            coordinator_port,
            world_size: assignment.world_size,
        }
    }

    pub fn role(&self) -> Role {
        if self.rank == 0 {
            Role::Coordinator
        } else {
            Role::Worker
        }
    }

    /// Environment read by torch-style launchers and training scripts.
    ///
    /// Plain names serve scripts started directly, one process per node, so
    /// the global rank equals the node rank. `torchrun` ignores those and
    /// takes its `--node-rank`, `--nnodes`, `--master-addr` and
    /// `--master-port` defaults from the `PET_` variables instead.
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        let master_addr = self.coordinator.to_string();
        let master_port = self.coordinator_port.to_string();
        let rank = self.rank.to_string();
        let world_size = self.world_size.to_string();

        vec![
            ("MASTER_ADDR", master_addr.clone()),
            ("MASTER_PORT", master_port.clone()),
            ("NODE_RANK", rank.clone()),
            ("RANK", rank.clone()),
            ("NNODES", world_size.clone()),
            ("WORLD_SIZE", world_size.clone()),
            ("PET_MASTER_ADDR", master_addr),
            ("PET_MASTER_PORT", master_port),
            ("PET_NODE_RANK", rank),
            ("PET_NNODES", world_size),
        ]
    }
}

/// Starts the distributed runtime as a child process.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
}

impl CommandLauncher {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from a full command line (program followed by arguments).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Launch`] for an empty command line.
    pub fn from_command_line(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::Launch("no command given".into()))?;
        Ok(Self::new(program.clone(), args.iter().cloned()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run the command with the plan's environment and wait for it to exit.
    ///
    /// Stdio is inherited.
    pub async fn launch(&self, plan: &LaunchPlan) -> Result<ExitStatus> {
        tracing::info!(
            program = %self.program,
            rank = plan.rank,
            world_size = plan.world_size,
            master_addr = %plan.coordinator,
            role = ?plan.role(),
            "Launching distributed runtime"
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(plan.env_vars())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Launch(format!("failed to start {}: {}", self.program, e)))?;

        let status = child.wait().await?;
        if status.success() {
            tracing::info!(program = %self.program, "Distributed runtime exited");
        } else {
            tracing::warn!(program = %self.program, %status, "Distributed runtime failed");
        }
        Ok(status)
    }
}
