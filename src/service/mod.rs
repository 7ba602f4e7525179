//! Async node service
//!
//! Drives a [`Node`] from a tokio interval, accepts configuration commands
//! over a channel and publishes a status snapshot after every tick for the
//! external reporting collaborator. The node lives inside a single task, so
//! the radio is never touched from two places at once.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::core::{Error, Eui, NodeConfig, Result, Role};
use crate::ranging::{Node, PeerSnapshot, RangingRole, RoleStats};
use crate::radio::RadioDriver;
use crate::store::{AntennaCalibration, Preferences};
use crate::util::Clock;

/// Status published after every tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeStatus {
    pub role: Role,
    pub eui: Eui,
    /// Current state machine state
    pub state: &'static str,
    pub antenna_delay: u16,
    pub peers: PeerSnapshot,
    pub stats: RoleStats,
}

/// Commands accepted by a running service
#[derive(Debug)]
pub enum Command {
    /// Persist and apply a new antenna delay
    SetAntennaDelay {
        delay: u16,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Stop the service loop
    Shutdown,
}

/// Owns a node and runs it until shut down
pub struct NodeService<R, C, P> {
    node: Node<R, C>,
    calibration: AntennaCalibration<P>,
    antenna_delay: u16,
    tick_interval: Duration,
    commands: mpsc::Receiver<Command>,
    status: watch::Sender<NodeStatus>,
}

/// Cloneable handle to a running [`NodeService`]
#[derive(Clone)]
pub struct ServiceHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<NodeStatus>,
}

impl<R, C, P> NodeService<R, C, P>
where
    R: RadioDriver,
    C: Clock,
    P: Preferences,
{
    /// Loads the stored calibration, builds the node and returns the
    /// service together with its handle
    pub fn new(config: &NodeConfig, radio: R, clock: C, prefs: P) -> Result<(Self, ServiceHandle)> {
        let calibration = AntennaCalibration::new(prefs, config.default_antenna_delay);
        let antenna_delay = calibration.load();
        let node = Node::new(config, radio, clock, antenna_delay)?;

        let (command_tx, command_rx) = mpsc::channel(16);
        let (status_tx, status_rx) = watch::channel(status_of(&node, antenna_delay));

        let service = NodeService {
            node,
            calibration,
            antenna_delay,
            tick_interval: config.tick_interval,
            commands: command_rx,
            status: status_tx,
        };
        let handle = ServiceHandle {
            commands: command_tx,
            status: status_rx,
        };
        Ok((service, handle))
    }

    /// Runs the tick loop until a shutdown command arrives or every handle
    /// is dropped; returns the node for inspection
    pub async fn run(mut self) -> Node<R, C> {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(role = %self.node.role(), eui = %self.node.eui(), "Node service started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.node.tick();
                    self.publish();
                }
                command = self.commands.recv() => match command {
                    Some(Command::SetAntennaDelay { delay, reply }) => {
                        let result = self.apply_antenna_delay(delay);
                        if let Err(e) = &result {
                            warn!(delay, error = %e, "Failed to apply antenna delay");
                        }
                        self.publish();
                        let _ = reply.send(result);
                    }
                    Some(Command::Shutdown) | None => break,
                },
            }
        }

        info!("Node service stopped");
        self.node
    }

    fn apply_antenna_delay(&mut self, delay: u16) -> Result<()> {
        self.calibration.store(delay)?;
        self.node.set_antenna_delay(delay)?;
        self.antenna_delay = delay;
        debug!(delay, "Antenna delay updated");
        Ok(())
    }

    fn publish(&self) {
        let status = status_of(&self.node, self.antenna_delay);
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

fn status_of<R: RadioDriver, C: Clock>(node: &Node<R, C>, antenna_delay: u16) -> NodeStatus {
    NodeStatus {
        role: node.role(),
        eui: node.eui(),
        state: node.state_name(),
        antenna_delay,
        peers: node.snapshot(),
        stats: node.stats(),
    }
}

impl ServiceHandle {
    /// Latest published status
    pub fn status(&self) -> NodeStatus {
        self.status.borrow().clone()
    }

    /// Waits for the next status change
    pub async fn changed(&mut self) -> Result<NodeStatus> {
        self.status
            .changed()
            .await
            .map_err(|_| Error::service("Node service stopped"))?;
        Ok(self.status.borrow_and_update().clone())
    }

    /// Persists and applies a new antenna delay
    pub async fn set_antenna_delay(&self, delay: u16) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::SetAntennaDelay { delay, reply })
            .await
            .map_err(|e| Error::service(format!("Failed to send command: {}", e)))?;
        response
            .await
            .map_err(|e| Error::service(format!("No reply from service: {}", e)))?
    }

    /// Asks the service loop to stop
    pub async fn shutdown(&self) -> Result<()> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|e| Error::service(format!("Failed to send shutdown: {}", e)))
    }
}
