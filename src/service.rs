//! Host PDR Service
//!
//! Runs a [`HostPdrHandler`] on its own tokio task. Commands arrive over an
//! unbounded channel and are handled one at a time, so a fetch requested
//! while a cycle runs simply waits its turn. Host power-off notifications
//! from the host state channel reset the handler between commands.

use crate::error::{ApiError, FetchError, LookupError};
use crate::event::EventDataFormat;
use crate::handler::{CycleReport, HostPdrHandler};
use crate::sensor::{SensorInfo, SensorMap, SharedSensorMap};
use crate::types::{CompletionCode, EventState, HostState, RecordHandle, SensorEntry};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type FetchReply = oneshot::Sender<Result<Option<CycleReport>, FetchError>>;

#[derive(Debug)]
enum Command {
    FetchPdr {
        handles: Vec<RecordHandle>,
        reply: Option<FetchReply>,
    },
    SendRepoChange {
        pdr_types: Vec<u8>,
        event_data_format: u8,
    },
    SetHostFirmwareCondition {
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

pub struct HostPdrService;

impl HostPdrService {
    /// Move `handler` onto a new task. Must be called within a tokio runtime.
    pub fn spawn(handler: HostPdrHandler) -> HostPdrHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let sensors = handler.shared_sensor_map();
        let task = tokio::spawn(run(handler, rx));
        HostPdrHandle { tx, sensors, task }
    }
}

async fn run(mut handler: HostPdrHandler, mut rx: mpsc::UnboundedReceiver<Command>) -> HostPdrHandler {
    let mut host_state = handler.subscribe_host_state();
    let mut watching = true;
    info!("Host PDR service started");

    loop {
        tokio::select! {
            biased;
            changed = host_state.changed(), if watching => {
                if changed.is_err() {
                    debug!("Host state sender dropped");
                    watching = false;
                    continue;
                }
                let state = *host_state.borrow_and_update();
                debug!(state = ?state, "Host state changed");
                if state == HostState::Off {
                    handler.on_host_off();
                }
            }
            command = rx.recv() => match command {
                None | Some(Command::Shutdown) => break,
                Some(Command::FetchPdr { handles, reply }) => {
                    handler.fetch_pdr(handles);
                    let result = handler.run_pending().await;
                    match reply {
                        Some(reply) => {
                            let _ = reply.send(result);
                        }
                        None => {
                            if let Err(e) = result {
                                warn!(error = %e, "Requested fetch failed");
                            }
                        }
                    }
                }
                Some(Command::SendRepoChange { pdr_types, event_data_format }) => {
                    match EventDataFormat::from_u8(event_data_format) {
                        Some(format) => handler.send_pdr_repository_chg_event(&pdr_types, format).await,
                        None => warn!(event_data_format, "Unknown event data format, change event not sent"),
                    }
                }
                Some(Command::SetHostFirmwareCondition { reply }) => {
                    let up = handler.set_host_firmware_condition().await;
                    let _ = reply.send(up);
                }
            },
        }
    }

    info!("Host PDR service stopped");
    handler
}

/// Client side of a running [`HostPdrService`]
pub struct HostPdrHandle {
    tx: mpsc::UnboundedSender<Command>,
    sensors: SharedSensorMap,
    task: JoinHandle<HostPdrHandler>,
}

impl HostPdrHandle {
    fn send(&self, command: Command) -> Result<(), ApiError> {
        self.tx.send(command).map_err(|_| ApiError::ServiceStopped)
    }

    /// Fetch and wait for the cycle to finish.
    pub async fn fetch_pdr(
        &self,
        handles: Vec<RecordHandle>,
    ) -> Result<Option<CycleReport>, ApiError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::FetchPdr {
            handles,
            reply: Some(reply),
        })?;
        let result = response.await.map_err(|_| ApiError::ServiceStopped)?;
        Ok(result?)
    }

    /// Queue a fetch without waiting for it.
    pub fn request_fetch(&self, handles: Vec<RecordHandle>) -> Result<(), ApiError> {
        self.send(Command::FetchPdr {
            handles,
            reply: None,
        })
    }

    pub fn send_pdr_repository_chg_event(
        &self,
        pdr_types: Vec<u8>,
        event_data_format: u8,
    ) -> Result<(), ApiError> {
        self.send(Command::SendRepoChange {
            pdr_types,
            event_data_format,
        })
    }

    pub async fn set_host_firmware_condition(&self) -> Result<bool, ApiError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::SetHostFirmwareCondition { reply })?;
        response.await.map_err(|_| ApiError::ServiceStopped)
    }

    /// Current sensor map snapshot
    pub fn sensor_map(&self) -> Arc<SensorMap> {
        self.sensors.snapshot()
    }

    pub fn lookup_sensor_info(&self, entry: &SensorEntry) -> Result<SensorInfo, LookupError> {
        self.sensors.lookup_sensor_info(entry)
    }

    pub fn handle_state_sensor_event(
        &self,
        entry: &SensorEntry,
        sensor_offset: u8,
        state: EventState,
    ) -> CompletionCode {
        self.sensors
            .handle_state_sensor_event(entry, sensor_offset, state)
    }

    /// Stop the service after queued commands and hand back the handler.
    pub async fn shutdown(self) -> Result<HostPdrHandler, ApiError> {
        let _ = self.tx.send(Command::Shutdown);
        self.task.await.map_err(|_| ApiError::ServiceStopped)
    }
}
