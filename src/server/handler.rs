//! Connection and message handling

use crate::console::ConsoleKind;
use crate::debug_log::DebugLogEntry;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::service::{ServiceError, ServiceHandle};
use crate::transport::{AsyncConnection, SocketError};
use tokio::net::UnixStream;
use tokio::sync::mpsc::UnboundedReceiver;

type ServerResult<T> = std::result::Result<T, SocketError>;

pub(super) async fn handle_connection(stream: UnixStream, handle: ServiceHandle) -> ServerResult<()> {
    let mut conn = AsyncConnection::new(stream);

    // Set once this connection becomes the debug observer
    let mut debug_rx: Option<UnboundedReceiver<DebugLogEntry>> = None;

    loop {
        tokio::select! {
            result = conn.read_client_message() => {
                let Some(request) = result? else {
                    // Connection closed
                    break;
                };
                log::debug!("Received request: {:?}", request);

                let response = match request {
                    ClientMessage::SubscribeDebug { id } => match handle.subscribe_debug().await {
                        Ok(rx) => {
                            debug_rx = Some(rx);
                            ServerMessage::Subscribed { id }
                        }
                        Err(e) => ServerMessage::new_error(id, e.to_string()),
                    },
                    request => process_message(request, &handle).await,
                };
                conn.write_server_message(&response).await?;
            }

            entry = next_entry(&mut debug_rx), if debug_rx.is_some() => {
                match entry {
                    Some(entry) => {
                        conn.write_server_message(&ServerMessage::DebugEntry { entry }).await?;
                    }
                    // Replaced by a newer observer
                    None => debug_rx = None,
                }
            }
        }
    }

    Ok(())
}

async fn next_entry(rx: &mut Option<UnboundedReceiver<DebugLogEntry>>) -> Option<DebugLogEntry> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn process_message(request: ClientMessage, handle: &ServiceHandle) -> ServerMessage {
    let id = request.id();

    let result: Result<ServerMessage, ServiceError> = match request {
        ClientMessage::Trigger { id } => handle
            .request_trigger()
            .await
            .map(|outcome| ServerMessage::TriggerResult { id, outcome }),
        ClientMessage::Complete { id } => handle.report_complete().map(|()| ServerMessage::Ack { id }),
        ClientMessage::GetSettings { id } => handle
            .get_settings()
            .await
            .map(|settings| ServerMessage::Settings { id, settings }),
        ClientMessage::UpdateSettings { id, update } => handle
            .update_settings(update)
            .await
            .map(|settings| ServerMessage::Settings { id, settings }),
        ClientMessage::GetDebugLogs { id } => handle
            .debug_logs()
            .await
            .map(|entries| ServerMessage::DebugLogs { id, entries }),
        ClientMessage::GetDebugStatus { id } => handle
            .debug_status()
            .await
            .map(|status| ServerMessage::DebugStatus { id, status }),
        ClientMessage::ReportError { id, info } => {
            handle.report_error(info).map(|()| ServerMessage::Ack { id })
        }
        ClientMessage::ToggleEnabled { id } => handle
            .toggle_enabled()
            .await
            .map(|enabled| ServerMessage::Enabled { id, enabled }),
        ClientMessage::OpenDebug { id } => handle
            .open_console(ConsoleKind::Debug)
            .map(|()| ServerMessage::Ack { id }),
        ClientMessage::OpenSettings { id } => handle
            .open_console(ConsoleKind::Settings)
            .map(|()| ServerMessage::Ack { id }),
        ClientMessage::SubscribeDebug { id } => Ok(ServerMessage::new_error(
            id,
            "Subscribe should be handled at connection level",
        )),
    };

    result.unwrap_or_else(|e| ServerMessage::new_error(id, e.to_string()))
}
