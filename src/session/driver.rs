// =============================================================================
// Session driver — the single task that owns the controller
// =============================================================================
//
// All buffer mutation happens on this task: switch commands and live feed
// events are handled one at a time, so "close old feed, open new feed" is
// serialized and no lock is needed around the buffer.
// =============================================================================

use tokio::sync::mpsc;
use tracing::info;

use super::controller::SessionController;
use crate::types::SessionKey;

/// Requests accepted by [`run_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Start (or switch to) a session for the given pair.
    Switch(SessionKey),
    /// Close the live feed and stop the driver.
    Shutdown,
}

/// Drive `controller` until a `Shutdown` command arrives or every command
/// sender is dropped. The controller is closed and handed back.
pub async fn run_session(
    mut controller: SessionController,
    mut commands: mpsc::Receiver<SessionCommand>,
) -> SessionController {
    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(SessionCommand::Switch(key)) => {
                    info!(key = %key, "switching session");
                    controller.switch_to(key).await;
                }
                Some(SessionCommand::Shutdown) | None => {
                    info!("session driver stopping");
                    controller.close().await;
                    break;
                }
            },
            Some(msg) = controller.next_feed_message() => {
                controller.handle_feed_message(msg);
            }
        }
    }
    controller
}
