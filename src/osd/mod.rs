//! Overlay surfaces for Wayland
//!
//! The compositor connection lives on its own thread running a calloop
//! event loop. The core talks to it through [`WaylandSurfaceFactory`] and
//! hears back through [`BackendEvent`]s.

mod render;
mod wayland;

use anyhow::{Context, Result, anyhow};
use calloop::channel::Sender;
use tokio::sync::{mpsc::UnboundedSender, oneshot};

use crate::display::{
    BackendEvent, Bounds, Display, DisplayId, OverlaySurface, ShowCommand, SurfaceFactory,
};

use self::wayland::OverlayApp;

/// Requests from the core to the overlay thread
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayRequest {
    Create { display: DisplayId, bounds: Bounds },
    SetBounds { display: DisplayId, bounds: Bounds },
    Show { display: DisplayId, command: ShowCommand },
    Close { display: DisplayId },
}

pub struct WaylandSurfaceFactory {
    tx: Sender<OverlayRequest>,
}

pub struct WaylandSurface {
    display: DisplayId,
    tx: Sender<OverlayRequest>,
}

impl WaylandSurface {
    fn send(&self, request: OverlayRequest) {
        if let Err(e) = self.tx.send(request) {
            log::warn!("Overlay thread unavailable for display {}: {}", self.display, e);
        }
    }
}

impl OverlaySurface for WaylandSurface {
    fn set_bounds(&mut self, bounds: Bounds) {
        self.send(OverlayRequest::SetBounds {
            display: self.display,
            bounds,
        });
    }

    fn show(&mut self, command: &ShowCommand) {
        self.send(OverlayRequest::Show {
            display: self.display,
            command: *command,
        });
    }

    fn close(self) {
        self.send(OverlayRequest::Close {
            display: self.display,
        });
    }
}

impl SurfaceFactory for WaylandSurfaceFactory {
    type Surface = WaylandSurface;

    fn create(&mut self, display: &Display) -> Result<WaylandSurface> {
        self.tx
            .send(OverlayRequest::Create {
                display: display.id,
                bounds: display.bounds,
            })
            .map_err(|_| anyhow!("Overlay thread is not running"))?;

        Ok(WaylandSurface {
            display: display.id,
            tx: self.tx.clone(),
        })
    }
}

/// Start the overlay thread and wait until it is connected to the compositor
pub async fn spawn(events: UnboundedSender<BackendEvent>) -> Result<WaylandSurfaceFactory> {
    let (ready_tx, ready_rx) = oneshot::channel();

    std::thread::Builder::new()
        .name("scarify-wayland".to_string())
        .spawn(move || {
            let (mut event_loop, mut app, tx) = match OverlayApp::connect(events.clone()) {
                Ok(parts) => parts,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(tx));

            if let Err(e) = app.run(&mut event_loop) {
                log::error!("Overlay event loop failed: {}", e);
            }
            let _ = events.send(BackendEvent::Closed);
        })
        .context("Failed to spawn overlay thread")?;

    let tx = ready_rx
        .await
        .map_err(|_| anyhow!("Overlay thread exited during startup"))??;
    log::info!("Connected to Wayland compositor");

    Ok(WaylandSurfaceFactory { tx })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> (WaylandSurfaceFactory, calloop::channel::Channel<OverlayRequest>) {
        let (tx, rx) = calloop::channel::channel();
        (WaylandSurfaceFactory { tx }, rx)
    }

    fn display() -> Display {
        Display {
            id: 3,
            bounds: Bounds {
                x: 0,
                y: 0,
                width: 2560,
                height: 1440,
            },
        }
    }

    #[test]
    fn test_factory_fails_when_thread_gone() {
        let (mut factory, rx) = factory();
        drop(rx);
        assert!(factory.create(&display()).is_err());
    }

    #[test]
    fn test_surface_calls_after_thread_gone_do_not_panic() {
        let (mut factory, rx) = factory();
        let mut surface = factory.create(&display()).unwrap();
        drop(rx);

        surface.show(&ShowCommand {
            duration_ms: 2000,
            audio_enabled: false,
        });
        surface.close();
    }
}
