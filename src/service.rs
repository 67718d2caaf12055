//! The service process: one task owns the orchestrator and multiplexes every
//! event source onto it.

mod command;

pub use command::{Command, ServiceError, ServiceHandle};

use crate::config::ServiceConfig;
use crate::console::ConsoleKind;
use crate::display::{BackendEvent, SurfaceFactory};
use crate::fault;
use crate::orchestrator::Orchestrator;
use crate::osd;
use crate::protocol::ClientMessage;
use crate::server::{SocketServer, remove_socket_file};
use crate::shortcuts::{self, HotkeyAction};
use crate::timer;
use crate::transport::{AsyncTransport, SocketError};
use anyhow::{Context, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

/// Event sources feeding the service loop
pub struct Inputs {
    pub commands: UnboundedReceiver<Command>,
    pub backend: UnboundedReceiver<BackendEvent>,
    pub hotkeys: UnboundedReceiver<HotkeyAction>,
}

pub async fn run(config: ServiceConfig) -> Result<()> {
    let socket_path = config.socket_path();

    let server = match SocketServer::bind(&socket_path) {
        Ok(server) => server,
        Err(SocketError::AlreadyRunning(path)) => {
            log::info!("Service already running at {}; opening its settings", path);
            AsyncTransport::new(path)
                .send_request(&ClientMessage::new_open_settings())
                .await
                .context("Failed to reach running service")?;
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to bind service socket"),
    };

    let result = serve(config, server).await;
    remove_socket_file(&socket_path);
    result
}

async fn serve(config: ServiceConfig, server: SocketServer) -> Result<()> {
    fault::install_panic_hook();

    let (backend_tx, backend_rx) = unbounded_channel();
    let factory = osd::spawn(backend_tx)
        .await
        .context("Failed to start Wayland overlay backend")?;

    let mut core = Orchestrator::new(factory, config.initial_settings(), config.consoles());
    let settings = core.settings();
    log::info!(
        "Service started (chance 1/{}, duration {}ms, audio {}, enabled {})",
        settings.chance_denominator,
        settings.duration_ms,
        settings.audio_enabled,
        settings.enabled
    );

    let (command_tx, command_rx) = unbounded_channel();
    let server_task = tokio::spawn(server.run(ServiceHandle::new(command_tx)));

    let (hotkey_tx, hotkey_rx) = unbounded_channel();
    match config.shortcuts() {
        Some(shortcut_config) => shortcuts::spawn(shortcut_config, hotkey_tx),
        None => log::info!("Global shortcuts disabled"),
    }

    core.open_console(ConsoleKind::Settings);

    let inputs = Inputs {
        commands: command_rx,
        backend: backend_rx,
        hotkeys: hotkey_rx,
    };
    let mut rng = StdRng::from_entropy();
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    event_loop(&mut core, inputs, config.tick_interval(), &mut rng, shutdown).await;

    server_task.abort();
    core.shutdown();
    log::info!("Service stopped");
    Ok(())
}

/// Dispatch events to the core until shutdown or loss of the display backend
pub async fn event_loop<F, R>(
    core: &mut Orchestrator<F>,
    mut inputs: Inputs,
    tick_interval: Duration,
    rng: &mut R,
    shutdown: impl Future<Output = ()>,
) where
    F: SurfaceFactory,
    R: rand::Rng,
{
    let mut ticker = timer::ticker(tick_interval);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                log::info!("Shutdown requested");
                break;
            }

            _ = ticker.tick() => {
                fault::guarded(core, |core| core.tick(rng));
            }

            Some(command) = inputs.commands.recv() => {
                fault::guarded(core, |core| command.apply(core));
            }

            event = inputs.backend.recv() => match event {
                Some(BackendEvent::Closed) | None => {
                    log::warn!("Display backend closed; shutting down");
                    break;
                }
                Some(event) => {
                    fault::guarded(core, |core| handle_backend_event(core, event));
                }
            },

            Some(action) = inputs.hotkeys.recv() => {
                fault::guarded(core, |core| handle_hotkey(core, action));
            }
        }
    }
}

fn handle_backend_event<F: SurfaceFactory>(core: &mut Orchestrator<F>, event: BackendEvent) {
    match event {
        BackendEvent::DisplaysChanged(displays) => core.sync_displays(&displays),
        BackendEvent::SurfaceCompleted(display) => {
            log::debug!("Overlay on display {} finished", display);
            core.report_complete();
        }
        BackendEvent::SurfaceError { display, message } => {
            core.report_surface_error(display, &message);
        }
        BackendEvent::SurfaceLost { display, message } => core.surface_lost(display, &message),
        BackendEvent::Closed => {}
    }
}

fn handle_hotkey<F: SurfaceFactory>(core: &mut Orchestrator<F>, action: HotkeyAction) {
    match action {
        HotkeyAction::ToggleEnabled => {
            core.toggle_enabled();
        }
        HotkeyAction::OpenDebug => {
            core.open_console(ConsoleKind::Debug);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::ConsoleLauncher;
    use crate::debug_log::LogKind;
    use crate::display::testing::{FakeFactory, display};
    use crate::settings::Settings;
    use crate::trigger::TriggerState;
    use tokio::sync::mpsc::UnboundedSender;
    use tokio::sync::oneshot;

    struct Senders {
        commands: UnboundedSender<Command>,
        backend: UnboundedSender<BackendEvent>,
        hotkeys: UnboundedSender<HotkeyAction>,
    }

    fn channels() -> (Senders, Inputs) {
        let (commands_tx, commands) = unbounded_channel();
        let (backend_tx, backend) = unbounded_channel();
        let (hotkeys_tx, hotkeys) = unbounded_channel();
        (
            Senders {
                commands: commands_tx,
                backend: backend_tx,
                hotkeys: hotkeys_tx,
            },
            Inputs {
                commands,
                backend,
                hotkeys,
            },
        )
    }

    fn core(settings: Settings) -> Orchestrator<FakeFactory> {
        Orchestrator::new(FakeFactory::default(), settings, ConsoleLauncher::disabled())
    }

    #[tokio::test]
    async fn test_backend_events_drive_core() {
        let mut core = core(Settings::default());
        let (senders, inputs) = channels();
        let mut rng = StdRng::seed_from_u64(1);

        senders
            .backend
            .send(BackendEvent::DisplaysChanged(vec![display(1, 0), display(2, 1920)]))
            .unwrap();
        senders.backend.send(BackendEvent::Closed).unwrap();

        event_loop(
            &mut core,
            inputs,
            Duration::from_secs(3600),
            &mut rng,
            std::future::pending(),
        )
        .await;

        assert_eq!(core.surface_count(), 2);
    }

    #[tokio::test]
    async fn test_surface_completion_ends_episode() {
        let mut core = core(Settings::default());
        let (senders, inputs) = channels();
        let mut rng = StdRng::seed_from_u64(1);

        let (reply, outcome) = oneshot::channel();
        senders.commands.send(Command::Trigger { reply }).unwrap();

        let driver = event_loop(
            &mut core,
            inputs,
            Duration::from_secs(3600),
            &mut rng,
            std::future::pending(),
        );
        let script = async {
            assert!(outcome.await.unwrap().accepted);
            senders.backend.send(BackendEvent::SurfaceCompleted(1)).unwrap();
            senders.backend.send(BackendEvent::Closed).unwrap();
        };
        tokio::join!(driver, script);

        assert_eq!(core.trigger_state(), TriggerState::Idle);
    }

    #[tokio::test]
    async fn test_hotkeys_and_surface_errors() {
        let mut core = core(Settings::default());
        let (senders, inputs) = channels();
        let mut rng = StdRng::seed_from_u64(1);

        senders.hotkeys.send(HotkeyAction::ToggleEnabled).unwrap();
        senders
            .backend
            .send(BackendEvent::SurfaceError {
                display: 4,
                message: "buffer allocation failed".to_string(),
            })
            .unwrap();

        let driver = event_loop(
            &mut core,
            inputs,
            Duration::from_secs(3600),
            &mut rng,
            tokio::time::sleep(Duration::from_millis(50)),
        );
        driver.await;

        assert!(!core.settings().enabled);
        let errors: Vec<_> = core
            .debug_logs()
            .into_iter()
            .filter(|entry| entry.kind == LogKind::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Renderer error reported");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_roll_only_when_enabled() {
        let mut settings = Settings::default();
        settings.chance_denominator = 1;
        let mut core = core(settings);
        let (_senders, inputs) = channels();
        let mut rng = StdRng::seed_from_u64(7);

        event_loop(
            &mut core,
            inputs,
            Duration::from_millis(1000),
            &mut rng,
            tokio::time::sleep(Duration::from_millis(3500)),
        )
        .await;

        // First tick triggers; later ones are blocked while the episode runs
        let logs = core.debug_logs();
        assert_eq!(
            logs.iter().filter(|e| e.kind == LogKind::Trigger).count(),
            1
        );
        assert_eq!(
            logs.iter()
                .filter(|e| e.message == "Trigger blocked: in-progress")
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_closed_surface_rebuilt_after_republish() {
        let factory = FakeFactory::default();
        let calls = std::rc::Rc::clone(&factory.calls);
        let mut core = Orchestrator::new(factory, Settings::default(), ConsoleLauncher::disabled());
        let (senders, inputs) = channels();
        let mut rng = StdRng::seed_from_u64(1);
        let displays = vec![display(1, 0)];

        senders
            .backend
            .send(BackendEvent::DisplaysChanged(displays.clone()))
            .unwrap();
        senders
            .backend
            .send(BackendEvent::SurfaceLost {
                display: 1,
                message: "Overlay closed by compositor".to_string(),
            })
            .unwrap();
        senders
            .backend
            .send(BackendEvent::DisplaysChanged(displays))
            .unwrap();
        senders.backend.send(BackendEvent::Closed).unwrap();

        event_loop(
            &mut core,
            inputs,
            Duration::from_secs(3600),
            &mut rng,
            std::future::pending(),
        )
        .await;

        assert_eq!(core.surface_count(), 1);
        assert_eq!(calls.borrow().len(), 2);
    }

    #[tokio::test]
    async fn test_dropped_backend_stops_loop() {
        let mut core = core(Settings::default());
        let (senders, inputs) = channels();
        let mut rng = StdRng::seed_from_u64(1);
        drop(senders.backend);

        event_loop(
            &mut core,
            inputs,
            Duration::from_secs(3600),
            &mut rng,
            std::future::pending(),
        )
        .await;
    }
}
