//! Wayland layer-shell integration

use anyhow::{Result, anyhow};
use calloop::channel::{self, Channel};
use calloop::timer::{TimeoutAction, Timer};
use calloop::{EventLoop, LoopHandle, RegistrationToken};
use smithay_client_toolkit::{
    compositor::{CompositorHandler, CompositorState, Region},
    delegate_compositor, delegate_layer, delegate_output, delegate_registry, delegate_shm,
    output::{OutputHandler, OutputInfo, OutputState},
    reexports::calloop_wayland_source::WaylandSource,
    registry::{ProvidesRegistryState, RegistryState},
    registry_handlers,
    shell::{
        WaylandSurface,
        wlr_layer::{
            Anchor, KeyboardInteractivity, Layer, LayerShell, LayerShellHandler, LayerSurface,
            LayerSurfaceConfigure,
        },
    },
    shm::{
        Shm, ShmHandler,
        slot::{Buffer, SlotPool},
    },
};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use wayland_client::{
    Connection, QueueHandle,
    globals::registry_queue_init,
    protocol::{wl_output, wl_shm, wl_surface},
};

use crate::display::{BackendEvent, Bounds, Display, DisplayId, ShowCommand};
use crate::osd::{OverlayRequest, render};

const LAYER_NAMESPACE: &str = "scarify-overlay";

struct OverlayWindow {
    layer: LayerSurface,
    pool: Option<SlotPool>,
    buffer: Option<Buffer>,
    width: u32,
    height: u32,
    configured: bool,
    // Show command that arrived before the first configure
    pending: Option<ShowCommand>,
    hide_timer: Option<RegistrationToken>,
}

/// Overlay backend state, driven by the calloop event loop
pub struct OverlayApp {
    registry_state: RegistryState,
    output_state: OutputState,
    compositor_state: CompositorState,
    shm: Shm,
    layer_shell: LayerShell,

    qh: QueueHandle<Self>,
    loop_handle: LoopHandle<'static, Self>,
    events: UnboundedSender<BackendEvent>,

    windows: HashMap<DisplayId, OverlayWindow>,
    published: Option<Vec<Display>>,
    pub exit: bool,
}

impl OverlayApp {
    /// Connect to the compositor and wire requests into a fresh event loop
    pub fn connect(
        events: UnboundedSender<BackendEvent>,
    ) -> Result<(EventLoop<'static, Self>, Self, channel::Sender<OverlayRequest>)> {
        let conn = Connection::connect_to_env()?;
        let (globals, event_queue) = registry_queue_init(&conn)?;
        let qh = event_queue.handle();

        let event_loop: EventLoop<'static, Self> = EventLoop::try_new()?;
        WaylandSource::new(conn, event_queue)
            .insert(event_loop.handle())
            .map_err(|e| anyhow!("Failed to insert Wayland source: {}", e.error))?;

        let (tx, requests): (channel::Sender<OverlayRequest>, Channel<OverlayRequest>) =
            channel::channel();
        event_loop
            .handle()
            .insert_source(requests, |event, _, app: &mut Self| match event {
                channel::Event::Msg(request) => app.handle_request(request),
                channel::Event::Closed => app.exit = true,
            })
            .map_err(|e| anyhow!("Failed to insert request channel: {}", e.error))?;

        let app = Self {
            registry_state: RegistryState::new(&globals),
            output_state: OutputState::new(&globals, &qh),
            compositor_state: CompositorState::bind(&globals, &qh)?,
            shm: Shm::bind(&globals, &qh)?,
            layer_shell: LayerShell::bind(&globals, &qh)?,
            qh,
            loop_handle: event_loop.handle(),
            events,
            windows: HashMap::new(),
            published: None,
            exit: false,
        };

        Ok((event_loop, app, tx))
    }

    pub fn run(&mut self, event_loop: &mut EventLoop<'static, Self>) -> Result<()> {
        while !self.exit {
            event_loop.dispatch(None, self)?;
        }
        log::info!("Overlay backend shutting down");
        Ok(())
    }

    fn handle_request(&mut self, request: OverlayRequest) {
        match request {
            OverlayRequest::Create { display, bounds } => self.create_window(display, bounds),
            OverlayRequest::SetBounds { display, bounds } => {
                if let Some(window) = self.windows.get_mut(&display) {
                    // Anchored to every edge, so the compositor sizes us; keep
                    // the bounds as the fallback size for the next buffer.
                    if !window.configured {
                        window.width = bounds.width;
                        window.height = bounds.height;
                    }
                }
            }
            OverlayRequest::Show { display, command } => {
                let Some(window) = self.windows.get_mut(&display) else {
                    self.report_error(display, "Show requested for unknown overlay");
                    return;
                };
                if window.configured {
                    self.start_show(display, command);
                } else {
                    window.pending = Some(command);
                }
            }
            OverlayRequest::Close { display } => self.remove_window(display),
        }
    }

    fn create_window(&mut self, display: DisplayId, bounds: Bounds) {
        let output = self.output_state.outputs().find(|output| {
            self.output_state
                .info(output)
                .is_some_and(|info| info.id == display)
        });
        let Some(output) = output else {
            self.report_lost(display, "No wl_output for display");
            return;
        };

        let surface = self.compositor_state.create_surface(&self.qh);
        let layer = self.layer_shell.create_layer_surface(
            &self.qh,
            surface,
            Layer::Overlay,
            Some(LAYER_NAMESPACE),
            Some(&output),
        );

        layer.set_anchor(Anchor::TOP | Anchor::BOTTOM | Anchor::LEFT | Anchor::RIGHT);
        layer.set_keyboard_interactivity(KeyboardInteractivity::None);
        layer.set_exclusive_zone(-1);
        layer.set_size(0, 0);

        // Empty input region: pointer and touch fall through to whatever is below
        match Region::new(&self.compositor_state) {
            Ok(region) => layer.wl_surface().set_input_region(Some(region.wl_region())),
            Err(e) => self.report_error(display, &format!("Failed to create input region: {}", e)),
        }

        // No buffer yet: the surface stays invisible until configured
        layer.wl_surface().commit();

        self.windows.insert(
            display,
            OverlayWindow {
                layer,
                pool: None,
                buffer: None,
                width: bounds.width,
                height: bounds.height,
                configured: false,
                pending: None,
                hide_timer: None,
            },
        );
    }

    fn start_show(&mut self, display: DisplayId, command: ShowCommand) {
        log::debug!(
            "Showing overlay on display {} for {}ms (audio requested: {})",
            display,
            command.duration_ms,
            command.audio_enabled
        );

        if let Err(e) = self.draw(display, true) {
            self.report_error(display, &format!("Failed to draw overlay: {}", e));
        }

        let timer = Timer::from_duration(Duration::from_millis(command.duration_ms));
        let inserted = self.loop_handle.insert_source(timer, move |_, _, app| {
            app.finish_show(display);
            TimeoutAction::Drop
        });

        match inserted {
            Ok(token) => {
                let previous = self
                    .windows
                    .get_mut(&display)
                    .and_then(|window| window.hide_timer.replace(token));
                if let Some(previous) = previous {
                    self.loop_handle.remove(previous);
                }
            }
            Err(e) => {
                self.report_error(display, &format!("Failed to schedule hide: {}", e.error));
                self.finish_show(display);
            }
        }
    }

    fn finish_show(&mut self, display: DisplayId) {
        let Some(window) = self.windows.get_mut(&display) else {
            return;
        };
        window.hide_timer = None;

        if let Err(e) = self.draw(display, false) {
            self.report_error(display, &format!("Failed to clear overlay: {}", e));
        }
        let _ = self.events.send(BackendEvent::SurfaceCompleted(display));
    }

    fn draw(&mut self, display: DisplayId, visible: bool) -> Result<()> {
        let Some(window) = self.windows.get_mut(&display) else {
            return Ok(());
        };

        let width = window.width.max(1);
        let height = window.height.max(1);
        let stride = width as i32 * 4;

        if window.pool.is_none() {
            window.pool = Some(SlotPool::new(stride as usize * height as usize, &self.shm)?);
        }
        let pool = window
            .pool
            .as_mut()
            .ok_or_else(|| anyhow!("Buffer pool missing"))?;

        let (buffer, canvas) =
            pool.create_buffer(width as i32, height as i32, stride, wl_shm::Format::Argb8888)?;
        render::render_frame(canvas, width, height, visible)?;

        let surface = window.layer.wl_surface();
        surface.attach(Some(buffer.wl_buffer()), 0, 0);
        surface.damage_buffer(0, 0, width as i32, height as i32);
        surface.commit();

        window.buffer = Some(buffer);
        Ok(())
    }

    fn remove_window(&mut self, display: DisplayId) {
        if let Some(token) = self
            .windows
            .remove(&display)
            .and_then(|window| window.hide_timer)
        {
            self.loop_handle.remove(token);
        }
    }

    fn report_error(&self, display: DisplayId, message: &str) {
        log::warn!("Overlay {}: {}", display, message);
        let _ = self.events.send(BackendEvent::SurfaceError {
            display,
            message: message.to_string(),
        });
    }

    /// The window for `display` is gone; the core must stop tracking it
    fn report_lost(&self, display: DisplayId, message: &str) {
        log::warn!("Overlay {} lost: {}", display, message);
        let _ = self.events.send(BackendEvent::SurfaceLost {
            display,
            message: message.to_string(),
        });
    }

    fn display_for(&self, surface: &wl_surface::WlSurface) -> Option<DisplayId> {
        self.windows
            .iter()
            .find(|(_, window)| window.layer.wl_surface() == surface)
            .map(|(id, _)| *id)
    }

    /// Send the live display list to the core if it changed
    fn publish_displays(&mut self, removed: Option<&wl_output::WlOutput>) {
        let displays: Vec<Display> = self
            .output_state
            .outputs()
            .filter(|output| Some(output) != removed)
            .filter_map(|output| self.output_state.info(&output))
            .map(|info| display_from_info(&info))
            .collect();

        if self.published.as_ref() == Some(&displays) {
            return;
        }
        self.published = Some(displays.clone());
        let _ = self.events.send(BackendEvent::DisplaysChanged(displays));
    }
}

fn display_from_info(info: &OutputInfo) -> Display {
    let current_mode = info
        .modes
        .iter()
        .find(|mode| mode.current)
        .map(|mode| mode.dimensions);

    display_geometry(
        info.id,
        info.logical_position.unwrap_or(info.location),
        info.logical_size.or(current_mode),
    )
}

/// Logical geometry wins; the current mode is the fallback size
fn display_geometry(id: DisplayId, position: (i32, i32), size: Option<(i32, i32)>) -> Display {
    let (width, height) = size.unwrap_or((0, 0));
    Display {
        id,
        bounds: Bounds {
            x: position.0,
            y: position.1,
            width: width.max(0) as u32,
            height: height.max(0) as u32,
        },
    }
}

// Implement required trait delegates
delegate_compositor!(OverlayApp);
delegate_output!(OverlayApp);
delegate_shm!(OverlayApp);
delegate_layer!(OverlayApp);
delegate_registry!(OverlayApp);

impl CompositorHandler for OverlayApp {
    fn scale_factor_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_factor: i32,
    ) {
    }

    fn transform_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_transform: wl_output::Transform,
    ) {
    }

    fn frame(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _time: u32,
    ) {
    }

    fn surface_enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }

    fn surface_leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }
}

impl OutputHandler for OverlayApp {
    fn output_state(&mut self) -> &mut OutputState {
        &mut self.output_state
    }

    fn new_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
        self.publish_displays(None);
    }

    fn update_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
        self.publish_displays(None);
    }

    fn output_destroyed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        output: wl_output::WlOutput,
    ) {
        self.publish_displays(Some(&output));
    }
}

impl LayerShellHandler for OverlayApp {
    fn closed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, layer: &LayerSurface) {
        let Some(display) = self.display_for(layer.wl_surface()) else {
            return;
        };
        self.remove_window(display);
        self.report_lost(display, "Overlay closed by compositor");

        // Resend the display list so the core recreates the surface
        self.published = None;
        self.publish_displays(None);
    }

    fn configure(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        layer: &LayerSurface,
        configure: LayerSurfaceConfigure,
        _serial: u32,
    ) {
        let Some(display) = self.display_for(layer.wl_surface()) else {
            return;
        };
        let Some(window) = self.windows.get_mut(&display) else {
            return;
        };

        let (width, height) = configure.new_size;
        if width > 0 && height > 0 && (width, height) != (window.width, window.height) {
            window.width = width;
            window.height = height;
            window.pool = None; // Recreate pool with new size
        }
        window.configured = true;

        let visible = window.hide_timer.is_some();
        match window.pending.take() {
            Some(command) => self.start_show(display, command),
            None => {
                if let Err(e) = self.draw(display, visible) {
                    self.report_error(display, &format!("Failed to draw overlay: {}", e));
                }
            }
        }
    }
}

impl ShmHandler for OverlayApp {
    fn shm_state(&mut self) -> &mut Shm {
        &mut self.shm
    }
}

impl ProvidesRegistryState for OverlayApp {
    fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry_state
    }
    registry_handlers![OutputState];
}
