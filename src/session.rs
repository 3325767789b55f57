/* SPDX-License-Identifier: GPL-3.0-or-later */
/*! Per-client relay session: one host connection, one guest display, and
 * the scheduler interleaving the two readers.
 *
 * All relaying is single-threaded within a session. The guest reader
 * (`Display::dispatch_clients`) and the host reader (queue read +
 * `dispatch_pending`) are interleaved by one poll loop, and handlers never
 * suspend between decoding a message and issuing its translation, so pairs
 * are updated atomically from either side's viewpoint. Sessions share no
 * mutable state with each other. */
use crate::registry;
use crate::shm::ShmAllocator;
use crate::tag;
use log::{debug, info};
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use wayland_client::backend::WaylandError;
use wayland_client::globals::{registry_queue_init, GlobalList, GlobalListContents};
use wayland_client::protocol::wl_registry;
use wayland_client::{Connection, EventQueue, QueueHandle};
use wayland_server::backend::{ClientData, ClientId, DisconnectReason};
use wayland_server::Display;

/** Settings shared by every session. */
pub struct RelayConfig {
    /** Prefix prepended to every toplevel title forwarded to the host. */
    pub tag: String,
}

/** Mutable per-client state handed to every request and event handler. */
pub struct RelayState {
    pub config: Arc<RelayConfig>,
    pub qh: QueueHandle<RelayState>,
    pub globals: GlobalList,
    pub allocator: Arc<dyn ShmAllocator>,
}

/* The host registry only matters through `GlobalList`; later global
 * announcements are not re-advertised to the guest. */
impl wayland_client::Dispatch<wl_registry::WlRegistry, GlobalListContents> for RelayState {
    fn event(
        _: &mut Self,
        _: &wl_registry::WlRegistry,
        _: wl_registry::Event,
        _: &GlobalListContents,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
    }
}

/** Client-side bookkeeping for the single guest of a session. */
struct GuestHandle {
    disconnected: AtomicBool,
}

impl ClientData for GuestHandle {
    fn initialized(&self, _client_id: ClientId) {}
    fn disconnected(&self, _client_id: ClientId, _reason: DisconnectReason) {
        self.disconnected.store(true, Ordering::Release);
    }
}

enum SessionStatus {
    Running,
    GuestClosed,
    HostClosed,
}

/** A relay between one guest client and its own host connection. */
pub struct RelaySession {
    display: Display<RelayState>,
    queue: EventQueue<RelayState>,
    state: RelayState,
    guest: Arc<GuestHandle>,
}

impl RelaySession {
    /** Connect to the host, advertise the global catalog, and adopt the
     * guest socket. Fails if the host registry cannot be loaded. */
    pub fn new(
        guest: UnixStream,
        host: UnixStream,
        config: Arc<RelayConfig>,
        allocator: Arc<dyn ShmAllocator>,
    ) -> Result<RelaySession, String> {
        let conn = Connection::from_socket(host)
            .map_err(|x| tag!("Failed to set up host connection: {}", x))?;
        let (globals, queue) = registry_queue_init::<RelayState>(&conn)
            .map_err(|x| tag!("Failed to load host registry: {}", x))?;
        let qh = queue.handle();

        let display: Display<RelayState> =
            Display::new().map_err(|x| tag!("Failed to create guest display: {}", x))?;
        let mut handle = display.handle();
        registry::create_catalog(&handle);

        let guest_handle = Arc::new(GuestHandle {
            disconnected: AtomicBool::new(false),
        });
        handle
            .insert_client(guest, guest_handle.clone())
            .map_err(|x| tag!("Failed to adopt guest client: {}", x))?;
        debug!("Session established, {} host globals", globals.contents().clone_list().len());

        Ok(RelaySession {
            display,
            queue,
            state: RelayState {
                config,
                qh,
                globals,
                allocator,
            },
            guest: guest_handle,
        })
    }

    /** Relay until one transport closes; the first side to close is logged
     * and the other side is torn down when the session drops. */
    pub fn run(&mut self) -> Result<(), String> {
        loop {
            match self.dispatch_round(PollTimeout::NONE)? {
                SessionStatus::Running => (),
                SessionStatus::GuestClosed => {
                    info!("Guest disconnected; closing session");
                    return Ok(());
                }
                SessionStatus::HostClosed => {
                    info!("Host connection closed; closing session");
                    return Ok(());
                }
            }
        }
    }

    /** One scheduler pass: drain queued work on both sides, flush, sleep
     * in poll, then read whichever transport became ready. */
    fn dispatch_round(&mut self, timeout: PollTimeout) -> Result<SessionStatus, String> {
        let Self {
            display,
            queue,
            state,
            guest,
        } = self;

        queue
            .dispatch_pending(state)
            .map_err(|x| tag!("Failed to dispatch host events: {}", x))?;
        display
            .dispatch_clients(state)
            .map_err(|x| tag!("Failed to dispatch guest requests: {}", x))?;
        display
            .flush_clients()
            .map_err(|x| tag!("Failed to flush guest connection: {}", x))?;
        if let Err(x) = queue.flush() {
            debug!("Failed to flush host connection: {}", x);
            return Ok(SessionStatus::HostClosed);
        }
        if guest.disconnected.load(Ordering::Acquire) {
            return Ok(SessionStatus::GuestClosed);
        }

        let Some(read_guard) = queue.prepare_read() else {
            /* Host events were queued while flushing; next pass drains them. */
            return Ok(SessionStatus::Running);
        };

        let (guest_ready, host_ready);
        {
            let mut fds = [
                PollFd::new(display.backend().poll_fd(), PollFlags::POLLIN),
                PollFd::new(read_guard.connection_fd(), PollFlags::POLLIN),
            ];
            match nix::poll::poll(&mut fds, timeout) {
                Ok(_) => (),
                Err(Errno::EINTR) => return Ok(SessionStatus::Running),
                Err(x) => return Err(tag!("Failed to poll: {}", x)),
            }
            let wake = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;
            guest_ready = fds[0].revents().unwrap_or(PollFlags::empty()).intersects(wake);
            host_ready = fds[1].revents().unwrap_or(PollFlags::empty()).intersects(wake);
        }

        if host_ready {
            match read_guard.read() {
                Ok(_) => (),
                Err(WaylandError::Io(ref e)) if e.kind() == std::io::ErrorKind::WouldBlock => (),
                Err(x) => {
                    debug!("Host connection failed or closed: {}", x);
                    return Ok(SessionStatus::HostClosed);
                }
            }
            queue
                .dispatch_pending(state)
                .map_err(|x| tag!("Failed to dispatch host events: {}", x))?;
        } else {
            drop(read_guard);
        }

        if guest_ready {
            display
                .dispatch_clients(state)
                .map_err(|x| tag!("Failed to dispatch guest requests: {}", x))?;
            if guest.disconnected.load(Ordering::Acquire) {
                return Ok(SessionStatus::GuestClosed);
            }
        }

        Ok(SessionStatus::Running)
    }
}
