/* SPDX-License-Identifier: GPL-3.0-or-later */
/*! Compositor, surface, region and subsurface pairing.
 *
 * Surfaces are the only objects here with state: the pair of memory spans
 * captured by the most recent attach, written back at commit time. */
use crate::session::RelayState;
use crate::shm::{BufferData, MapSpan};
use crate::util::{host_data, server_data, PeerCell};
use log::{debug, warn};
use std::sync::Mutex;
use wayland_client::protocol as cp;
use wayland_server::protocol::{
    wl_callback::WlCallback,
    wl_compositor::{self, WlCompositor},
    wl_output::WlOutput,
    wl_region::{self, WlRegion},
    wl_subcompositor::{self, WlSubcompositor},
    wl_subsurface::{self, WlSubsurface},
    wl_surface::{self, WlSurface},
};
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, Resource};

/** Pair state of a surface: its host peer and the spans of the currently
 * attached buffer. The spans are written only by attach and read only by
 * commit. */
pub struct SurfaceData {
    pub host: cp::wl_surface::WlSurface,
    contents: Mutex<Option<SurfaceContents>>,
}

/** The two memory slices of the attached buffer: identical offsets and
 * lengths in the guest-visible and host-visible pool mappings. */
struct SurfaceContents {
    client_mem: MapSpan,
    host_mem: MapSpan,
}

impl SurfaceData {
    fn new(host: cp::wl_surface::WlSurface) -> SurfaceData {
        SurfaceData {
            host,
            contents: Mutex::new(None),
        }
    }
}

/** Host peer of a server-side surface. */
pub fn host_surface(surface: &WlSurface) -> &cp::wl_surface::WlSurface {
    &server_data::<SurfaceData, _>(surface).host
}

/** Server peer of a host-side surface (for translating event arguments). */
pub fn server_surface(surface: &cp::wl_surface::WlSurface) -> &WlSurface {
    host_data::<PeerCell<WlSurface>, _>(surface).get()
}

fn host_region(region: &WlRegion) -> &cp::wl_region::WlRegion {
    server_data::<cp::wl_region::WlRegion, _>(region)
}

impl Dispatch<WlCompositor, PeerCell<cp::wl_compositor::WlCompositor>> for RelayState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _compositor: &WlCompositor,
        request: wl_compositor::Request,
        data: &PeerCell<cp::wl_compositor::WlCompositor>,
        _dh: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_compositor::Request::CreateSurface { id } => {
                let peer: PeerCell<WlSurface> = PeerCell::default();
                let host = data.get().create_surface(&state.qh, peer.clone());
                let server = data_init.init(id, SurfaceData::new(host));
                debug!("Paired new surface {}", server.id());
                peer.link(server);
            }
            wl_compositor::Request::CreateRegion { id } => {
                let host = data.get().create_region(&state.qh, ());
                data_init.init(id, host);
            }
            other => warn!("Unhandled wl_compositor request: {:?}", other),
        }
    }
}

impl Dispatch<WlSurface, SurfaceData> for RelayState {
    fn request(
        state: &mut Self,
        _client: &Client,
        surface: &WlSurface,
        request: wl_surface::Request,
        data: &SurfaceData,
        _dh: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_surface::Request::Attach { buffer, x, y } => {
                let mut contents = data.contents.lock().unwrap();
                if let Some(buffer) = buffer {
                    let b: &BufferData = server_data(&buffer);
                    *contents = Some(SurfaceContents {
                        client_mem: b.client_mem.clone(),
                        host_mem: b.host_mem.clone(),
                    });
                    data.host.attach(Some(&b.host), x, y);
                } else {
                    *contents = None;
                    data.host.attach(None, x, y);
                }
            }
            wl_surface::Request::Commit => {
                /* Publish the guest's pixels before the host can latch the
                 * buffer: a full blit of the attached span. */
                if let Some(c) = &*data.contents.lock().unwrap() {
                    c.client_mem.copy_to(&c.host_mem);
                }
                data.host.commit();
            }
            wl_surface::Request::Damage {
                x,
                y,
                width,
                height,
            } => {
                data.host.damage(x, y, width, height);
            }
            wl_surface::Request::Frame { callback } => {
                let server_cb = data_init.init(callback, ());
                data.host.frame(&state.qh, server_cb);
            }
            wl_surface::Request::SetOpaqueRegion { region } => {
                data.host.set_opaque_region(region.as_ref().map(host_region));
            }
            wl_surface::Request::SetInputRegion { region } => {
                data.host.set_input_region(region.as_ref().map(host_region));
            }
            wl_surface::Request::SetBufferScale { scale } => {
                data.host.set_buffer_scale(scale);
            }
            wl_surface::Request::SetBufferTransform { .. } => {
                surface.post_error(
                    wl_surface::Error::InvalidTransform,
                    "buffer transforms are not supported",
                );
            }
            wl_surface::Request::Destroy => {
                data.host.destroy();
            }
            other => warn!("Unhandled wl_surface request: {:?}", other),
        }
    }
}

impl Dispatch<WlRegion, cp::wl_region::WlRegion> for RelayState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _region: &WlRegion,
        request: wl_region::Request,
        data: &cp::wl_region::WlRegion,
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_region::Request::Add {
                x,
                y,
                width,
                height,
            } => data.add(x, y, width, height),
            wl_region::Request::Subtract {
                x,
                y,
                width,
                height,
            } => data.subtract(x, y, width, height),
            wl_region::Request::Destroy => data.destroy(),
            other => warn!("Unhandled wl_region request: {:?}", other),
        }
    }
}

impl Dispatch<WlSubcompositor, PeerCell<cp::wl_subcompositor::WlSubcompositor>> for RelayState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _subcompositor: &WlSubcompositor,
        request: wl_subcompositor::Request,
        data: &PeerCell<cp::wl_subcompositor::WlSubcompositor>,
        _dh: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_subcompositor::Request::GetSubsurface {
                id,
                surface,
                parent,
            } => {
                let host = data.get().get_subsurface(
                    host_surface(&surface),
                    host_surface(&parent),
                    &state.qh,
                    (),
                );
                data_init.init(id, host);
            }
            wl_subcompositor::Request::Destroy => data.get().destroy(),
            other => warn!("Unhandled wl_subcompositor request: {:?}", other),
        }
    }
}

impl Dispatch<WlSubsurface, cp::wl_subsurface::WlSubsurface> for RelayState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _subsurface: &WlSubsurface,
        request: wl_subsurface::Request,
        data: &cp::wl_subsurface::WlSubsurface,
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_subsurface::Request::SetPosition { x, y } => data.set_position(x, y),
            wl_subsurface::Request::PlaceAbove { sibling } => {
                data.place_above(host_surface(&sibling))
            }
            wl_subsurface::Request::PlaceBelow { sibling } => {
                data.place_below(host_surface(&sibling))
            }
            wl_subsurface::Request::SetSync => data.set_sync(),
            wl_subsurface::Request::SetDesync => data.set_desync(),
            wl_subsurface::Request::Destroy => data.destroy(),
            other => warn!("Unhandled wl_subsurface request: {:?}", other),
        }
    }
}

/* Guest-side callbacks only ever receive the terminal `done`. */
impl Dispatch<WlCallback, ()> for RelayState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _callback: &WlCallback,
        _request: <WlCallback as Resource>::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        unreachable!();
    }
}

/* Host-side events. */

impl wayland_client::Dispatch<cp::wl_compositor::WlCompositor, WlCompositor> for RelayState {
    fn event(
        _: &mut Self,
        _: &cp::wl_compositor::WlCompositor,
        event: cp::wl_compositor::Event,
        _: &WlCompositor,
        _: &wayland_client::Connection,
        _: &wayland_client::QueueHandle<Self>,
    ) {
        warn!("Unhandled wl_compositor event: {:?}", event);
    }
}

impl wayland_client::Dispatch<cp::wl_subcompositor::WlSubcompositor, WlSubcompositor>
    for RelayState
{
    fn event(
        _: &mut Self,
        _: &cp::wl_subcompositor::WlSubcompositor,
        event: cp::wl_subcompositor::Event,
        _: &WlSubcompositor,
        _: &wayland_client::Connection,
        _: &wayland_client::QueueHandle<Self>,
    ) {
        warn!("Unhandled wl_subcompositor event: {:?}", event);
    }
}

impl wayland_client::Dispatch<cp::wl_surface::WlSurface, PeerCell<WlSurface>> for RelayState {
    fn event(
        _: &mut Self,
        _: &cp::wl_surface::WlSurface,
        event: cp::wl_surface::Event,
        data: &PeerCell<WlSurface>,
        _: &wayland_client::Connection,
        _: &wayland_client::QueueHandle<Self>,
    ) {
        match event {
            cp::wl_surface::Event::Enter { output } => {
                let server_output: &WlOutput = host_data(&output);
                data.get().enter(server_output);
            }
            cp::wl_surface::Event::Leave { output } => {
                let server_output: &WlOutput = host_data(&output);
                data.get().leave(server_output);
            }
            other => warn!("Unhandled wl_surface event: {:?}", other),
        }
    }
}

impl wayland_client::Dispatch<cp::wl_region::WlRegion, ()> for RelayState {
    fn event(
        _: &mut Self,
        _: &cp::wl_region::WlRegion,
        event: cp::wl_region::Event,
        _: &(),
        _: &wayland_client::Connection,
        _: &wayland_client::QueueHandle<Self>,
    ) {
        warn!("Unhandled wl_region event: {:?}", event);
    }
}

impl wayland_client::Dispatch<cp::wl_subsurface::WlSubsurface, ()> for RelayState {
    fn event(
        _: &mut Self,
        _: &cp::wl_subsurface::WlSubsurface,
        event: cp::wl_subsurface::Event,
        _: &(),
        _: &wayland_client::Connection,
        _: &wayland_client::QueueHandle<Self>,
    ) {
        warn!("Unhandled wl_subsurface event: {:?}", event);
    }
}

/* A host frame callback fires once; forwarding `done` is a destructor
 * event on the server side, so the codec deletes both halves. */
impl wayland_client::Dispatch<cp::wl_callback::WlCallback, WlCallback> for RelayState {
    fn event(
        _: &mut Self,
        _: &cp::wl_callback::WlCallback,
        event: cp::wl_callback::Event,
        data: &WlCallback,
        _: &wayland_client::Connection,
        _: &wayland_client::QueueHandle<Self>,
    ) {
        match event {
            cp::wl_callback::Event::Done { callback_data } => data.done(callback_data),
            other => warn!("Unhandled wl_callback event: {:?}", other),
        }
    }
}
