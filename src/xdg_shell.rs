/* SPDX-License-Identifier: GPL-3.0-or-later */
/*! xdg-shell pairing: wm_base, positioners, xdg_surfaces, toplevels and
 * popups. Toplevel titles get the configured tag prepended before they
 * reach the host. */
use crate::compositor::host_surface;
use crate::seat::host_seat;
use crate::session::RelayState;
use crate::util::{convert_wenum, server_data, PeerCell};
use log::warn;
use wayland_protocols::xdg::shell::client as xs;
use wayland_protocols::xdg::shell::server::{
    xdg_popup::{self, XdgPopup},
    xdg_positioner::{self, XdgPositioner},
    xdg_surface::{self, XdgSurface},
    xdg_toplevel::{self, XdgToplevel},
    xdg_wm_base::{self, XdgWmBase},
};
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle};

fn host_positioner(positioner: &XdgPositioner) -> &xs::xdg_positioner::XdgPositioner {
    server_data::<xs::xdg_positioner::XdgPositioner, _>(positioner)
}

fn host_xdg_surface(surface: &XdgSurface) -> &xs::xdg_surface::XdgSurface {
    server_data::<xs::xdg_surface::XdgSurface, _>(surface)
}

impl Dispatch<XdgWmBase, PeerCell<xs::xdg_wm_base::XdgWmBase>> for RelayState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _wm_base: &XdgWmBase,
        request: xdg_wm_base::Request,
        data: &PeerCell<xs::xdg_wm_base::XdgWmBase>,
        _dh: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            xdg_wm_base::Request::CreatePositioner { id } => {
                let host = data.get().create_positioner(&state.qh, ());
                data_init.init(id, host);
            }
            xdg_wm_base::Request::GetXdgSurface { id, surface } => {
                let peer: PeerCell<XdgSurface> = PeerCell::default();
                let host =
                    data.get()
                        .get_xdg_surface(host_surface(&surface), &state.qh, peer.clone());
                let server = data_init.init(id, host);
                peer.link(server);
            }
            xdg_wm_base::Request::Pong { serial } => data.get().pong(serial),
            xdg_wm_base::Request::Destroy => data.get().destroy(),
            other => warn!("Unhandled xdg_wm_base request: {:?}", other),
        }
    }
}

impl Dispatch<XdgPositioner, xs::xdg_positioner::XdgPositioner> for RelayState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _positioner: &XdgPositioner,
        request: xdg_positioner::Request,
        data: &xs::xdg_positioner::XdgPositioner,
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            xdg_positioner::Request::SetSize { width, height } => data.set_size(width, height),
            xdg_positioner::Request::SetAnchorRect {
                x,
                y,
                width,
                height,
            } => data.set_anchor_rect(x, y, width, height),
            xdg_positioner::Request::SetAnchor { anchor } => {
                data.set_anchor(convert_wenum(anchor))
            }
            xdg_positioner::Request::SetGravity { gravity } => {
                data.set_gravity(convert_wenum(gravity))
            }
            xdg_positioner::Request::SetConstraintAdjustment {
                constraint_adjustment,
            } => data.set_constraint_adjustment(convert_wenum(constraint_adjustment)),
            xdg_positioner::Request::SetOffset { x, y } => data.set_offset(x, y),
            xdg_positioner::Request::Destroy => data.destroy(),
            other => warn!("Unhandled xdg_positioner request: {:?}", other),
        }
    }
}

impl Dispatch<XdgSurface, xs::xdg_surface::XdgSurface> for RelayState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _surface: &XdgSurface,
        request: xdg_surface::Request,
        data: &xs::xdg_surface::XdgSurface,
        _dh: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            xdg_surface::Request::GetToplevel { id } => {
                let peer: PeerCell<XdgToplevel> = PeerCell::default();
                let host = data.get_toplevel(&state.qh, peer.clone());
                let server = data_init.init(id, host);
                peer.link(server);
            }
            xdg_surface::Request::GetPopup {
                id,
                parent,
                positioner,
            } => {
                let peer: PeerCell<XdgPopup> = PeerCell::default();
                let host = data.get_popup(
                    parent.as_ref().map(host_xdg_surface),
                    host_positioner(&positioner),
                    &state.qh,
                    peer.clone(),
                );
                let server = data_init.init(id, host);
                peer.link(server);
            }
            xdg_surface::Request::SetWindowGeometry {
                x,
                y,
                width,
                height,
            } => data.set_window_geometry(x, y, width, height),
            xdg_surface::Request::AckConfigure { serial } => data.ack_configure(serial),
            xdg_surface::Request::Destroy => data.destroy(),
            other => warn!("Unhandled xdg_surface request: {:?}", other),
        }
    }
}

impl Dispatch<XdgToplevel, xs::xdg_toplevel::XdgToplevel> for RelayState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _toplevel: &XdgToplevel,
        request: xdg_toplevel::Request,
        data: &xs::xdg_toplevel::XdgToplevel,
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            xdg_toplevel::Request::SetTitle { title } => {
                data.set_title(format!("{}{}", state.config.tag, title));
            }
            xdg_toplevel::Request::SetAppId { app_id } => data.set_app_id(app_id),
            xdg_toplevel::Request::SetParent { parent } => {
                data.set_parent(
                    parent
                        .as_ref()
                        .map(|p| server_data::<xs::xdg_toplevel::XdgToplevel, _>(p)),
                );
            }
            xdg_toplevel::Request::SetMaxSize { width, height } => {
                data.set_max_size(width, height)
            }
            xdg_toplevel::Request::SetMinSize { width, height } => {
                data.set_min_size(width, height)
            }
            xdg_toplevel::Request::SetMaximized => data.set_maximized(),
            xdg_toplevel::Request::UnsetMaximized => data.unset_maximized(),
            xdg_toplevel::Request::SetFullscreen { output } => {
                data.set_fullscreen(output.as_ref().map(crate::output::host_output));
            }
            xdg_toplevel::Request::UnsetFullscreen => data.unset_fullscreen(),
            xdg_toplevel::Request::SetMinimized => data.set_minimized(),
            xdg_toplevel::Request::Move { seat, serial } => data._move(host_seat(&seat), serial),
            xdg_toplevel::Request::Resize {
                seat,
                serial,
                edges,
            } => data.resize(host_seat(&seat), serial, convert_wenum(edges)),
            xdg_toplevel::Request::ShowWindowMenu { seat, serial, x, y } => {
                data.show_window_menu(host_seat(&seat), serial, x, y)
            }
            xdg_toplevel::Request::Destroy => data.destroy(),
            other => warn!("Unhandled xdg_toplevel request: {:?}", other),
        }
    }
}

impl Dispatch<XdgPopup, xs::xdg_popup::XdgPopup> for RelayState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _popup: &XdgPopup,
        request: xdg_popup::Request,
        data: &xs::xdg_popup::XdgPopup,
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            xdg_popup::Request::Grab { seat, serial } => data.grab(host_seat(&seat), serial),
            xdg_popup::Request::Destroy => data.destroy(),
            other => warn!("Unhandled xdg_popup request: {:?}", other),
        }
    }
}

/* Host-side events. */

impl wayland_client::Dispatch<xs::xdg_wm_base::XdgWmBase, XdgWmBase> for RelayState {
    fn event(
        _: &mut Self,
        _: &xs::xdg_wm_base::XdgWmBase,
        event: xs::xdg_wm_base::Event,
        data: &XdgWmBase,
        _: &wayland_client::Connection,
        _: &wayland_client::QueueHandle<Self>,
    ) {
        match event {
            xs::xdg_wm_base::Event::Ping { serial } => data.ping(serial),
            other => warn!("Unhandled xdg_wm_base event: {:?}", other),
        }
    }
}

impl wayland_client::Dispatch<xs::xdg_positioner::XdgPositioner, ()> for RelayState {
    fn event(
        _: &mut Self,
        _: &xs::xdg_positioner::XdgPositioner,
        event: xs::xdg_positioner::Event,
        _: &(),
        _: &wayland_client::Connection,
        _: &wayland_client::QueueHandle<Self>,
    ) {
        warn!("Unhandled xdg_positioner event: {:?}", event);
    }
}

impl wayland_client::Dispatch<xs::xdg_surface::XdgSurface, PeerCell<XdgSurface>> for RelayState {
    fn event(
        _: &mut Self,
        _: &xs::xdg_surface::XdgSurface,
        event: xs::xdg_surface::Event,
        data: &PeerCell<XdgSurface>,
        _: &wayland_client::Connection,
        _: &wayland_client::QueueHandle<Self>,
    ) {
        match event {
            xs::xdg_surface::Event::Configure { serial } => data.get().configure(serial),
            other => warn!("Unhandled xdg_surface event: {:?}", other),
        }
    }
}

impl wayland_client::Dispatch<xs::xdg_toplevel::XdgToplevel, PeerCell<XdgToplevel>>
    for RelayState
{
    fn event(
        _: &mut Self,
        _: &xs::xdg_toplevel::XdgToplevel,
        event: xs::xdg_toplevel::Event,
        data: &PeerCell<XdgToplevel>,
        _: &wayland_client::Connection,
        _: &wayland_client::QueueHandle<Self>,
    ) {
        match event {
            xs::xdg_toplevel::Event::Configure {
                width,
                height,
                states,
            } => data.get().configure(width, height, states),
            xs::xdg_toplevel::Event::Close => data.get().close(),
            other => warn!("Unhandled xdg_toplevel event: {:?}", other),
        }
    }
}

impl wayland_client::Dispatch<xs::xdg_popup::XdgPopup, PeerCell<XdgPopup>> for RelayState {
    fn event(
        _: &mut Self,
        _: &xs::xdg_popup::XdgPopup,
        event: xs::xdg_popup::Event,
        data: &PeerCell<XdgPopup>,
        _: &wayland_client::Connection,
        _: &wayland_client::QueueHandle<Self>,
    ) {
        match event {
            xs::xdg_popup::Event::Configure {
                x,
                y,
                width,
                height,
            } => data.get().configure(x, y, width, height),
            xs::xdg_popup::Event::PopupDone => data.get().popup_done(),
            other => warn!("Unhandled xdg_popup event: {:?}", other),
        }
    }
}
