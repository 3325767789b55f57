/* SPDX-License-Identifier: GPL-3.0-or-later */
/*! Output pairing: wl_output and zxdg_output_v1 events pass straight
 * through; the host output's server peer is also what surface enter/leave
 * and fullscreen requests translate against. */
use crate::session::RelayState;
use crate::util::{convert_wenum, server_data, PeerCell};
use log::warn;
use wayland_client::protocol as cp;
use wayland_protocols::xdg::xdg_output::zv1::client as xo;
use wayland_protocols::xdg::xdg_output::zv1::server::{
    zxdg_output_manager_v1::{self, ZxdgOutputManagerV1},
    zxdg_output_v1::{self, ZxdgOutputV1},
};
use wayland_server::protocol::wl_output::{self, WlOutput};
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle};

/** Host peer of a server-side output. */
pub fn host_output(output: &WlOutput) -> &cp::wl_output::WlOutput {
    server_data::<PeerCell<cp::wl_output::WlOutput>, _>(output).get()
}

impl Dispatch<WlOutput, PeerCell<cp::wl_output::WlOutput>> for RelayState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _output: &WlOutput,
        request: wl_output::Request,
        _data: &PeerCell<cp::wl_output::WlOutput>,
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        /* wl_output has no requests before v3. */
        warn!("Unhandled wl_output request: {:?}", request);
    }
}

impl Dispatch<ZxdgOutputManagerV1, PeerCell<xo::zxdg_output_manager_v1::ZxdgOutputManagerV1>>
    for RelayState
{
    fn request(
        state: &mut Self,
        _client: &Client,
        _manager: &ZxdgOutputManagerV1,
        request: zxdg_output_manager_v1::Request,
        data: &PeerCell<xo::zxdg_output_manager_v1::ZxdgOutputManagerV1>,
        _dh: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            zxdg_output_manager_v1::Request::GetXdgOutput { id, output } => {
                let peer: PeerCell<ZxdgOutputV1> = PeerCell::default();
                let host = data
                    .get()
                    .get_xdg_output(host_output(&output), &state.qh, peer.clone());
                let server = data_init.init(id, host);
                peer.link(server);
            }
            zxdg_output_manager_v1::Request::Destroy => data.get().destroy(),
            other => warn!("Unhandled zxdg_output_manager_v1 request: {:?}", other),
        }
    }
}

impl Dispatch<ZxdgOutputV1, xo::zxdg_output_v1::ZxdgOutputV1> for RelayState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _output: &ZxdgOutputV1,
        request: zxdg_output_v1::Request,
        data: &xo::zxdg_output_v1::ZxdgOutputV1,
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            zxdg_output_v1::Request::Destroy => data.destroy(),
            other => warn!("Unhandled zxdg_output_v1 request: {:?}", other),
        }
    }
}

/* Host-side events. */

impl wayland_client::Dispatch<cp::wl_output::WlOutput, WlOutput> for RelayState {
    fn event(
        _: &mut Self,
        _: &cp::wl_output::WlOutput,
        event: cp::wl_output::Event,
        data: &WlOutput,
        _: &wayland_client::Connection,
        _: &wayland_client::QueueHandle<Self>,
    ) {
        match event {
            cp::wl_output::Event::Geometry {
                x,
                y,
                physical_width,
                physical_height,
                subpixel,
                make,
                model,
                transform,
            } => data.geometry(
                x,
                y,
                physical_width,
                physical_height,
                convert_wenum(subpixel),
                make,
                model,
                convert_wenum(transform),
            ),
            cp::wl_output::Event::Mode {
                flags,
                width,
                height,
                refresh,
            } => data.mode(convert_wenum(flags), width, height, refresh),
            cp::wl_output::Event::Scale { factor } => data.scale(factor),
            cp::wl_output::Event::Done => data.done(),
            other => warn!("Unhandled wl_output event: {:?}", other),
        }
    }
}

impl
    wayland_client::Dispatch<
        xo::zxdg_output_manager_v1::ZxdgOutputManagerV1,
        ZxdgOutputManagerV1,
    > for RelayState
{
    fn event(
        _: &mut Self,
        _: &xo::zxdg_output_manager_v1::ZxdgOutputManagerV1,
        event: xo::zxdg_output_manager_v1::Event,
        _: &ZxdgOutputManagerV1,
        _: &wayland_client::Connection,
        _: &wayland_client::QueueHandle<Self>,
    ) {
        warn!("Unhandled zxdg_output_manager_v1 event: {:?}", event);
    }
}

impl wayland_client::Dispatch<xo::zxdg_output_v1::ZxdgOutputV1, PeerCell<ZxdgOutputV1>>
    for RelayState
{
    fn event(
        _: &mut Self,
        _: &xo::zxdg_output_v1::ZxdgOutputV1,
        event: xo::zxdg_output_v1::Event,
        data: &PeerCell<ZxdgOutputV1>,
        _: &wayland_client::Connection,
        _: &wayland_client::QueueHandle<Self>,
    ) {
        match event {
            xo::zxdg_output_v1::Event::LogicalPosition { x, y } => {
                data.get().logical_position(x, y)
            }
            xo::zxdg_output_v1::Event::LogicalSize { width, height } => {
                data.get().logical_size(width, height)
            }
            xo::zxdg_output_v1::Event::Name { name } => data.get().name(name),
            xo::zxdg_output_v1::Event::Description { description } => {
                data.get().description(description)
            }
            xo::zxdg_output_v1::Event::Done => data.get().done(),
            other => warn!("Unhandled zxdg_output_v1 event: {:?}", other),
        }
    }
}
