/* SPDX-License-Identifier: GPL-3.0-or-later */
/*! Seat and input device pairing.
 *
 * The relay only offers keyboard and pointer input; host capability
 * announcements are masked accordingly and touch acquisition is refused. */
use crate::compositor::{host_surface, server_surface};
use crate::session::RelayState;
use crate::util::{convert_wenum, server_data, PeerCell};
use log::warn;
use std::os::fd::AsFd;
use wayland_client::protocol as cp;
use wayland_server::protocol::{
    wl_keyboard::{self, WlKeyboard},
    wl_pointer::{self, WlPointer},
    wl_seat::{self, WlSeat},
};
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, Resource, WEnum};

/** Host peer of a server-side seat. */
pub fn host_seat(seat: &WlSeat) -> &cp::wl_seat::WlSeat {
    server_data::<PeerCell<cp::wl_seat::WlSeat>, _>(seat).get()
}

/** Restrict a host capability set to what the relay forwards. */
pub fn mask_capabilities(caps: WEnum<cp::wl_seat::Capability>) -> wl_seat::Capability {
    let raw = match caps {
        WEnum::Value(v) => v.bits(),
        WEnum::Unknown(v) => v,
    };
    let offered = wl_seat::Capability::Pointer | wl_seat::Capability::Keyboard;
    wl_seat::Capability::from_bits_truncate(raw) & offered
}

impl Dispatch<WlSeat, PeerCell<cp::wl_seat::WlSeat>> for RelayState {
    fn request(
        state: &mut Self,
        _client: &Client,
        seat: &WlSeat,
        request: wl_seat::Request,
        data: &PeerCell<cp::wl_seat::WlSeat>,
        _dh: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_seat::Request::GetPointer { id } => {
                let peer: PeerCell<WlPointer> = PeerCell::default();
                let host = data.get().get_pointer(&state.qh, peer.clone());
                let server = data_init.init(id, host);
                peer.link(server);
            }
            wl_seat::Request::GetKeyboard { id } => {
                let peer: PeerCell<WlKeyboard> = PeerCell::default();
                let host = data.get().get_keyboard(&state.qh, peer.clone());
                let server = data_init.init(id, host);
                peer.link(server);
            }
            wl_seat::Request::GetTouch { .. } => {
                seat.post_error(
                    wl_seat::Error::MissingCapability,
                    "touch input is not offered",
                );
            }
            wl_seat::Request::Release => data.get().release(),
            other => warn!("Unhandled wl_seat request: {:?}", other),
        }
    }
}

impl Dispatch<WlPointer, cp::wl_pointer::WlPointer> for RelayState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _pointer: &WlPointer,
        request: wl_pointer::Request,
        data: &cp::wl_pointer::WlPointer,
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_pointer::Request::SetCursor {
                serial,
                surface,
                hotspot_x,
                hotspot_y,
            } => {
                data.set_cursor(
                    serial,
                    surface.as_ref().map(host_surface),
                    hotspot_x,
                    hotspot_y,
                );
            }
            wl_pointer::Request::Release => data.release(),
            other => warn!("Unhandled wl_pointer request: {:?}", other),
        }
    }
}

impl Dispatch<WlKeyboard, cp::wl_keyboard::WlKeyboard> for RelayState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _keyboard: &WlKeyboard,
        request: wl_keyboard::Request,
        data: &cp::wl_keyboard::WlKeyboard,
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_keyboard::Request::Release => data.release(),
            other => warn!("Unhandled wl_keyboard request: {:?}", other),
        }
    }
}

/* Host-side events. */

impl wayland_client::Dispatch<cp::wl_seat::WlSeat, WlSeat> for RelayState {
    fn event(
        _: &mut Self,
        _: &cp::wl_seat::WlSeat,
        event: cp::wl_seat::Event,
        data: &WlSeat,
        _: &wayland_client::Connection,
        _: &wayland_client::QueueHandle<Self>,
    ) {
        match event {
            cp::wl_seat::Event::Capabilities { capabilities } => {
                data.capabilities(mask_capabilities(capabilities));
            }
            cp::wl_seat::Event::Name { name } => data.name(name),
            other => warn!("Unhandled wl_seat event: {:?}", other),
        }
    }
}

impl wayland_client::Dispatch<cp::wl_pointer::WlPointer, PeerCell<WlPointer>> for RelayState {
    fn event(
        _: &mut Self,
        _: &cp::wl_pointer::WlPointer,
        event: cp::wl_pointer::Event,
        data: &PeerCell<WlPointer>,
        _: &wayland_client::Connection,
        _: &wayland_client::QueueHandle<Self>,
    ) {
        match event {
            cp::wl_pointer::Event::Enter {
                serial,
                surface,
                surface_x,
                surface_y,
            } => {
                data.get()
                    .enter(serial, server_surface(&surface), surface_x, surface_y);
            }
            cp::wl_pointer::Event::Leave { serial, surface } => {
                data.get().leave(serial, server_surface(&surface));
            }
            cp::wl_pointer::Event::Motion {
                time,
                surface_x,
                surface_y,
            } => data.get().motion(time, surface_x, surface_y),
            cp::wl_pointer::Event::Button {
                serial,
                time,
                button,
                state,
            } => data.get().button(serial, time, button, convert_wenum(state)),
            cp::wl_pointer::Event::Axis { time, axis, value } => {
                data.get().axis(time, convert_wenum(axis), value)
            }
            cp::wl_pointer::Event::Frame => data.get().frame(),
            cp::wl_pointer::Event::AxisSource { axis_source } => {
                data.get().axis_source(convert_wenum(axis_source))
            }
            cp::wl_pointer::Event::AxisStop { time, axis } => {
                data.get().axis_stop(time, convert_wenum(axis))
            }
            cp::wl_pointer::Event::AxisDiscrete { axis, discrete } => {
                data.get().axis_discrete(convert_wenum(axis), discrete)
            }
            other => warn!("Unhandled wl_pointer event: {:?}", other),
        }
    }
}

impl wayland_client::Dispatch<cp::wl_keyboard::WlKeyboard, PeerCell<WlKeyboard>> for RelayState {
    fn event(
        _: &mut Self,
        _: &cp::wl_keyboard::WlKeyboard,
        event: cp::wl_keyboard::Event,
        data: &PeerCell<WlKeyboard>,
        _: &wayland_client::Connection,
        _: &wayland_client::QueueHandle<Self>,
    ) {
        match event {
            cp::wl_keyboard::Event::Keymap { format, fd, size } => {
                /* fd drops (closes) once the forward has written it out. */
                data.get().keymap(convert_wenum(format), fd.as_fd(), size);
            }
            cp::wl_keyboard::Event::Enter {
                serial,
                surface,
                keys,
            } => data.get().enter(serial, server_surface(&surface), keys),
            cp::wl_keyboard::Event::Leave { serial, surface } => {
                data.get().leave(serial, server_surface(&surface))
            }
            cp::wl_keyboard::Event::Key {
                serial,
                time,
                key,
                state,
            } => data.get().key(serial, time, key, convert_wenum(state)),
            cp::wl_keyboard::Event::Modifiers {
                serial,
                mods_depressed,
                mods_latched,
                mods_locked,
                group,
            } => data
                .get()
                .modifiers(serial, mods_depressed, mods_latched, mods_locked, group),
            cp::wl_keyboard::Event::RepeatInfo { rate, delay } => {
                data.get().repeat_info(rate, delay)
            }
            other => warn!("Unhandled wl_keyboard event: {:?}", other),
        }
    }
}
