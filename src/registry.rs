/* SPDX-License-Identifier: GPL-3.0-or-later */
/*! Catalog of globals offered to the guest, and the binders that establish
 * the initial pair for each of them.
 *
 * Advertisement, name validation, version ceilings and interface matching
 * are enforced by the codec against exactly the globals created here; a
 * rejected bind never reaches a binder and never touches the host. */
use crate::session::RelayState;
use crate::tag;
use crate::util::PeerCell;
use log::error;
use wayland_client::Proxy;
use wayland_protocols::xdg::shell::client as xs_client;
use wayland_protocols::xdg::shell::server::xdg_wm_base::XdgWmBase;
use wayland_protocols::xdg::xdg_output::zv1::client as xo_client;
use wayland_protocols::xdg::xdg_output::zv1::server::zxdg_output_manager_v1::ZxdgOutputManagerV1;
use wayland_client::backend::protocol::ProtocolError;
use wayland_server::protocol::{
    wl_compositor::WlCompositor, wl_data_device_manager::WlDataDeviceManager, wl_output::WlOutput,
    wl_seat::WlSeat, wl_shm::WlShm, wl_subcompositor::WlSubcompositor,
};
use wayland_server::{Client, DataInit, DisplayHandle, GlobalDispatch, New, Resource};

use wayland_client::protocol as cp;

/** One supported global. */
pub struct GlobalEntry {
    pub interface: &'static str,
    pub version: u32,
}

/** The fixed set of globals offered to guest clients, in advertisement
 * order. Binds outside this table are protocol errors. */
pub const GLOBAL_CATALOG: &[GlobalEntry] = &[
    GlobalEntry { interface: "wl_compositor", version: 3 },
    GlobalEntry { interface: "wl_subcompositor", version: 1 },
    GlobalEntry { interface: "wl_shm", version: 1 },
    GlobalEntry { interface: "xdg_wm_base", version: 1 },
    GlobalEntry { interface: "wl_seat", version: 5 },
    GlobalEntry { interface: "wl_output", version: 2 },
    GlobalEntry { interface: "wl_data_device_manager", version: 3 },
    GlobalEntry { interface: "zxdg_output_manager_v1", version: 3 },
];

/** Create every catalog global on the guest display, in catalog order. */
pub fn create_catalog(handle: &DisplayHandle) {
    for entry in GLOBAL_CATALOG {
        let v = entry.version;
        match entry.interface {
            "wl_compositor" => {
                handle.create_global::<RelayState, WlCompositor, ()>(v, ());
            }
            "wl_subcompositor" => {
                handle.create_global::<RelayState, WlSubcompositor, ()>(v, ());
            }
            "wl_shm" => {
                handle.create_global::<RelayState, WlShm, ()>(v, ());
            }
            "xdg_wm_base" => {
                handle.create_global::<RelayState, XdgWmBase, ()>(v, ());
            }
            "wl_seat" => {
                handle.create_global::<RelayState, WlSeat, ()>(v, ());
            }
            "wl_output" => {
                handle.create_global::<RelayState, WlOutput, ()>(v, ());
            }
            "wl_data_device_manager" => {
                handle.create_global::<RelayState, WlDataDeviceManager, ()>(v, ());
            }
            "zxdg_output_manager_v1" => {
                handle.create_global::<RelayState, ZxdgOutputManagerV1, ()>(v, ());
            }
            other => panic!("no binder for catalog entry {}", other),
        }
    }
}

/** Bind the host global matching a fresh guest bind, at exactly the
 * guest's version. The host advertising a lower version (or lacking the
 * global entirely) fails the bind. */
pub fn bind_host<I, U>(state: &RelayState, version: u32, udata: U) -> Result<I, String>
where
    I: Proxy + 'static,
    U: Send + Sync + 'static,
    RelayState: wayland_client::Dispatch<I, U>,
{
    state
        .globals
        .bind::<I, RelayState, U>(&state.qh, version..=version, udata)
        .map_err(|x| {
            tag!(
                "Host compositor does not provide {} v{}: {}",
                I::interface().name,
                version,
                x
            )
        })
}

/** Disconnect a guest whose bind could not be paired on the host side. */
pub fn kill_client(client: &Client, handle: &DisplayHandle, message: &str) {
    client.kill(
        handle,
        ProtocolError {
            code: 0,
            object_id: 0,
            object_interface: String::new(),
            message: message.to_owned(),
        },
    );
}

/* A global binder: initialize the server object with an (initially empty)
 * host-peer cell, bind the matching host global at the negotiated version,
 * and link the two. The host proxy carries the server object so events can
 * be forwarded back without further lookups. */
macro_rules! relay_global {
    ($srv:ty, $cli:ty) => {
        impl GlobalDispatch<$srv, ()> for RelayState {
            fn bind(
                state: &mut Self,
                handle: &DisplayHandle,
                client: &Client,
                resource: New<$srv>,
                _global_data: &(),
                data_init: &mut DataInit<'_, Self>,
            ) {
                let host: PeerCell<$cli> = PeerCell::default();
                let server = data_init.init(resource, host.clone());
                match bind_host::<$cli, $srv>(state, server.version(), server.clone()) {
                    Ok(proxy) => host.link(proxy),
                    Err(err) => {
                        error!("{}", err);
                        kill_client(client, handle, &err);
                    }
                }
            }
        }
    };
}

relay_global!(WlCompositor, cp::wl_compositor::WlCompositor);
relay_global!(WlSubcompositor, cp::wl_subcompositor::WlSubcompositor);
relay_global!(WlShm, cp::wl_shm::WlShm);
relay_global!(XdgWmBase, xs_client::xdg_wm_base::XdgWmBase);
relay_global!(WlSeat, cp::wl_seat::WlSeat);
relay_global!(WlOutput, cp::wl_output::WlOutput);
relay_global!(
    ZxdgOutputManagerV1,
    xo_client::zxdg_output_manager_v1::ZxdgOutputManagerV1
);
/* wl_data_device_manager is a stub with no host peer; its binder lives in
 * data_device.rs. */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_shape() {
        let expected: &[(&str, u32)] = &[
            ("wl_compositor", 3),
            ("wl_subcompositor", 1),
            ("wl_shm", 1),
            ("xdg_wm_base", 1),
            ("wl_seat", 5),
            ("wl_output", 2),
            ("wl_data_device_manager", 3),
            ("zxdg_output_manager_v1", 3),
        ];
        assert_eq!(GLOBAL_CATALOG.len(), expected.len());
        for (entry, (name, version)) in GLOBAL_CATALOG.iter().zip(expected) {
            assert_eq!(entry.interface, *name);
            assert_eq!(entry.version, *version);
        }
    }

    #[test]
    fn catalog_names_match_codec() {
        let codec_names = [
            WlCompositor::interface().name,
            WlSubcompositor::interface().name,
            WlShm::interface().name,
            XdgWmBase::interface().name,
            WlSeat::interface().name,
            WlOutput::interface().name,
            WlDataDeviceManager::interface().name,
            ZxdgOutputManagerV1::interface().name,
        ];
        for (entry, name) in GLOBAL_CATALOG.iter().zip(codec_names) {
            assert_eq!(entry.interface, name);
        }
    }
}
