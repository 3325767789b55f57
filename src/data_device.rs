/* SPDX-License-Identifier: GPL-3.0-or-later */
/*! Data device stub: the manager global is advertised so capability probes
 * succeed, but no host pairing exists. Selections and drags are accepted
 * and dropped; source creation is refused outright. */
use crate::session::RelayState;
use log::{debug, warn};
use wayland_server::protocol::{
    wl_data_device::{self, WlDataDevice},
    wl_data_device_manager::{self, WlDataDeviceManager},
};
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource};

impl GlobalDispatch<WlDataDeviceManager, ()> for RelayState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<WlDataDeviceManager>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        data_init.init(resource, ());
    }
}

impl Dispatch<WlDataDeviceManager, ()> for RelayState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        manager: &WlDataDeviceManager,
        request: wl_data_device_manager::Request,
        _data: &(),
        _dh: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_data_device_manager::Request::CreateDataSource { .. } => {
                manager.post_error(0u32, "data sources are not supported");
            }
            wl_data_device_manager::Request::GetDataDevice { id, seat: _ } => {
                data_init.init(id, ());
            }
            other => warn!("Unhandled wl_data_device_manager request: {:?}", other),
        }
    }
}

impl Dispatch<WlDataDevice, ()> for RelayState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _device: &WlDataDevice,
        request: wl_data_device::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_data_device::Request::SetSelection { .. } => {
                debug!("Dropping set_selection on inert data device");
            }
            wl_data_device::Request::StartDrag { .. } => {
                debug!("Dropping start_drag on inert data device");
            }
            wl_data_device::Request::Release => (),
            other => warn!("Unhandled wl_data_device request: {:?}", other),
        }
    }
}
