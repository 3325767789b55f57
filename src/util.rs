/* SPDX-License-Identifier: GPL-3.0-or-later */
/*! Misc utilities shared by the binder modules */
use std::sync::{Arc, OnceLock};
use wayland_client::Proxy;
use wayland_server::{Resource, WEnum};

/** Like `format!`, but prepends file and line number.
 *
 * Example: `tag!("Failed to X: {} {}", arg1, arg2)` */
#[macro_export]
macro_rules! tag {
    ($x:tt) => {
        format!(concat!(std::file!(), ":", std::line!(), ": ", $x))
    };
    ($x:tt, $($arg:tt)+) => {
        format!(concat!(std::file!(), ":", std::line!(), ": ", $x), $($arg)+)
    };
}

/** One half of an object pair, linked after both halves exist.
 *
 * Pairing is cyclic (either proxy must yield its peer), while proxy user
 * data is fixed at creation time; whichever proxy is created first stores
 * its peer in a cell filled by the same operation that creates the second
 * proxy. No handler runs between creation and linking, so a read of an
 * unlinked cell is an engine bug. */
pub struct PeerCell<T>(Arc<OnceLock<T>>);

impl<T> Default for PeerCell<T> {
    fn default() -> Self {
        PeerCell(Arc::new(OnceLock::new()))
    }
}
impl<T> Clone for PeerCell<T> {
    fn clone(&self) -> Self {
        PeerCell(self.0.clone())
    }
}
impl<T> PeerCell<T> {
    pub fn link(&self, peer: T) {
        if self.0.set(peer).is_err() {
            panic!("proxy peer linked twice");
        }
    }
    pub fn get(&self) -> &T {
        self.0.get().expect("proxy peer was never linked")
    }
}

/** Typed user data of a server-side (guest-facing) proxy.
 *
 * Panics on a missing or mismatched slot: every relayed server object is
 * given its user data at creation, so failure here is an engine bug. */
#[track_caller]
pub fn server_data<T: Send + Sync + 'static, R: Resource>(resource: &R) -> &T {
    match resource.data::<T>() {
        Some(d) => d,
        None => panic!("unexpected user data on server object {}", resource.id()),
    }
}

/** Typed user data of a host-side proxy; see `server_data`. */
#[track_caller]
pub fn host_data<T: Send + Sync + 'static, P: Proxy>(proxy: &P) -> &T {
    match proxy.data::<T>() {
        Some(d) => d,
        None => panic!("unexpected user data on host object {}", proxy.id()),
    }
}

/** Re-encode an enum argument received on one connection for sending on
 * the other. The two codec halves use distinct Rust types for the same
 * wire enum, so this round-trips through the raw value. */
pub fn convert_wenum<A, B>(value: WEnum<A>) -> B
where
    A: Into<u32>,
    B: TryFrom<u32>,
{
    let raw: u32 = match value {
        WEnum::Value(v) => v.into(),
        WEnum::Unknown(v) => v,
    };
    match B::try_from(raw) {
        Ok(v) => v,
        Err(_) => panic!("enum value {} has no equivalent on the peer connection", raw),
    }
}
