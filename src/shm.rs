/* SPDX-License-Identifier: GPL-3.0-or-later */
/*! Shared-memory plumbing: double-mapped pools, host-visible allocation,
 * and the wl_shm/wl_shm_pool/wl_buffer binders.
 *
 * Every guest pool is doubled: the guest's file descriptor is mapped into
 * the relay, a second file of the same size is taken from the host-visible
 * allocator, mapped, and turned into the host-side pool. Buffers capture
 * spans of both mappings; commits blit guest bytes into host bytes. */
use crate::session::RelayState;
use crate::tag;
use crate::util::PeerCell;
use log::{debug, error, warn};
use nix::errno::Errno;
use nix::libc;
use nix::sys::memfd;
use nix::unistd;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::sync::{Arc, Mutex};
use wayland_client::protocol as cp;
use wayland_server::protocol::{
    wl_buffer::{self, WlBuffer},
    wl_shm::{self, WlShm},
    wl_shm_pool::{self, WlShmPool},
};
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, Resource, WEnum};

/** A read/write shared mapping of a pool file.
 *
 * Held behind `Arc`: buffer spans keep their mapping alive after the pool
 * has moved on to a fresh one (resize) or been destroyed. */
pub struct ShmMapping {
    data: *mut u8,
    size: usize,
}

// SAFETY: the mapping is plain shared memory with no thread affinity; all
// access goes through raw-pointer reads/copies that tolerate concurrent
// guest writes.
unsafe impl Send for ShmMapping {}
unsafe impl Sync for ShmMapping {}

impl ShmMapping {
    /** Map `size` bytes of `fd` read/write and shared. */
    pub fn new(fd: BorrowedFd<'_>, size: usize) -> Result<ShmMapping, String> {
        if size == 0 || size > isize::MAX as usize {
            return Err(tag!("Cannot map pool of size {}", size));
        }
        let addr = unsafe {
            /* SAFETY: creates a fresh mapping; no existing references involved */
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(tag!("Failed to mmap size {}: {}", size, Errno::last()));
        }
        assert!(!addr.is_null());
        Ok(ShmMapping {
            data: addr as *mut u8,
            size,
        })
    }
    pub fn len(&self) -> usize {
        self.size
    }
    /** View the mapping. The guest may write its half of a pool at any
     * time, so contents are only stable between commit and the next guest
     * write. */
    pub fn get(&self) -> &[u8] {
        unsafe {
            /* SAFETY: data/size describe the live mapping */
            std::slice::from_raw_parts(self.data, self.size)
        }
    }
    pub fn get_mut(&mut self) -> &mut [u8] {
        unsafe {
            /* SAFETY: as for get(); &mut self prevents aliased slices */
            std::slice::from_raw_parts_mut(self.data, self.size)
        }
    }
}

impl Drop for ShmMapping {
    fn drop(&mut self) {
        unsafe {
            /* SAFETY: data/size exactly describe the region mapped in new() */
            let ret = libc::munmap(self.data as *mut libc::c_void, self.size);
            /* munmap should only fail if EINVAL or bad security policy */
            assert!(ret == 0);
        }
    }
}

/** A byte range inside a pool mapping, bounds-checked at construction. */
#[derive(Clone)]
pub struct MapSpan {
    map: Arc<ShmMapping>,
    offset: usize,
    len: usize,
}

impl MapSpan {
    pub fn new(map: &Arc<ShmMapping>, offset: usize, len: usize) -> Option<MapSpan> {
        if offset.checked_add(len)? > map.size {
            return None;
        }
        Some(MapSpan {
            map: map.clone(),
            offset,
            len,
        })
    }
    /** Blit this span into `dst`; both spans must have the same length. */
    pub fn copy_to(&self, dst: &MapSpan) {
        assert!(
            self.len == dst.len,
            "span length mismatch: {} vs {}",
            self.len,
            dst.len
        );
        unsafe {
            /* SAFETY: both spans were bounds-checked against their mappings,
             * and the two mappings are distinct regions. The guest may write
             * the source concurrently; the copy makes no exclusivity
             * assumption about its contents. */
            std::ptr::copy_nonoverlapping(
                self.map.data.add(self.offset),
                dst.map.data.add(dst.offset),
                self.len,
            );
        }
    }
}

/** Source of host-visible pool memory.
 *
 * The default implementation hands out memfds (sufficient when the host
 * compositor shares a kernel with the relay); a virtualization transport
 * substitutes allocations the host side can map. */
pub trait ShmAllocator: Send + Sync {
    fn alloc(&self, size: usize) -> Result<OwnedFd, String>;
}

pub struct MemfdAllocator;

impl ShmAllocator for MemfdAllocator {
    fn alloc(&self, size: usize) -> Result<OwnedFd, String> {
        let fd = memfd::memfd_create(
            c"/wlrelay-pool",
            memfd::MemFdCreateFlag::MFD_CLOEXEC | memfd::MemFdCreateFlag::MFD_ALLOW_SEALING,
        )
        .map_err(|x| tag!("Failed to create memfd: {:?}", x))?;
        unistd::ftruncate(&fd, size as libc::off_t)
            .map_err(|x| tag!("Failed to resize memfd: {:?}", x))?;
        /* Newly created memfds are fully zeroed */
        Ok(fd)
    }
}

/** The double backing of one guest pool. Replaced wholesale on resize;
 * spans captured by existing buffers keep the old mappings alive. */
struct PoolState {
    host_pool: cp::wl_shm_pool::WlShmPool,
    client_fd: OwnedFd,
    client_map: Arc<ShmMapping>,
    host_map: Arc<ShmMapping>,
}

/** Pair state of a guest pool. */
pub struct PoolData {
    host_shm: cp::wl_shm::WlShm,
    inner: Mutex<PoolState>,
}

/** Pair state of a buffer: the host buffer and its two captured spans. */
pub struct BufferData {
    pub host: cp::wl_buffer::WlBuffer,
    pub client_mem: MapSpan,
    pub host_mem: MapSpan,
}

/** Map the guest FD, allocate and map a same-size host file, and create
 * the host pool from it. The host FD is closed on return; the mapping and
 * the wire message each hold their own reference to the file. */
fn create_pool_state(
    state: &RelayState,
    host_shm: &cp::wl_shm::WlShm,
    client_fd: OwnedFd,
    size: usize,
) -> Result<PoolState, String> {
    let client_map = Arc::new(ShmMapping::new(client_fd.as_fd(), size)?);
    let host_fd = state.allocator.alloc(size)?;
    let host_map = Arc::new(ShmMapping::new(host_fd.as_fd(), size)?);
    let host_pool = host_shm.create_pool(host_fd.as_fd(), size as i32, &state.qh, ());
    Ok(PoolState {
        host_pool,
        client_fd,
        client_map,
        host_map,
    })
}

/** Compute and bounds-check the byte range of a buffer inside its pool. */
fn buffer_range(
    offset: i32,
    height: i32,
    stride: i32,
    pool_size: usize,
) -> Result<(usize, usize), String> {
    if offset < 0 || height < 0 || stride < 0 {
        return Err(tag!(
            "Negative buffer geometry: offset {} height {} stride {}",
            offset,
            height,
            stride
        ));
    }
    let len = (height as u64) * (stride as u64);
    let end = (offset as u64).checked_add(len).unwrap();
    if end > pool_size as u64 {
        return Err(tag!(
            "Buffer range [{}, {}) exceeds pool size {}",
            offset,
            end,
            pool_size
        ));
    }
    Ok((offset as usize, len as usize))
}

impl Dispatch<WlShm, PeerCell<cp::wl_shm::WlShm>> for RelayState {
    fn request(
        state: &mut Self,
        _client: &Client,
        shm: &WlShm,
        request: wl_shm::Request,
        data: &PeerCell<cp::wl_shm::WlShm>,
        _dh: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_shm::Request::CreatePool { id, fd, size } => {
                if size <= 0 {
                    shm.post_error(wl_shm::Error::InvalidFd, format!("invalid pool size {}", size));
                    return;
                }
                match create_pool_state(state, data.get(), fd, size as usize) {
                    Ok(ps) => {
                        debug!("Doubled new pool of {} bytes", size);
                        data_init.init(
                            id,
                            PoolData {
                                host_shm: data.get().clone(),
                                inner: Mutex::new(ps),
                            },
                        );
                    }
                    Err(err) => {
                        error!("Failed to set up pool: {}", err);
                        shm.post_error(wl_shm::Error::InvalidFd, "could not back shared memory pool");
                    }
                }
            }
            other => warn!("Unhandled wl_shm request: {:?}", other),
        }
    }
}

impl Dispatch<WlShmPool, PoolData> for RelayState {
    fn request(
        state: &mut Self,
        _client: &Client,
        pool: &WlShmPool,
        request: wl_shm_pool::Request,
        data: &PoolData,
        _dh: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_shm_pool::Request::CreateBuffer {
                id,
                offset,
                width,
                height,
                stride,
                format,
            } => {
                let ps = data.inner.lock().unwrap();
                let (off, len) = match buffer_range(offset, height, stride, ps.client_map.len()) {
                    Ok(r) => r,
                    Err(err) => {
                        pool.post_error(wl_shm::Error::InvalidStride, err);
                        return;
                    }
                };
                /* The format is guest-controlled; reject rather than panic. */
                let host_format = match format {
                    WEnum::Value(f) => cp::wl_shm::Format::try_from(u32::from(f)).ok(),
                    WEnum::Unknown(_) => None,
                };
                let Some(host_format) = host_format else {
                    pool.post_error(
                        wl_shm::Error::InvalidFormat,
                        format!("unsupported buffer format {:?}", format),
                    );
                    return;
                };
                /* Bounds were checked against the pool, so both spans exist. */
                let client_mem = MapSpan::new(&ps.client_map, off, len).unwrap();
                let host_mem = MapSpan::new(&ps.host_map, off, len).unwrap();
                let peer: PeerCell<WlBuffer> = PeerCell::default();
                let host = ps.host_pool.create_buffer(
                    offset,
                    width,
                    height,
                    stride,
                    host_format,
                    &state.qh,
                    peer.clone(),
                );
                let server = data_init.init(
                    id,
                    BufferData {
                        host,
                        client_mem,
                        host_mem,
                    },
                );
                peer.link(server);
            }
            wl_shm_pool::Request::Resize { size } => {
                let mut ps = data.inner.lock().unwrap();
                if size <= 0 || (size as usize) < ps.client_map.len() {
                    pool.post_error(
                        wl_shm::Error::InvalidFd,
                        format!("cannot shrink pool to {}", size),
                    );
                    return;
                }
                /* The guest file grew in place; the host pool cannot grow
                 * (its backing file is ours), so destroy it and allocate a
                 * fresh double. Existing buffers keep their captured spans
                 * of the old mappings. */
                ps.host_pool.destroy();
                let client_fd = ps.client_fd.try_clone().map_err(|x| {
                    tag!("Failed to duplicate pool fd: {}", x)
                });
                let fresh = client_fd.and_then(|fd| {
                    create_pool_state(state, &data.host_shm, fd, size as usize)
                });
                match fresh {
                    Ok(new_state) => {
                        debug!("Pool resized from {} to {} bytes", ps.client_map.len(), size);
                        *ps = new_state;
                    }
                    Err(err) => {
                        error!("Failed to resize pool: {}", err);
                        pool.post_error(wl_shm::Error::InvalidFd, "could not grow shared memory pool");
                    }
                }
            }
            wl_shm_pool::Request::Destroy => {
                /* Dropping PoolState closes the guest FD and releases the
                 * pool's own hold on both mappings. */
                let ps = data.inner.lock().unwrap();
                ps.host_pool.destroy();
            }
            other => warn!("Unhandled wl_shm_pool request: {:?}", other),
        }
    }
}

impl Dispatch<WlBuffer, BufferData> for RelayState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _buffer: &WlBuffer,
        request: wl_buffer::Request,
        data: &BufferData,
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_buffer::Request::Destroy => data.host.destroy(),
            other => warn!("Unhandled wl_buffer request: {:?}", other),
        }
    }
}

/* Host-side events. */

impl wayland_client::Dispatch<cp::wl_shm::WlShm, WlShm> for RelayState {
    fn event(
        _: &mut Self,
        _: &cp::wl_shm::WlShm,
        event: cp::wl_shm::Event,
        data: &WlShm,
        _: &wayland_client::Connection,
        _: &wayland_client::QueueHandle<Self>,
    ) {
        match event {
            cp::wl_shm::Event::Format { format } => {
                /* Hosts may advertise formats minted after this build; the
                 * typed sender cannot express those, so drop them. */
                let raw = match format {
                    WEnum::Value(f) => u32::from(f),
                    WEnum::Unknown(r) => r,
                };
                match wl_shm::Format::try_from(raw) {
                    Ok(f) => data.format(f),
                    Err(_) => debug!("Dropping unknown shm format 0x{:x}", raw),
                }
            }
            other => warn!("Unhandled wl_shm event: {:?}", other),
        }
    }
}

impl wayland_client::Dispatch<cp::wl_shm_pool::WlShmPool, ()> for RelayState {
    fn event(
        _: &mut Self,
        _: &cp::wl_shm_pool::WlShmPool,
        event: cp::wl_shm_pool::Event,
        _: &(),
        _: &wayland_client::Connection,
        _: &wayland_client::QueueHandle<Self>,
    ) {
        warn!("Unhandled wl_shm_pool event: {:?}", event);
    }
}

impl wayland_client::Dispatch<cp::wl_buffer::WlBuffer, PeerCell<WlBuffer>> for RelayState {
    fn event(
        _: &mut Self,
        _: &cp::wl_buffer::WlBuffer,
        event: cp::wl_buffer::Event,
        data: &PeerCell<WlBuffer>,
        _: &wayland_client::Connection,
        _: &wayland_client::QueueHandle<Self>,
    ) {
        match event {
            cp::wl_buffer::Event::Release => data.get().release(),
            other => warn!("Unhandled wl_buffer event: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_mapping(size: usize) -> (OwnedFd, Arc<ShmMapping>) {
        let fd = MemfdAllocator.alloc(size).unwrap();
        let map = Arc::new(ShmMapping::new(fd.as_fd(), size).unwrap());
        (fd, map)
    }

    #[test]
    fn span_bounds() {
        let (_fd, map) = test_mapping(4096);
        assert!(MapSpan::new(&map, 0, 4096).is_some());
        assert!(MapSpan::new(&map, 4096, 0).is_some());
        assert!(MapSpan::new(&map, 0, 4097).is_none());
        assert!(MapSpan::new(&map, 4000, 128).is_none());
        assert!(MapSpan::new(&map, usize::MAX, 2).is_none());
    }

    #[test]
    fn span_blit() {
        let (fd_a, map_a) = test_mapping(4096);
        let (_fd_b, map_b) = test_mapping(4096);
        /* Write through a second mapping of the same file, as the guest
         * would through its own. */
        let mut writer = ShmMapping::new(fd_a.as_fd(), 4096).unwrap();
        writer.get_mut()[128..132].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef]);

        let src = MapSpan::new(&map_a, 128, 256).unwrap();
        let dst = MapSpan::new(&map_b, 128, 256).unwrap();
        src.copy_to(&dst);
        assert_eq!(&map_b.get()[128..132], &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(&map_b.get()[132..384], &[0u8; 252][..]);
        assert_eq!(&map_b.get()[0..128], &[0u8; 128][..]);
    }

    #[test]
    fn buffer_ranges() {
        assert_eq!(buffer_range(0, 32, 128, 4096).unwrap(), (0, 4096));
        assert_eq!(buffer_range(512, 1, 16, 4096).unwrap(), (512, 16));
        assert!(buffer_range(1, 32, 128, 4096).is_err());
        assert!(buffer_range(-4, 1, 16, 4096).is_err());
        assert!(buffer_range(0, -1, 16, 4096).is_err());
        assert!(buffer_range(0, i32::MAX, i32::MAX, 4096).is_err());
    }

    #[test]
    fn allocator_size() {
        let fd = MemfdAllocator.alloc(8192).unwrap();
        /* The file must be exactly large enough to map and touch. */
        let mut map = ShmMapping::new(fd.as_fd(), 8192).unwrap();
        map.get_mut()[8191] = 1;
        assert_eq!(map.get()[8191], 1);
        assert_eq!(map.len(), 8192);
    }
}
