/* SPDX-License-Identifier: GPL-3.0-or-later */
/*! Wayland relay: presents a compositor to guest clients and forwards
 * everything they do to a host compositor, re-publishing shared memory
 * into host-visible pools along the way. */
use clap::{Arg, ArgAction, Command};
use log::{error, info, Log, Record};
use std::io::{IsTerminal, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::Arc;

mod compositor;
mod data_device;
mod output;
mod registry;
mod seat;
mod session;
mod shm;
mod util;
mod xdg_shell;

use crate::session::{RelayConfig, RelaySession};
use crate::shm::MemfdAllocator;

/** Logger configuration data */
struct Logger {
    max_level: log::LevelFilter,
    pid: u32,
    color_output: bool,
    anti_staircase: bool,
}

impl Log for Logger {
    fn enabled(&self, meta: &log::Metadata<'_>) -> bool {
        meta.level() <= self.max_level
    }
    fn log(&self, record: &Record<'_>) {
        if record.level() > self.max_level {
            return;
        }

        let time = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH);
        let t = if let Ok(t) = time {
            (t.as_nanos() % 100000000000u128) / 1000u128
        } else {
            0
        };
        let (esc1, esc2) = if self.color_output {
            if record.level() <= log::Level::Error {
                ("\x1b[0;35;1m", "\x1b[0m")
            } else {
                ("\x1b[0;35m", "\x1b[0m")
            }
        } else {
            ("", "")
        };
        let esc3 = if self.anti_staircase { "\r\n" } else { "\n" };
        let lvl_str: &str = match record.level() {
            log::Level::Error => "ERR",
            log::Level::Warn => "Wrn",
            log::Level::Debug => "dbg",
            log::Level::Info => "inf",
            log::Level::Trace => "trc",
        };

        const MAX_LOG_LEN: usize = 512;
        let mut buf = [0u8; MAX_LOG_LEN];
        let mut cursor = std::io::Cursor::new(&mut buf[..MAX_LOG_LEN - 5]);
        let _ = write!(
            &mut cursor,
            "{}[{:02}.{:06} {} ({}) {}:{}]{} {}{}",
            esc1,
            t / 1000000u128,
            t % 1000000u128,
            lvl_str,
            self.pid,
            record
                .file()
                .unwrap_or("src/unknown")
                .strip_prefix("src/")
                .unwrap_or("unknown"),
            record.line().unwrap_or(0),
            esc2,
            record.args(),
            esc3
        );
        let mut str_end = cursor.position() as usize;
        if str_end >= MAX_LOG_LEN - 9 {
            /* Deal with possible partial UTF-8 char */
            str_end = match std::str::from_utf8(&buf[..str_end]) {
                Ok(x) => x.len(),
                Err(y) => y.valid_up_to(),
            };
        }
        if str_end >= MAX_LOG_LEN - 9 {
            /* Assume message was truncated */
            buf[str_end..str_end + 3].fill(b'.');
            if self.anti_staircase {
                buf[str_end + 3] = b'\r';
                buf[str_end + 4] = b'\n';
                str_end += 5;
            } else {
                buf[str_end + 3] = b'\n';
                str_end += 4;
            }
        }
        let handle = &mut std::io::stderr().lock();
        let _ = handle.write_all(&buf[..str_end]);
        let _ = handle.flush();
    }
    fn flush(&self) {
        /* not needed */
    }
}

/** Resolve the host compositor socket: an explicit path, or the usual
 * `$XDG_RUNTIME_DIR`/`$WAYLAND_DISPLAY` pair. */
fn connect_to_host(explicit: Option<&str>) -> Result<UnixStream, String> {
    let path: PathBuf = match explicit {
        Some(p) => PathBuf::from(p),
        None => {
            let display = std::env::var_os("WAYLAND_DISPLAY")
                .ok_or_else(|| tag!("WAYLAND_DISPLAY is not set"))?;
            let display = PathBuf::from(display);
            if display.is_absolute() {
                display
            } else {
                let dir = std::env::var_os("XDG_RUNTIME_DIR")
                    .ok_or_else(|| tag!("XDG_RUNTIME_DIR is not set"))?;
                PathBuf::from(dir).join(display)
            }
        }
    };
    UnixStream::connect(&path)
        .map_err(|x| tag!("Failed to connect to host compositor at {:?}: {}", path, x))
}

fn bind_listener(path: &str) -> Result<UnixListener, String> {
    /* Replace a stale socket left by an earlier run. */
    let _ = std::fs::remove_file(path);
    UnixListener::bind(path).map_err(|x| tag!("Failed to bind socket at {:?}: {}", path, x))
}

fn run(
    listener: UnixListener,
    host_path: Option<String>,
    config: Arc<RelayConfig>,
) -> Result<(), String> {
    let allocator = Arc::new(MemfdAllocator);
    let mut counter: u64 = 0;
    for stream in listener.incoming() {
        let guest = match stream {
            Ok(g) => g,
            Err(x) => return Err(tag!("Failed to accept connection: {}", x)),
        };
        counter += 1;
        info!("Accepted guest connection {}", counter);

        let host = match connect_to_host(host_path.as_deref()) {
            Ok(h) => h,
            Err(x) => {
                error!("Dropping guest {}: {}", counter, x);
                continue;
            }
        };

        let config = config.clone();
        let allocator = allocator.clone();
        let builder = std::thread::Builder::new().name(format!("guest-{}", counter));
        let spawned = builder.spawn(move || {
            let result =
                RelaySession::new(guest, host, config, allocator).and_then(|mut s| s.run());
            if let Err(x) = result {
                error!("Session failed: {}", x);
            }
        });
        if let Err(x) = spawned {
            error!("Failed to spawn session thread: {}", x);
        }
    }
    Ok(())
}

fn main() {
    let matches = Command::new("wlrelay")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Relay Wayland clients to a host compositor")
        .arg(
            Arg::new("socket")
                .long("socket")
                .value_name("PATH")
                .required(true)
                .help("Path of the listening socket for guest clients"),
        )
        .arg(
            Arg::new("tag")
                .long("tag")
                .value_name("STRING")
                .default_value("")
                .help("Prefix for window titles forwarded to the host"),
        )
        .arg(
            Arg::new("host-socket")
                .long("host-socket")
                .value_name("PATH")
                .help("Host compositor socket; defaults to $WAYLAND_DISPLAY"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .short('d')
                .action(ArgAction::SetTrue)
                .help("Print debug messages"),
        )
        .arg(
            Arg::new("anti-staircase")
                .long("anti-staircase")
                .action(ArgAction::SetTrue)
                .hide(true)
                .help("Print \\r\\n line endings (for pty output capture)"),
        )
        .get_matches();

    let max_level = if matches.get_flag("debug") {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    let logger = Box::leak(Box::new(Logger {
        max_level,
        pid: std::process::id(),
        color_output: std::io::stderr().is_terminal(),
        anti_staircase: matches.get_flag("anti-staircase"),
    }));
    log::set_logger(logger).expect("logger was already installed");
    log::set_max_level(max_level);

    let socket_path: &String = matches.get_one("socket").unwrap();
    let tag: &String = matches.get_one("tag").unwrap();
    let host_path: Option<String> = matches.get_one::<String>("host-socket").cloned();
    let config = Arc::new(RelayConfig { tag: tag.clone() });

    let listener = match bind_listener(socket_path) {
        Ok(l) => l,
        Err(x) => {
            error!("{}", x);
            std::process::exit(1);
        }
    };
    info!("Listening for guest clients at {:?}", socket_path);

    if let Err(x) = run(listener, host_path, config) {
        error!("{}", x);
        std::process::exit(1);
    }
}
