//! Central kernel logging with optional in-memory capture.
//!
//! [`KernelLogger`] is the `log` backend: every record goes to the console as
//! `[LEVEL target] message` and, while capture is enabled, into a fixed
//! buffer that can be read back per target.

use core::fmt::{self, Write as _};
use core::sync::atomic::{AtomicBool, Ordering};

use log::{LevelFilter, Log, Metadata, Record};

use crate::console::Console;
use crate::sync::SpinLock;

const CAPTURE_BUF_SIZE: usize = 16 * 1024;

struct CaptureState {
    enabled: bool,
    len: usize,
    overflow: bool,
    buf: [u8; CAPTURE_BUF_SIZE],
}

static CAPTURE: SpinLock<CaptureState> = SpinLock::new(CaptureState {
    enabled: false,
    len: 0,
    overflow: false,
    buf: [0; CAPTURE_BUF_SIZE],
});

struct BufferWriter<'a> {
    state: &'a mut CaptureState,
}

impl fmt::Write for BufferWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let remaining = self.state.buf.len().saturating_sub(self.state.len);
        let write_len = remaining.min(bytes.len());

        if write_len > 0 {
            let start = self.state.len;
            let end = start + write_len;
            self.state.buf[start..end].copy_from_slice(&bytes[..write_len]);
            self.state.len = end;
        }

        if write_len < bytes.len() {
            self.state.overflow = true;
        }
        Ok(())
    }
}

pub struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;
static INSTALLED: AtomicBool = AtomicBool::new(false);

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let _ = writeln!(
            Console,
            "[{:<5} {}] {}",
            record.level(),
            record.target(),
            record.args()
        );
        capture_line(record.target(), *record.args());
    }

    fn flush(&self) {}
}

fn capture_line(target: &str, args: fmt::Arguments<'_>) {
    let mut state = CAPTURE.lock();
    if !state.enabled {
        return;
    }

    let mut writer = BufferWriter { state: &mut state };
    let _ = writer.write_str(target);
    let _ = writer.write_char('|');
    let _ = fmt::write(&mut writer, args);
    let _ = writer.write_char('\n');
}

/// Install the kernel logger. Later calls only change the level.
pub fn init(level: LevelFilter) {
    if !INSTALLED.swap(true, Ordering::AcqRel) {
        // Fails only if another logger was installed first; keep that one.
        let _ = log::set_logger(&LOGGER);
    }
    log::set_max_level(level);
}

/// Enable or disable capture. Either way the buffer is emptied.
pub fn set_capture_enabled(enabled: bool) {
    let mut state = CAPTURE.lock();
    state.enabled = enabled;
    state.len = 0;
    state.overflow = false;
}

pub fn capture_overflowed() -> bool {
    CAPTURE.lock().overflow
}

/// Call `f` with each captured message logged under `target`, oldest first.
/// `f` runs under the capture lock and must not log.
pub fn captured_lines_for(target: &str, mut f: impl FnMut(&str)) {
    let state = CAPTURE.lock();
    let Ok(text) = core::str::from_utf8(&state.buf[..state.len]) else {
        return;
    };

    for raw_line in text.split('\n') {
        let Some((line_target, msg)) = raw_line.split_once('|') else {
            continue;
        };
        if line_target == target {
            f(msg);
        }
    }
}
