//! Process-wide mutex serialising the handful of libav calls that are not
//! safe to run concurrently with each other: opening/closing a codec,
//! probing stream info, and closing an input. Grounded directly on
//! harvid's own `avcodec_lock` in the original C implementation. Decoding
//! and scaling on distinct `Decoder` instances are unaffected and proceed
//! in parallel.

use std::sync::Mutex;

use once_cell::sync::OnceCell;

static CODEC_LOCK: OnceCell<Mutex<()>> = OnceCell::new();

pub fn codec_lock() -> &'static Mutex<()> {
    CODEC_LOCK.get_or_init(|| Mutex::new(()))
}
